pub mod custom;
pub mod metadata;
pub mod properties;

pub use custom::{
    register_easy_filter, register_if_condition, CustomCallback, CustomKind, CustomNodeRef,
    CustomRegistration,
};
pub use metadata::{
    element_types, find_element, ElementKind, ElementMetadata, ElementMetadataFactoryWrapper,
    PadTemplate,
};
pub use properties::{PropertyKind, PropertySpec, PropertyStore, PropertyValue};
