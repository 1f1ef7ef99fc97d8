use super::properties::PropertySpec;
use crate::core::ProcessingNode;

/// Role an element plays towards the handle API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Accepts injected data (`appsrc`).
    Source,
    /// Delivers buffers to registered callbacks.
    Sink,
    Valve,
    InputSelector,
    OutputSelector,
    Generic,
}

/// How an element exposes pads of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadTemplate {
    None,
    /// Fixed pads that exist from creation.
    Always(&'static [&'static str]),
    /// Pads created on link, named `<prefix><n>`.
    Request(&'static str),
}

/// Factory function type for creating element instances
pub type NodeFactory = fn() -> Box<dyn ProcessingNode>;

/// Complete metadata for an element type
#[derive(Clone)]
pub struct ElementMetadata {
    pub type_name: &'static str,
    pub description: &'static str,
    pub kind: ElementKind,
    pub sink_pads: PadTemplate,
    pub src_pads: PadTemplate,
    pub properties: Vec<PropertySpec>,
    pub factory: NodeFactory,
}

impl ElementMetadata {
    pub fn new(
        type_name: &'static str,
        description: &'static str,
        kind: ElementKind,
        factory: NodeFactory,
    ) -> Self {
        Self {
            type_name,
            description,
            kind,
            sink_pads: PadTemplate::Always(&["sink"]),
            src_pads: PadTemplate::Always(&["src"]),
            properties: Vec::new(),
            factory,
        }
    }

    pub fn with_sink_pads(mut self, pads: PadTemplate) -> Self {
        self.sink_pads = pads;
        self
    }

    pub fn with_src_pads(mut self, pads: PadTemplate) -> Self {
        self.src_pads = pads;
        self
    }

    pub fn add_property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// Create a new instance of this element type
    pub fn create_instance(&self) -> Box<dyn ProcessingNode> {
        (self.factory)()
    }
}

// Factory type for creating element metadata at runtime
pub type ElementMetadataFactory = fn() -> ElementMetadata;

/// Registration of an element type defined outside this crate.
///
/// ```ignore
/// inventory::submit! {
///     ElementMetadataFactoryWrapper(my_element_metadata)
/// }
/// ```
pub struct ElementMetadataFactoryWrapper(pub ElementMetadataFactory);

inventory::collect!(ElementMetadataFactoryWrapper);

/// Resolve an element type name. Built-in types shadow submitted ones.
pub fn find_element(type_name: &str) -> Option<ElementMetadata> {
    crate::nodes::builtin_elements()
        .iter()
        .map(|factory| factory())
        .find(|meta| meta.type_name == type_name)
        .or_else(|| {
            inventory::iter::<ElementMetadataFactoryWrapper>
                .into_iter()
                .map(|wrapper| (wrapper.0)())
                .find(|meta| meta.type_name == type_name)
        })
}

/// Names of every known element type.
pub fn element_types() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = crate::nodes::builtin_elements()
        .iter()
        .map(|factory| factory().type_name)
        .collect();
    for wrapper in inventory::iter::<ElementMetadataFactoryWrapper> {
        let name = (wrapper.0)().type_name;
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
