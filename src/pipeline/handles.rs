//! Typed handles on the named nodes of a pipeline.

use super::PipelineInner;
use crate::core::{Buffer, BufferPolicy, Element, TensorsData, TensorsInfo};
use crate::engine::{SinkCallback, SrcCallbacks};
use crate::error::{MlError, Result};
use crate::nodes::tensor_buffer::to_flexible;
use crate::registry::{ElementKind, PropertyValue};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// What a handle is allowed to do with its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleRole {
    Source,
    Sink,
    Valve,
    Switch,
    /// Property access; any node qualifies.
    Element,
}

impl HandleRole {
    pub(crate) fn accepts(self, kind: ElementKind) -> bool {
        match self {
            HandleRole::Source => kind == ElementKind::Source,
            HandleRole::Sink => kind == ElementKind::Sink,
            HandleRole::Valve => kind == ElementKind::Valve,
            HandleRole::Switch => matches!(kind, ElementKind::InputSelector | ElementKind::OutputSelector),
            HandleRole::Element => true,
        }
    }
}

impl fmt::Display for HandleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleRole::Source => "source",
            HandleRole::Sink => "sink",
            HandleRole::Valve => "valve",
            HandleRole::Switch => "switch",
            HandleRole::Element => "element",
        })
    }
}

/// Lease shared by all handle types.
struct Lease {
    id: u64,
    role: HandleRole,
    pipeline: Weak<PipelineInner>,
    element: Weak<Element>,
    name: String,
    released: AtomicBool,
}

impl Lease {
    fn new(inner: &Arc<PipelineInner>, element: Arc<Element>, role: HandleRole) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        inner.lease(id, element.name(), role);
        Self {
            id,
            role,
            pipeline: Arc::downgrade(inner),
            element: Arc::downgrade(&element),
            name: element.name().to_string(),
            released: AtomicBool::new(false),
        }
    }

    /// The live pipeline and node behind the handle.
    fn get(&self) -> Result<(Arc<PipelineInner>, Arc<Element>)> {
        let invalid = || MlError::invalid(format!("{} handle on '{}' is no longer valid", self.role, self.name));
        if self.released.load(Ordering::Acquire) {
            return Err(invalid());
        }
        let pipeline = self.pipeline.upgrade().ok_or_else(invalid)?;
        if pipeline.is_closed() || !pipeline.holds_lease(self.id) {
            return Err(invalid());
        }
        let element = self.element.upgrade().ok_or_else(invalid)?;
        Ok((pipeline, element))
    }

    fn release(&self) -> Result<()> {
        let (pipeline, _) = self.get()?;
        self.released.store(true, Ordering::Release);
        if !pipeline.end_lease(self.id) {
            return Err(MlError::invalid(format!("{} handle on '{}' is already released", self.role, self.name)));
        }
        debug!(node = %self.name, role = %self.role, id = self.id, "handle released");
        Ok(())
    }

    /// Drop path: quietly end the lease if still held.
    fn release_quietly(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pipeline) = self.pipeline.upgrade() {
            pipeline.end_lease(self.id);
        }
    }
}

/// Injects data into an `appsrc` node.
pub struct SrcHandle {
    lease: Lease,
}

impl SrcHandle {
    pub(super) fn new(inner: &Arc<PipelineInner>, element: Arc<Element>) -> Self {
        Self {
            lease: Lease::new(inner, element, HandleRole::Source),
        }
    }

    pub fn name(&self) -> &str {
        &self.lease.name
    }

    /// Layout of the tensors the source pushes. Sources without a fixed
    /// layout report the layout of the last injected data.
    pub fn get_tensors_info(&self) -> Result<TensorsInfo> {
        let (_, element) = self.lease.get()?;
        let caps = element.caps();
        match (caps.is_flexible(), caps.tensors_info()) {
            (false, Some(info)) => Ok(info.clone()),
            _ => element
                .last_info()
                .ok_or_else(|| MlError::pipe(format!("source '{}' has no negotiated tensor layout yet", element.name()))),
        }
    }

    /// Inject one buffer. `AutoFree` hands the data over; `DoNotFree` lets
    /// the engine read the caller's data in place while it is in flight.
    pub fn input_data(&self, data: impl Into<Arc<TensorsData>>, policy: BufferPolicy) -> Result<()> {
        let data = data.into();
        let (pipeline, element) = self.lease.get()?;
        pipeline.engine().check()?;

        if data.count() == 0 || !data.is_allocated() {
            return Err(MlError::invalid("input data holds no tensor buffers"));
        }
        let info = data.info().clone();
        let caps = element.caps();

        let buffer = if caps.is_flexible() {
            let raw = Buffer::from_tensors(data, policy)?;
            let buffer = to_flexible(&raw, &info).map_err(|e| MlError::invalid(e.to_string()))?;
            element.set_last_info(info);
            buffer
        } else if let Some(expected) = caps.tensors_info() {
            if expected.count() != info.count() {
                return Err(MlError::invalid(format!(
                    "source '{}' expects {} tensors, got {}",
                    element.name(),
                    expected.count(),
                    info.count()
                )));
            }
            for i in 0..info.count() {
                let (want, got) = (expected.tensor_size(i as i32)?, info.tensor_size(i as i32)?);
                if want != got {
                    return Err(MlError::invalid(format!(
                        "tensor {} of source '{}' must be {} bytes, got {}",
                        i,
                        element.name(),
                        want,
                        got
                    )));
                }
            }
            Buffer::from_tensors(data, policy)?
        } else {
            element.set_last_info(info);
            Buffer::from_tensors(data, policy)?
        };

        trace!(node = %element.name(), bytes = buffer.total_size(), ?policy, "data injected");
        element
            .push_input(buffer)
            .map_err(|e| MlError::pipe(e.to_string()))
    }

    /// Install need-data / enough-data notifications. A later call on any
    /// handle of the same node replaces them.
    pub fn set_event_cb(&self, callbacks: SrcCallbacks) -> Result<()> {
        let (_, element) = self.lease.get()?;
        element.set_src_callbacks(self.lease.id, callbacks);
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        let (_, element) = self.lease.get()?;
        element.clear_src_callbacks(self.lease.id);
        self.lease.release()
    }
}

impl Drop for SrcHandle {
    fn drop(&mut self) {
        if let Ok((_, element)) = self.lease.get() {
            element.clear_src_callbacks(self.lease.id);
        }
        self.lease.release_quietly();
    }
}

/// One callback registration on a sink node.
pub struct SinkHandle {
    lease: Lease,
    signal: u64,
}

impl SinkHandle {
    pub(super) fn new(inner: &Arc<PipelineInner>, element: Arc<Element>, callback: SinkCallback) -> Self {
        let signal = element.connect_new_data(callback);
        Self {
            lease: Lease::new(inner, element, HandleRole::Sink),
            signal,
        }
    }

    pub fn name(&self) -> &str {
        &self.lease.name
    }

    /// Detach this registration; others on the same node keep receiving.
    pub fn unregister(&self) -> Result<()> {
        let (_, element) = self.lease.get()?;
        element.disconnect_new_data(self.signal);
        self.lease.release()
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        if let Ok((_, element)) = self.lease.get() {
            element.disconnect_new_data(self.signal);
        }
        self.lease.release_quietly();
    }
}

pub struct ValveHandle {
    lease: Lease,
}

impl ValveHandle {
    pub(super) fn new(inner: &Arc<PipelineInner>, element: Arc<Element>) -> Self {
        Self {
            lease: Lease::new(inner, element, HandleRole::Valve),
        }
    }

    /// An open valve lets buffers through; a closed one drops them.
    pub fn set_open(&self, open: bool) -> Result<()> {
        let (_, element) = self.lease.get()?;
        element.props().set("drop", PropertyValue::Bool(!open))?;
        debug!(node = %element.name(), open, "valve toggled");
        Ok(())
    }

    pub fn is_open(&self) -> Result<bool> {
        let (_, element) = self.lease.get()?;
        Ok(!element.props().bool("drop"))
    }

    pub fn release(&self) -> Result<()> {
        self.lease.release()
    }
}

impl Drop for ValveHandle {
    fn drop(&mut self) {
        self.lease.release_quietly();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchType {
    /// Picks one of several inputs.
    Input,
    /// Sends to one of several outputs.
    Output,
}

pub struct SwitchHandle {
    lease: Lease,
    switch_type: SwitchType,
}

impl SwitchHandle {
    pub(super) fn new(inner: &Arc<PipelineInner>, element: Arc<Element>, switch_type: SwitchType) -> Self {
        Self {
            lease: Lease::new(inner, element, HandleRole::Switch),
            switch_type,
        }
    }

    pub fn switch_type(&self) -> SwitchType {
        self.switch_type
    }

    /// Pads the switch selects between.
    pub fn get_pad_list(&self) -> Result<Vec<String>> {
        let (_, element) = self.lease.get()?;
        Ok(match self.switch_type {
            SwitchType::Input => element.sink_pads(),
            SwitchType::Output => element.src_pads(),
        })
    }

    pub fn select(&self, pad: &str) -> Result<()> {
        let pads = self.get_pad_list()?;
        if !pads.iter().any(|p| p == pad) {
            return Err(MlError::invalid(format!(
                "switch '{}' has no pad '{}' (pads: {})",
                self.lease.name,
                pad,
                pads.join(", ")
            )));
        }
        let (_, element) = self.lease.get()?;
        element
            .props()
            .set("active-pad", PropertyValue::String(pad.to_string()))?;
        debug!(node = %element.name(), pad, "switch selected");
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        self.lease.release()
    }
}

impl Drop for SwitchHandle {
    fn drop(&mut self) {
        self.lease.release_quietly();
    }
}

/// Typed property access on any node.
///
/// Each accessor requires the property's declared type. Enum properties
/// are also readable and writable through the signed and unsigned 32-bit
/// accessors.
pub struct ElementHandle {
    lease: Lease,
}

macro_rules! typed_property {
    ($set:ident, $get:ident, $ty:ty, $variant:ident) => {
        pub fn $set(&self, property: &str, value: $ty) -> Result<()> {
            self.set(property, PropertyValue::$variant(value))
        }

        pub fn $get(&self, property: &str) -> Result<$ty> {
            match self.get(property)? {
                PropertyValue::$variant(v) => Ok(v),
                other => Err(self.mismatch(property, stringify!($ty), &other)),
            }
        }
    };
}

impl ElementHandle {
    pub(super) fn new(inner: &Arc<PipelineInner>, element: Arc<Element>) -> Self {
        Self {
            lease: Lease::new(inner, element, HandleRole::Element),
        }
    }

    pub fn name(&self) -> &str {
        &self.lease.name
    }

    fn get(&self, property: &str) -> Result<PropertyValue> {
        let (_, element) = self.lease.get()?;
        element.props().get(property)
    }

    fn set(&self, property: &str, value: PropertyValue) -> Result<()> {
        let (_, element) = self.lease.get()?;
        element.props().set(property, value)?;
        trace!(node = %element.name(), property, "property set");
        Ok(())
    }

    fn mismatch(&self, property: &str, wanted: &str, found: &PropertyValue) -> MlError {
        MlError::invalid(format!(
            "property '{}' of '{}' is {}, not {}",
            property,
            self.lease.name,
            found.kind_name(),
            wanted
        ))
    }

    typed_property!(set_bool, get_bool, bool, Bool);
    typed_property!(set_i64, get_i64, i64, Int64);
    typed_property!(set_u64, get_u64, u64, UInt64);
    typed_property!(set_f64, get_f64, f64, Double);

    pub fn set_string(&self, property: &str, value: &str) -> Result<()> {
        self.set(property, PropertyValue::String(value.to_string()))
    }

    pub fn get_string(&self, property: &str) -> Result<String> {
        match self.get(property)? {
            PropertyValue::String(v) => Ok(v),
            other => Err(self.mismatch(property, "string", &other)),
        }
    }

    pub fn set_i32(&self, property: &str, value: i32) -> Result<()> {
        self.set(property, PropertyValue::Int32(value))
    }

    pub fn get_i32(&self, property: &str) -> Result<i32> {
        match self.get(property)? {
            PropertyValue::Int32(v) | PropertyValue::Enum(v) => Ok(v),
            other => Err(self.mismatch(property, "i32", &other)),
        }
    }

    pub fn set_u32(&self, property: &str, value: u32) -> Result<()> {
        self.set(property, PropertyValue::UInt32(value))
    }

    pub fn get_u32(&self, property: &str) -> Result<u32> {
        match self.get(property)? {
            PropertyValue::UInt32(v) => Ok(v),
            PropertyValue::Enum(v) => u32::try_from(v).map_err(|_| MlError::invalid("negative enum value")),
            other => Err(self.mismatch(property, "u32", &other)),
        }
    }

    pub fn set_enum(&self, property: &str, value: u32) -> Result<()> {
        let raw = i32::try_from(value).map_err(|_| MlError::invalid("enum value out of range"))?;
        self.set(property, PropertyValue::Enum(raw))
    }

    pub fn get_enum(&self, property: &str) -> Result<u32> {
        match self.get(property)? {
            PropertyValue::Enum(v) => u32::try_from(v).map_err(|_| MlError::invalid("negative enum value")),
            other => Err(self.mismatch(property, "enum", &other)),
        }
    }

    pub fn release(&self) -> Result<()> {
        self.lease.release()
    }
}

impl Drop for ElementHandle {
    fn drop(&mut self) {
        self.lease.release_quietly();
    }
}
