//! Process-wide table of user-defined elements.
//!
//! A registered easy filter is referenced from a graph description as
//! `tensor_filter framework=custom-easy model=<name>`, an if-condition as
//! `tensor_if compared-value=CUSTOM compared-value-option=<name>`. Every
//! element built on a registration holds a [`CustomNodeRef`]; while one is
//! alive the registration cannot be removed.

use crate::core::{TensorsData, TensorsInfo};
use crate::error::{MlError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info};

/// Fills the pre-allocated output from the input. An error drops the buffer.
pub type EasyFilterFn = Arc<dyn Fn(&TensorsData, &mut TensorsData) -> anyhow::Result<()> + Send + Sync>;

/// Decides between the `then` (`true`) and `else` branch for a buffer.
pub type IfConditionFn = Arc<dyn Fn(&TensorsData, &TensorsInfo) -> anyhow::Result<bool> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomKind {
    EasyFilter,
    IfCondition,
}

#[derive(Clone)]
pub enum CustomCallback {
    EasyFilter {
        in_info: TensorsInfo,
        out_info: TensorsInfo,
        invoke: EasyFilterFn,
    },
    IfCondition(IfConditionFn),
}

impl CustomCallback {
    pub fn kind(&self) -> CustomKind {
        match self {
            CustomCallback::EasyFilter { .. } => CustomKind::EasyFilter,
            CustomCallback::IfCondition(_) => CustomKind::IfCondition,
        }
    }
}

struct Registration {
    id: u64,
    callback: CustomCallback,
    active: usize,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn table() -> MutexGuard<'static, HashMap<String, Registration>> {
    static TABLE: OnceLock<Mutex<HashMap<String, Registration>>> = OnceLock::new();
    TABLE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|p| p.into_inner())
}

fn insert(name: &str, callback: CustomCallback) -> Result<CustomRegistration> {
    if name.is_empty() {
        return Err(MlError::invalid("custom node name is empty"));
    }
    let kind = callback.kind();
    let mut table = table();
    if table.contains_key(name) {
        return Err(MlError::pipe(format!("custom node '{}' is already registered", name)));
    }
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    table.insert(
        name.to_string(),
        Registration {
            id,
            callback,
            active: 0,
        },
    );
    info!(name, ?kind, "custom node registered");
    Ok(CustomRegistration {
        name: name.to_string(),
        id,
        kind,
    })
}

/// Register an easy filter that maps `in_info` tensors to `out_info` tensors.
pub fn register_easy_filter<F>(
    name: &str,
    in_info: &TensorsInfo,
    out_info: &TensorsInfo,
    filter: F,
) -> Result<CustomRegistration>
where
    F: Fn(&TensorsData, &mut TensorsData) -> anyhow::Result<()> + Send + Sync + 'static,
{
    if !in_info.validate() || !out_info.validate() {
        return Err(MlError::invalid("easy filter needs valid input and output info"));
    }
    insert(
        name,
        CustomCallback::EasyFilter {
            in_info: in_info.clone(),
            out_info: out_info.clone(),
            invoke: Arc::new(filter),
        },
    )
}

/// Register a branch condition for `tensor_if`.
pub fn register_if_condition<F>(name: &str, condition: F) -> Result<CustomRegistration>
where
    F: Fn(&TensorsData, &TensorsInfo) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    insert(name, CustomCallback::IfCondition(Arc::new(condition)))
}

/// Caller-side handle of a registration.
#[derive(Debug)]
pub struct CustomRegistration {
    name: String,
    id: u64,
    kind: CustomKind,
}

impl CustomRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CustomKind {
        self.kind
    }

    /// Number of live pipelines or single-shot handles using this node.
    pub fn active_count(&self) -> usize {
        table()
            .get(&self.name)
            .filter(|r| r.id == self.id)
            .map_or(0, |r| r.active)
    }

    /// Remove the registration. Fails while any pipeline still uses it, and
    /// when it was already removed.
    pub fn unregister(&self) -> Result<()> {
        let mut table = table();
        match table.get(&self.name) {
            Some(r) if r.id == self.id => {
                if r.active > 0 {
                    return Err(MlError::invalid(format!(
                        "custom node '{}' is used by {} pipeline(s)",
                        self.name, r.active
                    )));
                }
            }
            _ => {
                return Err(MlError::invalid(format!(
                    "custom node '{}' is not registered",
                    self.name
                )))
            }
        }
        table.remove(&self.name);
        info!(name = %self.name, "custom node unregistered");
        Ok(())
    }
}

/// A counted use of a registration; dropping it releases the use.
pub struct CustomNodeRef {
    name: String,
    id: u64,
    callback: CustomCallback,
}

impl CustomNodeRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callback(&self) -> &CustomCallback {
        &self.callback
    }
}

impl Drop for CustomNodeRef {
    fn drop(&mut self) {
        let mut table = table();
        if let Some(r) = table.get_mut(&self.name) {
            if r.id == self.id {
                r.active = r.active.saturating_sub(1);
                debug!(name = %self.name, active = r.active, "custom node released");
            }
        }
    }
}

/// Take a counted reference on the registration `name` of the given kind.
pub(crate) fn acquire(name: &str, kind: CustomKind) -> Result<CustomNodeRef> {
    let mut table = table();
    let r = table
        .get_mut(name)
        .ok_or_else(|| MlError::pipe(format!("no custom node named '{}'", name)))?;
    if r.callback.kind() != kind {
        return Err(MlError::pipe(format!(
            "custom node '{}' is a {:?}, not a {:?}",
            name,
            r.callback.kind(),
            kind
        )));
    }
    r.active += 1;
    debug!(name, active = r.active, "custom node acquired");
    Ok(CustomNodeRef {
        name: name.to_string(),
        id: r.id,
        callback: r.callback.clone(),
    })
}
