//! Single-shot invocation of a registered easy filter, outside any
//! streaming pipeline.

use crate::core::{TensorsData, TensorsInfo};
use crate::error::{MlError, Result};
use crate::registry::custom::{self, CustomCallback, CustomKind, CustomNodeRef};
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// An opened easy filter. Holding it counts as a use of the registration.
pub struct SingleShot {
    node: Arc<CustomNodeRef>,
    timeout: Duration,
    busy: Arc<AtomicBool>,
}

impl SingleShot {
    /// Open the easy filter registered as `name`.
    pub fn open(name: &str) -> Result<Self> {
        let node = custom::acquire(name, CustomKind::EasyFilter)?;
        debug!(name, "single-shot opened");
        Ok(Self {
            node: Arc::new(node),
            timeout: Duration::ZERO,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Upper bound on one invocation; zero waits forever.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn input_info(&self) -> Result<TensorsInfo> {
        match self.node.callback() {
            CustomCallback::EasyFilter { in_info, .. } => Ok(in_info.clone()),
            CustomCallback::IfCondition(_) => Err(MlError::pipe("not an easy filter")),
        }
    }

    pub fn output_info(&self) -> Result<TensorsInfo> {
        match self.node.callback() {
            CustomCallback::EasyFilter { out_info, .. } => Ok(out_info.clone()),
            CustomCallback::IfCondition(_) => Err(MlError::pipe("not an easy filter")),
        }
    }

    /// Run the filter on `input`.
    ///
    /// When the timeout expires the call returns `TimedOut` and the late
    /// result is discarded; until that run finishes, further calls return
    /// `TryAgain`.
    pub fn invoke(&self, input: &TensorsData) -> Result<TensorsData> {
        let CustomCallback::EasyFilter {
            in_info,
            out_info,
            invoke,
        } = self.node.callback()
        else {
            return Err(MlError::pipe("not an easy filter"));
        };

        if input.count() != in_info.count() {
            return Err(MlError::invalid(format!(
                "'{}' takes {} tensors, got {}",
                self.node.name(),
                in_info.count(),
                input.count()
            )));
        }
        for i in 0..input.count() {
            if input.tensor_data(i)?.len() != in_info.tensor_size(i as i32)? {
                return Err(MlError::invalid(format!("tensor {} has the wrong size", i)));
            }
        }

        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(MlError::TryAgain(format!(
                "previous invocation of '{}' is still running",
                self.node.name()
            )));
        }

        let mut output = match TensorsData::create(out_info) {
            Ok(output) => output,
            Err(e) => {
                self.busy.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let input = input.clone();
        let invoke = Arc::clone(invoke);
        let node = Arc::clone(&self.node);
        let busy = Arc::clone(&self.busy);
        let (tx, rx) = crossbeam_channel::bounded(1);

        let spawned = thread::Builder::new()
            .name("mlstream-single".to_string())
            .spawn(move || {
                let result = invoke(&input, &mut output).map(|()| output);
                drop(node);
                busy.store(false, Ordering::Release);
                // The caller may have given up already.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            self.busy.store(false, Ordering::Release);
            return Err(e.into());
        }

        let result = if self.timeout.is_zero() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(self.timeout)
        };
        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(MlError::pipe(format!("'{}' failed: {:#}", self.node.name(), e))),
            Err(RecvTimeoutError::Timeout) => {
                warn!(name = %self.node.name(), timeout_ms = self.timeout.as_millis() as u64, "invocation timed out");
                Err(MlError::TimedOut(format!(
                    "'{}' did not finish within {:?}",
                    self.node.name(),
                    self.timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(MlError::pipe("invocation thread ended without a result")),
        }
    }

    /// Release the filter.
    pub fn close(self) -> Result<()> {
        debug!(name = %self.node.name(), "single-shot closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TensorType;
    use crate::registry::register_easy_filter;

    fn info() -> TensorsInfo {
        let mut info = TensorsInfo::new();
        info.set_count(1).unwrap();
        info.set_tensor_type(0, TensorType::UInt8).unwrap();
        info.set_tensor_dimension(0, &[4]).unwrap();
        info
    }

    #[test]
    fn test_invoke_copies_through() {
        let reg = register_easy_filter("unit_single_copy", &info(), &info(), |input, output| {
            output.set_tensor_data(0, input.tensor_data(0)?)?;
            Ok(())
        })
        .unwrap();
        let single = SingleShot::open("unit_single_copy").unwrap();
        assert_eq!(reg.active_count(), 1);

        let mut input = TensorsData::create(&info()).unwrap();
        input.set_tensor_data(0, &[1, 2, 3, 4]).unwrap();
        let output = single.invoke(&input).unwrap();
        assert_eq!(output.tensor_data(0).unwrap(), &[1, 2, 3, 4]);

        assert!(reg.unregister().is_err());
        single.close().unwrap();
        reg.unregister().unwrap();
    }

    #[test]
    fn test_open_unknown_name() {
        let err = SingleShot::open("unit_single_missing").err().unwrap();
        assert_eq!(err.status(), crate::Status::StreamsPipe);
    }
}
