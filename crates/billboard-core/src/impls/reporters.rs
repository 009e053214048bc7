use parking_lot::Mutex;
use tracing::warn;

use crate::domain::EngineFault;
use crate::ports::ErrorReporter;

/// Default reporter: one `warn!` event per fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, fault: EngineFault) {
        warn!(
            kind = ?fault.kind(),
            ad_id = %fault.advertisement(),
            error = %fault,
            "engine fault"
        );
    }
}

/// Keeps every fault in memory.
#[derive(Debug, Default)]
pub struct CollectingErrorReporter {
    faults: Mutex<Vec<EngineFault>>,
}

impl CollectingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Vec<EngineFault> {
        self.faults.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.faults.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.lock().is_empty()
    }

    pub fn clear(&self) {
        self.faults.lock().clear();
    }
}

impl ErrorReporter for CollectingErrorReporter {
    fn report(&self, fault: EngineFault) {
        self.faults.lock().push(fault);
    }
}
