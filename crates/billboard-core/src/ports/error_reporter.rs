//! ErrorReporter port - 非致命的な失敗の通知先

use crate::domain::EngineFault;

pub trait ErrorReporter: Send + Sync {
    fn report(&self, fault: EngineFault);
}
