//! Best-effort "keep the device awake" requests.
//!
//! The timer asks for a wake lock while it runs and gives it back when it
//! pauses or stops. Acquisition failures are logged and otherwise ignored.

use thiserror::Error;

use super::TimerId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("wake lock unavailable: {0}")]
pub struct WakeLockError(pub String);

pub trait WakeLock: Send + Sync {
    fn acquire(&self, id: &TimerId) -> Result<(), WakeLockError>;
    fn release(&self, id: &TimerId);
}

/// Platform without wake-lock support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWakeLock;

impl WakeLock for NoWakeLock {
    fn acquire(&self, _id: &TimerId) -> Result<(), WakeLockError> {
        Err(WakeLockError("not supported on this platform".into()))
    }

    fn release(&self, _id: &TimerId) {}
}
