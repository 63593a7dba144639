/// Error kinds shared by the codecs, the sensor source and the broadcast session
use thiserror::Error;

use crate::bluetooth::driver::Capability;

/// Errors raised by beacon operations
///
/// Every failure is local to the operation that produced it. Callers may
/// retry at their own discretion; nothing here retries automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeaconError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Truncated payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    #[error("Permission not granted: {0}")]
    PermissionDenied(Capability),

    #[error("Unsupported hardware: {0}")]
    UnsupportedHardware(String),

    #[error("Radio driver failure, error code {0}")]
    DriverFailure(i32),
}
