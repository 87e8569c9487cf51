//! Errors reported by a device.

use thiserror::Error;

/// Result of a device call.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A device call failed.
///
/// After any of these the device's session state is unknown: auxiliary data sent earlier may or
/// may not still be latched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DeviceError {
    /// The device answered with an error status, for example because the user declined.
    #[error("device rejected the request with status {status:#06x}: {reason}")]
    Rejected {
        /// Status word returned by the device.
        status: u16,
        /// Human readable reason.
        reason: String,
    },

    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device does not implement the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The device accepted the request but could not produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl DeviceError {
    /// Status word returned by the device, if it answered at all.
    pub const fn status(&self) -> Option<u16> {
        match self {
            DeviceError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_reports_status() {
        let err = DeviceError::Rejected {
            status: 0x6985,
            reason: "denied by the user".to_string(),
        };
        assert_eq!(err.status(), Some(0x6985));
        assert_eq!(
            err.to_string(),
            "device rejected the request with status 0x6985: denied by the user"
        );
        assert_eq!(DeviceError::Transport("closed".into()).status(), None);
    }
}
