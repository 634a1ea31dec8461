//! Error types for the wgc-capture library

use thiserror::Error;

/// Main error type for capture operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No usable hardware graphics adapter or driver
    #[error("Graphics device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Window or monitor cannot be bound as a capture source
    #[error("Capture target unavailable: {0}")]
    TargetUnavailable(String),

    /// Caller-supplied destination is smaller than the resolved region
    #[error("Destination buffer too small: need {required} bytes, got {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    /// Polling before the compositor has delivered any frame
    #[error("No frame available yet")]
    NoFrameYet,

    /// One-shot capture exceeded its wait budget
    #[error("Capture timeout: exceeded {timeout_ms}ms")]
    CaptureTimeout { timeout_ms: u64 },

    /// GPU copy into the staging surface failed
    #[error("Surface copy failed: {0}")]
    CopyFailed(String),

    /// Mapped surface geometry does not fit the requested copy
    #[error("Invalid surface layout: {0}")]
    InvalidLayout(String),

    /// Operation on a session that is no longer running
    #[error("Capture session is closed")]
    SessionClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Windows-specific error
    #[cfg(windows)]
    #[error("Windows error: {0}")]
    WindowsError(#[from] windows::core::Error),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Combined result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Error code reported when the last operation succeeded
pub const CODE_SUCCESS: i32 = 0;

/// Convert error code to human-readable string
pub fn error_code_to_string(code: i32) -> String {
    match code {
        CODE_SUCCESS => "Success".to_string(),
        -1001 => "Graphics device unavailable".to_string(),
        -1002 => "Capture target unavailable".to_string(),
        -1003 => "Destination buffer too small".to_string(),
        -1004 => "No frame available yet".to_string(),
        -1005 => "Capture timeout".to_string(),
        -1006 => "Surface copy failed".to_string(),
        -1007 => "Invalid surface layout".to_string(),
        -1008 => "Capture session is closed".to_string(),
        -1009 => "Invalid configuration".to_string(),
        -1010 => "Windows error".to_string(),
        -1999 => "Generic error".to_string(),
        _ => format!("Unknown error code: {}", code),
    }
}

impl CaptureError {
    /// Check if the error is an expected, transient outcome (worth polling again)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::NoFrameYet | CaptureError::CaptureTimeout { .. }
        )
    }

    /// Get error code for FFI
    pub fn to_error_code(&self) -> i32 {
        match self {
            CaptureError::DeviceUnavailable(_) => -1001,
            CaptureError::TargetUnavailable(_) => -1002,
            CaptureError::BufferTooSmall { .. } => -1003,
            CaptureError::NoFrameYet => -1004,
            CaptureError::CaptureTimeout { .. } => -1005,
            CaptureError::CopyFailed(_) => -1006,
            CaptureError::InvalidLayout(_) => -1007,
            CaptureError::SessionClosed => -1008,
            CaptureError::InvalidConfiguration(_) => -1009,
            #[cfg(windows)]
            CaptureError::WindowsError(_) => -1010,
            CaptureError::Other(_) => -1999,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_display() {
        let err = CaptureError::BufferTooSmall {
            required: 400,
            provided: 399,
        };
        assert_eq!(
            err.to_string(),
            "Destination buffer too small: need 400 bytes, got 399"
        );
    }

    #[test]
    fn test_error_code_conversion() {
        let err = CaptureError::TargetUnavailable("window closed".to_string());
        assert_eq!(err.to_error_code(), -1002);
        assert_eq!(
            error_code_to_string(err.to_error_code()),
            "Capture target unavailable"
        );
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            CaptureError::DeviceUnavailable(String::new()),
            CaptureError::TargetUnavailable(String::new()),
            CaptureError::BufferTooSmall {
                required: 1,
                provided: 0,
            },
            CaptureError::NoFrameYet,
            CaptureError::CaptureTimeout { timeout_ms: 1 },
            CaptureError::CopyFailed(String::new()),
            CaptureError::InvalidLayout(String::new()),
            CaptureError::SessionClosed,
            CaptureError::InvalidConfiguration(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.to_error_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|code| *code < CODE_SUCCESS));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(CaptureError::NoFrameYet.is_recoverable());
        assert!(CaptureError::CaptureTimeout { timeout_ms: 2000 }.is_recoverable());
        assert!(!CaptureError::DeviceUnavailable("no adapter".to_string()).is_recoverable());
    }
}
