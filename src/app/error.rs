use serde::Serialize;
use std::fmt;

/// Boundary error carried by every fallible operation in the crate.
///
/// `code` classifies the failure: `ERR_VALIDATION` for bad input or
/// configuration, `ERR_TRANSPORT` for an unreachable bridge or a device that
/// detached mid-call, `ERR_DEVICE` for an application-level rejection the
/// device itself reported, `ERR_SYSTEM` for local failures (spawn, IO).
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    pub fn transport(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_TRANSPORT", message, trace_id)
    }

    pub fn device(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_DEVICE", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    pub fn is_transport(&self) -> bool {
        self.code == "ERR_TRANSPORT"
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transport_errors() {
        let err = AppError::transport("device detached", "trace-1");
        assert!(err.is_transport());
        assert_eq!(err.trace_id, "trace-1");
        assert!(!AppError::device("pm rejected", "trace-2").is_transport());
    }
}
