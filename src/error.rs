use thiserror::Error;

/// Errors surfaced to the operator as transient notices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Startup or playlist data could not be loaded.
    #[error("{0}")]
    Initialization(String),

    /// The backend rejected the device access keys.
    #[error("{0}")]
    AuthenticationFailed(String),

    /// The backend has no record of this device.
    #[error("{0}")]
    DeviceNotFound(String),

    /// The device is not (or no longer) linked to a backend record.
    #[error("{0}")]
    DeviceLinking(String),

    /// Catch-all for settings and unlink operations.
    #[error("{0}")]
    Application(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Initialization(_) => "INITIALIZATION_ERROR",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::DeviceLinking(_) => "DEVICE_LINKING_ERROR",
            Self::Application(_) => "APPLICATION_ERROR",
        }
    }

    /// Map a backend `errorCode` onto a typed error. Unknown codes fall back
    /// to [`AppError::Application`].
    pub fn from_code(code: &str, messages: &[String]) -> Self {
        let message = if messages.is_empty() {
            code.to_string()
        } else {
            messages.join("; ")
        };
        match code {
            "INITIALIZATION_ERROR" => Self::Initialization(message),
            "AUTHENTICATION_FAILED" => Self::AuthenticationFailed(message),
            "DEVICE_NOT_FOUND" => Self::DeviceNotFound(message),
            "DEVICE_LINKING_ERROR" => Self::DeviceLinking(message),
            _ => Self::Application(message),
        }
    }

    pub fn initialization() -> Self {
        Self::Initialization("Something went wrong when initializing the application".into())
    }
}

/// Transient operator-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub code: &'static str,
    pub message: String,
}

impl From<&AppError> for Notice {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_codes_round_trip_to_typed_errors() {
        let err = AppError::from_code("DEVICE_NOT_FOUND", &["no such device".into()]);
        assert_eq!(err, AppError::DeviceNotFound("no such device".into()));
        assert_eq!(err.code(), "DEVICE_NOT_FOUND");
    }

    #[test]
    fn unknown_code_becomes_application_error() {
        let err = AppError::from_code("TEAPOT", &[]);
        assert_eq!(err, AppError::Application("TEAPOT".into()));
        let notice = Notice::from(&err);
        assert_eq!(notice.code, "APPLICATION_ERROR");
    }
}
