use thiserror::Error;

/// Domain failures of the approval workflow. Every variant carries enough
/// context to render a user-facing message without re-reading state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("workflow configuration invalid for `{kind}`: {message}")]
    Configuration { kind: String, message: String },
    #[error("actor `{actor}` with role `{role}` is not authorized to act at step `{expected}`")]
    UnauthorizedActor { actor: String, role: String, expected: String },
    #[error("request `{request_id}` is terminal with status `{status}` and accepts no further actions")]
    ActionOnTerminalRequest { request_id: String, status: String },
    #[error("override rejected for `{field}`: {message}")]
    Validation { field: String, message: String },
    #[error("request `{request_id}` was modified concurrently (expected version {expected_version})")]
    Conflict { request_id: String, expected_version: i64 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The request changed while you were acting on it. Reload and retry."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Conflicts and transient unavailability may be retried as-is; bad
    /// requests and internal errors need operator correction first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::ServiceUnavailable { .. })
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error @ WorkflowError::Conflict { .. }) => Self::Conflict {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, InterfaceError, WorkflowError};

    #[test]
    fn conflict_maps_to_retryable_interface_error() {
        let interface = ApplicationError::from(WorkflowError::Conflict {
            request_id: "REQ-1".to_owned(),
            expected_version: 3,
        })
        .into_interface("corr-1");

        assert!(matches!(
            interface,
            InterfaceError::Conflict { ref correlation_id, .. } if correlation_id == "corr-1"
        ));
        assert!(interface.is_retryable());
        assert_eq!(
            interface.user_message(),
            "The request changed while you were acting on it. Reload and retry."
        );
    }

    #[test]
    fn unauthorized_actor_maps_to_bad_request() {
        let interface = ApplicationError::from(WorkflowError::UnauthorizedActor {
            actor: "u-17".to_owned(),
            role: "hod".to_owned(),
            expected: "manager".to_owned(),
        })
        .into_interface("corr-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert!(!interface.is_retryable());
    }

    #[test]
    fn persistence_failure_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("database lock timeout".to_owned()).into_interface("c-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.is_retryable());
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn terminal_request_error_names_the_request() {
        let message = WorkflowError::ActionOnTerminalRequest {
            request_id: "REQ-9".to_owned(),
            status: "approved".to_owned(),
        }
        .to_string();

        assert!(message.contains("REQ-9"));
        assert!(message.contains("approved"));
    }
}
