//! The error taxonomy shared by every layer of the server.
//!
//! Structured errors propagate verbatim to the caller as the wire-level
//! error envelope; anything else is wrapped as `Internal` at the dispatch
//! boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ids::{ConfirmationId, RefId, SessionId, WindowId};

/// Wire-level error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    PolicyViolation,
    SessionNotFound,
    WindowNotFound,
    RefNotFound,
    RefStale,
    LaunchFailed,
    ConfirmationRequired,
    InternalError,
}

/// One schema-validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputIssue {
    /// JSON-pointer-ish path to the offending value ("" for the root).
    pub path: String,
    pub message: String,
}

/// Structured server error. One variant per wire code.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{message}")]
    InvalidInput {
        message: String,
        issues: Vec<InputIssue>,
    },

    #[error("{message}")]
    PolicyViolation { message: String },

    #[error("Session not found: {id}")]
    SessionNotFound { id: SessionId },

    #[error("{message}")]
    WindowNotFound { message: String },

    #[error("Ref not found: {id}")]
    RefNotFound { id: RefId },

    #[error("Ref {id} is stale: snapshot epoch {snapshot_epoch} superseded by {current_epoch}")]
    RefStale {
        id: RefId,
        snapshot_epoch: i64,
        current_epoch: i64,
    },

    #[error("{message}")]
    LaunchFailed {
        message: String,
        diagnostics: Option<Value>,
    },

    #[error("Tool '{tool_name}' requires confirmation")]
    ConfirmationRequired {
        id: ConfirmationId,
        tool_name: String,
        params: Value,
    },

    #[error("{message}")]
    Internal {
        message: String,
        cause: Option<String>,
    },
}

impl ServerError {
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn window_not_found(id: &WindowId) -> Self {
        Self::WindowNotFound {
            message: format!("Window not found: {id}"),
        }
    }

    #[must_use]
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: message.into(),
            diagnostics: None,
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap an unknown error, preserving its display form as the cause.
    #[must_use]
    pub fn wrap_internal(context: &str, cause: impl std::fmt::Display) -> Self {
        Self::Internal {
            message: format!("Unexpected error during {context}"),
            cause: Some(cause.to_string()),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
            Self::PolicyViolation { .. } => ErrorCode::PolicyViolation,
            Self::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            Self::WindowNotFound { .. } => ErrorCode::WindowNotFound,
            Self::RefNotFound { .. } => ErrorCode::RefNotFound,
            Self::RefStale { .. } => ErrorCode::RefStale,
            Self::LaunchFailed { .. } => ErrorCode::LaunchFailed,
            Self::ConfirmationRequired { .. } => ErrorCode::ConfirmationRequired,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Whether the caller may usefully retry the same invocation.
    #[must_use]
    pub const fn retriable(&self) -> bool {
        matches!(self, Self::LaunchFailed { .. } | Self::Internal { .. })
    }

    /// Actionable remedies surfaced alongside the error, where one is known.
    #[must_use]
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::RefStale { .. } | Self::RefNotFound { .. } => {
                vec!["Capture a fresh snapshot and retry with the new refs".to_string()]
            }
            Self::ConfirmationRequired { id, tool_name, .. } => {
                vec![format!(
                    "Call `confirm` with id '{id}', then re-invoke '{tool_name}' passing confirmation_id"
                )]
            }
            _ => Vec::new(),
        }
    }

    /// Structured details carried in the wire envelope.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::InvalidInput { issues, .. } if !issues.is_empty() => {
                Some(json!({ "issues": issues }))
            }
            Self::RefStale {
                snapshot_epoch,
                current_epoch,
                ..
            } => Some(json!({
                "snapshot_epoch": snapshot_epoch,
                "current_epoch": current_epoch,
            })),
            Self::LaunchFailed {
                diagnostics: Some(diagnostics),
                ..
            } => Some(diagnostics.clone()),
            Self::ConfirmationRequired {
                id,
                tool_name,
                params,
            } => Some(json!({
                "confirmation_id": id,
                "tool_name": tool_name,
                "params": params,
            })),
            Self::Internal {
                cause: Some(cause), ..
            } => Some(json!({ "cause": cause })),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_envelope(&self) -> crate::envelope::ErrorEnvelope {
        crate::envelope::ErrorEnvelope {
            code: self.code(),
            message: self.to_string(),
            retriable: self.retriable(),
            details: self.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, ServerError};
    use crate::ids::{ConfirmationId, SessionId};

    #[test]
    fn codes_and_retriability_match_the_taxonomy() {
        let launch = ServerError::launch_failed("boom");
        assert_eq!(launch.code(), ErrorCode::LaunchFailed);
        assert!(launch.retriable());

        let missing = ServerError::SessionNotFound {
            id: SessionId::new("nope"),
        };
        assert_eq!(missing.code(), ErrorCode::SessionNotFound);
        assert!(!missing.retriable());

        let internal = ServerError::wrap_internal("snapshot", "oops");
        assert_eq!(internal.code(), ErrorCode::InternalError);
        assert!(internal.retriable());
    }

    #[test]
    fn confirmation_envelope_carries_id_and_params() {
        let err = ServerError::ConfirmationRequired {
            id: ConfirmationId::new("c1"),
            tool_name: "app_close".into(),
            params: serde_json::json!({"session_id": "s1"}),
        };
        let env = err.to_envelope();
        assert_eq!(env.code, ErrorCode::ConfirmationRequired);
        let details = env.details.unwrap();
        assert_eq!(details["confirmation_id"], "c1");
        assert_eq!(details["params"]["session_id"], "s1");
    }

    #[test]
    fn error_code_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::RefStale).unwrap(),
            "\"REF_STALE\""
        );
    }
}
