//! Invocation events and pending confirmations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::ids::{ConfirmationId, SessionId, WindowId};

/// How long a pending confirmation stays valid.
pub const DEFAULT_CONFIRMATION_TTL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// Compact outcome of one invocation, for the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ResultSummary {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            status: ResultStatus::Ok,
            message: None,
            code: None,
        }
    }

    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            message: Some(message.into()),
            code: Some(code),
        }
    }
}

/// One recorded tool invocation. Params are stored redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationEvent {
    /// Stamped by the event log when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    pub params: Value,
    pub result: ResultSummary,
    pub duration_ms: u64,
}

/// A two-phase approval token for a dangerous tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: ConfirmationId,
    pub tool_name: String,
    pub description: String,
    pub params: Value,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at_ms: Option<i64>,
}

impl PendingConfirmation {
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at_ms.is_some()
    }
}
