//! Core domain types for the Gantry automation server.
//!
//! Everything here is plain data: branded identifiers, the session and
//! snapshot models, the safety-policy model, the error taxonomy, and the
//! redaction primitives shared by the event log and launch diagnostics.
//! No IO, no async.

pub mod envelope;
pub mod error;
pub mod event;
pub mod ids;
pub mod policy;
pub mod redact;
pub mod session;
pub mod snapshot;
mod time;

pub use envelope::{ErrorEnvelope, ToolMeta, ToolOutcome};
pub use error::{ErrorCode, InputIssue, ServerError};
pub use event::{
    DEFAULT_CONFIRMATION_TTL_MS, PendingConfirmation, ResultStatus, ResultSummary,
    ToolInvocationEvent,
};
pub use ids::{ConfirmationId, RefId, SessionId, WindowId};
pub use policy::{ResolvedPolicy, SafetyMode, SafetyPolicy, ToolPolicy};
pub use redact::{REDACTED, is_sensitive_key, redact_value_in_place};
pub use session::{
    LaunchMode, Session, SessionState, SessionSummary, TraceState, Window, WindowBounds,
    WindowKind,
};
pub use snapshot::{
    LocatorHints, RawSnapshot, RoleAndName, SelectorDescriptor, SelectorKind, SnapshotNode,
    ViewportRect,
};
pub use time::now_unix_ms;
