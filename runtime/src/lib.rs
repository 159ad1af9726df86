//! Tool-execution runtime.
//!
//! Owns the stores every tool invocation flows through: the session manager,
//! the confirmation store, per-window ref maps, and the invocation event
//! log. The dispatch module ties them together behind the shared tool
//! contract (validation, gating, error envelope, diagnostics).
//!
//! Concurrency model: handlers are cooperative async tasks. Each store sits
//! behind its own mutex; a lock is taken, the mutation completed, and the
//! lock released before any suspension point.

pub mod confirmation;
pub mod dispatch;
pub mod driver;
pub mod event_log;
pub mod refmap;
pub mod session;
pub mod testing;
pub mod windowing;

pub use confirmation::{ConfirmationStore, should_require_confirmation};
pub use dispatch::{
    ALL_MODES, Dispatcher, ELEVATED_MODES, ToolContext, ToolDefinition, ToolFut, ToolHandler,
    ToolLimits, ToolRegistry, parse_args, strict_object_schema, validate_input,
};
pub use driver::{
    ActionDescriptor, AttachTarget, AutomationDriver, ConsoleEntry, DriverFut, DriverLaunchSpec,
    DriverSession, MouseButton, NetworkEntry,
};
pub use event_log::EventLog;
pub use refmap::{RefMap, to_locator};
pub use session::{
    CleanupFailure, CleanupFut, CleanupHook, ManagedSession, SessionManager, run_cleanup,
};
pub use windowing::{WindowSelection, apply_window_refresh, is_likely_modal, select_window};
