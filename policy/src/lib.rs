//! Policy resolution for the Gantry automation server.
//!
//! The effective policy is the merge of static per-mode defaults with an
//! optional operator-provided policy file. The merge is strictly narrowing:
//! a file can disable tools, shorten TTLs, or restrict origins, but it can
//! never escalate beyond what the runtime mode allows.

mod file;
mod resolve;

pub use file::{PolicyFile, PolicyFileTools, load_policy_file, policy_file_from_value};
pub use resolve::{
    default_allowed_origins, default_session_ttl_ms, is_origin_admissible, resolve_policy,
};
