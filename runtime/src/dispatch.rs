//! The shared tool contract: registry, context, and dispatch.
//!
//! Every invocation flows through the same gauntlet: strict input
//! validation, the disabled-tool check, the mode gate, the confirmation
//! gate, the timed handler run, and finally the event-log append. Handlers
//! only ever see inputs that survived all of it.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use uuid::Uuid;

use gantry_types::{
    ConfirmationId, DEFAULT_CONFIRMATION_TTL_MS, InputIssue, PendingConfirmation, ResolvedPolicy,
    ResultSummary, SafetyMode, ServerError, Session, SessionId, ToolInvocationEvent, ToolOutcome,
    WindowId, now_unix_ms,
};

use crate::confirmation::{ConfirmationStore, should_require_confirmation};
use crate::driver::AutomationDriver;
use crate::event_log::EventLog;
use crate::session::SessionManager;

/// All three safety modes; the default gate for tools that are always
/// available.
pub const ALL_MODES: &[SafetyMode] = &[SafetyMode::Safe, SafetyMode::Standard, SafetyMode::Trusted];

/// Elevated modes only.
pub const ELEVATED_MODES: &[SafetyMode] = &[SafetyMode::Standard, SafetyMode::Trusted];

const DEFAULT_MAX_SNAPSHOT_NODES: usize = 2_000;
const DEFAULT_MAX_TEXT_CHARS_PER_NODE: usize = 400;

/// Ceiling on one handler run. Generous: every wait a handler performs
/// (readiness, window polling) carries its own tighter deadline.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Boxed future returned by tool handlers.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<ToolOutcome, ServerError>> + Send + 'a>>;

/// Node and text caps applied to snapshot-shaped output.
#[derive(Debug, Clone, Copy)]
pub struct ToolLimits {
    pub max_nodes: usize,
    pub max_text_chars_per_node: usize,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_SNAPSHOT_NODES,
            max_text_chars_per_node: DEFAULT_MAX_TEXT_CHARS_PER_NODE,
        }
    }
}

/// Per-invocation context handed to handlers.
pub struct ToolContext {
    pub mode: SafetyMode,
    pub policy: Arc<ResolvedPolicy>,
    pub driver: Arc<dyn AutomationDriver>,
    pub sessions: Arc<SessionManager>,
    pub confirmations: Option<Arc<ConfirmationStore>>,
    pub event_log: Arc<EventLog>,
    pub limits: ToolLimits,
    pub metadata: BTreeMap<String, String>,
    pub started_at_ms: i64,
    enabled_tools: Vec<String>,
}

impl ToolContext {
    /// Names of tools currently invocable (registered, not disabled, and
    /// allowed in the active mode).
    #[must_use]
    pub fn enabled_tools(&self) -> &[String] {
        &self.enabled_tools
    }

    /// Manager lookup that surfaces `SESSION_NOT_FOUND` for unknown ids,
    /// bumping activity on hit.
    pub fn resolve_session(&self, id: &SessionId) -> Result<Session, ServerError> {
        let session = self.sessions.get_or_err(id)?;
        self.sessions.touch(id);
        Ok(session)
    }
}

/// One tool behind the dispatch contract.
pub trait ToolHandler: Send + Sync + std::panic::UnwindSafe {
    fn name(&self) -> &'static str;
    fn title(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Strict JSON schema: unknown keys reject. Every schema admits the
    /// shared optional `confirmation_id` key (see `strict_object_schema`).
    fn input_schema(&self) -> Value;
    fn output_schema(&self) -> Value;
    fn allowed_modes(&self) -> &'static [SafetyMode] {
        ALL_MODES
    }
    /// Hint that the tool observes without mutating.
    fn read_only_hint(&self) -> bool {
        false
    }
    /// Per-tool override of the dispatcher's handler deadline.
    fn timeout(&self) -> Option<Duration> {
        None
    }
    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a>;
}

/// Serializable tool description for transports.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub output_schema: Value,
    pub allowed_modes: Vec<SafetyMode>,
    pub read_only: bool,
}

/// Registry of tool handlers. Duplicate names reject at registration.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn ToolHandler>) -> Result<(), ServerError> {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            return Err(ServerError::internal(format!(
                "Duplicate tool registered: {name}"
            )));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.handlers.get(name).map(AsRef::as_ref)
    }

    /// Definitions sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .handlers
            .values()
            .map(|h| ToolDefinition {
                name: h.name(),
                title: h.title(),
                description: h.description(),
                input_schema: h.input_schema(),
                output_schema: h.output_schema(),
                allowed_modes: h.allowed_modes().to_vec(),
                read_only: h.read_only_hint(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(b.name));
        defs
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Build a strict object schema for a tool input.
///
/// Adds the shared optional `confirmation_id` property and forbids unknown
/// keys, so the confirmation gate can thread its token through any tool.
#[must_use]
pub fn strict_object_schema(mut properties: serde_json::Map<String, Value>, required: &[&str]) -> Value {
    properties.insert(
        "confirmation_id".to_string(),
        serde_json::json!({
            "type": "string",
            "description": "Id of a confirmed approval token, when this tool is confirmation-gated",
        }),
    );
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Deserialize validated input into a typed argument struct.
pub fn parse_args<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, ServerError> {
    serde_json::from_value(input.clone())
        .map_err(|e| ServerError::invalid_input(format!("Bad tool args: {e}")))
}

/// Validate `input` against a strict schema, producing a structured issue
/// list on failure.
pub fn validate_input(tool_name: &str, schema: &Value, input: &Value) -> Result<(), ServerError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        ServerError::internal(format!("Invalid input schema for tool '{tool_name}': {e}"))
    })?;
    let issues: Vec<InputIssue> = validator
        .iter_errors(input)
        .map(|err| InputIssue {
            path: err.instance_path().to_string(),
            message: err.to_string(),
        })
        .collect();
    if issues.is_empty() {
        return Ok(());
    }
    Err(ServerError::InvalidInput {
        message: format!("Input validation failed for tool '{tool_name}'"),
        issues,
    })
}

/// The tool-execution front door.
pub struct Dispatcher {
    registry: ToolRegistry,
    policy: Arc<ResolvedPolicy>,
    driver: Arc<dyn AutomationDriver>,
    sessions: Arc<SessionManager>,
    confirmations: Option<Arc<ConfirmationStore>>,
    event_log: Arc<EventLog>,
    limits: ToolLimits,
    metadata: BTreeMap<String, String>,
    handler_timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: ToolRegistry,
        policy: Arc<ResolvedPolicy>,
        driver: Arc<dyn AutomationDriver>,
        sessions: Arc<SessionManager>,
        confirmations: Option<Arc<ConfirmationStore>>,
        event_log: Arc<EventLog>,
    ) -> Self {
        let limits = ToolLimits {
            max_nodes: policy
                .max_snapshot_nodes
                .unwrap_or(DEFAULT_MAX_SNAPSHOT_NODES),
            max_text_chars_per_node: DEFAULT_MAX_TEXT_CHARS_PER_NODE,
        };
        Self {
            registry,
            policy,
            driver,
            sessions,
            confirmations,
            event_log,
            limits,
            metadata: BTreeMap::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Attach server-level metadata handed to every tool context.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override the default handler deadline.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    #[must_use]
    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }

    fn enabled_tools(&self) -> Vec<String> {
        self.registry
            .definitions()
            .into_iter()
            .filter(|def| {
                !self.policy.is_tool_disabled(def.name)
                    && def.allowed_modes.contains(&self.policy.mode)
            })
            .map(|def| def.name.to_string())
            .collect()
    }

    /// Run one tool invocation through the full contract and record it.
    pub async fn dispatch(&self, tool_name: &str, input: Value) -> Result<ToolOutcome, ServerError> {
        let started_at_ms = now_unix_ms();
        let started = Instant::now();

        let result = self.dispatch_inner(tool_name, &input, started_at_ms).await;

        let summary = match &result {
            Ok(_) => ResultSummary::ok(),
            Err(err) => ResultSummary::error(err.code(), err.to_string()),
        };
        let session_id = input
            .get("session_id")
            .and_then(Value::as_str)
            .map(SessionId::new);
        let window_id = input
            .get("window_id")
            .and_then(Value::as_str)
            .map(WindowId::new);
        self.event_log.record(ToolInvocationEvent {
            timestamp_ms: Some(started_at_ms),
            tool_name: tool_name.to_string(),
            session_id,
            window_id,
            params: input,
            result: summary,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        result
    }

    async fn dispatch_inner(
        &self,
        tool_name: &str,
        input: &Value,
        started_at_ms: i64,
    ) -> Result<ToolOutcome, ServerError> {
        let handler = self
            .registry
            .lookup(tool_name)
            .ok_or_else(|| ServerError::invalid_input(format!("Unknown tool '{tool_name}'")))?;

        validate_input(tool_name, &handler.input_schema(), input)?;

        if self.policy.is_tool_disabled(tool_name) {
            return Err(ServerError::policy_violation(format!(
                "Tool '{tool_name}' is disabled by policy"
            )));
        }

        if !handler.allowed_modes().contains(&self.policy.mode) {
            return Err(ServerError::policy_violation(format!(
                "Tool '{tool_name}' is not available in {} mode",
                self.policy.mode
            )));
        }

        self.gate_confirmation(handler, input)?;

        let ctx = ToolContext {
            mode: self.policy.mode,
            policy: self.policy.clone(),
            driver: self.driver.clone(),
            sessions: self.sessions.clone(),
            confirmations: self.confirmations.clone(),
            event_log: self.event_log.clone(),
            limits: self.limits,
            metadata: self.metadata.clone(),
            started_at_ms,
            enabled_tools: self.enabled_tools(),
        };

        tracing::debug!(tool = tool_name, "dispatching tool");
        let timeout = handler.timeout().unwrap_or(self.handler_timeout);
        let handler_future = handler.handle(input.clone(), &ctx);
        let handler_future = AssertUnwindSafe(handler_future).catch_unwind();

        match tokio::time::timeout(timeout, handler_future).await {
            Err(_) => Err(ServerError::Internal {
                message: format!(
                    "Tool '{tool_name}' timed out after {} ms",
                    timeout.as_millis()
                ),
                cause: None,
            }),
            Ok(Err(panic_payload)) => {
                let panic_msg = panic_payload_to_string(&panic_payload);
                tracing::error!(tool = tool_name, panic = %panic_msg, "tool handler panicked");
                Err(ServerError::Internal {
                    message: format!("Tool '{tool_name}' panicked"),
                    cause: Some(panic_msg),
                })
            }
            Ok(Ok(result)) => result,
        }
    }

    fn gate_confirmation(
        &self,
        handler: &dyn ToolHandler,
        input: &Value,
    ) -> Result<(), ServerError> {
        let tool_name = handler.name();
        if !should_require_confirmation(tool_name, &self.policy) {
            return Ok(());
        }
        let store = self.confirmations.as_ref().ok_or_else(|| {
            // Fail closed: a gated tool without a store must not run.
            ServerError::internal(format!(
                "Tool '{tool_name}' requires confirmation but no confirmation store is configured"
            ))
        })?;

        let params = strip_confirmation_id(input);

        if let Some(id) = input
            .get("confirmation_id")
            .and_then(Value::as_str)
            .map(ConfirmationId::new)
        {
            if let Some(entry) = store.get(&id) {
                if entry.tool_name == tool_name {
                    if entry.is_confirmed() {
                        // Single-use: drop the token now that it opened the gate.
                        let _ = store.consume(&id);
                        return Ok(());
                    }
                    // Issued but never confirmed: hand the same id back.
                    return Err(ServerError::ConfirmationRequired {
                        id,
                        tool_name: tool_name.to_string(),
                        params,
                    });
                }
                tracing::warn!(
                    tool = tool_name,
                    confirmation_tool = %entry.tool_name,
                    "confirmation id presented to a different tool"
                );
            }
        }

        let id = ConfirmationId::new(Uuid::new_v4().to_string());
        let now = now_unix_ms();
        store.add(PendingConfirmation {
            id: id.clone(),
            tool_name: tool_name.to_string(),
            description: format!("Confirm execution of '{}' ({})", tool_name, handler.title()),
            params: params.clone(),
            created_at_ms: now,
            expires_at_ms: now + DEFAULT_CONFIRMATION_TTL_MS as i64,
            confirmed_at_ms: None,
        });
        Err(ServerError::ConfirmationRequired {
            id,
            tool_name: tool_name.to_string(),
            params,
        })
    }
}

fn strip_confirmation_id(input: &Value) -> Value {
    let mut params = input.clone();
    if let Value::Object(map) = &mut params {
        map.remove("confirmation_id");
    }
    params
}

fn panic_payload_to_string(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
