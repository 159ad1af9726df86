//! Trace recording tools.
//!
//! `trace_start` marks intent on the session before the driver call and
//! registers the trace teardown hook exactly once; `trace_stop` writes the
//! archive to its deterministic per-session path.

use serde::Deserialize;
use serde_json::{Value, json};

use gantry_launch::trace_path;
use gantry_runtime::{
    ELEVATED_MODES, ToolContext, ToolFut, ToolHandler, parse_args, strict_object_schema,
};
use gantry_types::{SafetyMode, ServerError, SessionId, ToolOutcome, TraceState};

use crate::driver_session_of;

#[derive(Debug, Deserialize)]
struct TraceArgs {
    session_id: String,
}

pub struct TraceStartTool;

impl ToolHandler for TraceStartTool {
    fn name(&self) -> &'static str {
        "trace_start"
    }

    fn title(&self) -> &'static str {
        "Start tracing"
    }

    fn description(&self) -> &'static str {
        "Begin recording a trace for the session. The recording is stopped on \
         trace_stop or, failing that, during session cleanup."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        strict_object_schema(props, &["session_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tracing": {"type": "boolean"},
                "trace_path": {"type": "string"},
            },
            "required": ["tracing", "trace_path"],
        })
    }

    fn allowed_modes(&self) -> &'static [SafetyMode] {
        ELEVATED_MODES
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: TraceArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            ctx.sessions.touch(&session_id);

            let already_active = ctx.sessions.with_session(&session_id, |m| {
                m.session.trace.as_ref().is_some_and(|t| t.active)
            })?;
            if already_active {
                return Err(ServerError::invalid_input(format!(
                    "Tracing is already active for session '{session_id}'"
                )));
            }
            let driver_session = driver_session_of(ctx, &session_id)?;

            // Mark intent before yielding so concurrent handlers observe a
            // consistent trace state.
            ctx.sessions.set_trace_state(
                &session_id,
                TraceState {
                    active: true,
                    trace_path: None,
                },
            )?;

            if let Err(error) = ctx.driver.start_tracing(&driver_session).await {
                let _ = ctx.sessions.set_trace_state(
                    &session_id,
                    TraceState {
                        active: false,
                        trace_path: None,
                    },
                );
                return Err(error);
            }

            let archive = trace_path(&ctx.policy.artifact_root, &session_id);
            ctx.sessions.with_session(&session_id, |m| {
                if !m.trace_cleanup_registered {
                    let driver = ctx.driver.clone();
                    let driver_session = driver_session.clone();
                    let path = archive.clone();
                    m.push_cleanup(Box::new(move || {
                        Box::pin(async move {
                            // Best-effort: a trace already stopped by
                            // trace_stop makes this a no-op at the driver.
                            if let Err(error) = driver.stop_tracing(&driver_session, &path).await {
                                tracing::debug!(%error, "trace teardown during cleanup failed");
                            }
                            Ok(())
                        })
                    }));
                    m.trace_cleanup_registered = true;
                }
            })?;

            Ok(ToolOutcome::new(json!({
                "tracing": true,
                "trace_path": archive,
            })))
        })
    }
}

pub struct TraceStopTool;

impl ToolHandler for TraceStopTool {
    fn name(&self) -> &'static str {
        "trace_stop"
    }

    fn title(&self) -> &'static str {
        "Stop tracing"
    }

    fn description(&self) -> &'static str {
        "Stop the active trace recording and write the archive to the session's \
         deterministic trace path."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        strict_object_schema(props, &["session_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tracing": {"type": "boolean"},
                "path": {"type": "string"},
            },
            "required": ["tracing", "path"],
        })
    }

    fn allowed_modes(&self) -> &'static [SafetyMode] {
        ELEVATED_MODES
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: TraceArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            ctx.sessions.touch(&session_id);

            let active = ctx.sessions.with_session(&session_id, |m| {
                m.session.trace.as_ref().is_some_and(|t| t.active)
            })?;
            if !active {
                return Err(ServerError::invalid_input(format!(
                    "Tracing is not active for session '{session_id}'"
                )));
            }

            let driver_session = driver_session_of(ctx, &session_id)?;
            let archive = trace_path(&ctx.policy.artifact_root, &session_id);
            ctx.driver
                .stop_tracing(&driver_session, &archive)
                .await?;

            ctx.sessions.set_trace_state(
                &session_id,
                TraceState {
                    active: false,
                    trace_path: Some(archive.clone()),
                },
            )?;

            Ok(ToolOutcome::new(json!({
                "tracing": false,
                "path": archive,
            })))
        })
    }
}
