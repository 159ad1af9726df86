//! Application lifecycle tools: launch, attach, close.

use serde::Deserialize;
use serde_json::{Value, json};

use gantry_launch::{AttachOptions, LaunchOptions, attach_app, launch_app};
use gantry_runtime::{
    ELEVATED_MODES, ToolContext, ToolFut, ToolHandler, parse_args, strict_object_schema,
};
use gantry_types::{SafetyMode, SessionId, ToolMeta, ToolOutcome};

pub struct AppLaunchTool;

impl ToolHandler for AppLaunchTool {
    fn name(&self) -> &'static str {
        "app_launch"
    }

    fn title(&self) -> &'static str {
        "Launch application"
    }

    fn description(&self) -> &'static str {
        "Launch the application under automation (named preset or custom entry point), \
         optionally starting its dev server first, and register a new session."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("project_root".into(), json!({"type": "string"}));
        props.insert("preset".into(), json!({"type": "string"}));
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert(
            "dev_server".into(),
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "url": {"type": "string"},
                    "ready_pattern": {"type": "string"},
                    "timeout_ms": {"type": "integer", "minimum": 1},
                },
                "additionalProperties": false,
            }),
        );
        props.insert(
            "electron".into(),
            json!({
                "type": "object",
                "properties": {
                    "entry_path": {"type": "string"},
                    "executable_path": {"type": "string"},
                    "args": {"type": "array", "items": {"type": "string"}},
                    "env": {"type": "object", "additionalProperties": {"type": "string"}},
                },
                "additionalProperties": false,
            }),
        );
        props.insert(
            "timeouts".into(),
            json!({
                "type": "object",
                "properties": {
                    "launch_ms": {"type": "integer", "minimum": 1},
                    "first_window_ms": {"type": "integer", "minimum": 0},
                },
                "additionalProperties": false,
            }),
        );
        props.insert("attach_fallback".into(), json!({"type": "boolean"}));
        strict_object_schema(props, &["project_root"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session": {"type": "object"},
            },
            "required": ["session"],
        })
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let options: LaunchOptions = parse_args(&input)?;
            let outcome = launch_app(
                ctx.driver.clone(),
                ctx.sessions.clone(),
                &ctx.policy,
                options,
            )
            .await?;

            let mut meta = ToolMeta::default()
                .with_diagnostic("launch", outcome.diagnostics.snapshot());
            if outcome.session.windows.is_empty() {
                meta.warnings
                    .push("No windows appeared after launch; try wait_for_window".to_string());
            }
            Ok(ToolOutcome::with_meta(
                json!({"session": outcome.session}),
                meta,
            ))
        })
    }
}

pub struct AppAttachTool;

impl ToolHandler for AppAttachTool {
    fn name(&self) -> &'static str {
        "app_attach"
    }

    fn title(&self) -> &'static str {
        "Attach to running application"
    }

    fn description(&self) -> &'static str {
        "Attach to an already-running instance over the remote debugging protocol \
         and register a session for it."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("ws_endpoint".into(), json!({"type": "string"}));
        props.insert("cdp_url".into(), json!({"type": "string"}));
        props.insert("session_id".into(), json!({"type": "string"}));
        strict_object_schema(props, &[])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"session": {"type": "object"}},
            "required": ["session"],
        })
    }

    fn allowed_modes(&self) -> &'static [SafetyMode] {
        ELEVATED_MODES
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let options: AttachOptions = parse_args(&input)?;
            let outcome = attach_app(
                ctx.driver.clone(),
                ctx.sessions.clone(),
                &ctx.policy,
                options,
            )
            .await?;
            Ok(ToolOutcome::new(json!({"session": outcome.session})))
        })
    }
}

#[derive(Debug, Deserialize)]
struct AppCloseArgs {
    session_id: String,
}

pub struct AppCloseTool;

impl ToolHandler for AppCloseTool {
    fn name(&self) -> &'static str {
        "app_close"
    }

    fn title(&self) -> &'static str {
        "Close session"
    }

    fn description(&self) -> &'static str {
        "Run the session's composed cleanup (trace teardown, driver close, dev-server \
         shutdown) and remove it."
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
                "closed": {"type": "boolean"},
                "session_id": {"type": "string"},
            },
            "required": ["closed", "session_id"],
        })
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: AppCloseArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let failures = ctx.sessions.close_session(&session_id).await?;

            let mut meta = ToolMeta::default();
            for failure in &failures {
                meta.warnings
                    .push(format!("Cleanup step failed: {}", failure.error));
            }
            Ok(ToolOutcome::with_meta(
                json!({"closed": true, "session_id": session_id}),
                meta,
            ))
        })
    }
}
