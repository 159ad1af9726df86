//! Capture tools: screenshots, console logs, network logs.

use serde::Deserialize;
use serde_json::{Value, json};

use gantry_runtime::{ToolContext, ToolFut, ToolHandler, parse_args, strict_object_schema};
use gantry_types::{SessionId, ToolMeta, ToolOutcome, WindowId, now_unix_ms};

use crate::resolve_target;

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct ScreenshotArgs {
    session_id: String,
    #[serde(default)]
    window_id: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

pub struct ScreenshotCaptureTool;

impl ToolHandler for ScreenshotCaptureTool {
    fn name(&self) -> &'static str {
        "screenshot_capture"
    }

    fn title(&self) -> &'static str {
        "Capture screenshot"
    }

    fn description(&self) -> &'static str {
        "Save a screenshot of a window into the session's artifact directory."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        props.insert("label".into(), json!({"type": "string", "pattern": "^[A-Za-z0-9_-]+$"}));
        strict_object_schema(props, &["session_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "window_id": {"type": "string"},
            },
            "required": ["path", "window_id"],
        })
    }

    fn read_only_hint(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: ScreenshotArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = args.window_id.map(WindowId::new);

            let target = resolve_target(ctx, &session_id, window_id.as_ref(), false).await?;
            let artifact_dir = ctx
                .sessions
                .with_session(&session_id, |m| m.session.artifact_dir.clone())?;
            let file_name = match args.label {
                Some(label) => format!("{label}-{}.png", now_unix_ms()),
                None => format!("shot-{}.png", now_unix_ms()),
            };
            let path = artifact_dir.join("screenshots").join(file_name);

            ctx.driver
                .screenshot(&target.driver_session, &target.window.id, &path)
                .await?;

            Ok(ToolOutcome::with_meta(
                json!({
                    "path": path,
                    "window_id": target.window.id,
                }),
                ToolMeta::default().with_diagnostic("window_selection", json!(target.strategy)),
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConsoleReadArgs {
    session_id: String,
    #[serde(default)]
    window_id: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct ConsoleReadTool;

impl ToolHandler for ConsoleReadTool {
    fn name(&self) -> &'static str {
        "console_read"
    }

    fn title(&self) -> &'static str {
        "Read console logs"
    }

    fn description(&self) -> &'static str {
        "Renderer console messages for a window, optionally filtered by level, newest \
         last."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        props.insert(
            "level".into(),
            json!({"type": "string", "enum": ["log", "info", "warn", "error", "debug"]}),
        );
        props.insert("limit".into(), json!({"type": "integer", "minimum": 1}));
        strict_object_schema(props, &["session_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entries": {"type": "array"},
                "count": {"type": "integer"},
            },
            "required": ["entries", "count"],
        })
    }

    fn read_only_hint(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: ConsoleReadArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = args.window_id.map(WindowId::new);

            let target = resolve_target(ctx, &session_id, window_id.as_ref(), false).await?;
            let mut entries = ctx
                .driver
                .console_logs(&target.driver_session, &target.window.id)
                .await?;

            if let Some(level) = &args.level {
                entries.retain(|e| e.level.eq_ignore_ascii_case(level));
            }
            let limit = args.limit.unwrap_or(DEFAULT_LOG_LIMIT);
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }

            Ok(ToolOutcome::new(json!({
                "count": entries.len(),
                "entries": entries,
            })))
        })
    }
}

#[derive(Debug, Deserialize)]
struct NetworkReadArgs {
    session_id: String,
    #[serde(default)]
    window_id: Option<String>,
    #[serde(default)]
    url_contains: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct NetworkReadTool;

impl ToolHandler for NetworkReadTool {
    fn name(&self) -> &'static str {
        "network_read"
    }

    fn title(&self) -> &'static str {
        "Read network logs"
    }

    fn description(&self) -> &'static str {
        "Observed network exchanges for a window, optionally filtered by URL fragment, \
         newest last."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        props.insert("url_contains".into(), json!({"type": "string"}));
        props.insert("limit".into(), json!({"type": "integer", "minimum": 1}));
        strict_object_schema(props, &["session_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entries": {"type": "array"},
                "count": {"type": "integer"},
            },
            "required": ["entries", "count"],
        })
    }

    fn read_only_hint(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: NetworkReadArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = args.window_id.map(WindowId::new);

            let target = resolve_target(ctx, &session_id, window_id.as_ref(), false).await?;
            let mut entries = ctx
                .driver
                .network_logs(&target.driver_session, &target.window.id)
                .await?;

            if let Some(fragment) = &args.url_contains {
                entries.retain(|e| e.url.contains(fragment.as_str()));
            }
            let limit = args.limit.unwrap_or(DEFAULT_LOG_LIMIT);
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }

            Ok(ToolOutcome::new(json!({
                "count": entries.len(),
                "entries": entries,
            })))
        })
    }
}
