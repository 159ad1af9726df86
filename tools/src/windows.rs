//! Window tools: list, select, wait.

use std::time::Duration;

use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{Value, json};

use gantry_runtime::{
    ToolContext, ToolFut, ToolHandler, apply_window_refresh, parse_args, strict_object_schema,
};
use gantry_types::{ServerError, SessionId, ToolMeta, ToolOutcome, Window, WindowId, WindowKind};

use crate::{driver_session_of, resolve_target};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize)]
struct WindowListArgs {
    session_id: String,
}

pub struct WindowListTool;

impl ToolHandler for WindowListTool {
    fn name(&self) -> &'static str {
        "window_list"
    }

    fn title(&self) -> &'static str {
        "List windows"
    }

    fn description(&self) -> &'static str {
        "Refresh the session's window list from the driver and return it."
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
                "windows": {"type": "array"},
                "count": {"type": "integer"},
            },
            "required": ["windows", "count"],
        })
    }

    fn read_only_hint(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: WindowListArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            ctx.sessions.touch(&session_id);

            let driver_session = driver_session_of(ctx, &session_id)?;
            let windows = ctx.driver.windows(&driver_session).await?;
            let windows = ctx.sessions.with_session(&session_id, |m| {
                apply_window_refresh(m, windows);
                m.session.windows.clone()
            })?;

            Ok(ToolOutcome::new(json!({
                "count": windows.len(),
                "windows": windows,
            })))
        })
    }
}

#[derive(Debug, Deserialize)]
struct WindowSelectArgs {
    session_id: String,
    window_id: String,
}

pub struct WindowSelectTool;

impl ToolHandler for WindowSelectTool {
    fn name(&self) -> &'static str {
        "window_select"
    }

    fn title(&self) -> &'static str {
        "Select window"
    }

    fn description(&self) -> &'static str {
        "Make a window the session default for subsequent tools, focusing it when the \
         driver supports focus."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        strict_object_schema(props, &["session_id", "window_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"window": {"type": "object"}},
            "required": ["window"],
        })
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: WindowSelectArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = WindowId::new(args.window_id);

            let target = resolve_target(ctx, &session_id, Some(&window_id), true).await?;
            ctx.sessions.with_session(&session_id, |m| {
                m.default_window_id = Some(window_id.clone());
            })?;

            let mut meta = ToolMeta::default();
            if let Err(e) = ctx
                .driver
                .focus_window(&target.driver_session, &window_id)
                .await
            {
                meta.warnings.push(format!("Could not focus window: {e}"));
            }

            Ok(ToolOutcome::with_meta(
                json!({"window": target.window}),
                meta,
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct WaitForWindowArgs {
    session_id: String,
    #[serde(default)]
    title_pattern: Option<String>,
    #[serde(default)]
    url_contains: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub struct WaitForWindowTool;

impl WaitForWindowTool {
    fn matches(
        window: &Window,
        title: Option<&regex::Regex>,
        url_contains: Option<&str>,
    ) -> bool {
        if let Some(re) = title {
            if !re.is_match(&window.title) {
                return false;
            }
        }
        if let Some(fragment) = url_contains {
            if !window.url.contains(fragment) {
                return false;
            }
        }
        // Without a predicate, any non-devtools window satisfies the wait.
        if title.is_none() && url_contains.is_none() {
            return window.kind != WindowKind::Devtools;
        }
        true
    }
}

impl ToolHandler for WaitForWindowTool {
    fn name(&self) -> &'static str {
        "wait_for_window"
    }

    fn title(&self) -> &'static str {
        "Wait for window"
    }

    fn description(&self) -> &'static str {
        "Poll the driver until a window matching the title pattern or URL fragment \
         appears, or the timeout elapses."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("title_pattern".into(), json!({"type": "string"}));
        props.insert("url_contains".into(), json!({"type": "string"}));
        props.insert("timeout_ms".into(), json!({"type": "integer", "minimum": 1}));
        strict_object_schema(props, &["session_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "window": {"type": "object"},
                "waited_ms": {"type": "integer"},
            },
            "required": ["window", "waited_ms"],
        })
    }

    fn read_only_hint(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: WaitForWindowArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            ctx.resolve_session(&session_id)?;

            let title_re = args
                .title_pattern
                .as_deref()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            ServerError::invalid_input(format!("Invalid title pattern '{p}': {e}"))
                        })
                })
                .transpose()?;

            let driver_session = driver_session_of(ctx, &session_id)?;
            let timeout_ms = args.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
            let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
            let started = tokio::time::Instant::now();

            loop {
                let windows = ctx.driver.windows(&driver_session).await?;
                let found = windows
                    .iter()
                    .find(|w| {
                        Self::matches(w, title_re.as_ref(), args.url_contains.as_deref())
                    })
                    .cloned();
                ctx.sessions
                    .with_session(&session_id, |m| apply_window_refresh(m, windows))?;

                if let Some(window) = found {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    return Ok(ToolOutcome::new(json!({
                        "window": window,
                        "waited_ms": waited_ms,
                    })));
                }
                if tokio::time::Instant::now() >= deadline {
                    let wanted = args
                        .title_pattern
                        .as_deref()
                        .or(args.url_contains.as_deref())
                        .unwrap_or("any window");
                    return Err(ServerError::WindowNotFound {
                        message: format!(
                            "Timed out after {timeout_ms} ms waiting for window matching '{wanted}'"
                        ),
                    });
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        })
    }
}
