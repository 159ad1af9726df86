//! Interactive tools: click, type, key chords. All drive the underlying
//! automation through locators resolved from snapshot refs.

use serde::Deserialize;
use serde_json::{Value, json};

use gantry_runtime::{
    ActionDescriptor, MouseButton, ToolContext, ToolFut, ToolHandler, parse_args,
    strict_object_schema, to_locator,
};
use gantry_types::{RefId, ServerError, SessionId, ToolMeta, ToolOutcome, WindowId};

use crate::resolve_target;

/// Resolve a ref against the window's ref map, enforcing epoch freshness
/// when the caller supplies the epoch its snapshot came from.
fn resolve_locator(
    ctx: &ToolContext,
    session_id: &SessionId,
    window_id: &WindowId,
    ref_id: &RefId,
    snapshot_epoch: Option<i64>,
) -> Result<String, ServerError> {
    let map = ctx
        .sessions
        .get_ref_map(session_id, window_id)
        .ok_or_else(|| ServerError::RefNotFound { id: ref_id.clone() })?;
    if let Some(epoch) = snapshot_epoch {
        if map.is_stale(epoch) {
            return Err(ServerError::RefStale {
                id: ref_id.clone(),
                snapshot_epoch: epoch,
                current_epoch: map.current_epoch(),
            });
        }
    }
    let descriptor = map
        .resolve(ref_id)
        .ok_or_else(|| ServerError::RefNotFound { id: ref_id.clone() })?;
    Ok(to_locator(descriptor))
}

#[derive(Debug, Deserialize)]
struct ClickArgs {
    session_id: String,
    #[serde(default)]
    window_id: Option<String>,
    #[serde(rename = "ref")]
    ref_id: String,
    #[serde(default)]
    snapshot_epoch: Option<i64>,
    #[serde(default)]
    button: Option<MouseButton>,
    #[serde(default)]
    double: bool,
}

pub struct ElementClickTool;

impl ToolHandler for ElementClickTool {
    fn name(&self) -> &'static str {
        "element_click"
    }

    fn title(&self) -> &'static str {
        "Click element"
    }

    fn description(&self) -> &'static str {
        "Click the element a snapshot ref points at."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        props.insert("ref".into(), json!({"type": "string"}));
        props.insert("snapshot_epoch".into(), json!({"type": "integer"}));
        props.insert(
            "button".into(),
            json!({"type": "string", "enum": ["left", "right", "middle"]}),
        );
        props.insert("double".into(), json!({"type": "boolean"}));
        strict_object_schema(props, &["session_id", "ref"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "clicked": {"type": "boolean"},
                "ref": {"type": "string"},
                "locator": {"type": "string"},
                "window_id": {"type": "string"},
            },
            "required": ["clicked", "ref", "locator", "window_id"],
        })
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: ClickArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = args.window_id.map(WindowId::new);
            let ref_id = RefId::new(args.ref_id);

            let target = resolve_target(ctx, &session_id, window_id.as_ref(), true).await?;
            let locator = resolve_locator(
                ctx,
                &session_id,
                &target.window.id,
                &ref_id,
                args.snapshot_epoch,
            )?;

            ctx.driver
                .perform(
                    &target.driver_session,
                    &target.window.id,
                    ActionDescriptor::Click {
                        locator: locator.clone(),
                        button: args.button.unwrap_or_default(),
                        click_count: if args.double { 2 } else { 1 },
                    },
                )
                .await?;

            Ok(ToolOutcome::with_meta(
                json!({
                    "clicked": true,
                    "ref": ref_id,
                    "locator": locator,
                    "window_id": target.window.id,
                }),
                ToolMeta::default().with_diagnostic("window_selection", json!(target.strategy)),
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct TypeArgs {
    session_id: String,
    #[serde(default)]
    window_id: Option<String>,
    #[serde(rename = "ref")]
    ref_id: String,
    text: String,
    #[serde(default)]
    snapshot_epoch: Option<i64>,
    #[serde(default)]
    clear_first: bool,
}

pub struct ElementTypeTool;

impl ToolHandler for ElementTypeTool {
    fn name(&self) -> &'static str {
        "element_type"
    }

    fn title(&self) -> &'static str {
        "Type into element"
    }

    fn description(&self) -> &'static str {
        "Type text into the element a snapshot ref points at, optionally clearing it \
         first."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        props.insert("ref".into(), json!({"type": "string"}));
        props.insert("text".into(), json!({"type": "string"}));
        props.insert("snapshot_epoch".into(), json!({"type": "integer"}));
        props.insert("clear_first".into(), json!({"type": "boolean"}));
        strict_object_schema(props, &["session_id", "ref", "text"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "typed": {"type": "boolean"},
                "ref": {"type": "string"},
                "window_id": {"type": "string"},
            },
            "required": ["typed", "ref", "window_id"],
        })
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: TypeArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = args.window_id.map(WindowId::new);
            let ref_id = RefId::new(args.ref_id);

            let target = resolve_target(ctx, &session_id, window_id.as_ref(), true).await?;
            let locator = resolve_locator(
                ctx,
                &session_id,
                &target.window.id,
                &ref_id,
                args.snapshot_epoch,
            )?;

            ctx.driver
                .perform(
                    &target.driver_session,
                    &target.window.id,
                    ActionDescriptor::TypeText {
                        locator,
                        text: args.text,
                        clear_first: args.clear_first,
                    },
                )
                .await?;

            Ok(ToolOutcome::with_meta(
                json!({
                    "typed": true,
                    "ref": ref_id,
                    "window_id": target.window.id,
                }),
                ToolMeta::default().with_diagnostic("window_selection", json!(target.strategy)),
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct PressKeysArgs {
    session_id: String,
    #[serde(default)]
    window_id: Option<String>,
    keys: Vec<String>,
}

pub struct ElementPressKeysTool;

impl ToolHandler for ElementPressKeysTool {
    fn name(&self) -> &'static str {
        "element_press_keys"
    }

    fn title(&self) -> &'static str {
        "Press keys"
    }

    fn description(&self) -> &'static str {
        "Send a key chord to a window (e.g. [\"Control\", \"s\"])."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        props.insert(
            "keys".into(),
            json!({"type": "array", "items": {"type": "string"}, "minItems": 1}),
        );
        strict_object_schema(props, &["session_id", "keys"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pressed": {"type": "boolean"},
                "window_id": {"type": "string"},
            },
            "required": ["pressed", "window_id"],
        })
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: PressKeysArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = args.window_id.map(WindowId::new);

            let target = resolve_target(ctx, &session_id, window_id.as_ref(), true).await?;
            ctx.driver
                .perform(
                    &target.driver_session,
                    &target.window.id,
                    ActionDescriptor::PressKeys { keys: args.keys },
                )
                .await?;

            Ok(ToolOutcome::with_meta(
                json!({
                    "pressed": true,
                    "window_id": target.window.id,
                }),
                ToolMeta::default().with_diagnostic("window_selection", json!(target.strategy)),
            ))
        })
    }
}
