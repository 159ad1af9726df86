//! Accessibility snapshots and ref-map rebuilds.

use serde::Deserialize;
use serde_json::{Value, json};

use gantry_runtime::{RefMap, ToolContext, ToolFut, ToolHandler, parse_args, strict_object_schema};
use gantry_types::{SessionId, SnapshotNode, ToolMeta, ToolOutcome, WindowId};

use crate::{clamp_chars, resolve_target};

#[derive(Debug, Deserialize)]
struct SnapshotArgs {
    session_id: String,
    #[serde(default)]
    window_id: Option<String>,
    #[serde(default)]
    max_nodes: Option<usize>,
}

pub struct SnapshotCaptureTool;

impl ToolHandler for SnapshotCaptureTool {
    fn name(&self) -> &'static str {
        "snapshot_capture"
    }

    fn title(&self) -> &'static str {
        "Capture snapshot"
    }

    fn description(&self) -> &'static str {
        "Take an accessibility snapshot of a window, rebuild its ref map, and return \
         the nodes with refs valid for the new epoch."
    }

    fn input_schema(&self) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("session_id".into(), json!({"type": "string"}));
        props.insert("window_id".into(), json!({"type": "string"}));
        props.insert("max_nodes".into(), json!({"type": "integer", "minimum": 1}));
        strict_object_schema(props, &["session_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "epoch": {"type": "integer"},
                "window_id": {"type": "string"},
                "truncated": {"type": "boolean"},
                "node_count": {"type": "integer"},
                "nodes": {"type": "array"},
            },
            "required": ["epoch", "window_id", "truncated", "node_count", "nodes"],
        })
    }

    fn read_only_hint(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: SnapshotArgs = parse_args(&input)?;
            let session_id = SessionId::new(args.session_id);
            let window_id = args.window_id.map(WindowId::new);

            let target = resolve_target(ctx, &session_id, window_id.as_ref(), true).await?;
            let raw = ctx
                .driver
                .snapshot(&target.driver_session, &target.window.id)
                .await?;

            let mut map = ctx
                .sessions
                .get_ref_map(&session_id, &target.window.id)
                .unwrap_or_else(RefMap::new);
            let epoch = map.rebuild_from_snapshot(&raw.nodes);
            ctx.sessions
                .set_ref_map(&session_id, target.window.id.clone(), map)?;

            let limit = args
                .max_nodes
                .unwrap_or(ctx.limits.max_nodes)
                .min(ctx.limits.max_nodes);
            let truncated = raw.truncated || raw.nodes.len() > limit;
            let nodes: Vec<SnapshotNode> = raw
                .nodes
                .into_iter()
                .take(limit)
                .map(|mut node| {
                    node.name = clamp_chars(&node.name, ctx.limits.max_text_chars_per_node);
                    if let Some(value) = node.value.take() {
                        node.value =
                            Some(clamp_chars(&value, ctx.limits.max_text_chars_per_node));
                    }
                    node
                })
                .collect();

            let mut meta = ToolMeta::default()
                .with_diagnostic("window_selection", json!(target.strategy));
            if truncated {
                meta.warnings
                    .push(format!("Snapshot truncated to {} node(s)", nodes.len()));
            }

            Ok(ToolOutcome::with_meta(
                json!({
                    "epoch": epoch,
                    "window_id": target.window.id,
                    "truncated": truncated,
                    "node_count": nodes.len(),
                    "nodes": nodes,
                    "viewport": raw.viewport,
                }),
                meta,
            ))
        })
    }
}
