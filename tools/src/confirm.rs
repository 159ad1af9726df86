//! The confirmation tool.
//!
//! Stamps a pending approval so the originating tool can be re-invoked with
//! the confirmation id. It never executes the original tool itself.

use serde::Deserialize;
use serde_json::{Value, json};

use gantry_runtime::{ToolContext, ToolFut, ToolHandler, parse_args, strict_object_schema};
use gantry_types::{ConfirmationId, ServerError, ToolOutcome};

#[derive(Debug, Deserialize)]
struct ConfirmArgs {
    confirmation_id: String,
}

pub struct ConfirmTool;

impl ToolHandler for ConfirmTool {
    fn name(&self) -> &'static str {
        "confirm"
    }

    fn title(&self) -> &'static str {
        "Confirm a pending approval"
    }

    fn description(&self) -> &'static str {
        "Approve a pending confirmation. The original tool is not executed; re-invoke \
         it with this confirmation id."
    }

    fn input_schema(&self) -> Value {
        // confirmation_id is the payload here, not the gate pass-through,
        // so it is the one required field.
        let mut props = serde_json::Map::new();
        props.insert("confirmation_id".into(), json!({"type": "string"}));
        strict_object_schema(props, &["confirmation_id"])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ok": {"type": "boolean"},
                "tool_name": {"type": "string"},
                "params": {"type": "object"},
                "confirmed_at_ms": {"type": "integer"},
            },
            "required": ["ok", "tool_name", "params", "confirmed_at_ms"],
        })
    }

    fn handle<'a>(&'a self, input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let args: ConfirmArgs = parse_args(&input)?;
            let store = ctx.confirmations.as_ref().ok_or_else(|| {
                ServerError::internal("No confirmation store is configured")
            })?;
            let entry = store.confirm(&ConfirmationId::new(args.confirmation_id))?;

            Ok(ToolOutcome::new(json!({
                "ok": true,
                "tool_name": entry.tool_name,
                "params": entry.params,
                "confirmed_at_ms": entry.confirmed_at_ms,
            })))
        })
    }
}
