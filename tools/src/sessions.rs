//! Session listing.

use serde_json::{Value, json};

use gantry_runtime::{ToolContext, ToolFut, ToolHandler, strict_object_schema};
use gantry_types::ToolOutcome;

pub struct SessionListTool;

impl ToolHandler for SessionListTool {
    fn name(&self) -> &'static str {
        "session_list"
    }

    fn title(&self) -> &'static str {
        "List sessions"
    }

    fn description(&self) -> &'static str {
        "Summaries of every active session, oldest first."
    }

    fn input_schema(&self) -> Value {
        strict_object_schema(serde_json::Map::new(), &[])
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessions": {"type": "array"},
                "count": {"type": "integer"},
                "enabled_tools": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["sessions", "count", "enabled_tools"],
        })
    }

    fn read_only_hint(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, _input: Value, ctx: &'a ToolContext) -> ToolFut<'a> {
        Box::pin(async move {
            let summaries = ctx.sessions.list_summaries();
            Ok(ToolOutcome::new(json!({
                "count": summaries.len(),
                "sessions": summaries,
                "enabled_tools": ctx.enabled_tools(),
            })))
        })
    }
}
