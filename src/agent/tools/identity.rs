use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult};
use crate::models::ToolSpec;
use crate::records::CustomerMatch;

pub struct SetIdentityTool;

impl Tool for SetIdentityTool {
    fn name(&self) -> &'static str { "set_identity" }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_identity",
            description: "Validate the user's first and last name against the customer records \
                          and set the verified identity for this conversation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "first_name": {"type": "string", "description": "The user's first name"},
                    "last_name": {"type": "string", "description": "The user's last name"},
                },
                "required": ["first_name", "last_name"],
            }),
        }
    }

    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let first = args
                .get("first_name")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing first_name"))?;
            let last = args
                .get("last_name")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing last_name"))?;

            match ctx.records.match_customer(first, last).await? {
                CustomerMatch::Unique { first_name, last_name } => Ok(ToolResult {
                    content: format!("Updated user name to {first_name} {last_name}."),
                    is_error: false,
                    verified: Some((first_name, last_name)),
                }),
                CustomerMatch::NotFound => Ok(ToolResult::error(format!(
                    "{first} {last} is not a valid name in the customer records. Ask the user for \
                     a name that actually exists. Do not address the user as {first}."
                ))),
                CustomerMatch::Ambiguous(n) => Ok(ToolResult::error(format!(
                    "{first} {last} matches {n} different customers, so the identity cannot be \
                     set. Ask the user for something to tell them apart."
                ))),
            }
        })
    }
}
