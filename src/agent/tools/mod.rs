use serde_json::Value;

use crate::models::ToolSpec;
use crate::records::RecordStore;
use crate::session::IdentityState;

pub mod identity;
pub mod query;

pub struct ToolContext<'a> {
    pub records: &'a RecordStore,
    pub identity: &'a IdentityState,
    pub max_rows: usize,
}

/// What a dispatched tool hands back to the loop. `content` is wrapped into
/// a message the model reads on its next iteration; `verified` carries a
/// successful identity validation so the working state can flip.
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
    pub verified: Option<(String, String)>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false, verified: None }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: true, verified: None }
    }
}

pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn spec(&self) -> ToolSpec;
    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: Vec::new() } }
    pub fn with_default_tools() -> Self {
        let mut r = Self::new();
        r.register(Box::new(identity::SetIdentityTool));
        r.register(Box::new(query::ExecuteQueryTool));
        r
    }
    pub fn register(&mut self, t: Box<dyn Tool>) { self.tools.push(t); }
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().map(|b| b.as_ref()).find(|t| t.name() == name)
    }

    /// Specs for the tools the gate offers in this identity state.
    pub fn specs_for(&self, offered: &[&str]) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .filter(|t| offered.contains(&t.name()))
            .map(|t| t.spec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::gate;
    use crate::session::IdentityState;

    #[test]
    fn registry_resolves_default_tools() {
        let registry = ToolRegistry::with_default_tools();
        assert!(registry.get(gate::TOOL_SET_IDENTITY).is_some());
        assert!(registry.get(gate::TOOL_EXECUTE_QUERY).is_some());
        assert!(registry.get("files.write").is_none());
    }

    #[test]
    fn specs_follow_the_gate() {
        let registry = ToolRegistry::with_default_tools();
        let unverified = registry.specs_for(gate::available_tools(&IdentityState::Unverified));
        assert_eq!(unverified.len(), 1);
        assert_eq!(unverified[0].name, gate::TOOL_SET_IDENTITY);

        let verified = registry.specs_for(gate::available_tools(&IdentityState::Verified {
            first_name: "Frank".into(),
            last_name: "Harris".into(),
        }));
        assert_eq!(verified.len(), 2);
    }
}
