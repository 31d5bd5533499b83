use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One message in the working conversation given to the model. At most one
/// of `tool_call` (an assistant message requesting a tool) and `tool_call_id`
/// (a tool result) is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub tool_call: Option<ToolCallRequest>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(text: &str) -> Self {
        Self { role: "user".into(), content: text.into(), tool_call: None, tool_call_id: None }
    }

    pub fn assistant(text: &str) -> Self {
        Self { role: "assistant".into(), content: text.into(), tool_call: None, tool_call_id: None }
    }

    pub fn tool_request(call: &ToolCallRequest) -> Self {
        Self {
            role: "assistant".into(),
            content: String::new(),
            tool_call: Some(call.clone()),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A model-issued request to run one named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Description of a tool offered to the model this iteration.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// What the model decided to do with one invocation.
#[derive(Debug, Clone)]
pub enum ModelOutcome {
    Reply(String),
    ToolCall(ToolCallRequest),
}

/// The opaque language model: instructions, history, and the offered tool
/// set in; a final reply or a tool-invocation request out. The orchestrator
/// treats the implementation as an unreliable external actor.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        instructions: &str,
        history: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> anyhow::Result<ModelOutcome>;
}

/// Client for any OpenAI-compatible chat-completions endpoint with function
/// calling (the hosted Gemini/OpenAI compatibility endpoints both qualify).
#[derive(Clone)]
pub struct OpenAICompatible {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAICompatible {
    pub fn from_env(model: String) -> Self {
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        Self { base_url, api_key, model, client: reqwest::Client::new() }
    }
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize)]
struct OaiChoice {
    message: OaiMessage,
}

#[derive(Debug, Deserialize)]
struct OaiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OaiToolCall {
    id: String,
    function: OaiFunction,
}

#[derive(Debug, Deserialize)]
struct OaiFunction {
    name: String,
    arguments: String,
}

fn wire_messages(instructions: &str, history: &[ChatMessage]) -> Vec<Value> {
    let mut out = vec![json!({"role": "system", "content": instructions})];
    for m in history {
        if let Some(call) = &m.tool_call {
            out.push(json!({
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": [{
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments.to_string()},
                }],
            }));
        } else if let Some(id) = &m.tool_call_id {
            out.push(json!({"role": "tool", "tool_call_id": id, "content": m.content}));
        } else {
            out.push(json!({"role": m.role, "content": m.content}));
        }
    }
    out
}

#[async_trait]
impl ChatModel for OpenAICompatible {
    async fn invoke(
        &self,
        instructions: &str,
        history: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> anyhow::Result<ModelOutcome> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect();
        let body = json!({
            "model": self.model,
            "messages": wire_messages(instructions, history),
            "tools": tool_defs,
        });
        let mut rb = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("model call failed: {}", resp.status());
        }
        let v: OaiChatResponse = resp.json().await?;
        let message = v.choices.into_iter().next().map(|c| c.message);
        let Some(message) = message else {
            anyhow::bail!("model returned no choices");
        };
        if let Some(tc) = message.tool_calls.and_then(|mut calls| {
            if calls.is_empty() { None } else { Some(calls.remove(0)) }
        }) {
            let arguments = match serde_json::from_str(&tc.function.arguments) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        tool = %tc.function.name,
                        error = %e,
                        "tool call arguments are not valid JSON; defaulting to empty object"
                    );
                    Value::Object(Default::default())
                }
            };
            return Ok(ModelOutcome::ToolCall(ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments,
            }));
        }
        Ok(ModelOutcome::Reply(message.content.unwrap_or_default()))
    }
}

/// Deterministic stand-in for tests: pops a scripted outcome per invocation
/// and records which tools were offered each time.
#[cfg(test)]
pub struct ScriptedModel {
    outcomes: std::sync::Mutex<std::collections::VecDeque<ModelOutcome>>,
    pub offered: std::sync::Mutex<Vec<Vec<String>>>,
}

#[cfg(test)]
impl ScriptedModel {
    pub fn new(outcomes: Vec<ModelOutcome>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes.into()),
            offered: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn tool_call(name: &str, arguments: Value) -> ModelOutcome {
        ModelOutcome::ToolCall(ToolCallRequest {
            id: format!("call-{name}"),
            name: name.into(),
            arguments,
        })
    }
}

#[cfg(test)]
#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(
        &self,
        _instructions: &str,
        _history: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> anyhow::Result<ModelOutcome> {
        self.offered.lock().unwrap().push(tools.iter().map(|t| t.name.to_string()).collect());
        let next = self.outcomes.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ModelOutcome::Reply("(script exhausted)".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_carry_tool_flow() {
        let call = ToolCallRequest {
            id: "call-1".into(),
            name: "execute_query".into(),
            arguments: json!({"query": "SELECT 1"}),
        };
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::tool_request(&call),
            ChatMessage::tool_result("call-1", "rows"),
            ChatMessage::assistant("done"),
        ];
        let wire = wire_messages("rules", &history);
        assert_eq!(wire.len(), 5);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "execute_query");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call-1");
        assert_eq!(wire[4]["content"], "done");
    }
}
