use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use uuid::Uuid;

use super::{AgentError, gate};
use crate::agent::tools::{ToolContext, ToolRegistry, ToolResult};
use crate::models::{ChatMessage, ChatModel, ModelOutcome, ToolCallRequest};
use crate::prompt;
use crate::records::RecordStore;
use crate::session::{self, IdentityState, ToolExchange, Turn};
use crate::store::SessionStore;

/// Per-turn safety bounds.
#[derive(Debug, Clone)]
pub struct TurnLimits {
    pub max_tool_calls: usize,
    pub turn_timeout: Duration,
    pub max_result_rows: usize,
}

pub struct TurnReply {
    pub thread_id: Uuid,
    pub reply: String,
}

struct TurnDraft {
    exchanges: Vec<ToolExchange>,
    reply: String,
    identity: IdentityState,
}

const LOOP_EXCEEDED_REPLY: &str =
    "I'm sorry, I was not able to finish working on that request. Could you try rephrasing it?";
const MODEL_FAILURE_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again in a moment.";

/// The orchestration runtime: drives one request/reply cycle per call,
/// mediating every action the model asks for. The model is treated as an
/// unreliable external actor; the gate and the read-only guard are enforced
/// here, never assumed from the instructions.
pub struct AgentEngine {
    model: Arc<dyn ChatModel>,
    records: Arc<RecordStore>,
    store: Arc<SessionStore>,
    registry: ToolRegistry,
    limits: TurnLimits,
    tables: Vec<String>,
}

impl AgentEngine {
    pub async fn new(
        model: Arc<dyn ChatModel>,
        records: Arc<RecordStore>,
        store: Arc<SessionStore>,
        limits: TurnLimits,
    ) -> anyhow::Result<Self> {
        let tables = records.table_names().await?;
        Ok(Self { model, records, store, registry: ToolRegistry::with_default_tools(), limits, tables })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run one turn against a thread. Unknown explicit ids fail with
    /// `SessionNotFound`; a missing id creates a new thread. The per-session
    /// lock is held for the whole turn, so turns on one thread serialize
    /// while distinct threads proceed in parallel. On timeout nothing is
    /// appended and the lock is released by guard drop.
    pub async fn handle_turn(
        &self,
        thread_id: Option<Uuid>,
        text: &str,
    ) -> Result<TurnReply, AgentError> {
        let slot = match thread_id {
            Some(id) => self.store.get(id).await.ok_or(AgentError::SessionNotFound(id))?,
            None => self.store.create(None, Some(session::generate_title(text))).await.0,
        };

        let mut state = slot.lock_state().await;
        let history = state.history();
        let identity = state.identity.clone();
        counter!("concierge_turns_total").increment(1);

        let work = self.run_loop(history, identity, text);
        let draft = match tokio::time::timeout(self.limits.turn_timeout, work).await {
            Ok(draft) => draft,
            Err(_) => {
                counter!("concierge_turn_timeouts_total").increment(1);
                tracing::warn!(thread = %slot.id, "turn abandoned on timeout");
                return Err(AgentError::Timeout(self.limits.turn_timeout));
            }
        };

        let turn = Turn {
            id: Uuid::new_v4(),
            user_text: text.into(),
            exchanges: draft.exchanges,
            reply: draft.reply.clone(),
            created_at: Utc::now(),
        };
        slot.push_turn(&mut state, turn, draft.identity).await;
        Ok(TurnReply { thread_id: slot.id, reply: draft.reply })
    }

    /// The per-turn state machine: assemble instructions, await the model,
    /// dispatch requested tools, loop, bounded by the dispatch cap. The tool
    /// set is fixed from the identity at turn start; a mid-turn verification
    /// updates the instructions and the state appended afterwards, but
    /// unlocks the query tool only on the next turn.
    async fn run_loop(
        &self,
        mut working: Vec<ChatMessage>,
        identity_at_start: IdentityState,
        text: &str,
    ) -> TurnDraft {
        let offered = gate::available_tools(&identity_at_start);
        let specs = self.registry.specs_for(offered);
        let mut identity = identity_at_start;
        let mut exchanges = Vec::new();
        working.push(ChatMessage::user(text));

        for _ in 0..self.limits.max_tool_calls {
            let instructions = prompt::build(&identity, &self.tables);
            let outcome = match self.model.invoke(&instructions, &working, &specs).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "model invocation failed; absorbing into reply");
                    return TurnDraft { exchanges, reply: MODEL_FAILURE_REPLY.into(), identity };
                }
            };
            match outcome {
                ModelOutcome::Reply(reply) => return TurnDraft { exchanges, reply, identity },
                ModelOutcome::ToolCall(call) => {
                    let result = self.dispatch(offered, &identity, &call).await;
                    if let Some((first_name, last_name)) = result.verified.clone() {
                        identity = IdentityState::Verified { first_name, last_name };
                    }
                    exchanges.push(ToolExchange {
                        tool: call.name.clone(),
                        arguments: call.arguments.clone(),
                        content: result.content.clone(),
                        is_error: result.is_error,
                    });
                    working.push(ChatMessage::tool_request(&call));
                    working.push(ChatMessage::tool_result(&call.id, &result.content));
                }
            }
        }

        counter!("concierge_tool_loop_exceeded_total").increment(1);
        tracing::warn!(limit = self.limits.max_tool_calls, "tool dispatch limit reached");
        TurnDraft { exchanges, reply: LOOP_EXCEEDED_REPLY.into(), identity }
    }

    /// Validate a model-issued tool request against the gate, run it, and
    /// wrap whatever happened into a message the model can read. Nothing
    /// thrown by a tool escapes this function.
    async fn dispatch(
        &self,
        offered: &[&str],
        identity: &IdentityState,
        call: &ToolCallRequest,
    ) -> ToolResult {
        if !offered.contains(&call.name.as_str()) {
            counter!("concierge_policy_violations_total").increment(1);
            tracing::warn!(tool = %call.name, "model requested a tool outside the offered set");
            let hint = if identity.is_verified() {
                "Use only the tools you were offered."
            } else {
                "Collect and validate the user's full name with set_identity before anything else."
            };
            return ToolResult::error(format!("The tool '{}' is not available. {hint}", call.name));
        }
        let Some(tool) = self.registry.get(&call.name) else {
            counter!("concierge_policy_violations_total").increment(1);
            return ToolResult::error(format!("Unknown tool '{}'.", call.name));
        };
        counter!("concierge_tool_calls_total", "tool" => tool.name()).increment(1);
        let ctx = ToolContext {
            records: self.records.as_ref(),
            identity,
            max_rows: self.limits.max_result_rows,
        };
        match tool.run(ctx, call.arguments.clone()).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(format!("Error: {e}")),
        }
    }
}
