use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use uuid::Uuid;

use crate::agent::AgentError;
use crate::agent::engine::AgentEngine;
use crate::session::MessageRecord;
use crate::store::ThreadSummary;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AgentEngine>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agent: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", agent: "data_concierge" })
}

async fn render_metrics(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    state.metrics.as_ref().map(|h| h.render()).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub thread_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub thread_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

async fn chat(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, StatusCode> {
    match state.engine.handle_turn(body.thread_id, &body.message).await {
        Ok(turn) => Ok(Json(ChatResponse {
            reply: turn.reply,
            thread_id: turn.thread_id,
            timestamp: Utc::now(),
        })),
        Err(AgentError::SessionNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(AgentError::Timeout(_)) => Err(StatusCode::GATEWAY_TIMEOUT),
        Err(AgentError::Internal(e)) => {
            tracing::error!(error = %e, "turn failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateThreadBody {
    pub thread_id: Option<Uuid>,
    pub title: Option<String>,
}

async fn create_thread(
    axum::extract::State(state): axum::extract::State<AppState>,
    body: Option<Json<CreateThreadBody>>,
) -> (StatusCode, Json<ThreadSummary>) {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let (slot, _created) = state.engine.store().create(body.thread_id, body.title).await;
    (StatusCode::CREATED, Json(slot.summary().await))
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<ThreadSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

async fn list_threads(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Query(params): axum::extract::Query<PageParams>,
) -> Json<ThreadListResponse> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);
    let (threads, total) = state.engine.store().list(limit, offset).await;
    Json(ThreadListResponse { threads, total, limit, offset })
}

async fn get_thread(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<ThreadSummary>, StatusCode> {
    match state.engine.store().get(id).await {
        Some(slot) => Ok(Json(slot.summary().await)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageRecord>,
    pub thread_id: Uuid,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

async fn thread_messages(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
    axum::extract::Query(params): axum::extract::Query<PageParams>,
) -> Result<Json<MessagesResponse>, StatusCode> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0);
    let Some(slot) = state.engine.store().get(id).await else {
        return Err(StatusCode::NOT_FOUND);
    };
    let records = slot.lock_state().await.records();
    let total = records.len();
    let messages = records.into_iter().skip(offset).take(limit).collect();
    Ok(Json(MessagesResponse { messages, thread_id: id, total, limit, offset }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub thread_id: Uuid,
    pub status: &'static str,
}

async fn delete_thread(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<DeleteResponse>, StatusCode> {
    if state.engine.store().delete(id).await {
        Ok(Json(DeleteResponse { thread_id: id, status: "deleted" }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/v1/chat", post(chat))
        .route("/v1/threads", post(create_thread).get(list_threads))
        .route("/v1/threads/:id", get(get_thread).delete(delete_thread))
        .route("/v1/threads/:id/messages", get(thread_messages))
        .with_state(state)
}

pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    idle_evict: Option<Duration>,
) -> anyhow::Result<()> {
    if let Some(max_idle) = idle_evict {
        let store = state.engine.store().clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(max_idle.max(Duration::from_secs(60)));
            loop {
                tick.tick().await;
                let evicted = store
                    .evict_idle(chrono::Duration::from_std(max_idle).unwrap_or(chrono::Duration::hours(1)))
                    .await;
                if evicted > 0 {
                    tracing::info!(evicted, "evicted idle sessions");
                }
            }
        });
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::engine::TurnLimits;
    use crate::models::{ChatModel, ModelOutcome, ScriptedModel};
    use crate::records::{RecordStore, seed_sample_db};
    use crate::store::SessionStore;
    use serde_json::json;
    use tempfile::tempdir;

    async fn spawn_server(outcomes: Vec<ModelOutcome>) -> (String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.db");
        seed_sample_db(&path).await;
        let records = Arc::new(RecordStore::open(path.to_str().unwrap()).await.unwrap());
        let store = Arc::new(SessionStore::new());
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new(outcomes));
        let limits = TurnLimits {
            max_tool_calls: 4,
            turn_timeout: Duration::from_secs(5),
            max_result_rows: 50,
        };
        let engine =
            Arc::new(AgentEngine::new(model, records, store, limits).await.unwrap());
        let state = AppState { engine, metrics: None };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("http://{addr}"), dir)
    }

    #[tokio::test]
    async fn health_reports_service_identity() {
        let (base, _dir) = spawn_server(vec![]).await;
        let v: serde_json::Value =
            reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["agent"], "data_concierge");
    }

    #[tokio::test]
    async fn chat_roundtrip_and_history() {
        let (base, _dir) = spawn_server(vec![
            ScriptedModel::tool_call("set_identity", json!({"first_name": "Frank", "last_name": "Harris"})),
            ModelOutcome::Reply("Hello Frank!".into()),
        ])
        .await;
        let client = reqwest::Client::new();

        let resp: serde_json::Value = client
            .post(format!("{base}/v1/chat"))
            .json(&json!({"message": "I'm Frank Harris"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp["reply"], "Hello Frank!");
        let thread_id = resp["thread_id"].as_str().unwrap().to_string();

        let threads: serde_json::Value =
            client.get(format!("{base}/v1/threads")).send().await.unwrap().json().await.unwrap();
        assert_eq!(threads["total"], 1);
        assert_eq!(threads["threads"][0]["thread_id"], thread_id.as_str());
        assert_eq!(threads["threads"][0]["title"], "I'm Frank Harris");

        let messages: serde_json::Value = client
            .get(format!("{base}/v1/threads/{thread_id}/messages"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(messages["total"], 3);
        assert_eq!(messages["messages"][0]["role"], "user");
        assert_eq!(messages["messages"][2]["role"], "assistant");

        let deleted = client
            .delete(format!("{base}/v1/threads/{thread_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), reqwest::StatusCode::OK);
        let gone = client.get(format!("{base}/v1/threads/{thread_id}")).send().await.unwrap();
        assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_with_unknown_thread_is_404() {
        let (base, _dir) = spawn_server(vec![]).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/v1/chat"))
            .json(&json!({"message": "hi", "thread_id": Uuid::new_v4()}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn threads_can_be_created_with_a_client_id() {
        let (base, _dir) = spawn_server(vec![ModelOutcome::Reply("hello".into())]).await;
        let client = reqwest::Client::new();
        let id = Uuid::new_v4();

        let created = client
            .post(format!("{base}/v1/threads"))
            .json(&json!({"thread_id": id, "title": "Support"}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);

        let resp: serde_json::Value = client
            .post(format!("{base}/v1/chat"))
            .json(&json!({"message": "hi", "thread_id": id}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp["reply"], "hello");
        assert_eq!(resp["thread_id"], id.to_string());
    }
}
