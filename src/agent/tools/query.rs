use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult};
use crate::models::ToolSpec;
use crate::sql_guard;

pub struct ExecuteQueryTool;

impl Tool for ExecuteQueryTool {
    fn name(&self) -> &'static str { "execute_query" }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "execute_query",
            description: "Execute a single read-only SQL SELECT statement against the customer \
                          records database and return the resulting rows. Mutating statements \
                          are rejected.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "A single SQL SELECT statement"},
                },
                "required": ["query"],
            }),
        }
    }

    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let sql = args
                .get("query")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("missing query"))?;

            if let Err(rejection) = sql_guard::ensure_read_only(sql) {
                return Ok(ToolResult::error(format!(
                    "Error: {rejection}. Rewrite the request as one read-only SELECT statement."
                )));
            }

            match ctx.records.run_select(sql, ctx.max_rows).await {
                Ok(out) if out.rows.is_empty() => Ok(ToolResult::ok("Query returned no rows.")),
                Ok(out) => Ok(ToolResult::ok(
                    serde_json::to_string(&out).unwrap_or_else(|e| format!("Error: {e}")),
                )),
                // Execution failures are data for the model to explain, not
                // transport errors.
                Err(e) => Ok(ToolResult::error(format!("Error: {e}"))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RecordStore, seed_sample_db};
    use crate::session::IdentityState;
    use tempfile::tempdir;

    async fn ctx_store() -> (RecordStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.db");
        seed_sample_db(&path).await;
        (RecordStore::open(path.to_str().unwrap()).await.unwrap(), dir)
    }

    fn verified() -> IdentityState {
        IdentityState::Verified { first_name: "Frank".into(), last_name: "Harris".into() }
    }

    #[tokio::test]
    async fn select_returns_rows_as_json() {
        let (records, _dir) = ctx_store().await;
        let identity = verified();
        let ctx = ToolContext { records: &records, identity: &identity, max_rows: 50 };
        let res = ExecuteQueryTool
            .run(ctx, json!({"query": "SELECT InvoiceId, Total FROM Invoice WHERE CustomerId = 16 ORDER BY Total ASC LIMIT 1"}))
            .await
            .unwrap();
        assert!(!res.is_error);
        assert!(res.content.contains("13"));
        assert!(res.content.contains("0.99"));
    }

    #[tokio::test]
    async fn write_statements_are_rejected_before_execution() {
        let (records, _dir) = ctx_store().await;
        let identity = verified();
        for sql in ["DELETE FROM Invoice", "SELECT 1; DROP TABLE Customer", "PRAGMA writable_schema = 1"] {
            let ctx = ToolContext { records: &records, identity: &identity, max_rows: 50 };
            let res = ExecuteQueryTool.run(ctx, json!({"query": sql})).await.unwrap();
            assert!(res.is_error, "{sql}");
            assert!(res.content.starts_with("Error:"));
        }
        // Nothing was deleted.
        let ctx = ToolContext { records: &records, identity: &identity, max_rows: 50 };
        let res = ExecuteQueryTool.run(ctx, json!({"query": "SELECT COUNT(*) AS n FROM Invoice"})).await.unwrap();
        assert!(res.content.contains("3"));
    }

    #[tokio::test]
    async fn execution_errors_come_back_as_data() {
        let (records, _dir) = ctx_store().await;
        let identity = verified();
        let ctx = ToolContext { records: &records, identity: &identity, max_rows: 50 };
        let res = ExecuteQueryTool
            .run(ctx, json!({"query": "SELECT NoSuchColumn FROM Invoice"}))
            .await
            .unwrap();
        assert!(res.is_error);
        assert!(res.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn empty_result_is_reported_plainly() {
        let (records, _dir) = ctx_store().await;
        let identity = verified();
        let ctx = ToolContext { records: &records, identity: &identity, max_rows: 50 };
        let res = ExecuteQueryTool
            .run(ctx, json!({"query": "SELECT * FROM Invoice WHERE Total > 1000"}))
            .await
            .unwrap();
        assert!(!res.is_error);
        assert_eq!(res.content, "Query returned no rows.");
    }
}
