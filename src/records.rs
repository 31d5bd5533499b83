use serde::Serialize;
use serde_json::{Value, json};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Pool, Row, Sqlite, ValueRef};

/// Read-only access to the customer record store. The pool is opened with
/// `read_only(true)`, so even a statement that slips past the guard cannot
/// write.
#[derive(Clone)]
pub struct RecordStore {
    pool: Pool<Sqlite>,
}

/// Rows from a successful query, decoded to JSON values.
#[derive(Debug, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub truncated: bool,
}

/// Execution failure (malformed SQL, unknown column, ...). Returned to the
/// model as data, never raised to the transport layer.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct QueryError(pub String);

/// Outcome of a customer-name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerMatch {
    Unique { first_name: String, last_name: String },
    NotFound,
    Ambiguous(usize),
}

impl RecordStore {
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = Pool::<Sqlite>::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Names of the user-facing tables, for the schema summary in the prompt.
    pub async fn table_names(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
    }

    /// Run one already-guarded SELECT and decode up to `max_rows` rows.
    pub async fn run_select(&self, sql: &str, max_rows: usize) -> Result<QueryOutput, QueryError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryError(e.to_string()))?;
        let truncated = rows.len() > max_rows;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().take(max_rows).map(row_to_values).collect();
        Ok(QueryOutput { columns, rows, truncated })
    }

    /// Exact-match customer lookup, case-insensitive, with bound parameters.
    /// Zero matches and more than one match are both rejections; a unique
    /// match returns the canonical casing from the store.
    pub async fn match_customer(&self, first: &str, last: &str) -> anyhow::Result<CustomerMatch> {
        let rows = sqlx::query(
            "SELECT FirstName, LastName FROM Customer \
             WHERE LOWER(FirstName) = LOWER(?1) AND LOWER(LastName) = LOWER(?2)",
        )
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await?;
        match rows.as_slice() {
            [] => Ok(CustomerMatch::NotFound),
            [row] => Ok(CustomerMatch::Unique {
                first_name: row.get("FirstName"),
                last_name: row.get("LastName"),
            }),
            many => Ok(CustomerMatch::Ambiguous(many.len())),
        }
    }
}

fn row_to_values(row: &SqliteRow) -> Vec<Value> {
    (0..row.columns().len())
        .map(|i| {
            if row.try_get_raw(i).map(|raw| raw.is_null()).unwrap_or(true) {
                return Value::Null;
            }
            if let Ok(v) = row.try_get::<i64, _>(i) {
                return json!(v);
            }
            if let Ok(v) = row.try_get::<f64, _>(i) {
                return json!(v);
            }
            if let Ok(v) = row.try_get::<String, _>(i) {
                return json!(v);
            }
            if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
                return json!(format!("<{} bytes>", v.len()));
            }
            Value::Null
        })
        .collect()
}

/// Seed a small Chinook-shaped database for tests.
#[cfg(test)]
pub async fn seed_sample_db(path: &std::path::Path) {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    let pool = Pool::<Sqlite>::connect_with(options).await.unwrap();
    for stmt in [
        "CREATE TABLE Customer (CustomerId INTEGER PRIMARY KEY, FirstName TEXT NOT NULL, LastName TEXT NOT NULL)",
        "CREATE TABLE Invoice (InvoiceId INTEGER PRIMARY KEY, CustomerId INTEGER NOT NULL, Total REAL NOT NULL)",
        "INSERT INTO Customer VALUES (16, 'Frank', 'Harris')",
        "INSERT INTO Customer VALUES (20, 'Michelle', 'Brooks')",
        "INSERT INTO Customer VALUES (31, 'John', 'Smith')",
        "INSERT INTO Customer VALUES (32, 'John', 'Smith')",
        "INSERT INTO Invoice VALUES (13, 16, 0.99)",
        "INSERT INTO Invoice VALUES (145, 16, 13.86)",
        "INSERT INTO Invoice VALUES (200, 20, 5.94)",
    ] {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool.close().await;
}
