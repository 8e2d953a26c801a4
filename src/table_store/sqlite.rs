// SQLite table storage. Connection string: `sqlite:<path>`.
// One `entities` table holds every logical table; `tables` is the catalog.
// Properties are stored as a JSON object (same shape as the table REST payload).

use super::{EntityValue, StoreError, TableClient, TableEntity, TableService, TableStore};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

const SCHEME: &str = "sqlite:";

#[derive(Debug, Clone, Default)]
pub struct SqliteTableStore;

impl SqliteTableStore {
    pub fn new() -> Self {
        Self
    }

    /// Connect with the concrete service type (tests and inspection).
    pub async fn open(connection_string: &str) -> Result<SqliteTableService, StoreError> {
        let path = connection_string
            .trim()
            .strip_prefix(SCHEME)
            .map(|p| p.trim_start_matches("//"))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                StoreError::InvalidConnectionString(format!("expected '{}<path>'", SCHEME))
            })?;
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("{}{}", SCHEME, path))
            .map_err(StoreError::Connect)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .connect_with(opts)
            .await
            .map_err(StoreError::Connect)?;
        let service = SqliteTableService { pool };
        service.init().await?;
        Ok(service)
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn TableService>, StoreError> {
        Ok(Box::new(Self::open(connection_string).await?))
    }
}

pub struct SqliteTableService {
    pool: SqlitePool,
}

impl SqliteTableService {
    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tables (name TEXT PRIMARY KEY, created_at INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::Backend {
            operation: "init",
            source,
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                properties TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (table_name, partition_key, row_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::Backend {
            operation: "init",
            source,
        })?;

        Ok(())
    }
}

#[async_trait]
impl TableService for SqliteTableService {
    #[instrument(skip(self), fields(store = "sqlite", operation = "create_table"))]
    async fn create_table(&self, table: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO tables (name, created_at) VALUES ($1, $2)")
            .bind(table)
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Backend {
                operation: "create_table",
                source,
            })?;
        Ok(())
    }

    async fn table_client(&self, table: &str) -> Result<Box<dyn TableClient>, StoreError> {
        let row = sqlx::query("SELECT name FROM tables WHERE name = $1")
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| StoreError::Backend {
                operation: "table_client",
                source,
            })?;
        if row.is_none() {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        Ok(Box::new(SqliteTableClient {
            pool: self.pool.clone(),
            table: table.to_string(),
        }))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

struct SqliteTableClient {
    pool: SqlitePool,
    table: String,
}

impl SqliteTableClient {
    fn parse_entity_row(row: &sqlx::sqlite::SqliteRow) -> Result<TableEntity, StoreError> {
        let backend = |source| StoreError::Backend {
            operation: "read_entity",
            source,
        };
        let partition_key: String = row.try_get("partition_key").map_err(backend)?;
        let row_key: String = row.try_get("row_key").map_err(backend)?;
        let properties: String = row.try_get("properties").map_err(backend)?;
        let properties: BTreeMap<String, EntityValue> =
            serde_json::from_str(&properties).map_err(|e| {
                StoreError::Malformed(format!(
                    "properties of ({}, {}): {}",
                    partition_key, row_key, e
                ))
            })?;
        Ok(TableEntity {
            partition_key,
            row_key,
            properties,
        })
    }
}

#[async_trait]
impl TableClient for SqliteTableClient {
    #[instrument(skip(self, entity), fields(store = "sqlite", operation = "create_entity", table = %self.table, row_key = %entity.row_key))]
    async fn create_entity(&self, entity: &TableEntity) -> Result<(), StoreError> {
        let properties = serde_json::to_string(&entity.properties)
            .map_err(|e| StoreError::Malformed(format!("encode properties: {}", e)))?;
        let result = sqlx::query(
            "INSERT INTO entities (table_name, partition_key, row_key, properties, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&self.table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .bind(&properties)
        .bind(now_ms())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::EntityExists {
                    table: self.table.clone(),
                    partition_key: entity.partition_key.clone(),
                    row_key: entity.row_key.clone(),
                })
            }
            Err(source) => Err(StoreError::Backend {
                operation: "create_entity",
                source,
            }),
        }
    }

    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StoreError> {
        let row = sqlx::query(
            "SELECT partition_key, row_key, properties FROM entities
             WHERE table_name = $1 AND partition_key = $2 AND row_key = $3",
        )
        .bind(&self.table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| StoreError::Backend {
            operation: "get_entity",
            source,
        })?;
        row.as_ref().map(Self::parse_entity_row).transpose()
    }

    async fn list_entities(
        &self,
        partition_key: &str,
        limit: u32,
    ) -> Result<Vec<TableEntity>, StoreError> {
        let rows = sqlx::query(
            "SELECT partition_key, row_key, properties FROM entities
             WHERE table_name = $1 AND partition_key = $2 ORDER BY id DESC LIMIT $3",
        )
        .bind(&self.table)
        .bind(partition_key)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| StoreError::Backend {
            operation: "list_entities",
            source,
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(Self::parse_entity_row(row)?);
        }
        Ok(out)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
