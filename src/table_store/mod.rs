// Append-only table storage: a connection (service) hands out per-table clients.
// Entities are flat property bags keyed by (partition key, row key).

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use sqlite::SqliteTableStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to connect to table storage")]
    Connect(#[source] sqlx::Error),

    #[error("invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    #[error("storage I/O error")]
    Io(#[from] std::io::Error),

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("entity ({partition_key}, {row_key}) already exists in table '{table}'")]
    EntityExists {
        table: String,
        partition_key: String,
        row_key: String,
    },

    #[error("storage operation '{operation}' failed")]
    Backend {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("unable to close table storage connection")]
    Close(#[source] sqlx::Error),

    #[error("malformed entity: {0}")]
    Malformed(String),
}

/// Property value. Serializes as a bare JSON scalar (`"text"`, `true`, `null`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Bool(bool),
    Text(String),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    pub properties: BTreeMap<String, EntityValue>,
}

impl TableEntity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Opens connections from a connection string (the storage secret).
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn TableService>, StoreError>;
}

/// An open connection to table storage.
#[async_trait]
pub trait TableService: Send + Sync {
    /// Create `table` if it does not exist.
    async fn create_table(&self, table: &str) -> Result<(), StoreError>;

    /// Resolve an existing table. Fails with [`StoreError::TableNotFound`].
    async fn table_client(&self, table: &str) -> Result<Box<dyn TableClient>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TableClient: Send + Sync {
    /// Insert a new entity. Never overwrites: a duplicate key is [`StoreError::EntityExists`].
    async fn create_entity(&self, entity: &TableEntity) -> Result<(), StoreError>;

    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StoreError>;

    /// Most recently inserted entities of a partition, newest first.
    async fn list_entities(
        &self,
        partition_key: &str,
        limit: u32,
    ) -> Result<Vec<TableEntity>, StoreError>;
}
