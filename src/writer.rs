// Aggregator/writer: fold one cycle's fetch results into a record and append it.
// Every storage failure is logged here and returned; nothing is retried.

use crate::config::StorageConfig;
use crate::models::{AggregateRecord, SourceField};
use crate::sources::FetchResults;
use crate::table_store::{StoreError, TableStore};
use tracing::{error, instrument};

/// Destination table and the single partition every record lands in.
#[derive(Debug, Clone)]
pub struct TableTarget {
    pub table: String,
    pub partition_key: String,
    pub create_table: bool,
}

impl TableTarget {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            table: config.table.clone(),
            partition_key: config.partition_key.clone(),
            create_table: config.create_table,
        }
    }
}

pub fn build_record(partition_key: &str, row_key: &str, results: &FetchResults) -> AggregateRecord {
    let mut record = AggregateRecord::new(partition_key, row_key);
    for field in SourceField::ALL {
        record.set_payload(field, results.get(field).map(str::to_string));
    }
    record
}

/// Connect, resolve the table, create the entity, close. The connection is closed on
/// every path once opened; the first failure is the one returned.
#[instrument(skip_all, fields(table = %target.table, row_key = %record.row_key))]
pub async fn store_record(
    store: &dyn TableStore,
    connection_string: &str,
    target: &TableTarget,
    record: &AggregateRecord,
) -> Result<(), StoreError> {
    let service = match store.connect(connection_string).await {
        Ok(s) => s,
        Err(e) => {
            error!(cycle = %record.row_key, error = %e, "unable to connect to table storage");
            return Err(e);
        }
    };

    let written = async {
        if target.create_table {
            service.create_table(&target.table).await.inspect_err(|e| {
                error!(cycle = %record.row_key, error = %e, "unable to create table");
            })?;
        }
        let client = service.table_client(&target.table).await.inspect_err(|e| {
            error!(cycle = %record.row_key, error = %e, "table does not exist");
        })?;
        client
            .create_entity(&record.to_entity())
            .await
            .inspect_err(|e| {
                error!(cycle = %record.row_key, error = %e, "unable to create entity");
            })
    }
    .await;

    let closed = service.close().await.inspect_err(|e| {
        error!(cycle = %record.row_key, error = %e, "unable to close table storage connection");
    });

    written.and(closed)
}
