// One collection cycle: gate -> secrets -> fetch -> write.
// Each invocation is independent; the only thing carried between cycles is the clock.

use crate::gate::{self, TimeGate};
use crate::models::SourceField;
use crate::sources::{Endpoint, SourceFetcher};
use crate::table_store::{StoreError, TableStore};
use crate::vault::{SecretNames, SecretProvider, VaultError, resolve_credentials};
use crate::writer::{self, TableTarget};
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Everything a cycle needs; credentials are resolved per cycle and passed down explicitly.
pub struct CycleDeps {
    pub gate: TimeGate,
    pub secrets: Arc<dyn SecretProvider>,
    pub secret_names: SecretNames,
    pub fetcher: SourceFetcher,
    pub endpoints: Vec<Endpoint>,
    pub store: Arc<dyn TableStore>,
    pub target: TableTarget,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Outside the active window; nothing fetched or written.
    Skipped { local_hour: u32 },
    /// Credentials could not be resolved; nothing fetched or written.
    SecretsUnavailable(VaultError),
    /// One record written. `missing` lists the columns stored as null.
    Stored {
        row_key: String,
        missing: Vec<SourceField>,
    },
    /// Fetches ran but the record could not be written.
    StoreFailed { row_key: String, error: StoreError },
}

impl CycleOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, CycleOutcome::Stored { .. })
    }
}

#[instrument(skip_all, fields(now = %now))]
pub async fn run_cycle(deps: &CycleDeps, now: DateTime<Utc>) -> CycleOutcome {
    let local = deps.gate.to_local(now);
    if !deps.gate.allows(&local) {
        debug!(local = %local, "outside active window");
        return CycleOutcome::Skipped {
            local_hour: local.hour(),
        };
    }
    let row_key = gate::row_key(&local);

    let credentials = match resolve_credentials(deps.secrets.as_ref(), &deps.secret_names).await {
        Ok(c) => c,
        Err(e) => {
            error!(cycle = %row_key, error = %e, "unable to retrieve secrets; cycle aborted");
            return CycleOutcome::SecretsUnavailable(e);
        }
    };

    let results = deps
        .fetcher
        .fetch_all(&deps.endpoints, &credentials.api_key, &local)
        .await;

    let record = writer::build_record(&deps.target.partition_key, &row_key, &results);
    let missing = record.missing_fields();

    match writer::store_record(
        deps.store.as_ref(),
        &credentials.storage_connection,
        &deps.target,
        &record,
    )
    .await
    {
        Ok(()) => {
            info!(
                cycle = %row_key,
                missing = missing.len(),
                "record stored"
            );
            CycleOutcome::Stored { row_key, missing }
        }
        Err(error) => CycleOutcome::StoreFailed { row_key, error },
    }
}
