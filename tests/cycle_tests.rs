// Cycle driver scenarios: gate, secrets, fetch and write end to end

mod common;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use common::{
    CountingStore, MockUpstream, PARTITION, StaticSecrets, TABLE, UnreachableVault, cycle_deps,
    sqlite_url,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use transit_collector::config::VaultConfig;
use transit_collector::cycle::{CycleOutcome, run_cycle};
use transit_collector::models::{AggregateRecord, SourceField};
use transit_collector::table_store::{SqliteTableStore, TableService};
use transit_collector::vault::{KeyVaultClient, VaultError};

/// UTC instant for a Singapore wall-clock time on 2024-01-01.
fn sgt(hour: u32, minute: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(8 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 1, hour, minute, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

async fn stored_record(url: &str, row_key: &str) -> Option<AggregateRecord> {
    let service = SqliteTableStore::open(url).await.unwrap();
    let client = service.table_client(TABLE).await.ok()?;
    client
        .get_entity(PARTITION, row_key)
        .await
        .unwrap()
        .map(|e| AggregateRecord::from_entity(&e).unwrap())
}

#[tokio::test]
async fn before_six_is_skipped_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let upstream = MockUpstream::start().await;
    let secrets = Arc::new(StaticSecrets::new(&sqlite_url(&dir)));
    let store = Arc::new(CountingStore::default());
    let deps = cycle_deps(&upstream, secrets.clone(), store.clone());

    let outcome = run_cycle(&deps, sgt(5, 59)).await;

    assert!(matches!(outcome, CycleOutcome::Skipped { local_hour: 5 }));
    assert_eq!(secrets.reads.load(Ordering::SeqCst), 0);
    assert!(upstream.requests().is_empty());
    assert_eq!(store.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn six_oclock_collects_and_stores_one_record() {
    let dir = TempDir::new().unwrap();
    let url = sqlite_url(&dir);
    let upstream = MockUpstream::start().await;
    let store = Arc::new(CountingStore::default());
    let deps = cycle_deps(&upstream, Arc::new(StaticSecrets::new(&url)), store.clone());

    let outcome = run_cycle(&deps, sgt(6, 0)).await;

    match &outcome {
        CycleOutcome::Stored { row_key, missing } => {
            assert_eq!(row_key, "2024-01-01T06:00:00+08:00");
            assert!(missing.is_empty());
        }
        other => panic!("expected Stored, got {:?}", other),
    }
    assert_eq!(upstream.requests().len(), 9);
    assert_eq!(store.connects.load(Ordering::SeqCst), 1);

    let record = stored_record(&url, "2024-01-01T06:00:00+08:00")
        .await
        .expect("record written");
    assert_eq!(record.partition_key, PARTITION);
    assert!(!record.processed);
    assert_eq!(
        record.payload(SourceField::BusArrival),
        Some(common::body_for("BusArrivalv2").as_str())
    );
}

#[tokio::test]
async fn weather_timeout_still_writes_transport_fields() {
    let dir = TempDir::new().unwrap();
    let url = sqlite_url(&dir);
    let upstream = MockUpstream::start().await;
    upstream.slow("rainfall");
    let deps = cycle_deps(
        &upstream,
        Arc::new(StaticSecrets::new(&url)),
        Arc::new(SqliteTableStore::new()),
    );

    let outcome = run_cycle(&deps, sgt(12, 30)).await;

    match &outcome {
        CycleOutcome::Stored { missing, .. } => {
            assert_eq!(missing, &vec![SourceField::Rainfall]);
        }
        other => panic!("expected Stored, got {:?}", other),
    }
    let record = stored_record(&url, "2024-01-01T12:30:00+08:00")
        .await
        .unwrap();
    assert_eq!(record.rainfall, None);
    for field in SourceField::ALL
        .into_iter()
        .filter(|f| *f != SourceField::Rainfall)
    {
        assert!(record.payload(field).is_some(), "{}", field);
    }
}

#[tokio::test]
async fn vault_failure_aborts_before_fetch_or_write() {
    let upstream = MockUpstream::start().await;
    let store = Arc::new(CountingStore::default());
    let deps = cycle_deps(&upstream, Arc::new(UnreachableVault), store.clone());

    let outcome = run_cycle(&deps, sgt(9, 0)).await;

    assert!(matches!(outcome, CycleOutcome::SecretsUnavailable(_)));
    assert!(upstream.requests().is_empty());
    assert_eq!(store.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unset_vault_location_aborts_only_the_cycle() {
    let upstream = MockUpstream::start().await;
    let store = Arc::new(CountingStore::default());
    let config = VaultConfig {
        url: None,
        url_env: "TRANSIT_COLLECTOR_CYCLE_NO_VAULT_URL".into(),
        ..VaultConfig::default()
    };
    let vault = KeyVaultClient::from_config(&config, Duration::from_secs(1)).unwrap();
    let deps = cycle_deps(&upstream, Arc::new(vault), store.clone());

    for now in [sgt(9, 0), sgt(9, 15)] {
        let outcome = run_cycle(&deps, now).await;
        assert!(
            matches!(outcome, CycleOutcome::SecretsUnavailable(VaultError::MissingLocation(_))),
            "{:?}",
            outcome
        );
    }
    assert!(upstream.requests().is_empty());
    assert_eq!(store.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn storage_failure_is_reported_after_fetching() {
    let upstream = MockUpstream::start().await;
    let deps = cycle_deps(
        &upstream,
        Arc::new(StaticSecrets::new("unsupported://store")),
        Arc::new(SqliteTableStore::new()),
    );

    let outcome = run_cycle(&deps, sgt(18, 45)).await;

    match outcome {
        CycleOutcome::StoreFailed { row_key, .. } => {
            assert_eq!(row_key, "2024-01-01T18:45:00+08:00");
        }
        other => panic!("expected StoreFailed, got {:?}", other),
    }
    assert_eq!(upstream.requests().len(), 9);
}

#[tokio::test]
async fn consecutive_cycles_write_distinct_rows() {
    let dir = TempDir::new().unwrap();
    let url = sqlite_url(&dir);
    let upstream = MockUpstream::start().await;
    let deps = cycle_deps(
        &upstream,
        Arc::new(StaticSecrets::new(&url)),
        Arc::new(SqliteTableStore::new()),
    );

    assert!(run_cycle(&deps, sgt(7, 0)).await.is_stored());
    assert!(run_cycle(&deps, sgt(7, 15)).await.is_stored());
    // Same instant again collides on the row key.
    assert!(matches!(
        run_cycle(&deps, sgt(7, 15)).await,
        CycleOutcome::StoreFailed { .. }
    ));

    assert!(stored_record(&url, "2024-01-01T07:00:00+08:00").await.is_some());
    assert!(stored_record(&url, "2024-01-01T07:15:00+08:00").await.is_some());
}
