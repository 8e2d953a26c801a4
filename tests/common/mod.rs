// Shared test helpers: stand-in upstream APIs, secret providers and a counting store.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use transit_collector::config::SourcesConfig;
use transit_collector::cycle::CycleDeps;
use transit_collector::gate::TimeGate;
use transit_collector::sources::{self, SourceFetcher};
use transit_collector::table_store::{SqliteTableStore, StoreError, TableService, TableStore};
use transit_collector::vault::{SecretNames, SecretProvider, VaultError};
use transit_collector::writer::TableTarget;

pub const API_KEY: &str = "test-account-key";
pub const TABLE: &str = "ltaData";
pub const PARTITION: &str = "partitionkey";

/// Client timeout used by tests; slow upstream routes sleep well past it.
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(300);
const SLOW_RESPONSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub key: String,
    pub account_key: Option<String>,
    pub accept: Option<String>,
    pub content_type: Option<String>,
    pub query: HashMap<String, String>,
}

#[derive(Clone, Default)]
struct UpstreamState {
    failing: Arc<Mutex<HashSet<String>>>,
    slow: Arc<Mutex<HashSet<String>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl UpstreamState {
    async fn respond(
        &self,
        key: String,
        headers: &HeaderMap,
        query: HashMap<String, String>,
    ) -> (StatusCode, String) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            key: key.clone(),
            account_key: header("AccountKey"),
            accept: header("accept"),
            content_type: header("content-type"),
            query,
        });
        let slow = self.slow.lock().unwrap().contains(&key);
        if slow {
            tokio::time::sleep(SLOW_RESPONSE).await;
        }
        if self.failing.lock().unwrap().contains(&key) {
            return (StatusCode::INTERNAL_SERVER_ERROR, "upstream error".into());
        }
        (StatusCode::OK, body_for(&key))
    }
}

/// Payload served for a route key, e.g. `{"feed":"PCDRealTime:NEL"}`.
pub fn body_for(key: &str) -> String {
    format!("{{\"feed\":\"{}\"}}", key)
}

async fn transport_handler(
    State(state): State<UpstreamState>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    let key = match query.get("TrainLine") {
        Some(line) => format!("{}:{}", path, line),
        None => path,
    };
    state.respond(key, &headers, query).await
}

async fn rainfall_handler(
    State(state): State<UpstreamState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    state.respond("rainfall".into(), &headers, query).await
}

/// In-process stand-in for the transport and weather APIs.
pub struct MockUpstream {
    pub base: String,
    state: UpstreamState,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = UpstreamState::default();
        let app = Router::new()
            .route("/weather/rainfall", get(rainfall_handler))
            .route("/lta/{*path}", get(transport_handler))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            state,
        }
    }

    /// Route keys: `rainfall`, a transport path (`BusArrivalv2`), or `PCDRealTime:<line>`.
    pub fn fail(&self, key: &str) {
        self.state.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn slow(&self, key: &str) {
        self.state.slow.lock().unwrap().insert(key.to_string());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_keys(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.key).collect()
    }

    pub fn sources_config(&self) -> SourcesConfig {
        SourcesConfig {
            weather_url: format!("{}/weather/rainfall", self.base),
            transport_base_url: format!("{}/lta", self.base),
            bus_stop_code: "08057".into(),
        }
    }
}

pub fn fetcher() -> SourceFetcher {
    SourceFetcher::new(FETCH_TIMEOUT).unwrap()
}

/// Secrets served from a map; counts reads.
pub struct StaticSecrets {
    values: HashMap<String, String>,
    pub reads: AtomicUsize,
}

impl StaticSecrets {
    pub fn new(connection_string: &str) -> Self {
        let mut values = HashMap::new();
        values.insert("LtaAccountKey".to_string(), API_KEY.to_string());
        values.insert(
            "CosmosDbTableConnectionString".to_string(),
            connection_string.to_string(),
        );
        Self {
            values,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn get_secret(&self, name: &str) -> Result<String, VaultError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.values.get(name).cloned().ok_or_else(|| VaultError::Read {
            name: name.to_string(),
            reason: "not found".into(),
        })
    }
}

/// A vault that cannot be reached.
pub struct UnreachableVault;

#[async_trait]
impl SecretProvider for UnreachableVault {
    async fn get_secret(&self, _name: &str) -> Result<String, VaultError> {
        Err(VaultError::Connect("vault unreachable".into()))
    }
}

/// SQLite store that counts connections (i.e. write attempts).
#[derive(Default)]
pub struct CountingStore {
    inner: SqliteTableStore,
    pub connects: AtomicUsize,
}

#[async_trait]
impl TableStore for CountingStore {
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn TableService>, StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(connection_string).await
    }
}

pub fn sqlite_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite:{}", dir.path().join("tables.db").display())
}

pub fn secret_names() -> SecretNames {
    SecretNames {
        api_key: "LtaAccountKey".into(),
        storage_connection: "CosmosDbTableConnectionString".into(),
    }
}

pub fn target() -> TableTarget {
    TableTarget {
        table: TABLE.into(),
        partition_key: PARTITION.into(),
        create_table: true,
    }
}

pub fn cycle_deps(
    upstream: &MockUpstream,
    secrets: Arc<dyn SecretProvider>,
    store: Arc<dyn TableStore>,
) -> CycleDeps {
    CycleDeps {
        gate: TimeGate::default(),
        secrets,
        secret_names: secret_names(),
        fetcher: fetcher(),
        endpoints: sources::catalog(&upstream.sources_config()),
        store,
        target: target(),
    }
}
