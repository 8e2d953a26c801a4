// Upstream feeds: sequential GETs, each isolated so one flaky API only blanks its own
// column. Grouped endpoints (platform crowd) are all-or-nothing: the first failure
// stops the group and blanks every member.

mod catalog;

pub use catalog::{Api, Endpoint, FetchGroup, catalog};

use crate::models::SourceField;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

/// Header carrying the transport API key.
pub const ACCOUNT_KEY_HEADER: &str = "AccountKey";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("reading body from {url} failed")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Raw payload per field; `None` marks a failed fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResults {
    payloads: BTreeMap<SourceField, Option<String>>,
}

impl FetchResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: SourceField, payload: Option<String>) {
        self.payloads.insert(field, payload);
    }

    /// Payload for `field`; `None` if it failed or was never fetched.
    pub fn get(&self, field: SourceField) -> Option<&str> {
        self.payloads.get(&field).and_then(|p| p.as_deref())
    }
}

pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::version::user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Fetch every endpoint once, in order. Never fails; failures are logged and null.
    #[instrument(skip_all, fields(cycle = %local, endpoints = endpoints.len()))]
    pub async fn fetch_all(
        &self,
        endpoints: &[Endpoint],
        api_key: &str,
        local: &DateTime<FixedOffset>,
    ) -> FetchResults {
        let date_time = crate::gate::weather_date_time(local);
        let cycle = crate::gate::row_key(local);
        let mut results = FetchResults::new();
        let mut done_groups: Vec<FetchGroup> = Vec::new();

        for endpoint in endpoints {
            if endpoint.group == FetchGroup::Single {
                let payload = match self.fetch_one(endpoint, api_key, &date_time).await {
                    Ok(body) => Some(body),
                    Err(e) => {
                        error!(
                            cycle = %cycle,
                            source = %endpoint.field,
                            error = %format!("{:#}", anyhow::Error::new(e)),
                            "unable to read feed"
                        );
                        None
                    }
                };
                results.set(endpoint.field, payload);
                continue;
            }

            if done_groups.contains(&endpoint.group) {
                continue;
            }
            done_groups.push(endpoint.group);
            let members: Vec<&Endpoint> = endpoints
                .iter()
                .filter(|e| e.group == endpoint.group)
                .collect();
            match self.fetch_group(&members, api_key, &date_time).await {
                Ok(bodies) => {
                    for (member, body) in members.iter().zip(bodies) {
                        results.set(member.field, Some(body));
                    }
                }
                Err(e) => {
                    error!(
                        cycle = %cycle,
                        group = ?endpoint.group,
                        error = %format!("{:#}", anyhow::Error::new(e)),
                        "unable to read feed group"
                    );
                    for member in &members {
                        results.set(member.field, None);
                    }
                }
            }
        }
        results
    }

    async fn fetch_group(
        &self,
        members: &[&Endpoint],
        api_key: &str,
        date_time: &str,
    ) -> Result<Vec<String>, FetchError> {
        let mut bodies = Vec::with_capacity(members.len());
        for member in members {
            bodies.push(self.fetch_one(member, api_key, date_time).await?);
        }
        Ok(bodies)
    }

    /// One GET. Transport errors, timeouts and non-2xx statuses are all failures.
    pub async fn fetch_one(
        &self,
        endpoint: &Endpoint,
        api_key: &str,
        date_time: &str,
    ) -> Result<String, FetchError> {
        let request = match endpoint.api {
            Api::Weather => self
                .client
                .get(&endpoint.url)
                .header(CONTENT_TYPE, "application/json")
                .query(&endpoint.query)
                .query(&[("date_time", date_time)]),
            Api::Transport => self
                .client
                .get(&endpoint.url)
                .header(ACCOUNT_KEY_HEADER, api_key)
                .header(ACCEPT, "application/json")
                .query(&endpoint.query),
        };

        let response = request.send().await.map_err(|source| FetchError::Request {
            url: endpoint.url.clone(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: endpoint.url.clone(),
                status,
            });
        }
        let body = response.text().await.map_err(|source| FetchError::Body {
            url: endpoint.url.clone(),
            source,
        })?;
        debug!(source = %endpoint.field, body = %body, "feed payload");
        Ok(body)
    }
}
