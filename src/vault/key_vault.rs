// Azure Key Vault over REST, authenticated with the host's managed identity.
// Token: App Service identity endpoint (IDENTITY_ENDPOINT/IDENTITY_HEADER) or the
// instance metadata service. One token is fetched per `get_secrets` call.
// The vault location is resolved on every read, so a missing location fails the
// cycle that needs it rather than the process.

use super::{SecretProvider, VaultError};
use crate::config::VaultConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const VAULT_RESOURCE: &str = "https://vault.azure.net";
const VAULT_API_VERSION: &str = "7.4";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKind {
    /// App Service / Functions: `X-IDENTITY-HEADER` carries the shared secret.
    AppService { header: String },
    /// Instance metadata service: `Metadata: true`.
    Imds,
}

/// Where and how to obtain a vault access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedIdentity {
    pub endpoint: String,
    pub kind: IdentityKind,
    /// User-assigned identity; system-assigned when `None`.
    pub client_id: Option<String>,
}

impl ManagedIdentity {
    pub fn from_env() -> Self {
        let client_id = std::env::var("AZURE_CLIENT_ID")
            .ok()
            .filter(|v| !v.is_empty());
        match (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            (Ok(endpoint), Ok(header)) if !endpoint.is_empty() => Self {
                endpoint,
                kind: IdentityKind::AppService { header },
                client_id,
            },
            _ => Self {
                endpoint: IMDS_ENDPOINT.into(),
                kind: IdentityKind::Imds,
                client_id,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

/// Where the vault lives.
#[derive(Debug, Clone)]
pub enum VaultLocation {
    Fixed(String),
    /// `url_env` from the environment at call time, falling back to `url`.
    Configured(VaultConfig),
}

impl VaultLocation {
    pub fn resolve(&self) -> Result<String, VaultError> {
        let url = match self {
            Self::Fixed(url) => Some(url.clone()).filter(|u| !u.trim().is_empty()),
            Self::Configured(config) => config.resolve_url(),
        };
        let url = url.ok_or_else(|| match self {
            Self::Configured(config) => VaultError::MissingLocation(config.url_env.clone()),
            Self::Fixed(_) => VaultError::MissingLocation("vault.url".into()),
        })?;
        Ok(url.trim_end_matches('/').to_string())
    }
}

pub struct KeyVaultClient {
    client: Client,
    location: VaultLocation,
    identity: ManagedIdentity,
}

impl KeyVaultClient {
    pub fn new(
        vault_url: impl Into<String>,
        identity: ManagedIdentity,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Self::with_location(VaultLocation::Fixed(vault_url.into()), identity, timeout)
    }

    pub fn with_location(
        location: VaultLocation,
        identity: ManagedIdentity,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::version::user_agent())
            .build()?;
        Ok(Self {
            client,
            location,
            identity,
        })
    }

    /// Vault location from config/environment (resolved per read), identity from the environment.
    pub fn from_config(config: &VaultConfig, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_location(
            VaultLocation::Configured(config.clone()),
            ManagedIdentity::from_env(),
            timeout,
        )
    }

    #[instrument(skip(self), fields(operation = "access_token"))]
    async fn access_token(&self) -> Result<String, VaultError> {
        let mut query: Vec<(&str, &str)> = vec![("resource", VAULT_RESOURCE)];
        let mut request = match &self.identity.kind {
            IdentityKind::AppService { header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.client
                    .get(&self.identity.endpoint)
                    .header("X-IDENTITY-HEADER", header)
            }
            IdentityKind::Imds => {
                query.push(("api-version", IMDS_API_VERSION));
                self.client
                    .get(&self.identity.endpoint)
                    .header("Metadata", "true")
            }
        };
        if let Some(client_id) = &self.identity.client_id {
            query.push(("client_id", client_id.as_str()));
        }
        request = request.query(&query);

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VaultError::Connect(format!("token request failed: {}", e)))?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Connect(format!("token response: {}", e)))?;
        debug!("vault access token acquired");
        Ok(token.access_token)
    }

    async fn read_secret(
        &self,
        vault_url: &str,
        token: &str,
        name: &str,
    ) -> Result<String, VaultError> {
        let read_err = |reason: String| VaultError::Read {
            name: name.to_string(),
            reason,
        };
        let url = format!("{}/secrets/{}", vault_url, name);
        let response = self
            .client
            .get(&url)
            .query(&[("api-version", VAULT_API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| read_err(e.to_string()))?;
        let bundle: SecretBundle = response.json().await.map_err(|e| read_err(e.to_string()))?;
        Ok(bundle.value)
    }
}

#[async_trait]
impl SecretProvider for KeyVaultClient {
    async fn get_secret(&self, name: &str) -> Result<String, VaultError> {
        let vault_url = self.location.resolve()?;
        let token = self.access_token().await?;
        self.read_secret(&vault_url, &token, name).await
    }

    async fn get_secrets(&self, names: &[&str]) -> Result<Vec<String>, VaultError> {
        let vault_url = self.location.resolve()?;
        let token = self.access_token().await?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            out.push(self.read_secret(&vault_url, &token, name).await?);
        }
        Ok(out)
    }
}
