// Secret resolution: the API key for the transport feed and the storage connection string.
// Resolution is all-or-nothing; a cycle without both credentials does not start.

pub mod env;
pub mod key_vault;

use async_trait::async_trait;
use thiserror::Error;

pub use env::EnvSecretProvider;
pub use key_vault::{KeyVaultClient, ManagedIdentity, VaultLocation};

use crate::config::VaultConfig;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault location is not configured (set {0} or vault.url)")]
    MissingLocation(String),

    #[error("unable to connect to vault: {0}")]
    Connect(String),

    #[error("unable to read secret '{name}': {reason}")]
    Read { name: String, reason: String },
}

/// Read-only access to named secrets.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String, VaultError>;

    /// Read several secrets; fails on the first one that cannot be read.
    async fn get_secrets(&self, names: &[&str]) -> Result<Vec<String>, VaultError> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            out.push(self.get_secret(name).await?);
        }
        Ok(out)
    }
}

/// Names of the two secrets a cycle needs.
#[derive(Debug, Clone)]
pub struct SecretNames {
    pub api_key: String,
    pub storage_connection: String,
}

impl SecretNames {
    pub fn from_config(config: &VaultConfig) -> Self {
        Self {
            api_key: config.api_key_secret.clone(),
            storage_connection: config.connection_string_secret.clone(),
        }
    }
}

/// Resolved credentials, passed explicitly to the fetch and write stages.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub storage_connection: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("storage_connection", &"<redacted>")
            .finish()
    }
}

pub async fn resolve_credentials<P>(
    provider: &P,
    names: &SecretNames,
) -> Result<Credentials, VaultError>
where
    P: SecretProvider + ?Sized,
{
    let values = provider
        .get_secrets(&[names.api_key.as_str(), names.storage_connection.as_str()])
        .await?;
    let [api_key, storage_connection]: [String; 2] =
        values.try_into().map_err(|v: Vec<String>| VaultError::Read {
            name: names.storage_connection.clone(),
            reason: format!("provider returned {} values for 2 secrets", v.len()),
        })?;
    Ok(Credentials {
        api_key,
        storage_connection,
    })
}
