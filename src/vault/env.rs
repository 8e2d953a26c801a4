// Environment-backed secrets for local runs: secret `Foo` is read from `$Foo`.

use super::{SecretProvider, VaultError};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider;

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<String, VaultError> {
        match std::env::var(name) {
            Ok(v) if !v.is_empty() => Ok(v),
            Ok(_) => Err(VaultError::Read {
                name: name.to_string(),
                reason: "environment variable is empty".into(),
            }),
            Err(e) => Err(VaultError::Read {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
