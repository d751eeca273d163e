//! Credential decryption.
//!
//! Data sources store their password in the sources file, possibly encrypted.
//! The gateway asks a decryptor for the usable secret right before it opens a
//! connector; a failure here counts as a failed execution tier.

use async_trait::async_trait;
use secrecy::SecretString;
use sluice_common::DataSourceConfig;

#[async_trait]
pub trait CredentialDecryptor: Send + Sync {
    async fn decrypt(&self, source: &DataSourceConfig) -> anyhow::Result<Option<SecretString>>;
}

/// Passwords are stored as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextDecryptor;

#[async_trait]
impl CredentialDecryptor for PlaintextDecryptor {
    async fn decrypt(&self, source: &DataSourceConfig) -> anyhow::Result<Option<SecretString>> {
        Ok(source.password.clone())
    }
}
