//! Credential lookup - decrypts the login pair written by setup

use std::sync::Arc;

use async_trait::async_trait;

use crate::ports::{
    ConfigStore, CredentialCipher, CredentialError, CredentialProvider, Credentials, config_keys,
};

/// Reads the encrypted credential pair from the config store on every call,
/// so a re-run of setup is picked up without a restart
pub struct StoredCredentials {
    store: Arc<dyn ConfigStore>,
    cipher: Arc<dyn CredentialCipher>,
}

impl StoredCredentials {
    pub fn new(store: Arc<dyn ConfigStore>, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self { store, cipher }
    }

    async fn encrypted(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|token| !token.is_empty()))
    }
}

#[async_trait]
impl CredentialProvider for StoredCredentials {
    async fn credentials(&self) -> Result<Option<Credentials>, CredentialError> {
        let (Some(user), Some(pass)) = (
            self.encrypted(config_keys::ENCRYPTED_USER).await?,
            self.encrypted(config_keys::ENCRYPTED_PASSWORD).await?,
        ) else {
            return Ok(None);
        };

        Ok(Some(Credentials {
            identifier: self.cipher.decrypt(&user)?,
            password: self.cipher.decrypt(&pass)?,
        }))
    }
}
