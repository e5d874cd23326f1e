//! AES-256-GCM credential cipher
//!
//! Tokens are `base64(nonce || ciphertext)`. The key never lives in the
//! configuration file; it is supplied through the environment.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use skyrelay_domain::{CipherError, CredentialCipher};

pub const KEY_ENV_VAR: &str = "SKYRELAY_ENCRYPTION_KEY";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Build from a base64-encoded 32-byte key
    pub fn from_base64(key: &SecretString) -> Result<Self, CipherError> {
        let bytes = STANDARD
            .decode(key.expose_secret().trim())
            .map_err(|e| CipherError::Key(format!("Key is not valid base64: {}", e)))?;

        if bytes.len() != KEY_LEN {
            return Err(CipherError::Key(format!(
                "Key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }

        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Build from `SKYRELAY_ENCRYPTION_KEY`; `Ok(None)` when it is unset
    pub fn from_env() -> Result<Option<Self>, CipherError> {
        match std::env::var(KEY_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => {
                Self::from_base64(&SecretString::new(value.into())).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Fresh random key, base64-encoded
    pub fn generate_key() -> SecretString {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        SecretString::new(STANDARD.encode(key).into())
    }
}

impl CredentialCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(token))
    }

    fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|e| CipherError::Decrypt(format!("Token is not valid base64: {}", e)))?;

        if bytes.len() <= NONCE_LEN {
            return Err(CipherError::Decrypt("Token is too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt("Wrong key or corrupted token".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::from_base64(&AesGcmCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = cipher();
        let token = cipher.encrypt("hunter2").unwrap();

        assert_ne!(token, "hunter2");
        assert_eq!(cipher.decrypt(&token).unwrap(), "hunter2");
    }

    #[test]
    fn test_nonce_makes_tokens_differ() {
        let cipher = cipher();
        assert_ne!(
            cipher.encrypt("same").unwrap(),
            cipher.encrypt("same").unwrap()
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let token = cipher().encrypt("secret").unwrap();
        assert!(matches!(
            cipher().decrypt(&token),
            Err(CipherError::Decrypt(_))
        ));
    }

    #[test]
    fn test_rejects_short_key() {
        let key = SecretString::new(STANDARD.encode([1u8; 16]).into());
        assert!(matches!(
            AesGcmCipher::from_base64(&key),
            Err(CipherError::Key(_))
        ));
    }

    #[test]
    fn test_rejects_garbage_token() {
        assert!(cipher().decrypt("not base64!").is_err());
        assert!(cipher().decrypt(&STANDARD.encode([0u8; 4])).is_err());
    }
}
