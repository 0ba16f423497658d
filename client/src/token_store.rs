//! Process-wide holder of the access/refresh token pair.
//!
//! All reads and writes of the tokens go through one [`TokenStore`] handle
//! (cheap to clone), so every guard and backend sees the same values. Values
//! are encrypted before they reach [`Storage`]. Storage failures and
//! undecryptable values read as "no token" and are only logged.

use payloads::responses::TokenPair;
use secrecy::SecretBox;
use std::sync::Arc;

use crate::cipher::Cipher;
use crate::storage::Storage;

pub const ACCESS_TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    cipher: Arc<Cipher>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>, key: &SecretBox<String>) -> Self {
        Self {
            storage,
            cipher: Arc::new(Cipher::new(key)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let sealed = match self.storage.get(key) {
            Ok(sealed) => sealed?,
            Err(e) => {
                tracing::warn!("Reading {key} from storage failed: {e}");
                return None;
            }
        };
        match self.cipher.open(&sealed) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring stored {key}: {e}");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, &self.cipher.seal(value)) {
            tracing::warn!("Writing {key} to storage failed: {e}");
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            tracing::warn!("Removing {key} from storage failed: {e}");
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    /// Replace the stored pair wholesale.
    pub fn store_pair(&self, pair: &TokenPair) {
        self.set(ACCESS_TOKEN_KEY, &pair.access_token);
        self.set(REFRESH_TOKEN_KEY, &pair.refresh_token);
    }

    pub fn clear(&self) {
        self.remove(ACCESS_TOKEN_KEY);
        self.remove(REFRESH_TOKEN_KEY);
    }
}
