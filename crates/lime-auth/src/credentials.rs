use lime_core::{KeyValueStore, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CREDENTIAL_KEY_PREFIX: &str = "credential:";

/// Stored value under `credential:<username>`.
///
/// The password is kept verbatim; there is no hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRecord {
    password: String,
}

/// Username to password mapping on top of a [`KeyValueStore`].
///
/// Entries are created by [`register`](Self::register) and never updated or removed.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn key_for(username: &str) -> String {
        format!("{CREDENTIAL_KEY_PREFIX}{username}")
    }

    /// Creates a credential, or returns `false` if the username is taken.
    pub fn register(&self, username: &str, password: &str) -> Result<bool> {
        let key = Self::key_for(username);
        if self.store.get(&key)?.is_some() {
            debug!("Registration rejected, username already exists: {}", username);
            return Ok(false);
        }

        let record = CredentialRecord {
            password: password.to_string(),
        };
        self.store.set(&key, &serde_json::to_string(&record)?)?;

        info!("Registered credential for {}", username);
        Ok(true)
    }

    /// True iff a credential exists for `username` and its password matches exactly.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool> {
        let Some(raw) = self.store.get(&Self::key_for(username))? else {
            return Ok(false);
        };

        match serde_json::from_str::<CredentialRecord>(&raw) {
            Ok(record) => Ok(record.password == password),
            Err(e) => {
                warn!("Ignoring unreadable credential for {}: {}", username, e);
                Ok(false)
            }
        }
    }

    pub fn contains(&self, username: &str) -> Result<bool> {
        Ok(self.store.get(&Self::key_for(username))?.is_some())
    }
}
