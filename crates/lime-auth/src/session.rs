use lime_core::{KeyValueStore, Result, SessionState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;

pub const SESSION_MARKER_KEY: &str = "session-marker";

/// Persisted form of the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    username: String,
}

/// Why an authentication attempt returned `false`.
///
/// The messages are deliberately generic: a failed login does not reveal
/// whether the username or the password was wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    UsernameTaken,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials => "Invalid username or password.",
            AuthFailure::UsernameTaken => "An account with this username already exists.",
        }
    }
}

/// Owns the login state machine: `Loading -> Anonymous <-> Authenticated`.
///
/// A session is only ever set by a successful login/signup or restored from a
/// marker naming an existing credential, so `Authenticated(u)` always has a
/// matching credential for `u`.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    credentials: CredentialStore,
    state: SessionState,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let credentials = CredentialStore::new(Arc::clone(&store));
        Self {
            store,
            credentials,
            state: SessionState::Loading,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_user(&self) -> Option<&str> {
        self.state.username()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Reads the persisted marker and settles in `Anonymous` or `Authenticated`.
    ///
    /// An unreadable marker, one without a username, or one naming an unknown
    /// user is deleted and treated as absent. If the store itself fails the
    /// manager still leaves `Loading` (as `Anonymous`) before the error is
    /// returned.
    pub fn restore_session(&mut self) -> Result<&SessionState> {
        match self.read_marker() {
            Ok(state) => self.state = state,
            Err(e) => {
                warn!("Session restore failed, continuing signed out: {}", e);
                self.state = SessionState::Anonymous;
                return Err(e);
            }
        }
        Ok(&self.state)
    }

    fn read_marker(&self) -> Result<SessionState> {
        let Some(raw) = self.store.get(SESSION_MARKER_KEY)? else {
            debug!("No persisted session");
            return Ok(SessionState::Anonymous);
        };

        match self.valid_marker(&raw)? {
            Some(username) => {
                info!("Restored session for {}", username);
                Ok(SessionState::Authenticated { username })
            }
            None => {
                self.store.remove(SESSION_MARKER_KEY)?;
                Ok(SessionState::Anonymous)
            }
        }
    }

    fn valid_marker(&self, raw: &str) -> Result<Option<String>> {
        let record = match serde_json::from_str::<SessionRecord>(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding malformed session marker: {}", e);
                return Ok(None);
            }
        };

        if record.username.is_empty() {
            warn!("Discarding session marker without a username");
            return Ok(None);
        }

        if !self.credentials.contains(&record.username)? {
            warn!("Discarding session marker for unknown user {}", record.username);
            return Ok(None);
        }

        Ok(Some(record.username))
    }

    /// Returns `false` and leaves the state untouched on bad credentials.
    pub fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        if !self.accepts_auth(username) {
            return Ok(false);
        }

        if !self.credentials.verify(username, password)? {
            debug!("Login rejected for {}", username);
            return Ok(false);
        }

        self.start_session(username)?;
        Ok(true)
    }

    /// Registers and immediately logs in. `false` if the username is taken.
    pub fn signup(&mut self, username: &str, password: &str) -> Result<bool> {
        if !self.accepts_auth(username) {
            return Ok(false);
        }

        if !self.credentials.register(username, password)? {
            return Ok(false);
        }

        self.start_session(username)?;
        Ok(true)
    }

    /// Clears the session and its marker. Safe to call when already anonymous.
    pub fn logout(&mut self) -> Result<()> {
        if let Some(username) = self.current_user() {
            info!("Logged out {}", username);
        }
        self.store.remove(SESSION_MARKER_KEY)?;
        self.state = SessionState::Anonymous;
        Ok(())
    }

    fn accepts_auth(&self, username: &str) -> bool {
        if self.state == SessionState::Loading {
            warn!("Authentication attempted before session restore");
            return false;
        }
        !username.is_empty()
    }

    fn start_session(&mut self, username: &str) -> Result<()> {
        let record = SessionRecord {
            username: username.to_string(),
        };
        self.store
            .set(SESSION_MARKER_KEY, &serde_json::to_string(&record)?)?;
        self.state = SessionState::Authenticated {
            username: username.to_string(),
        };

        info!("Session started for {}", username);
        Ok(())
    }
}
