// Session store - owns the authentication token
//
// The token is the only cross-component shared mutable value in the client.
// This store is its sole writer: login sets it, logout clears it, everything
// else reads. A persisted copy lives in a token file so a restart does not
// force re-login; it is written on login and erased on logout.
//
// No token validation happens client-side. An expired or revoked token is
// only discovered when the gateway gets an authorization failure - that
// surfaces to the caller as an ApiError and does NOT clear the session.
// Logout stays an explicit user action.

use crate::models::TokenPayload;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// File-backed persistence for the token.
///
/// The durable analog of the original client's per-tab key/value storage:
/// one fixed location, one value, cleared on logout.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted token, if any. Unreadable or empty files count as
    /// no session.
    pub fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(_) => None,
        }
    }

    /// Persist the token, creating parent directories as needed.
    pub fn store(&self, token: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!("Could not create session directory: {}", e);
                return;
            }
        }
        if let Err(e) = fs::write(&self.path, token) {
            tracing::warn!("Could not persist session token: {}", e);
        }
    }

    /// Erase the persisted token. Missing files are fine.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove session token file: {}", e),
        }
    }
}

/// Short SHA-256 fingerprint of a token (first 16 hex chars).
///
/// Used for session-scoped cache keys and log fields - never log or key on
/// the token itself.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// The client-side session: current token plus its derived logged-in state.
///
/// Cheap to clone; all clones share the same token cell.
#[derive(Debug, Clone)]
pub struct SessionStore {
    token: Arc<Mutex<Option<String>>>,
    storage: TokenStorage,
}

impl SessionStore {
    /// Create the store and hydrate it once from persistent storage.
    ///
    /// Called at startup before the first render, so a restart lands the
    /// user back in their session.
    pub fn restore(storage: TokenStorage) -> Self {
        let token = storage.load();
        if let Some(ref t) = token {
            tracing::info!(session = %token_fingerprint(t), "Restored persisted session");
        }
        Self {
            token: Arc::new(Mutex::new(token)),
            storage,
        }
    }

    /// Accept a token payload: store in memory and persist.
    ///
    /// Synchronous - `is_authenticated` is true as soon as this returns.
    pub fn login(&self, payload: &TokenPayload) {
        let mut token = self.token.lock().unwrap();
        *token = Some(payload.access_token.clone());
        self.storage.store(&payload.access_token);
        tracing::info!(
            session = %token_fingerprint(&payload.access_token),
            "Session established"
        );
    }

    /// Clear the in-memory and persisted token.
    pub fn logout(&self) {
        let mut token = self.token.lock().unwrap();
        *token = None;
        self.storage.clear();
        tracing::info!("Session cleared");
    }

    /// Current token, or None when logged out. Read by the gateway on every
    /// authenticated request.
    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    /// Fingerprint of the current token, for session-scoped cache keys.
    pub fn fingerprint(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap()
            .as_deref()
            .map(token_fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, TokenStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("session.token"));
        (dir, storage)
    }

    fn payload(token: &str) -> TokenPayload {
        TokenPayload {
            access_token: token.to_string(),
            token_type: "bearer".to_string(),
        }
    }

    #[test]
    fn test_login_logout_brackets_authentication() {
        let (_dir, storage) = temp_storage();
        let session = SessionStore::restore(storage.clone());

        assert!(!session.is_authenticated());
        assert_eq!(storage.load(), None);

        session.login(&payload("tok-1"));
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("tok-1"));
        assert_eq!(storage.load().as_deref(), Some("tok-1"));

        session.logout();
        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
        assert_eq!(storage.load(), None);
    }

    #[test]
    fn test_restore_survives_restart() {
        let (_dir, storage) = temp_storage();

        let first = SessionStore::restore(storage.clone());
        first.login(&payload("tok-2"));
        drop(first);

        // A fresh store over the same file picks up the persisted token.
        let second = SessionStore::restore(storage);
        assert!(second.is_authenticated());
        assert_eq!(second.token().as_deref(), Some("tok-2"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_token_scoped() {
        let (_dir, storage) = temp_storage();
        let session = SessionStore::restore(storage);

        assert_eq!(session.fingerprint(), None);

        session.login(&payload("tok-a"));
        let fp_a = session.fingerprint().unwrap();
        assert_eq!(fp_a.len(), 16);
        assert_eq!(fp_a, token_fingerprint("tok-a"));

        // A different token yields a different fingerprint, so cache keys
        // scoped by fingerprint are never reused across tokens.
        session.login(&payload("tok-b"));
        assert_ne!(session.fingerprint().unwrap(), fp_a);
    }

    #[test]
    fn test_clones_share_the_token_cell() {
        let (_dir, storage) = temp_storage();
        let session = SessionStore::restore(storage);
        let view_handle = session.clone();

        session.login(&payload("tok-3"));
        assert!(view_handle.is_authenticated());

        view_handle.logout();
        assert!(!session.is_authenticated());
    }
}
