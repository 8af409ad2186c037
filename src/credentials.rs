//! Persisted credential access and the 401 reaction.
//!
//! The host application owns the credential blob (a JSON document shaped like
//! `{"state": {"token": "..."}}`). This module only ever reads it, or clears it
//! entirely when the backend rejects the token.

use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

/// Navigation callback invoked when the host must send the user back to login.
pub type NavigateFn = Arc<dyn Fn() + Send + Sync>;

/// Storage backend holding named credential blobs.
///
/// Reads are treated as atomic snapshots; no locking is coordinated across calls.
pub trait CredentialStore: Send + Sync {
    /// Raw blob stored under `key`, if any.
    fn load(&self, key: &str) -> Option<String>;

    /// Remove the blob stored under `key` entirely.
    fn clear(&self, key: &str);
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, key: impl Into<String>, blob: impl Into<String>) -> Self {
        self.store(key, blob);
        self
    }

    /// Write a raw blob; used by hosts after a successful login.
    pub fn store(&self, key: impl Into<String>, blob: impl Into<String>) {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), blob.into());
    }

    /// Store a well-formed snapshot holding `token`.
    pub fn store_token(&self, key: impl Into<String>, token: impl Into<String>) {
        let blob = CredentialSnapshot::with_token(token).to_blob();
        self.store(key, blob);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn clear(&self, key: &str) {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        f.debug_struct("MemoryCredentialStore")
            .field("keys", &keys)
            .finish()
    }
}

/// Credential store keeping each blob in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Write a raw blob, creating the directory if needed.
    pub fn store(&self, key: &str, blob: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), blob)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(blob) => Some(blob),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, error = %_err, "failed to read credential blob");
                None
            }
        }
    }

    fn clear(&self, key: &str) {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, error = %_err, "failed to clear credential blob");
            }
        }
    }
}

/// Persisted credential snapshot as written by the host application.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSnapshot {
    #[serde(default)]
    pub state: CredentialState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl CredentialSnapshot {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            state: CredentialState {
                token: Some(token.into()),
            },
        }
    }

    /// Parse a raw blob. `None` when the blob is not the expected structure.
    pub fn parse(blob: &str) -> Option<Self> {
        serde_json::from_str(blob).ok()
    }

    pub fn to_blob(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Reads the bearer token from the persisted snapshot at dispatch time.
#[derive(Clone)]
pub struct CredentialProvider {
    store: Arc<dyn CredentialStore>,
    key: String,
}

impl CredentialProvider {
    pub fn new(store: Arc<dyn CredentialStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current bearer token, if any.
    ///
    /// A missing blob, a blob that does not parse, and a snapshot without a
    /// token all yield `None`; only the malformed case emits a diagnostic.
    pub fn get_token(&self) -> Option<String> {
        let blob = self.store.load(&self.key)?;
        match serde_json::from_str::<CredentialSnapshot>(&blob) {
            Ok(snapshot) => snapshot.state.token,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    key = %self.key,
                    error = %_err,
                    "ignoring malformed credential snapshot"
                );
                None
            }
        }
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("key", &self.key)
            .finish()
    }
}

/// Clears the stored credential and asks the host to re-authenticate.
#[derive(Clone)]
pub struct AuthExpiryReactor {
    store: Arc<dyn CredentialStore>,
    key: String,
    navigate: Option<NavigateFn>,
}

impl AuthExpiryReactor {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        key: impl Into<String>,
        navigate: Option<NavigateFn>,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            navigate,
        }
    }

    /// Clear the whole snapshot, then fire the navigation callback.
    pub fn on_auth_expired(&self) {
        #[cfg(feature = "tracing")]
        tracing::warn!(key = %self.key, "credential rejected; clearing stored session");
        self.store.clear(&self.key);
        if let Some(navigate) = &self.navigate {
            navigate();
        }
    }
}

impl fmt::Debug for AuthExpiryReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthExpiryReactor")
            .field("key", &self.key)
            .field("navigate", &self.navigate.as_ref().map(|_| "callback"))
            .finish()
    }
}
