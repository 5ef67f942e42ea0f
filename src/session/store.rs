use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::error::ApiError;
use crate::models::TokenPair;

/// Where the token pair lives between invocations. The admin UI kept it in
/// browser local storage; the CLI keeps a small JSON file.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>, ApiError>;
    fn save(&self, tokens: &TokenPair) -> Result<(), ApiError>;
    fn clear(&self) -> Result<(), ApiError>;
}

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Result<Option<TokenPair>, ApiError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(err) => {
                // A mangled file must not lock the user out of logging in.
                warn!("ignoring unreadable session file: {err}");
                Ok(None)
            }
        }
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests and one-shot runs that should not persist
/// credentials.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<TokenPair>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<TokenPair>, ApiError> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone())
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), ApiError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("scrutin-store-{}.json", uuid::Uuid::new_v4()))
    }

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        }
    }

    #[test]
    fn file_store_roundtrips_and_clears() {
        let path = scratch_path();
        let store = FileStore::new(&path);

        assert!(store.load().unwrap().is_none());
        store.save(&pair()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token, "refresh");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn file_store_treats_garbage_as_absent() {
        let path = scratch_path();
        fs::write(&path, "not json at all").unwrap();
        let store = FileStore::new(&path);
        assert!(store.load().unwrap().is_none());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn memory_store_roundtrips() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&pair()).unwrap();
        assert!(store.load().unwrap().is_some());
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
