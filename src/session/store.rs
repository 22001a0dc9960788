use crate::session::error::SessionError;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const TOKEN_CACHE_DIR_NAME: &str = "meteofrance_rs";

/// Default root of the token cache: `<temp dir>/meteofrance_rs/token`.
pub fn default_token_cache_dir() -> PathBuf {
    std::env::temp_dir().join(TOKEN_CACHE_DIR_NAME).join("token")
}

/// Key-value storage for the cached token record.
///
/// A missing key is `Ok(None)`, not an error.
pub trait TokenStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError>;
    fn write(&self, key: &str, value: &[u8]) -> Result<(), SessionError>;
}

/// One file per key under `root`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(default_token_cache_dir())
    }
}

impl TokenStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::TokenCacheRead(path, e)),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), SessionError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SessionError::TokenCacheWrite(parent.to_path_buf(), e))?;
        }
        write_owner_only(&path, value).map_err(|e| SessionError::TokenCacheWrite(path, e))
    }
}

/// Tokens are credentials: on unix the file is readable by its owner only,
/// including when an older file with wider permissions is overwritten.
fn write_owner_only(path: &Path, value: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(value)
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
