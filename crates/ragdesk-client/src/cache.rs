//! Best-effort credential cache.
//!
//! Holds the bearer token, the last known [`Identity`] and the CSRF state of a
//! login in progress. The identity is only an initial-render hint: nothing in
//! this crate treats it as proof of authentication. Writes happen on success,
//! and any doubt clears the entry.
//!
//! Two backends are provided:
//!
//! - [`MemoryCache`] for tests and short-lived processes.
//! - [`FileCache`], a JSON file with owner-only permissions on Unix.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::identity::Identity;

/// Everything the client persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_user: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_state: Option<String>,
}

impl CachedCredentials {
    pub fn is_empty(&self) -> bool {
        self.auth_token.is_none() && self.auth_user.is_none() && self.auth_state.is_none()
    }

    /// Drop the token and identity, keeping a pending login state.
    pub fn forget_session(&mut self) {
        self.auth_token = None;
        self.auth_user = None;
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Storage backend for [`CachedCredentials`].
///
/// Implementations must be `Send + Sync` so one cache can be shared by the
/// HTTP wrapper and the session store across tasks.
pub trait CredentialCache: Send + Sync {
    /// Read the cached credentials. A missing entry is an empty record.
    fn load(&self) -> Result<CachedCredentials>;

    /// Overwrite the cached credentials.
    fn save(&self, credentials: &CachedCredentials) -> Result<()>;

    /// Remove everything.
    fn clear(&self) -> Result<()>;

    /// Read, modify and write back in one step.
    fn update(&self, apply: &mut dyn FnMut(&mut CachedCredentials)) -> Result<()> {
        let mut credentials = self.load()?;
        apply(&mut credentials);
        if credentials.is_empty() {
            self.clear()
        } else {
            self.save(&credentials)
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Cache that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<CachedCredentials>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given credentials already cached.
    pub fn with(credentials: CachedCredentials) -> Self {
        Self {
            inner: Mutex::new(credentials),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CachedCredentials>> {
        self.inner.lock().map_err(|e| ClientError::Cache {
            reason: format!("cache lock poisoned: {e}"),
        })
    }
}

impl CredentialCache for MemoryCache {
    fn load(&self) -> Result<CachedCredentials> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, credentials: &CachedCredentials) -> Result<()> {
        *self.lock()? = credentials.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = CachedCredentials::default();
        Ok(())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut CachedCredentials)) -> Result<()> {
        let mut guard = self.lock()?;
        apply(&mut guard);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// Cache stored as a small JSON document on disk.
///
/// A file that cannot be parsed is treated as empty: the cache is never an
/// authentication source, so losing it only costs a re-login.
pub struct FileCache {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileCache {
    /// Create a cache backed by `path`. Nothing is touched until the first
    /// write; the parent directory is created then.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CachedCredentials> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CachedCredentials::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(credentials) => Ok(credentials),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unreadable credential cache"
                );
                Ok(CachedCredentials::default())
            }
        }
    }

    fn write(&self, credentials: &CachedCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(credentials)?;
        std::fs::write(&self.path, data)?;

        // Restrict file permissions on Unix (owner read/write only).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        tracing::debug!(path = %self.path.display(), "credential cache written");
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "credential cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|e| ClientError::Cache {
            reason: format!("cache lock poisoned: {e}"),
        })
    }
}

impl CredentialCache for FileCache {
    fn load(&self) -> Result<CachedCredentials> {
        self.read()
    }

    fn save(&self, credentials: &CachedCredentials) -> Result<()> {
        let _guard = self.guard()?;
        self.write(credentials)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.guard()?;
        self.remove()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut CachedCredentials)) -> Result<()> {
        let _guard = self.guard()?;
        let mut credentials = self.read()?;
        apply(&mut credentials);
        if credentials.is_empty() {
            self.remove()
        } else {
            self.write(&credentials)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    fn identity() -> Identity {
        Identity {
            id: 3,
            external_id: Some("user_01".to_string()),
            email: Some("c@d.com".to_string()),
            role: Role::User,
        }
    }

    fn full() -> CachedCredentials {
        CachedCredentials {
            auth_token: Some("tok".to_string()),
            auth_user: Some(identity()),
            auth_state: Some("pending".to_string()),
        }
    }

    #[test]
    fn forget_session_keeps_pending_state() {
        let mut credentials = full();
        credentials.forget_session();
        assert_eq!(credentials.auth_token, None);
        assert_eq!(credentials.auth_user, None);
        assert_eq!(credentials.auth_state.as_deref(), Some("pending"));
    }

    #[test]
    fn memory_cache_update_and_clear() {
        let cache = MemoryCache::new();
        assert!(cache.load().unwrap().is_empty());

        cache
            .update(&mut |c| c.auth_token = Some("abc".to_string()))
            .unwrap();
        assert_eq!(cache.load().unwrap().auth_token.as_deref(), Some("abc"));

        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn file_cache_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nope.json"));
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn file_cache_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        FileCache::new(&path).save(&full()).unwrap();
        let loaded = FileCache::new(&path).load().unwrap();
        assert_eq!(loaded, full());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"auth_token\""));
        assert!(raw.contains("\"auth_user\""));
    }

    #[cfg(unix)]
    #[test]
    fn file_cache_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileCache::new(&path).save(&full()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_cache_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(FileCache::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn file_cache_update_to_empty_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let cache = FileCache::new(&path);

        cache
            .update(&mut |c| c.auth_token = Some("t".to_string()))
            .unwrap();
        assert!(path.exists());

        cache.update(&mut |c| c.forget_session()).unwrap();
        assert!(!path.exists());

        // Clearing twice is fine.
        cache.clear().unwrap();
    }
}
