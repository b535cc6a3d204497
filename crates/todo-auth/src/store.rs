//! Durable credential store
//!
//! A JSON file mapping an API origin to that origin's stored keys:
//! `access`, `refresh` and `sessionExpired`. A store handle is bound to one
//! origin; entries for other origins are carried through every write.
//!
//! All writes use atomic temp-file + rename. A tokio Mutex serializes
//! concurrent writers, so two refreshes finishing together resolve as
//! last-writer-wins without corrupting the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Access and refresh tokens, always stored and removed together.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    access: Secret<String>,
    refresh: Secret<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Secret::new(refresh.into()),
        }
    }

    pub fn access(&self) -> &str {
        self.access.expose()
    }

    pub fn refresh(&self) -> &str {
        self.refresh.expose()
    }
}

/// Keys stored for one origin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OriginEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
    #[serde(rename = "sessionExpired", default)]
    session_expired: bool,
}

impl OriginEntry {
    fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none() && !self.session_expired
    }
}

type StoreFile = BTreeMap<String, OriginEntry>;

/// Origin-scoped handle over the credential file.
///
/// Reads clone from the in-memory copy; every mutation rewrites the file
/// while holding the lock.
pub struct SessionStore {
    path: PathBuf,
    origin: String,
    state: Mutex<StoreFile>,
}

impl SessionStore {
    /// Open the store at `path`, scoped to `origin`.
    ///
    /// A missing file is created as `{}` (parent directories included).
    pub async fn open(path: PathBuf, origin: impl Into<String>) -> Result<Self> {
        let origin = origin.into();
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session store: {e}")))?;
            let parsed: StoreFile = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session store: {e}")))?;
            info!(path = %path.display(), origins = parsed.len(), "loaded session store");
            parsed
        } else {
            info!(path = %path.display(), "session store not found, starting empty");
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Io(format!("creating session store directory: {e}")))?;
            }
            let empty = StoreFile::new();
            write_atomic(&path, &empty).await?;
            empty
        };

        Ok(Self {
            path,
            origin,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The stored pair, only when both tokens are present.
    pub async fn credentials(&self) -> Option<CredentialPair> {
        let state = self.state.lock().await;
        let entry = state.get(&self.origin)?;
        match (&entry.access, &entry.refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        }
    }

    pub async fn access(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.get(&self.origin).and_then(|e| e.access.clone())
    }

    pub async fn refresh(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.get(&self.origin).and_then(|e| e.refresh.clone())
    }

    /// Replace both tokens in a single write.
    pub async fn store_pair(&self, pair: &CredentialPair) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let entry = next.entry(self.origin.clone()).or_default();
        entry.access = Some(pair.access().to_string());
        entry.refresh = Some(pair.refresh().to_string());
        self.commit(&mut state, next).await?;
        debug!(origin = %self.origin, "stored credential pair");
        Ok(())
    }

    /// Replace the access token after a refresh, keeping the refresh token.
    ///
    /// Returns `false` without writing when no refresh token is stored (the
    /// session was cleared while the refresh was in flight).
    pub async fn replace_access(&self, access: String) -> Result<bool> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let Some(entry) = next.get_mut(&self.origin).filter(|e| e.refresh.is_some()) else {
            debug!(origin = %self.origin, "no refresh token stored, dropping refreshed access token");
            return Ok(false);
        };
        entry.access = Some(access);
        self.commit(&mut state, next).await?;
        debug!(origin = %self.origin, "replaced access token");
        Ok(true)
    }

    /// Remove both tokens in a single write. The expiry flag is untouched.
    pub async fn clear_credentials(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let Some(entry) = next.get_mut(&self.origin) else {
            return Ok(());
        };
        entry.access = None;
        entry.refresh = None;
        if entry.is_empty() {
            next.remove(&self.origin);
        }
        self.commit(&mut state, next).await?;
        debug!(origin = %self.origin, "cleared credentials");
        Ok(())
    }

    /// Raise the session-expired flag for the login screen.
    pub async fn mark_session_expired(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.entry(self.origin.clone()).or_default().session_expired = true;
        self.commit(&mut state, next).await
    }

    /// Peek at the session-expired flag without clearing it.
    pub async fn session_expired(&self) -> bool {
        let state = self.state.lock().await;
        state
            .get(&self.origin)
            .map(|e| e.session_expired)
            .unwrap_or(false)
    }

    /// Read and clear the session-expired flag.
    pub async fn take_session_expired(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let Some(entry) = next.get_mut(&self.origin).filter(|e| e.session_expired) else {
            return Ok(false);
        };
        entry.session_expired = false;
        if entry.is_empty() {
            next.remove(&self.origin);
        }
        self.commit(&mut state, next).await?;
        Ok(true)
    }

    /// Persist `next`, then adopt it in memory. On a failed write the
    /// in-memory state keeps matching the file.
    async fn commit(&self, state: &mut StoreFile, next: StoreFile) -> Result<()> {
        write_atomic(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

/// Write the store file atomically with 0600 permissions on unix.
async fn write_atomic(path: &Path, data: &StoreFile) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing session store: {e}")))?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session store");
    Ok(())
}
