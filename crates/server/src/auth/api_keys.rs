//! API key storage for the default authorization mode.
//!
//! Keys live in `{DATA_DIR}/api-keys.json`. Only the SHA-256 hash of each key
//! is stored; the plaintext is returned once from [`ApiKeyStore::issue_at`].
//! A key issued at `T` is valid while `now < T + expires_in_days`.
//!
//! The file is the source of truth: other processes (the CLI) may issue or
//! revoke keys while the server runs. [`ApiKeyStore::refresh`] re-reads it
//! only when its size or modification time changed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

const STORE_FILE: &str = "api-keys.json";
const KEY_PREFIX: &str = "da2-";
const KEY_RANDOM_LEN: usize = 26;

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API key store is corrupt: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown API key")]
    Unknown,

    #[error("API key {id} expired at {expired_at}")]
    Expired { id: String, expired_at: DateTime<Utc> },

    #[error("API key {id} has been revoked")]
    Revoked { id: String },

    #[error("no API key with id {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub key_hash: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

impl ApiKeyRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// A freshly issued key. `key` is not recoverable afterwards.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key: String,
    pub record: ApiKeyRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    /// `None` when the file does not exist yet.
    fn read(path: &Path) -> io::Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Self {
                modified: meta.modified().ok(),
                len: meta.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub struct ApiKeyStore {
    path: Option<PathBuf>,
    expires_in_days: u32,
    records: Vec<ApiKeyRecord>,
    stamp: Option<FileStamp>,
}

fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn generate_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", KEY_PREFIX, random.to_lowercase())
}

impl ApiKeyStore {
    /// Open (or create) the file-backed store under `data_dir`.
    pub fn open(data_dir: &Path, expires_in_days: u32) -> Result<Self, ApiKeyError> {
        let path = data_dir.join(STORE_FILE);
        let stamp = FileStamp::read(&path)?;
        let records = Self::read_records(&path)?;
        info!("API key store loaded ({} keys) from {}", records.len(), path.display());
        Ok(Self {
            path: Some(path),
            expires_in_days,
            records,
            stamp,
        })
    }

    /// Store that never touches disk.
    pub fn in_memory(expires_in_days: u32) -> Self {
        Self {
            path: None,
            expires_in_days,
            records: Vec::new(),
            stamp: None,
        }
    }

    fn read_records(path: &Path) -> Result<Vec<ApiKeyRecord>, ApiKeyError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn persist(&mut self) -> Result<(), ApiKeyError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.records)?)?;
        self.stamp = FileStamp::read(path)?;
        Ok(())
    }

    /// Re-read the backing file, picking up changes made by another process.
    pub fn reload(&mut self) -> Result<(), ApiKeyError> {
        if let Some(path) = &self.path {
            // Stamp first: a write racing the read shows up as stale next time.
            self.stamp = FileStamp::read(path)?;
            self.records = Self::read_records(path)?;
        }
        Ok(())
    }

    /// The backing file changed since it was last read or written here.
    pub fn is_stale(&self) -> Result<bool, ApiKeyError> {
        match &self.path {
            Some(path) => Ok(FileStamp::read(path)? != self.stamp),
            None => Ok(false),
        }
    }

    /// Reload when stale. Returns whether a reload happened.
    pub fn refresh(&mut self) -> Result<bool, ApiKeyError> {
        if !self.is_stale()? {
            return Ok(false);
        }
        self.reload()?;
        debug!("API key store reloaded ({} keys)", self.records.len());
        Ok(true)
    }

    pub fn list(&self) -> &[ApiKeyRecord] {
        &self.records
    }

    pub fn has_active_at(&self, now: DateTime<Utc>) -> bool {
        self.records.iter().any(|r| r.is_active_at(now))
    }

    pub fn issue(&mut self, description: Option<String>) -> Result<IssuedKey, ApiKeyError> {
        self.issue_at(description, Utc::now())
    }

    pub fn issue_at(
        &mut self,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<IssuedKey, ApiKeyError> {
        let key = generate_key();
        let record = ApiKeyRecord {
            id: uuid::Uuid::new_v4().to_string(),
            key_hash: hash_key(&key),
            description,
            created_at: now,
            expires_at: now + Duration::days(i64::from(self.expires_in_days)),
            revoked: false,
        };
        self.records.push(record.clone());
        self.persist()?;
        info!(id = %record.id, expires_at = %record.expires_at, "Issued API key");
        Ok(IssuedKey { key, record })
    }

    pub fn revoke(&mut self, id: &str) -> Result<(), ApiKeyError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ApiKeyError::NotFound(id.to_string()))?;
        record.revoked = true;
        self.persist()?;
        info!(id = %id, "Revoked API key");
        Ok(())
    }

    /// Look up `key` and check it against the clock.
    pub fn validate_at(&self, key: &str, now: DateTime<Utc>) -> Result<&ApiKeyRecord, ApiKeyError> {
        let hash = hash_key(key);
        let record = self
            .records
            .iter()
            .find(|r| r.key_hash == hash)
            .ok_or(ApiKeyError::Unknown)?;

        if record.revoked {
            return Err(ApiKeyError::Revoked {
                id: record.id.clone(),
            });
        }
        if now >= record.expires_at {
            return Err(ApiKeyError::Expired {
                id: record.id.clone(),
                expired_at: record.expires_at,
            });
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn issued_key_has_appsync_shape() {
        let mut store = ApiKeyStore::in_memory(30);
        let issued = store.issue_at(None, t0()).unwrap();
        assert!(issued.key.starts_with("da2-"));
        assert_eq!(issued.key.len(), 4 + 26);
        assert!(issued.key[4..].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(issued.record.key_hash, issued.key);
    }

    #[test]
    fn key_expires_after_configured_days() {
        let mut store = ApiKeyStore::in_memory(30);
        let issued = store.issue_at(Some("web client".into()), t0()).unwrap();

        assert!(store.validate_at(&issued.key, t0()).is_ok());
        assert!(store.validate_at(&issued.key, t0() + Duration::days(29)).is_ok());
        assert!(matches!(
            store.validate_at(&issued.key, t0() + Duration::days(30)),
            Err(ApiKeyError::Expired { .. })
        ));
        assert!(matches!(
            store.validate_at(&issued.key, t0() + Duration::days(31)),
            Err(ApiKeyError::Expired { .. })
        ));
    }

    #[test]
    fn unknown_and_revoked_keys_are_rejected() {
        let mut store = ApiKeyStore::in_memory(30);
        let issued = store.issue_at(None, t0()).unwrap();

        assert!(matches!(
            store.validate_at("da2-notarealkey", t0()),
            Err(ApiKeyError::Unknown)
        ));

        store.revoke(&issued.record.id).unwrap();
        assert!(matches!(
            store.validate_at(&issued.key, t0()),
            Err(ApiKeyError::Revoked { .. })
        ));
        assert!(!store.has_active_at(t0()));
        assert!(matches!(store.revoke("missing"), Err(ApiKeyError::NotFound(_))));
    }

    #[test]
    fn keys_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let issued = {
            let mut store = ApiKeyStore::open(tmp.path(), 30).unwrap();
            store.issue_at(Some("ci".into()), t0()).unwrap()
        };

        let store = ApiKeyStore::open(tmp.path(), 30).unwrap();
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.list()[0].description.as_deref(), Some("ci"));
        assert!(store.validate_at(&issued.key, t0() + Duration::days(1)).is_ok());

        let raw = std::fs::read_to_string(tmp.path().join(STORE_FILE)).unwrap();
        assert!(!raw.contains(&issued.key), "plaintext key must not be persisted");
    }

    #[test]
    fn reload_picks_up_keys_from_other_writers() {
        let tmp = tempfile::tempdir().unwrap();
        let mut server_view = ApiKeyStore::open(tmp.path(), 30).unwrap();

        let issued = ApiKeyStore::open(tmp.path(), 30)
            .unwrap()
            .issue_at(None, t0())
            .unwrap();

        assert!(server_view.validate_at(&issued.key, t0()).is_err());
        assert!(server_view.is_stale().unwrap());
        assert!(server_view.refresh().unwrap());
        assert!(server_view.validate_at(&issued.key, t0()).is_ok());
    }

    #[test]
    fn refresh_is_a_no_op_until_the_file_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ApiKeyStore::open(tmp.path(), 30).unwrap();
        assert!(!store.is_stale().unwrap());

        // Own writes keep the stamp current.
        let issued = store.issue_at(None, t0()).unwrap();
        assert!(!store.is_stale().unwrap());
        assert!(!store.refresh().unwrap());

        ApiKeyStore::open(tmp.path(), 30)
            .unwrap()
            .revoke(&issued.record.id)
            .unwrap();
        assert!(store.refresh().unwrap());
        assert!(matches!(
            store.validate_at(&issued.key, t0()),
            Err(ApiKeyError::Revoked { .. })
        ));
        assert!(!store.refresh().unwrap());
    }

    #[test]
    fn in_memory_store_is_never_stale() {
        let mut store = ApiKeyStore::in_memory(30);
        store.issue_at(None, t0()).unwrap();
        assert!(!store.is_stale().unwrap());
    }
}
