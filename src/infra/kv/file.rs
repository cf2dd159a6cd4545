//! Persistent cache directory provided by the hosting platform.
//!
//! One JSON file per key, named by the SHA-256 of the key. Expired files read
//! as absent and are removed when encountered.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{KvBackend, StoreError};
use crate::config::PlatformCacheSettings;
use crate::infra::error::InfraError;

const FILE_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    key: String,
    /// Epoch milliseconds after which the record is gone.
    expires_at: i64,
    /// Hex-encoded payload.
    value: String,
}

impl FileRecord {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

#[derive(Clone, Debug)]
pub struct FileKvBackend {
    directory: PathBuf,
}

impl FileKvBackend {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn from_settings(settings: &PlatformCacheSettings) -> Result<Self, InfraError> {
        settings
            .directory
            .as_ref()
            .map(|directory| Self::new(directory.clone()))
            .ok_or_else(|| InfraError::configuration("platform_cache.directory is required"))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.directory
            .join(format!("{}.{FILE_EXTENSION}", hex::encode(digest)))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<FileRecord>, StoreError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record: FileRecord = serde_json::from_slice(&bytes)?;

        if record.is_expired(now_ms()) {
            debug!(key = record.key.as_str(), "Removing expired cache file");
            remove_if_present(path).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl KvBackend for FileKvBackend {
    fn name(&self) -> &'static str {
        "platform"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(record) = self.read_record(&self.path_for(key)).await? else {
            return Ok(None);
        };
        // Hash collisions are not worth handling beyond a miss.
        if record.key != key {
            return Ok(None);
        }
        let value = hex::decode(&record.value)
            .map_err(|err| StoreError::Io(std::io::Error::new(ErrorKind::InvalidData, err)))?;
        Ok(Some(value))
    }

    async fn put_raw(
        &self,
        key: &str,
        value: Vec<u8>,
        expiration_ttl: u64,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.directory).await?;

        let ttl_ms = i64::try_from(expiration_ttl.saturating_mul(1000)).unwrap_or(i64::MAX);
        let record = FileRecord {
            key: key.to_string(),
            expires_at: now_ms().saturating_add(ttl_ms),
            value: hex::encode(value),
        };
        let encoded = serde_json::to_vec(&record)?;

        let target = self.path_for(key);
        let staging = self.directory.join(format!(".{}.tmp", Uuid::new_v4()));
        let written = match fs::write(&staging, encoded).await {
            Ok(()) => fs::rename(&staging, &target).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            if let Err(cleanup) = remove_if_present(&staging).await {
                warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging file");
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        remove_if_present(&self.path_for(key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            match self.read_record(&path).await {
                Ok(Some(record)) if record.key.starts_with(prefix) => keys.push(record.key),
                Ok(_) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable cache file");
                }
            }
        }
        Ok(keys)
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn now_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}
