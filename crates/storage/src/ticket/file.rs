//! File-system implementation of [`TicketStore`].
//!
//! Each ticket is kept as a pretty-printed JSON [`TicketRecord`] in a single
//! directory, one file per key:
//!
//! ```text
//! TA-<taxId>-<service>.json             (homologation)
//! TA-<taxId>-<service>-production.json  (production)
//! ```
//!
//! Writes go through a temporary file in the same directory followed by a
//! rename, so a reader never observes a half-written ticket. Every save
//! writes its own temporary file, so concurrent saves of one key resolve to
//! the last rename.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;

use crate::{
    error::{StorageError, StorageResult},
    ticket::{TicketRecord, TicketStore},
    types::TicketKey,
};

/// Distinguishes temporary files of saves running in the same process.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// [`TicketStore`] backed by JSON files in a directory.
///
/// The directory is created on the first save if it does not exist.
///
/// # Examples
///
/// ```no_run
/// use arca_sdk_storage::{
///     Environment, FileTicketStore, TaxId, TicketKey, TicketRecord, TicketStore,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FileTicketStore::new("/var/lib/arca/tickets");
/// let key = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Production);
///
/// assert_eq!(
///     store.path_for(&key)?.file_name().and_then(|n| n.to_str()),
///     Some("TA-20111111112-wsfe-production.json"),
/// );
/// let cached = store.get(&key).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileTicketStore {
    dir: PathBuf,
}

impl FileTicketStore {
    /// Creates a store that keeps its files in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory holding the ticket files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file name used for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the service name is empty or
    /// could escape the store directory.
    pub fn file_name(key: &TicketKey) -> StorageResult<String> {
        validate_service_name(&key.service)?;
        let suffix = if key.environment.is_production() { "-production" } else { "" };
        Ok(format!("TA-{}-{}{suffix}.json", key.tax_id, key.service))
    }

    /// Returns the full path of the file used for `key`.
    ///
    /// # Errors
    ///
    /// See [`file_name`](Self::file_name).
    pub fn path_for(&self, key: &TicketKey) -> StorageResult<PathBuf> {
        Ok(self.dir.join(Self::file_name(key)?))
    }
}

fn validate_service_name(service: &str) -> StorageResult<()> {
    if service.is_empty()
        || service.contains(['/', '\\'])
        || service.starts_with('.')
        || service.chars().any(char::is_control)
    {
        return Err(StorageError::internal(format!("invalid service name: {service:?}")));
    }
    Ok(())
}

#[async_trait]
impl TicketStore for FileTicketStore {
    #[tracing::instrument(skip(self, key), fields(key = %key))]
    async fn get(&self, key: &TicketKey) -> StorageResult<Option<TicketRecord>> {
        let path = self.path_for(key)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no ticket file");
                return Ok(None);
            },
            Err(err) => {
                return Err(StorageError::io_with_source(
                    format!("failed to read {}", path.display()),
                    err,
                ));
            },
        };

        let record = serde_json::from_slice(&bytes).map_err(|err| {
            StorageError::serialization_with_source(
                format!("invalid ticket file {}", path.display()),
                err,
            )
        })?;
        Ok(Some(record))
    }

    #[tracing::instrument(skip(self, key, record), fields(key = %key))]
    async fn save(&self, key: &TicketKey, record: &TicketRecord) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(record).map_err(|err| {
            StorageError::serialization_with_source("failed to encode ticket", err)
        })?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            StorageError::io_with_source(
                format!("failed to create {}", self.dir.display()),
                err,
            )
        })?;

        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            Self::file_name(key)?,
            std::process::id(),
            TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &bytes).await.map_err(|err| {
            StorageError::io_with_source(format!("failed to write {}", tmp.display()), err)
        })?;

        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _cleanup = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::io_with_source(
                format!("failed to replace {}", path.display()),
                err,
            ));
        }

        tracing::debug!(path = %path.display(), "ticket file written");
        Ok(())
    }

    #[tracing::instrument(skip(self, key), fields(key = %key))]
    async fn delete(&self, key: &TicketKey) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io_with_source(
                format!("failed to remove {}", path.display()),
                err,
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::types::{Environment, TaxId};

    #[rstest]
    #[case::homologation(Environment::Homologation, "TA-20111111112-wsfe.json")]
    #[case::production(Environment::Production, "TA-20111111112-wsfe-production.json")]
    fn test_file_name_convention(#[case] environment: Environment, #[case] expected: &str) {
        let key = TicketKey::new("wsfe", TaxId::from(20111111112), environment);
        assert_eq!(FileTicketStore::file_name(&key).unwrap(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::slash("../wsfe")]
    #[case::backslash("a\\b")]
    #[case::hidden(".wsfe")]
    fn test_file_name_rejects_unsafe_services(#[case] service: &str) {
        let key = TicketKey::new(service, TaxId::from(1), Environment::Homologation);
        assert!(matches!(FileTicketStore::file_name(&key), Err(StorageError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTicketStore::new(dir.path());
        let key = TicketKey::new("wsfe", TaxId::from(1), Environment::Homologation);

        std::fs::write(store.path_for(&key).unwrap(), b"{ not json").unwrap();

        let result = store.get(&key).await;
        assert!(matches!(result, Err(StorageError::Serialization { .. })), "got {result:?}");
    }

    #[tokio::test]
    async fn test_unreadable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTicketStore::new(dir.path());
        let key = TicketKey::new("wsfe", TaxId::from(1), Environment::Homologation);

        // A directory where the ticket file should be cannot be read as a file.
        std::fs::create_dir(store.path_for(&key).unwrap()).unwrap();

        let result = store.get(&key).await;
        assert!(matches!(result, Err(StorageError::Io { .. })), "got {result:?}");
    }

    #[tokio::test]
    async fn test_save_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTicketStore::new(dir.path().join("nested").join("tickets"));
        let key = TicketKey::new("wsfe", TaxId::from(1), Environment::Production);

        store.save(&key, &TicketRecord::default()).await.unwrap();

        assert!(store.path_for(&key).unwrap().is_file());
        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temporary files must not be left behind");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_of_one_key_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileTicketStore::new(dir.path()));
        let key = TicketKey::new("wsfe", TaxId::from(1), Environment::Homologation);

        for _round in 0..10 {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = std::sync::Arc::clone(&store);
                    let key = key.clone();
                    tokio::spawn(async move {
                        let record = TicketRecord {
                            credentials: crate::ticket::Credentials {
                                token: Some(format!("token-{i}")),
                                sign: None,
                            },
                            ..TicketRecord::default()
                        };
                        store.save(&key, &record).await
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        }

        let stored = store.get(&key).await.unwrap().unwrap();
        assert!(stored.credentials.token.unwrap().starts_with("token-"));
        let leftovers = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
