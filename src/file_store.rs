use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

use crate::store::{Storage, StorageError};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed [`Storage`], one JSON file per key.
///
/// Scoped to an origin by directory: two micro-apps sharing a base
/// directory never see each other's records.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted directly at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage for `origin` under `base` (`<base>/<scheme>_<host>_<port>`).
    #[must_use]
    pub fn for_origin(base: impl AsRef<Path>, origin: &Url) -> Self {
        Self::new(base.as_ref().join(origin_dir_name(origin)))
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(key)))
    }
}

impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            // Non-UTF-8 contents are surfaced as a value that will fail to parse,
            // so the session store heals it like any other corrupt record.
            Err(error) if error.kind() == ErrorKind::InvalidData => Ok(Some(String::new())),
            Err(error) => Err(StorageError(format!(
                "failed to read {}: {error}",
                path.display()
            ))),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| {
                StorageError(format!(
                    "failed to prepare storage directory {}: {error}",
                    self.dir.display()
                ))
            })?;

        let path = self.path(key);
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));

        tokio::fs::write(&temp_path, value)
            .await
            .map_err(|error| StorageError(format!("failed to write record: {error}")))?;

        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|error| StorageError(format!("failed to finalize record: {error}")))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StorageError(format!(
                "failed to remove {}: {error}",
                path.display()
            ))),
        }
    }
}

fn origin_dir_name(origin: &Url) -> String {
    let host = origin.host_str().unwrap_or("local");
    let port = origin.port_or_known_default().unwrap_or(0);
    sanitize(&format!("{}_{host}_{port}", origin.scheme()))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
