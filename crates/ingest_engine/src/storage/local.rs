use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;

use super::{validate_key, ObjectStore};
use crate::StorageError;

/// Stores objects as files under `root`, one directory level per key segment.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path that `key` maps to.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }

    async fn write_atomic<F>(&self, key: &str, fill: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut NamedTempFile) -> io::Result<()> + Send + 'static,
    {
        let target = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        tokio::task::spawn_blocking(move || persist_atomically(&target, fill))
            .await
            .map_err(|err| io_err(io::Error::other(err.to_string())))?
            .map_err(io_err)
    }
}

/// Writes through a sibling temp file, then renames it over `target`.
fn persist_atomically<F>(target: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let dir = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "key has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    fill(&mut tmp)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        self.write_atomic(key, move |tmp| tmp.write_all(&body)).await
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let source = path.to_path_buf();
        self.write_atomic(key, move |tmp| {
            let mut input = fs::File::open(&source)?;
            io::copy(&mut input, tmp.as_file_mut())?;
            Ok(())
        })
        .await
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
