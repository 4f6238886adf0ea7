//! The set of article links already handed out, one link per line.
//!
//! Readers and writers go through [`SeenLinksStore::begin`], which holds an
//! async mutex for the whole read-select-persist section so two concurrent
//! digests never claim the same link. Writes merge with whatever is on disk
//! and replace the file atomically.

use super::StoreError;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, instrument};

pub const FILE_NAME: &str = "seen_links.txt";

/// Flat-file store of previously selected links.
#[derive(Debug)]
pub struct SeenLinksStore {
    path: PathBuf,
    lock: Mutex<()>,
}

/// An open read-select-persist section. Holds the store lock until dropped
/// or committed.
pub struct SeenLinks<'a> {
    store: &'a SeenLinksStore,
    _guard: MutexGuard<'a, ()>,
    links: HashSet<String>,
}

impl SeenLinksStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `data_dir/seen_links.txt`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the store and load the current set.
    ///
    /// An unreadable file is logged and treated as empty; the subsequent
    /// commit still refuses to overwrite it.
    pub async fn begin(&self) -> SeenLinks<'_> {
        let guard = self.lock.lock().await;
        let links = match self.load().await {
            Ok(links) => links,
            Err(e) => {
                error!(
                    path = %self.path().display(),
                    error = %e,
                    "Could not load seen links, continuing with an empty set"
                );
                HashSet::new()
            }
        };
        SeenLinks {
            store: self,
            _guard: guard,
            links,
        }
    }

    /// Read the full set from disk. A missing file is an empty set.
    pub async fn load(&self) -> Result<HashSet<String>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(parse(&contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashSet::new()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    /// Merge `links` into the on-disk set and rewrite it atomically.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), links = links.len()))]
    async fn persist(&self, links: &HashSet<String>) -> Result<(), StoreError> {
        let mut merged = self.load().await?;
        merged.extend(links.iter().cloned());

        let mut lines: Vec<&str> = merged.iter().map(String::as_str).collect();
        lines.sort_unstable();
        let mut contents = lines.join("\n");
        contents.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp = tmp_path(&self.path);
        fs::write(&tmp, contents)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        debug!(total = merged.len(), "Persisted seen links");
        Ok(())
    }
}

impl SeenLinks<'_> {
    pub fn links(&self) -> &HashSet<String> {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut HashSet<String> {
        &mut self.links
    }

    /// Persist the set and release the lock.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.store.persist(&self.links).await
    }
}

fn parse(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
