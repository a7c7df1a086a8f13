//! Local dataset cache.
//!
//! Each dataset version owns one directory,
//! `<root>/<group-id>/<dataset-id>/<version>/`, holding:
//!
//! - `info.json`: the manifest, i.e. the export task result including its
//!   completion time
//! - `bin.zip`: the archive as downloaded
//! - `content`: the extracted archive
//!
//! An entry is present when both the manifest and the content exist, and valid
//! while the remote modification time is not later than the manifest's
//! completion time. The manifest is written last, atomically, so a present
//! entry is always a complete one.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::TransferConfig;
use crate::dataset::{CacheKey, DatasetRef};
use crate::error::{DataportError, ManifestError};
use crate::remote::{DatasetService, ExportTaskInfo};
use crate::store::ObjectStore;
use crate::table::Table;
use crate::timestamp::parse_timestamp;
use crate::transfer;

pub const MANIFEST_FILE: &str = "info.json";
pub const ARCHIVE_FILE: &str = "bin.zip";
pub const CONTENT_DIR: &str = "content";

/// Paths making up one cache entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePaths {
    pub dir: PathBuf,
    pub manifest: PathBuf,
    pub archive: PathBuf,
    pub content: PathBuf,
}

impl CachePaths {
    /// # Errors
    /// Fails when an id in `key` could place the entry outside `root`.
    pub fn new(root: &Path, key: &CacheKey) -> Result<Self, DataportError> {
        let dir = root.join(key.relative_dir()?);
        Ok(Self {
            manifest: dir.join(MANIFEST_FILE),
            archive: dir.join(ARCHIVE_FILE),
            content: dir.join(CONTENT_DIR),
            dir,
        })
    }

    pub fn is_present(&self) -> bool {
        self.manifest.is_file() && self.content.exists()
    }
}

/// What is currently cached for a key, without touching the network.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheStatus {
    pub paths: CachePaths,
    pub manifest: Option<ExportTaskInfo>,
}

/// Owner of the cache tree. One instance should serve every caller of a root.
#[derive(Debug)]
pub struct CacheManager {
    root: PathBuf,
    /// Per-key refresh locks. An entry lives only while some caller holds or
    /// waits on it.
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.cache_root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, key: &CacheKey) -> Result<CachePaths, DataportError> {
        CachePaths::new(&self.root, key)
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drop the map's entry for `key` once `lock` is its last outside handle.
    fn release_key_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Handles are only cloned under the map lock, so the count cannot grow here.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Return the dataset's content, refreshing the cache entry first when it
    /// is missing or older than the remote version.
    ///
    /// Callers asking for the same key are served one at a time.
    ///
    /// # Errors
    /// An unreadable manifest is returned as [`DataportError::CacheRead`]
    /// rather than triggering a new download.
    pub fn get_or_refresh(
        &self,
        dataset: &DatasetRef,
        service: &dyn DatasetService,
        store: &dyn ObjectStore,
        config: &TransferConfig,
    ) -> Result<Table, DataportError> {
        let key = dataset.cache_key();
        let paths = self.paths(&key)?;

        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.refresh_locked(dataset, &paths, service, store, config)
        };
        self.release_key_lock(&key, lock);
        result
    }

    fn refresh_locked(
        &self,
        dataset: &DatasetRef,
        paths: &CachePaths,
        service: &dyn DatasetService,
        store: &dyn ObjectStore,
        config: &TransferConfig,
    ) -> Result<Table, DataportError> {
        std::fs::create_dir_all(&paths.dir)?;

        if !paths.is_present() {
            info!(dir = %paths.dir.display(), "cache miss, refreshing");
            transfer::export_and_download(dataset, paths, service, store, config)?;
        } else {
            let manifest = read_manifest(&paths.manifest)?;
            let remote = service.get_dataset_version_info(&dataset.dataset_id)?;
            if is_stale(&paths.manifest, &manifest, &remote.modify_time)? {
                info!(
                    dir = %paths.dir.display(),
                    modified = %remote.modify_time,
                    "cache is stale, refreshing"
                );
                transfer::export_and_download(dataset, paths, service, store, config)?;
            } else {
                debug!(dir = %paths.dir.display(), "cache hit");
            }
        }

        Table::load(&paths.content, dataset.physical_format())
    }

    /// Report the entry for `key` as it is on disk.
    pub fn status(&self, key: &CacheKey) -> Result<CacheStatus, DataportError> {
        let paths = self.paths(key)?;
        let manifest = if paths.is_present() {
            Some(read_manifest(&paths.manifest)?)
        } else {
            None
        };
        Ok(CacheStatus { paths, manifest })
    }
}

/// Whether `remote_modify_time` is strictly later than the manifest's completion time.
pub fn is_stale(
    manifest_path: &Path,
    manifest: &ExportTaskInfo,
    remote_modify_time: &str,
) -> Result<bool, DataportError> {
    let read_error = |source: ManifestError| DataportError::CacheRead {
        path: manifest_path.to_path_buf(),
        source,
    };
    let finish_time = manifest
        .finish_time
        .as_deref()
        .ok_or_else(|| read_error(ManifestError::MissingFinishTime))?;
    let finished = parse_timestamp(finish_time)
        .map_err(|_| read_error(ManifestError::InvalidFinishTime(finish_time.to_string())))?;
    let modified = parse_timestamp(remote_modify_time)?;

    Ok(modified > finished)
}

pub fn read_manifest(path: &Path) -> Result<ExportTaskInfo, DataportError> {
    let read_error = |source: ManifestError| DataportError::CacheRead {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| read_error(e.into()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| read_error(e.into()))
}

/// Write the manifest through a temp file in the same directory and rename it
/// into place, so readers never see a partial document.
pub fn write_manifest(path: &Path, manifest: &ExportTaskInfo) -> Result<(), DataportError> {
    let write_error = |source: ManifestError| DataportError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().ok_or_else(|| {
        write_error(ManifestError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "manifest path has no parent directory",
        )))
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| write_error(e.into()))?;
    serde_json::to_writer_pretty(&mut tmp, manifest).map_err(|e| write_error(e.into()))?;
    tmp.flush().map_err(|e| write_error(e.into()))?;
    tmp.persist(path).map_err(|e| write_error(e.error.into()))?;
    Ok(())
}
