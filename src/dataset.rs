//! Dataset references, storage locations and upload targets.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::TransferConfig;
use crate::error::DataportError;
use crate::format::{self, LogicalFormat, PhysicalFormat};

/// Where a dataset's files physically live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    /// Storage managed by the dataset service. Not writable by clients.
    Managed,
    /// A bucket owned by the user.
    UserBucket,
}

/// Bucket, key prefix and region of a user-owned storage location.
///
/// The path always ends with `/`, including for deserialized values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStorageLocation")]
pub struct StorageLocation {
    pub bucket: Option<String>,
    path: String,
    pub region: Option<String>,
}

impl StorageLocation {
    pub fn new(
        bucket: Option<String>,
        path: &str,
        region: Option<String>,
    ) -> Result<Self, DataportError> {
        Ok(Self {
            bucket: bucket.filter(|b| !b.trim().is_empty()),
            path: normalize_storage_path(path)?,
            region: region.filter(|r| !r.trim().is_empty()),
        })
    }

    /// Parse `scheme://bucket/prefix/` or `/bucket/prefix/` as reported by the service.
    pub fn from_uri(uri: &str, region: Option<String>) -> Result<Self, DataportError> {
        let without_scheme = uri
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(uri)
            .trim_start_matches('/');

        let (bucket, prefix) = without_scheme
            .split_once('/')
            .unwrap_or((without_scheme, ""));
        if bucket.is_empty() {
            return Err(DataportError::Config {
                message: format!("storage location '{uri}' has no bucket"),
            });
        }

        Self::new(Some(bucket.to_string()), &format!("/{prefix}"), region)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Deserialize)]
struct RawStorageLocation {
    bucket: Option<String>,
    path: String,
    region: Option<String>,
}

impl TryFrom<RawStorageLocation> for StorageLocation {
    type Error = DataportError;

    fn try_from(raw: RawStorageLocation) -> Result<Self, Self::Error> {
        Self::new(raw.bucket, &raw.path, raw.region)
    }
}

fn normalize_storage_path(path: &str) -> Result<String, DataportError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(DataportError::Config {
            message: "storage path is required for user-owned storage".to_string(),
        });
    }
    if trimmed.ends_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/"))
    }
}

/// Key of a dataset version's cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub group_id: String,
    pub dataset_id: String,
    pub version: u32,
}

impl CacheKey {
    /// `<group-id>/<dataset-id>/<version>`, relative to the cache root.
    ///
    /// # Errors
    /// Ids come from the remote service; any id that is not a single plain
    /// path component is a [`DataportError::Config`] error.
    pub fn relative_dir(&self) -> Result<PathBuf, DataportError> {
        let group = path_component("group id", &self.group_id)?;
        let dataset = path_component("dataset id", &self.dataset_id)?;
        Ok(PathBuf::from(group)
            .join(dataset)
            .join(self.version.to_string()))
    }
}

fn path_component<'a>(what: &str, id: &'a str) -> Result<&'a str, DataportError> {
    let unsafe_reason = if id.is_empty() {
        Some("is empty")
    } else if id == "." || id == ".." {
        Some("is a relative directory name")
    } else if id.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if Path::new(id).is_absolute() || Path::new(id).has_root() {
        Some("is an absolute path")
    } else {
        None
    };

    match unsafe_reason {
        Some(reason) => Err(DataportError::Config {
            message: format!("{what} '{id}' {reason} and cannot name a cache directory"),
        }),
        None => Ok(id),
    }
}

/// A specific version of a remote dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetRef {
    /// Dataset group the version belongs to.
    pub group_id: String,
    /// Version id, used for every remote call.
    pub dataset_id: String,
    pub name: String,
    pub version: u32,
    pub format: LogicalFormat,
    storage: StorageKind,
    location: Option<StorageLocation>,
}

impl DatasetRef {
    /// A dataset kept in service-managed storage.
    pub fn managed(
        group_id: impl Into<String>,
        dataset_id: impl Into<String>,
        version: u32,
        format: LogicalFormat,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            dataset_id: dataset_id.into(),
            name: String::new(),
            version,
            format,
            storage: StorageKind::Managed,
            location: None,
        }
    }

    /// A dataset kept in a user-owned bucket.
    pub fn user_bucket(
        group_id: impl Into<String>,
        dataset_id: impl Into<String>,
        version: u32,
        format: LogicalFormat,
        location: StorageLocation,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            dataset_id: dataset_id.into(),
            name: String::new(),
            version,
            format,
            storage: StorageKind::UserBucket,
            location: Some(location),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    pub fn location(&self) -> Option<&StorageLocation> {
        self.location.as_ref()
    }

    /// Fill in the storage location once the service has reported it.
    pub fn set_location(&mut self, location: StorageLocation) -> Result<(), DataportError> {
        if self.storage == StorageKind::Managed {
            return Err(DataportError::UnsupportedOperation(format!(
                "dataset {} uses managed storage and has no user location",
                self.dataset_id
            )));
        }
        self.location = Some(location);
        Ok(())
    }

    pub fn physical_format(&self) -> PhysicalFormat {
        format::resolve(self.format)
    }

    /// Always fails: the physical format follows from the logical format.
    pub fn set_physical_format(&self, requested: PhysicalFormat) -> Result<(), DataportError> {
        format::set_physical_format(self.format, requested)
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            group_id: self.group_id.clone(),
            dataset_id: self.dataset_id.clone(),
            version: self.version,
        }
    }
}

/// Caller-supplied bucket, path and region that take precedence over the
/// dataset's own storage attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageOverride {
    pub bucket: String,
    pub path: String,
    pub region: String,
}

impl StorageOverride {
    fn is_complete(&self) -> bool {
        [&self.bucket, &self.path, &self.region]
            .iter()
            .all(|value| !value.trim().is_empty())
    }
}

/// Resolved destination of an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    /// Key prefix, always ending with `/`.
    pub path: String,
    pub region: String,
}

impl UploadTarget {
    /// Resolve from complete overrides, else from the dataset's own storage.
    pub fn resolve(
        dataset: &DatasetRef,
        overrides: Option<&StorageOverride>,
        default_region: &str,
    ) -> Result<Self, DataportError> {
        if let Some(overrides) = overrides.filter(|o| o.is_complete()) {
            return Ok(Self {
                bucket: overrides.bucket.trim().trim_matches('/').to_string(),
                path: normalize_storage_path(&overrides.path)?,
                region: overrides.region.trim().to_string(),
            });
        }

        match dataset.storage {
            StorageKind::Managed => Err(DataportError::Config {
                message: format!(
                    "dataset {} uses managed storage; uploading requires explicit bucket, path and region",
                    dataset.dataset_id
                ),
            }),
            StorageKind::UserBucket => {
                let location = dataset.location.as_ref().ok_or_else(|| DataportError::Config {
                    message: format!("dataset {} has no storage location", dataset.dataset_id),
                })?;
                let bucket = location.bucket.clone().ok_or_else(|| DataportError::Config {
                    message: format!("dataset {} has no storage bucket", dataset.dataset_id),
                })?;
                Ok(Self {
                    bucket,
                    path: location.path.clone(),
                    region: location
                        .region
                        .clone()
                        .unwrap_or_else(|| default_region.to_string()),
                })
            }
        }
    }

    /// Object key for `file_name` under this target's prefix.
    pub fn object_key(&self, file_name: &str) -> String {
        format!("{}{}", self.path.trim_start_matches('/'), file_name)
    }
}

/// Access key pair for object storage.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Explicit keys win over configured ones; both must end up present.
    pub fn resolve(
        explicit: Option<&Credentials>,
        config: &TransferConfig,
    ) -> Result<Self, DataportError> {
        let pick = |explicit: Option<&str>, configured: Option<&str>| {
            explicit
                .filter(|value| !value.is_empty())
                .or(configured.filter(|value| !value.is_empty()))
                .map(str::to_string)
        };

        let access_key = pick(
            explicit.map(|c| c.access_key.as_str()),
            config.access_key.as_deref(),
        )
        .ok_or_else(|| DataportError::Config {
            message: "no access key was provided".to_string(),
        })?;
        let secret_key = pick(
            explicit.map(|c| c.secret_key.as_str()),
            config.secret_key.as_deref(),
        )
        .ok_or_else(|| DataportError::Config {
            message: "no secret key was provided".to_string(),
        })?;

        Ok(Self {
            access_key,
            secret_key,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
