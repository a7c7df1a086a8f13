//! Dataset lifecycle and the remote jobs tied to a dataset version.

use rand::RngExt;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::config::TransferConfig;
use crate::dataset::{DatasetRef, StorageKind, StorageLocation};
use crate::error::DataportError;
use crate::format::LogicalFormat;
use crate::job::{self, JobKind, JobState, JobStatus, PollOptions};
use crate::remote::{
    CreateDatasetRequest, DatasetService, DatasetVersionInfo, EtlRequest, ImportSource,
};
use crate::store::ObjectStore;
use crate::table::Table;
use crate::transfer;

const ETL_NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ETL_NAME_SUFFIX_LEN: usize = 12;

/// Build a reference from the service's description of a version.
///
/// User-owned storage takes its bucket and prefix from `storagePath`, and its
/// region from `storageRegion`, falling back to `default_region`.
pub fn dataset_from_info(
    info: &DatasetVersionInfo,
    default_region: &str,
) -> Result<DatasetRef, DataportError> {
    let dataset = match info.storage_type {
        StorageKind::Managed => DatasetRef::managed(
            &info.group_id,
            &info.version_id,
            info.version,
            info.data_format,
        ),
        StorageKind::UserBucket => {
            let uri = info
                .storage_path
                .as_deref()
                .ok_or_else(|| DataportError::Config {
                    message: format!(
                        "version {} uses user-owned storage but reports no storage path",
                        info.version_id
                    ),
                })?;
            let region = info
                .storage_region
                .clone()
                .unwrap_or_else(|| default_region.to_string());
            DatasetRef::user_bucket(
                &info.group_id,
                &info.version_id,
                info.version,
                info.data_format,
                StorageLocation::from_uri(uri, Some(region))?,
            )
        }
    };

    Ok(dataset.with_name(&info.dataset_name))
}

/// Create an empty dataset.
///
/// # Errors
/// User-owned storage needs a `location`; managed storage must not get one.
pub fn create_bare_dataset(
    name: &str,
    format: LogicalFormat,
    storage: StorageKind,
    location: Option<&StorageLocation>,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<DatasetRef, DataportError> {
    let request = match (storage, location) {
        (StorageKind::Managed, None) => CreateDatasetRequest::new(name, format),
        (StorageKind::UserBucket, Some(location)) => {
            CreateDatasetRequest::new(name, format).with_location(location)
        }
        (StorageKind::UserBucket, None) => {
            return Err(DataportError::Config {
                message: format!("dataset '{name}' uses user-owned storage but has no path"),
            })
        }
        (StorageKind::Managed, Some(_)) => {
            return Err(DataportError::Config {
                message: format!("dataset '{name}' uses managed storage and takes no location"),
            })
        }
    };

    let info = service.create_dataset(&request)?;
    info!(name, version_id = %info.version_id, "dataset created");
    dataset_from_info(&info, &config.default_region)
}

/// Create a dataset in the user's bucket and import `file_name`, an object
/// already stored under the location's prefix.
pub fn create_from_object_file(
    name: &str,
    format: LogicalFormat,
    location: &StorageLocation,
    file_name: &str,
    is_annotated: bool,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<DatasetRef, DataportError> {
    let bucket = location
        .bucket
        .as_deref()
        .ok_or_else(|| DataportError::Config {
            message: format!("dataset '{name}' has no storage bucket"),
        })?;
    let dataset = create_bare_dataset(
        name,
        format,
        StorageKind::UserBucket,
        Some(location),
        service,
        config,
    )?;

    let prefix = format!("/{}", location.path().trim_start_matches('/'));
    let source = ImportSource::ObjectPath(format!(
        "/{bucket}{prefix}{}",
        file_name.trim_start_matches('/')
    ));
    let task_id = service.create_import_task(&dataset.dataset_id, &source, is_annotated)?;
    transfer::await_import(&task_id, service, config)?;

    Ok(dataset)
}

pub fn get_existing_dataset(
    version_id: &str,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<DatasetRef, DataportError> {
    let info = service.get_dataset_version_info(version_id)?;
    dataset_from_info(&info, &config.default_region)
}

/// Create the next version in `dataset`'s group. Format and storage follow
/// whatever the service assigns to the new version.
pub fn create_new_version(
    dataset: &DatasetRef,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<DatasetRef, DataportError> {
    let info = service.create_dataset_version(&dataset.group_id)?;
    info!(group = %dataset.group_id, version = info.version, "dataset version created");
    dataset_from_info(&info, &config.default_region)
}

/// Load `dataset` through the cache.
///
/// # Errors
/// Returns [`DataportError::EmptyDataset`] before any export when the remote
/// version holds no entities.
pub fn fetch(
    dataset: &DatasetRef,
    cache: &CacheManager,
    service: &dyn DatasetService,
    store: &dyn ObjectStore,
    config: &TransferConfig,
) -> Result<Table, DataportError> {
    let info = service.get_dataset_version_info(&dataset.dataset_id)?;
    if info.entity_count == 0 {
        return Err(DataportError::EmptyDataset {
            dataset_id: dataset.dataset_id.clone(),
        });
    }
    cache.get_or_refresh(dataset, service, store, config)
}

/// Release `dataset`, waiting for the release to finish. Already released
/// versions return at once.
pub fn release_dataset(
    dataset: &DatasetRef,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<(), DataportError> {
    let info = service.get_dataset_version_info(&dataset.dataset_id)?;
    if info.release_status == Some(JobStatus::Finished) {
        info!(dataset = %dataset.dataset_id, "already released");
        return Ok(());
    }

    service.release_dataset(&dataset.dataset_id)?;
    job::await_completion(
        JobKind::Release,
        &dataset.dataset_id,
        |id| service.get_release_status(id).map(JobState::<()>::new),
        &PollOptions::from_config(config, JobKind::Release),
    )?;
    Ok(())
}

/// Run an ETL task from `source` into a freshly created version.
///
/// Returns the destination version as reported by the finished task.
pub fn run_etl(
    source: &DatasetRef,
    operations: Value,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<DatasetRef, DataportError> {
    let destination = create_new_version(source, service, config)?;
    let request = EtlRequest {
        name: etl_task_name(),
        source_version_id: source.dataset_id.clone(),
        dest_version_id: destination.dataset_id.clone(),
        operations,
    };

    let task_id = service.create_etl_task(&request)?;
    info!(task = %request.name, task_id = %task_id, "etl task created");

    let finished = job::await_completion(
        JobKind::Etl,
        &task_id,
        |id| {
            service
                .get_etl_task(id)
                .map(|info| JobState::with_payload(info.status, info))
        },
        &PollOptions::from_config(config, JobKind::Etl),
    )?;

    match finished.and_then(|info| info.dest_version_id) {
        Some(version_id) if version_id != destination.dataset_id => {
            warn!(
                expected = %destination.dataset_id,
                reported = %version_id,
                "etl task wrote to a different version"
            );
            get_existing_dataset(&version_id, service, config)
        }
        _ => Ok(destination),
    }
}

/// Evaluate `dataset` against a model and return the result version id.
pub fn run_evaluation(
    dataset: &DatasetRef,
    model_set_id: &str,
    model_id: &str,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<String, DataportError> {
    let task_id = service.create_evaluation_task(&dataset.dataset_id, model_set_id, model_id)?;
    info!(dataset = %dataset.dataset_id, task_id = %task_id, "evaluation task created");

    let finished = job::await_completion(
        JobKind::Evaluation,
        &task_id,
        |id| {
            service
                .get_evaluation_task(id)
                .map(|info| JobState::with_payload(info.status, info))
        },
        &PollOptions::from_config(config, JobKind::Evaluation),
    )?;

    finished
        .and_then(|info| info.result_version_id)
        .ok_or_else(|| DataportError::RemoteRequest {
            operation: "get_evaluation_task".to_string(),
            message: format!("evaluation task {task_id} finished without a result dataset"),
        })
}

fn etl_task_name() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ETL_NAME_SUFFIX_LEN)
        .map(|_| char::from(ETL_NAME_ALPHABET[rng.random_range(0..ETL_NAME_ALPHABET.len())]))
        .collect();
    format!("etl_task_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn info(storage_type: StorageKind, storage_path: Option<&str>) -> DatasetVersionInfo {
        DatasetVersionInfo {
            group_id: "g1".into(),
            version_id: "d1".into(),
            dataset_name: "demo".into(),
            version: 2,
            data_format: LogicalFormat::Text,
            storage_type,
            storage_path: storage_path.map(str::to_string),
            storage_region: None,
            modify_time: "2024-01-01T00:00:00Z".into(),
            entity_count: 1,
            release_status: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn user_storage_fills_location_and_default_region() {
        let dataset =
            dataset_from_info(&info(StorageKind::UserBucket, Some("bos://bkt/sets/a")), "bj")
                .unwrap();
        let location = dataset.location().expect("location");
        assert_eq!(location.bucket.as_deref(), Some("bkt"));
        assert_eq!(location.path(), "/sets/a/");
        assert_eq!(location.region.as_deref(), Some("bj"));
        assert_eq!(dataset.name, "demo");
    }

    #[test]
    fn user_storage_without_path_is_config_error() {
        let err = dataset_from_info(&info(StorageKind::UserBucket, None), "bj")
            .expect_err("should fail");
        assert!(matches!(err, DataportError::Config { .. }));
    }

    #[test]
    fn etl_names_are_prefixed_and_random() {
        let first = etl_task_name();
        let second = etl_task_name();
        assert!(first.starts_with("etl_task_"));
        assert_eq!(first.len(), "etl_task_".len() + ETL_NAME_SUFFIX_LEN);
        assert_ne!(first, second);
    }
}
