//! Moving dataset content between the remote service and local disk.
//!
//! The download path exports a version, streams the archive into the cache
//! entry and unpacks it. The upload path packages local content in the
//! dataset's physical format, puts it in object storage and imports it.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::archive;
use crate::cache::{self, CachePaths};
use crate::config::TransferConfig;
use crate::dataset::{Credentials, DatasetRef, StorageOverride, UploadTarget};
use crate::error::DataportError;
use crate::format::PhysicalFormat;
use crate::job::{self, JobKind, JobState, PollOptions};
use crate::remote::{DatasetService, ExportTaskInfo, ImportSource, TaskInfo};
use crate::store::ObjectStore;
use crate::table::{has_extension, Table};
use crate::tasks;

/// Export `dataset` and install the result as the cache entry at `paths`.
///
/// The archive is streamed to `paths.archive`, size-checked, then extracted to
/// `paths.content`. The manifest is written last; until then any previous
/// manifest is removed so a half-refreshed entry is never reported as present.
pub fn export_and_download(
    dataset: &DatasetRef,
    paths: &CachePaths,
    service: &dyn DatasetService,
    store: &dyn ObjectStore,
    config: &TransferConfig,
) -> Result<ExportTaskInfo, DataportError> {
    let task_id = service.create_export_task(&dataset.dataset_id)?;
    info!(dataset = %dataset.dataset_id, task_id = %task_id, "export task created");

    let options = PollOptions::from_config(config, JobKind::Export);
    let mut manifest = job::await_completion(
        JobKind::Export,
        &task_id,
        |id| service.get_export_task(id).map(JobState::<ExportTaskInfo>::from),
        &options,
    )?
    .ok_or_else(|| DataportError::RemoteRequest {
        operation: "get_export_task".to_string(),
        message: format!("export task {task_id} finished without a result"),
    })?;

    let url = manifest
        .download_url
        .clone()
        .ok_or_else(|| DataportError::RemoteRequest {
            operation: "get_export_task".to_string(),
            message: format!("export task {task_id} finished without a download URL"),
        })?;

    std::fs::create_dir_all(&paths.dir)?;
    if paths.manifest.exists() {
        std::fs::remove_file(&paths.manifest)?;
    }

    let bytes = store.download(&url, &paths.archive)?;
    info!(archive = %paths.archive.display(), bytes, "archive downloaded");

    archive::check_and_extract(&paths.archive, &paths.content, config.export_size_limit)?;

    if manifest.finish_time.is_none() {
        warn!(task_id = %task_id, "export result has no finishTime, recording local time");
        manifest.finish_time = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    cache::write_manifest(&paths.manifest, &manifest)?;

    Ok(manifest)
}

/// Content to upload.
#[derive(Clone, Copy, Debug)]
pub enum SaveSource<'a> {
    /// In-memory rows, written out in the dataset's physical format. A table
    /// loaded from a file already in that format is uploaded from that file.
    Table(&'a Table),
    /// A file or folder already laid out in the dataset's physical format.
    Path(&'a Path),
}

#[derive(Clone, Debug, Default)]
pub struct SaveOptions {
    /// Whether the uploaded rows carry annotations.
    pub is_annotated: bool,
    /// Release the version once the import finished.
    pub release_after: bool,
    pub storage_override: Option<StorageOverride>,
    pub credentials: Option<Credentials>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    pub target: UploadTarget,
    pub object_key: String,
    pub import_task_id: String,
    pub released: bool,
}

/// Package `source`, upload it and import it into `dataset`.
pub fn save(
    dataset: &DatasetRef,
    source: SaveSource<'_>,
    options: &SaveOptions,
    service: &dyn DatasetService,
    store: &dyn ObjectStore,
    config: &TransferConfig,
) -> Result<SaveOutcome, DataportError> {
    let format = dataset.physical_format();
    let target = UploadTarget::resolve(
        dataset,
        options.storage_override.as_ref(),
        &config.default_region,
    )?;
    let credentials = Credentials::resolve(options.credentials.as_ref(), config)?;

    let workdir = tempfile::tempdir()?;
    let stem = format!("data_{}", Uuid::new_v4());
    let materialized = materialize(source, format, workdir.path(), &stem)?;

    let (upload_path, file_name) = if !format.requires_zip() {
        if materialized.is_dir() {
            return Err(DataportError::UnsupportedOperation(format!(
                "{format} datasets are uploaded as a single file, got directory {}",
                materialized.display()
            )));
        }
        (materialized, format!("{stem}.{}", format.extension()))
    } else if materialized.is_file() && has_extension(&materialized, "zip") {
        (materialized, format!("{stem}.zip"))
    } else {
        let zipped = workdir.path().join(format!("{stem}.zip"));
        archive::zip_path(&materialized, &zipped)?;
        (zipped, format!("{stem}.zip"))
    };

    let object_key = target.object_key(&file_name);
    store.upload(&upload_path, &target, &object_key, &credentials)?;
    info!(bucket = %target.bucket, key = %object_key, "uploaded");

    let import_source = if format.requires_zip() {
        ImportSource::SharedZipUrl(store.shared_url(&target, &object_key, &credentials)?)
    } else {
        ImportSource::ObjectPath(format!("/{}/{}", target.bucket, object_key))
    };

    let import_task_id =
        service.create_import_task(&dataset.dataset_id, &import_source, options.is_annotated)?;
    info!(dataset = %dataset.dataset_id, task_id = %import_task_id, "import task created");

    await_import(&import_task_id, service, config)?;

    let released = if options.release_after {
        tasks::release_dataset(dataset, service, config)?;
        true
    } else {
        false
    };

    Ok(SaveOutcome {
        target,
        object_key,
        import_task_id,
        released,
    })
}

/// Wait for an import task to finish.
///
/// # Errors
/// An import that ends failed or interrupted is reported as a
/// [`DataportError::RemoteRequest`] for the `import` operation.
pub(crate) fn await_import(
    task_id: &str,
    service: &dyn DatasetService,
    config: &TransferConfig,
) -> Result<(), DataportError> {
    job::await_completion(
        JobKind::Import,
        task_id,
        |id| service.get_import_task(id).map(JobState::<TaskInfo>::from),
        &PollOptions::from_config(config, JobKind::Import),
    )
    .map_err(|err| match err {
        DataportError::JobFailed { job_id, status, .. } => DataportError::RemoteRequest {
            operation: "import".to_string(),
            message: format!("import task {job_id} ended with status {status}"),
        },
        other => other,
    })?;
    Ok(())
}

/// Local path holding `source` in `format`, writing it under `workdir` if needed.
fn materialize(
    source: SaveSource<'_>,
    format: PhysicalFormat,
    workdir: &Path,
    stem: &str,
) -> Result<PathBuf, DataportError> {
    match source {
        SaveSource::Path(path) => {
            if !path.exists() {
                return Err(DataportError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )));
            }
            Ok(path.to_path_buf())
        }
        SaveSource::Table(table) => {
            if let Some(existing) = table.reusable_file(format) {
                info!(path = %existing.display(), "reusing cached file for upload");
                return Ok(existing.to_path_buf());
            }
            let path = match format {
                PhysicalFormat::ImageFolder => workdir.join(stem),
                _ => workdir.join(format!("{stem}.{}", format.extension())),
            };
            table.write(&path, format)?;
            Ok(path)
        }
    }
}
