#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use dataport::config::TransferConfig;
use dataport::dataset::{Credentials, StorageKind, UploadTarget};
use dataport::error::DataportError;
use dataport::format::LogicalFormat;
use dataport::job::JobStatus;
use dataport::remote::{
    CreateDatasetRequest, DatasetService, DatasetVersionInfo, EntityRecord, EtlRequest,
    EtlTaskInfo, EvaluationTaskInfo, ExportTaskInfo, ImportSource, TaskInfo,
};
use dataport::store::{ObjectStore, TextResponse};
use serde_json::Map;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const ARCHIVE_URL: &str = "https://store.test/exports/bin.zip";

/// Config with zero poll intervals, keys set and the cache under `root`.
pub fn test_config(root: &Path) -> TransferConfig {
    TransferConfig {
        cache_root: root.to_path_buf(),
        access_key: Some("test-ak".to_string()),
        secret_key: Some("test-sk".to_string()),
        export_poll_interval: Duration::ZERO,
        import_poll_interval: Duration::ZERO,
        release_poll_interval: Duration::ZERO,
        etl_poll_interval: Duration::ZERO,
        evaluation_poll_interval: Duration::ZERO,
        ..TransferConfig::default()
    }
}

pub fn version_info(
    group_id: &str,
    version_id: &str,
    version: u32,
    format: LogicalFormat,
    modify_time: &str,
) -> DatasetVersionInfo {
    DatasetVersionInfo {
        group_id: group_id.to_string(),
        version_id: version_id.to_string(),
        dataset_name: format!("{group_id}-name"),
        version,
        data_format: format,
        storage_type: StorageKind::Managed,
        storage_path: None,
        storage_region: None,
        modify_time: modify_time.to_string(),
        entity_count: 1,
        release_status: None,
        extra: Map::new(),
    }
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(bytes).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

fn next_status(queue: &mut VecDeque<JobStatus>) -> JobStatus {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or(JobStatus::Finished)
    } else {
        queue.front().copied().unwrap_or(JobStatus::Finished)
    }
}

/// In-memory dataset service. Job status queues repeat their last entry;
/// an empty queue reports Finished.
#[derive(Default)]
pub struct FakeService {
    state: Mutex<ServiceState>,
}

#[derive(Default)]
pub struct ServiceState {
    pub versions: HashMap<String, DatasetVersionInfo>,
    pub export_task_id: String,
    pub export_statuses: VecDeque<JobStatus>,
    pub export_download_url: Option<String>,
    pub export_finish_time: Option<String>,
    pub import_statuses: VecDeque<JobStatus>,
    pub release_statuses: VecDeque<JobStatus>,
    pub etl_statuses: VecDeque<JobStatus>,
    pub evaluation_statuses: VecDeque<JobStatus>,
    pub entities: Vec<EntityRecord>,
    pub calls: Vec<String>,
    pub imports: Vec<(String, ImportSource, bool)>,
    pub etl_requests: Vec<EtlRequest>,
    pub list_requests: Vec<(String, u64, u64)>,
    pub created: Vec<CreateDatasetRequest>,
}

impl FakeService {
    pub fn new() -> Self {
        let service = Self::default();
        {
            let mut state = service.state();
            state.export_task_id = "job-1".to_string();
            state.export_download_url = Some(ARCHIVE_URL.to_string());
            state.export_finish_time = Some("2024-01-01T00:00:00Z".to_string());
        }
        service
    }

    pub fn with_version(self, info: DatasetVersionInfo) -> Self {
        self.state().versions.insert(info.version_id.clone(), info);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().expect("service state")
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state().calls.iter().filter(|call| *call == name).count()
    }

    pub fn set_modify_time(&self, version_id: &str, modify_time: &str) {
        if let Some(info) = self.state().versions.get_mut(version_id) {
            info.modify_time = modify_time.to_string();
        }
    }

    fn record(&self, name: &str) -> MutexGuard<'_, ServiceState> {
        let mut state = self.state();
        state.calls.push(name.to_string());
        state
    }
}

fn not_found(operation: &str, id: &str) -> DataportError {
    DataportError::RemoteRequest {
        operation: operation.to_string(),
        message: format!("{id} not found"),
    }
}

impl DatasetService for FakeService {
    fn create_dataset(
        &self,
        request: &CreateDatasetRequest,
    ) -> Result<DatasetVersionInfo, DataportError> {
        let mut state = self.record("create_dataset");
        let n = state.created.len() + 1;
        state.created.push(request.clone());

        let mut info = version_info(
            &format!("grp-{n}"),
            &format!("ver-{n}"),
            1,
            request.data_format,
            "2024-01-01T00:00:00Z",
        );
        info.dataset_name = request.name.clone();
        info.storage_type = request.storage_type;
        info.entity_count = 0;
        if let (Some(bucket), Some(path)) = (&request.storage_bucket, &request.storage_path) {
            info.storage_path = Some(format!("bos://{bucket}{path}"));
            info.storage_region = request.storage_region.clone();
        }
        state.versions.insert(info.version_id.clone(), info.clone());
        Ok(info)
    }

    fn get_dataset_version_info(
        &self,
        version_id: &str,
    ) -> Result<DatasetVersionInfo, DataportError> {
        let state = self.record("get_dataset_version_info");
        state
            .versions
            .get(version_id)
            .cloned()
            .ok_or_else(|| not_found("get_dataset_version_info", version_id))
    }

    fn create_dataset_version(
        &self,
        group_id: &str,
    ) -> Result<DatasetVersionInfo, DataportError> {
        let mut state = self.record("create_dataset_version");
        let template = state
            .versions
            .values()
            .filter(|info| info.group_id == group_id)
            .max_by_key(|info| info.version)
            .cloned()
            .ok_or_else(|| not_found("create_dataset_version", group_id))?;

        let mut info = template;
        info.version += 1;
        info.version_id = format!("{group_id}-v{}", info.version);
        info.entity_count = 0;
        info.release_status = None;
        state.versions.insert(info.version_id.clone(), info.clone());
        Ok(info)
    }

    fn create_export_task(&self, _version_id: &str) -> Result<String, DataportError> {
        let state = self.record("create_export_task");
        Ok(state.export_task_id.clone())
    }

    fn get_export_task(&self, task_id: &str) -> Result<ExportTaskInfo, DataportError> {
        let mut state = self.record("get_export_task");
        let status = next_status(&mut state.export_statuses);
        let finished = status == JobStatus::Finished;
        Ok(ExportTaskInfo {
            task_id: task_id.to_string(),
            status,
            download_url: state.export_download_url.clone().filter(|_| finished),
            finish_time: state.export_finish_time.clone().filter(|_| finished),
            extra: Map::new(),
        })
    }

    fn create_import_task(
        &self,
        version_id: &str,
        source: &ImportSource,
        is_annotated: bool,
    ) -> Result<String, DataportError> {
        let mut state = self.record("create_import_task");
        state
            .imports
            .push((version_id.to_string(), source.clone(), is_annotated));
        Ok(format!("import-{}", state.imports.len()))
    }

    fn get_import_task(&self, task_id: &str) -> Result<TaskInfo, DataportError> {
        let mut state = self.record("get_import_task");
        Ok(TaskInfo {
            task_id: task_id.to_string(),
            status: next_status(&mut state.import_statuses),
            extra: Map::new(),
        })
    }

    fn create_etl_task(&self, request: &EtlRequest) -> Result<String, DataportError> {
        let mut state = self.record("create_etl_task");
        state.etl_requests.push(request.clone());
        Ok(format!("etl-{}", state.etl_requests.len()))
    }

    fn get_etl_task(&self, task_id: &str) -> Result<EtlTaskInfo, DataportError> {
        let mut state = self.record("get_etl_task");
        let status = next_status(&mut state.etl_statuses);
        let dest = state
            .etl_requests
            .last()
            .map(|request| request.dest_version_id.clone())
            .filter(|_| status == JobStatus::Finished);
        Ok(EtlTaskInfo {
            task_id: task_id.to_string(),
            status,
            dest_version_id: dest,
        })
    }

    fn release_dataset(&self, version_id: &str) -> Result<(), DataportError> {
        let state = self.record("release_dataset");
        if state.versions.contains_key(version_id) {
            Ok(())
        } else {
            Err(not_found("release_dataset", version_id))
        }
    }

    fn get_release_status(&self, version_id: &str) -> Result<JobStatus, DataportError> {
        let mut state = self.record("get_release_status");
        let status = next_status(&mut state.release_statuses);
        if status == JobStatus::Finished {
            if let Some(info) = state.versions.get_mut(version_id) {
                info.release_status = Some(JobStatus::Finished);
            }
        }
        Ok(status)
    }

    fn list_entities(
        &self,
        version_id: &str,
        offset: u64,
        page_size: u64,
    ) -> Result<Vec<EntityRecord>, DataportError> {
        let mut state = self.record("list_entities");
        state
            .list_requests
            .push((version_id.to_string(), offset, page_size));
        Ok(state
            .entities
            .iter()
            .skip(offset as usize)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    fn create_evaluation_task(
        &self,
        version_id: &str,
        _model_set_id: &str,
        _model_id: &str,
    ) -> Result<String, DataportError> {
        let _state = self.record("create_evaluation_task");
        Ok(format!("eval-{version_id}"))
    }

    fn get_evaluation_task(&self, task_id: &str) -> Result<EvaluationTaskInfo, DataportError> {
        let mut state = self.record("get_evaluation_task");
        let status = next_status(&mut state.evaluation_statuses);
        Ok(EvaluationTaskInfo {
            task_id: task_id.to_string(),
            status,
            result_version_id: Some("eval-result".to_string())
                .filter(|_| status == JobStatus::Finished),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRecord {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub access_key: String,
    pub bytes: Vec<u8>,
}

/// In-memory object store.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
pub struct StoreState {
    /// Download bodies by URL.
    pub objects: HashMap<String, Vec<u8>>,
    /// Queued GET responses by URL; an exhausted queue answers 404.
    pub text_responses: HashMap<String, VecDeque<TextResponse>>,
    pub uploads: Vec<UploadRecord>,
    pub downloads: Vec<String>,
    pub fetches: Vec<String>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, url: &str, bytes: Vec<u8>) -> Self {
        self.state().objects.insert(url.to_string(), bytes);
        self
    }

    pub fn queue_text(&self, url: &str, status: u16, body: &str) {
        self.state()
            .text_responses
            .entry(url.to_string())
            .or_default()
            .push_back(TextResponse {
                status,
                body: body.to_string(),
            });
    }

    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store state")
    }

    pub fn download_count(&self) -> usize {
        self.state().downloads.len()
    }
}

impl ObjectStore for FakeStore {
    fn upload(
        &self,
        local_path: &Path,
        target: &UploadTarget,
        key: &str,
        credentials: &Credentials,
    ) -> Result<(), DataportError> {
        let bytes = std::fs::read(local_path)?;
        self.state().uploads.push(UploadRecord {
            bucket: target.bucket.clone(),
            key: key.to_string(),
            region: target.region.clone(),
            access_key: credentials.access_key.clone(),
            bytes,
        });
        Ok(())
    }

    fn download(&self, url: &str, local_path: &Path) -> Result<u64, DataportError> {
        let mut state = self.state();
        state.downloads.push(url.to_string());
        let bytes = state
            .objects
            .get(url)
            .cloned()
            .ok_or_else(|| DataportError::Download {
                url: url.to_string(),
                path: local_path.to_path_buf(),
                message: "HTTP 404".to_string(),
            })?;
        std::fs::write(local_path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    fn shared_url(
        &self,
        target: &UploadTarget,
        key: &str,
        _credentials: &Credentials,
    ) -> Result<String, DataportError> {
        Ok(format!("https://share.test/{}/{key}", target.bucket))
    }

    fn fetch_text(&self, url: &str) -> Result<TextResponse, DataportError> {
        let mut state = self.state();
        state.fetches.push(url.to_string());
        Ok(state
            .text_responses
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(TextResponse {
                status: 404,
                body: String::new(),
            }))
    }
}
