//! Boundary to the remote dataset service.
//!
//! [`DatasetService`] lists every call the cache and transfer pipeline makes;
//! the wire types mirror the service's camelCase JSON and keep unknown fields
//! in `extra` so they survive a round trip through the cache manifest.

#[cfg(feature = "http")]
pub mod http;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::{StorageKind, StorageLocation};
use crate::error::DataportError;
use crate::format::LogicalFormat;
use crate::job::{JobState, JobStatus};

/// Version metadata as reported by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetVersionInfo {
    pub group_id: String,
    pub version_id: String,
    #[serde(default)]
    pub dataset_name: String,
    pub version: u32,
    pub data_format: LogicalFormat,
    pub storage_type: StorageKind,
    /// `scheme://bucket/prefix/` for user-owned storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_region: Option<String>,
    /// Last modification of the version's content.
    pub modify_time: String,
    #[serde(default)]
    pub entity_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_status: Option<JobStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a dataset creation request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatasetRequest {
    pub name: String,
    pub data_format: LogicalFormat,
    pub storage_type: StorageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_region: Option<String>,
}

impl CreateDatasetRequest {
    pub fn new(name: impl Into<String>, data_format: LogicalFormat) -> Self {
        Self {
            name: name.into(),
            data_format,
            storage_type: StorageKind::Managed,
            storage_bucket: None,
            storage_path: None,
            storage_region: None,
        }
    }

    pub fn with_location(mut self, location: &StorageLocation) -> Self {
        self.storage_type = StorageKind::UserBucket;
        self.storage_bucket = location.bucket.clone();
        self.storage_path = Some(location.path().to_string());
        self.storage_region = location.region.clone();
        self
    }
}

/// Result of an export task. Written verbatim as the cache manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTaskInfo {
    pub task_id: String,
    pub status: JobStatus,
    /// Time-limited archive URL, present once the task finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status of an import task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: String,
    pub status: JobStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where an import reads its data from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sourceType", content = "source")]
pub enum ImportSource {
    /// `<bucket>/<key>` address in object storage.
    ObjectPath(String),
    /// Shared download URL of an uploaded zip.
    SharedZipUrl(String),
}

/// Body of an ETL task creation request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtlRequest {
    pub name: String,
    pub source_version_id: String,
    pub dest_version_id: String,
    /// Operator configuration, passed through untouched.
    pub operations: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtlTaskInfo {
    pub task_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_version_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationTaskInfo {
    pub task_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_version_id: Option<String>,
}

/// One entity as listed by the service. Content lives behind `url`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: String,
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Calls made against the remote dataset service.
pub trait DatasetService: Send + Sync {
    fn create_dataset(
        &self,
        request: &CreateDatasetRequest,
    ) -> Result<DatasetVersionInfo, DataportError>;

    fn get_dataset_version_info(
        &self,
        version_id: &str,
    ) -> Result<DatasetVersionInfo, DataportError>;

    /// Create the next version in `group_id`.
    fn create_dataset_version(&self, group_id: &str)
        -> Result<DatasetVersionInfo, DataportError>;

    /// Returns the export task id.
    fn create_export_task(&self, version_id: &str) -> Result<String, DataportError>;

    fn get_export_task(&self, task_id: &str) -> Result<ExportTaskInfo, DataportError>;

    /// Returns the import task id.
    fn create_import_task(
        &self,
        version_id: &str,
        source: &ImportSource,
        is_annotated: bool,
    ) -> Result<String, DataportError>;

    fn get_import_task(&self, task_id: &str) -> Result<TaskInfo, DataportError>;

    fn create_etl_task(&self, request: &EtlRequest) -> Result<String, DataportError>;

    fn get_etl_task(&self, task_id: &str) -> Result<EtlTaskInfo, DataportError>;

    fn release_dataset(&self, version_id: &str) -> Result<(), DataportError>;

    fn get_release_status(&self, version_id: &str) -> Result<JobStatus, DataportError>;

    fn list_entities(
        &self,
        version_id: &str,
        offset: u64,
        page_size: u64,
    ) -> Result<Vec<EntityRecord>, DataportError>;

    fn create_evaluation_task(
        &self,
        version_id: &str,
        model_set_id: &str,
        model_id: &str,
    ) -> Result<String, DataportError>;

    fn get_evaluation_task(&self, task_id: &str) -> Result<EvaluationTaskInfo, DataportError>;
}

impl From<ExportTaskInfo> for JobState<ExportTaskInfo> {
    fn from(info: ExportTaskInfo) -> Self {
        JobState::with_payload(info.status, info)
    }
}

impl From<TaskInfo> for JobState<TaskInfo> {
    fn from(info: TaskInfo) -> Self {
        JobState::with_payload(info.status, info)
    }
}
