//! JSON-over-HTTP client for the dataset service.
//!
//! Every call is a `POST {endpoint}/{action}` with a JSON body. Responses wrap
//! their payload as `{"result": ...}`; failures carry `errorCode`/`errorMsg`.
//! Requests are authenticated with an optional bearer token only.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    CreateDatasetRequest, DatasetService, DatasetVersionInfo, EntityRecord, EtlRequest,
    EtlTaskInfo, EvaluationTaskInfo, ExportTaskInfo, ImportSource, TaskInfo,
};
use crate::config::TransferConfig;
use crate::error::DataportError;
use crate::job::JobStatus;

/// Blocking [`DatasetService`] backed by `ureq`.
pub struct HttpDatasetService {
    agent: ureq::Agent,
    endpoint: String,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIdResult {
    task_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseStatusResult {
    release_status: JobStatus,
}

#[derive(Deserialize)]
struct EntityPage {
    #[serde(default)]
    items: Vec<EntityRecord>,
}

impl HttpDatasetService {
    pub fn new(
        endpoint: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DataportError> {
        url::Url::parse(endpoint).map_err(|source| DataportError::Config {
            message: format!("invalid service endpoint '{endpoint}': {source}"),
        })?;

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        let agent: ureq::Agent = config.into();

        Ok(Self {
            agent,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build from the configured endpoint and token.
    pub fn from_config(config: &TransferConfig) -> Result<Self, DataportError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| DataportError::Config {
                message: "no dataset service endpoint configured (set DATAPORT_ENDPOINT)"
                    .to_string(),
            })?;
        Self::new(endpoint, config.access_token.clone(), config.request_timeout)
    }

    fn call<B, R>(&self, action: &str, body: &B) -> Result<R, DataportError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let result = self.call_raw(action, body)?;
        serde_json::from_value(result).map_err(|source| DataportError::RemoteRequest {
            operation: action.to_string(),
            message: format!("unexpected response shape: {source}"),
        })
    }

    fn call_raw<B: Serialize>(&self, action: &str, body: &B) -> Result<Value, DataportError> {
        let url = format!("{}/{}", self.endpoint, action);
        debug!(action, %url, "calling dataset service");

        let mut request = self.agent.post(&url);
        if let Some(token) = self.token.as_deref() {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }

        let mut response = request
            .send_json(body)
            .map_err(|source| request_error(action, source.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|source| request_error(action, source.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(request_error(action, format!("HTTP {status}: {text}")));
        }

        let envelope: Value = serde_json::from_str(&text)
            .map_err(|source| request_error(action, format!("invalid JSON response: {source}")))?;

        if let Some(message) = envelope.get("errorMsg").and_then(Value::as_str) {
            let code = envelope
                .get("errorCode")
                .map(Value::to_string)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(request_error(action, format!("error {code}: {message}")));
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

fn request_error(action: &str, message: String) -> DataportError {
    DataportError::RemoteRequest {
        operation: action.to_string(),
        message,
    }
}

impl DatasetService for HttpDatasetService {
    fn create_dataset(
        &self,
        request: &CreateDatasetRequest,
    ) -> Result<DatasetVersionInfo, DataportError> {
        self.call("createDataset", request)
    }

    fn get_dataset_version_info(
        &self,
        version_id: &str,
    ) -> Result<DatasetVersionInfo, DataportError> {
        self.call("describeDatasetVersion", &json!({ "versionId": version_id }))
    }

    fn create_dataset_version(
        &self,
        group_id: &str,
    ) -> Result<DatasetVersionInfo, DataportError> {
        self.call("createDatasetVersion", &json!({ "groupId": group_id }))
    }

    fn create_export_task(&self, version_id: &str) -> Result<String, DataportError> {
        let result: TaskIdResult =
            self.call("createExportTask", &json!({ "versionId": version_id }))?;
        Ok(result.task_id)
    }

    fn get_export_task(&self, task_id: &str) -> Result<ExportTaskInfo, DataportError> {
        self.call("describeExportTask", &json!({ "taskId": task_id }))
    }

    fn create_import_task(
        &self,
        version_id: &str,
        source: &ImportSource,
        is_annotated: bool,
    ) -> Result<String, DataportError> {
        let mut body = serde_json::to_value(source).map_err(|source| {
            request_error("createImportTask", format!("invalid import source: {source}"))
        })?;
        body["versionId"] = Value::from(version_id);
        body["annotated"] = Value::from(is_annotated);

        let result: TaskIdResult = self.call("createImportTask", &body)?;
        Ok(result.task_id)
    }

    fn get_import_task(&self, task_id: &str) -> Result<TaskInfo, DataportError> {
        self.call("describeImportTask", &json!({ "taskId": task_id }))
    }

    fn create_etl_task(&self, request: &EtlRequest) -> Result<String, DataportError> {
        let result: TaskIdResult = self.call("createEtlTask", request)?;
        Ok(result.task_id)
    }

    fn get_etl_task(&self, task_id: &str) -> Result<EtlTaskInfo, DataportError> {
        self.call("describeEtlTask", &json!({ "taskId": task_id }))
    }

    fn release_dataset(&self, version_id: &str) -> Result<(), DataportError> {
        self.call_raw("releaseDataset", &json!({ "versionId": version_id }))?;
        Ok(())
    }

    fn get_release_status(&self, version_id: &str) -> Result<JobStatus, DataportError> {
        let result: ReleaseStatusResult =
            self.call("describeRelease", &json!({ "versionId": version_id }))?;
        Ok(result.release_status)
    }

    fn list_entities(
        &self,
        version_id: &str,
        offset: u64,
        page_size: u64,
    ) -> Result<Vec<EntityRecord>, DataportError> {
        let page: EntityPage = self.call(
            "listEntities",
            &json!({ "versionId": version_id, "offset": offset, "pageSize": page_size }),
        )?;
        Ok(page.items)
    }

    fn create_evaluation_task(
        &self,
        version_id: &str,
        model_set_id: &str,
        model_id: &str,
    ) -> Result<String, DataportError> {
        let result: TaskIdResult = self.call(
            "createEvaluationTask",
            &json!({
                "versionId": version_id,
                "modelSetId": model_set_id,
                "modelId": model_id,
            }),
        )?;
        Ok(result.task_id)
    }

    fn get_evaluation_task(&self, task_id: &str) -> Result<EvaluationTaskInfo, DataportError> {
        self.call("describeEvaluationTask", &json!({ "taskId": task_id }))
    }
}
