use std::path::PathBuf;
use thiserror::Error;

use crate::job::{JobKind, JobStatus};

/// The main error type for dataport operations.
#[derive(Debug, Error)]
pub enum DataportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Archive {path} unpacks to {total_size} bytes, which reaches the limit of {limit} bytes")]
    SizeOverflow {
        path: PathBuf,
        total_size: u64,
        limit: u64,
    },

    #[error("{kind} job {job_id} terminated with status {status}")]
    JobFailed {
        kind: JobKind,
        job_id: String,
        status: JobStatus,
    },

    #[error("{kind} job {job_id} did not finish within {elapsed_secs:.1}s (last status: {status})")]
    JobTimedOut {
        kind: JobKind,
        job_id: String,
        status: JobStatus,
        elapsed_secs: f64,
    },

    #[error("{kind} job {job_id} was cancelled")]
    Cancelled { kind: JobKind, job_id: String },

    #[error("Failed to fetch content of entity {entity_id} from {url} after {attempts} attempt(s) (last status: {status})")]
    EntityFetch {
        entity_id: String,
        url: String,
        attempts: u32,
        status: u16,
    },

    #[error("Failed to read cache manifest {path}: {source}")]
    CacheRead {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("Failed to write cache manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("Remote request '{operation}' failed: {message}")]
    RemoteRequest { operation: String, message: String },

    #[error("Failed to download {url} to {path}: {message}")]
    Download {
        url: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to upload {path} to {bucket}/{key}: {message}")]
    Upload {
        path: PathBuf,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to parse {path}: {message}")]
    TableParse { path: PathBuf, message: String },

    #[error("Failed to parse JSON from {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse line {line} of {path}: {source}")]
    JsonlParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write JSON to {path}: {source}")]
    JsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed while traversing directory {path}: {source}")]
    DirectoryWalk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to write {path}: {message}")]
    TableWrite { path: PathBuf, message: String },

    #[error("Failed to write output: {source}")]
    OutputWrite {
        #[source]
        source: serde_json::Error,
    },

    #[error("Dataset version {dataset_id} has no data")]
    EmptyDataset { dataset_id: String },

    #[error("Invalid timestamp '{value}'")]
    InvalidTimestamp { value: String },
}

/// Why a cache manifest could not be read or written.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("manifest has no finishTime")]
    MissingFinishTime,

    #[error("manifest finishTime '{0}' is not a valid timestamp")]
    InvalidFinishTime(String),
}
