//! Object storage boundary: raw byte transfer, no business logic.

#[cfg(feature = "http")]
pub mod http;

use std::path::Path;

use crate::dataset::{Credentials, UploadTarget};
use crate::error::DataportError;

/// Status and body of a plain GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextResponse {
    pub status: u16,
    pub body: String,
}

impl TextResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transfers files to and from object storage.
pub trait ObjectStore: Send + Sync {
    /// Upload `local_path` to `key` under `target.bucket`.
    fn upload(
        &self,
        local_path: &Path,
        target: &UploadTarget,
        key: &str,
        credentials: &Credentials,
    ) -> Result<(), DataportError>;

    /// Stream `url` into `local_path`, returning the number of bytes written.
    fn download(&self, url: &str, local_path: &Path) -> Result<u64, DataportError>;

    /// URL through which the service can read an uploaded object.
    fn shared_url(
        &self,
        target: &UploadTarget,
        key: &str,
        credentials: &Credentials,
    ) -> Result<String, DataportError>;

    /// GET `url` as text. Non-2xx statuses are returned, not raised.
    fn fetch_text(&self, url: &str) -> Result<TextResponse, DataportError>;
}
