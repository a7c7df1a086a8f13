use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{ObjectStore, TextResponse};
use crate::config::TransferConfig;
use crate::dataset::{Credentials, UploadTarget};
use crate::error::DataportError;

/// Object store reached over plain HTTP.
///
/// Objects live at `{endpoint}/{bucket}/{key}`; a `{region}` placeholder in the
/// endpoint is replaced with the target's region. Keys are passed as headers
/// and are expected to be checked by a gateway in front of the store.
pub struct HttpObjectStore {
    agent: ureq::Agent,
    endpoint_template: String,
}

impl HttpObjectStore {
    pub fn new(endpoint_template: &str, timeout: Duration) -> Result<Self, DataportError> {
        let sample = endpoint_template.replace("{region}", "region");
        url::Url::parse(&sample).map_err(|source| DataportError::Config {
            message: format!("invalid object store endpoint '{endpoint_template}': {source}"),
        })?;

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        Ok(Self {
            agent: config.into(),
            endpoint_template: endpoint_template.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &TransferConfig) -> Result<Self, DataportError> {
        let endpoint = config
            .object_store_endpoint
            .as_deref()
            .ok_or_else(|| DataportError::Config {
                message:
                    "no object store endpoint configured (set DATAPORT_OBJECT_STORE_ENDPOINT)"
                        .to_string(),
            })?;
        Self::new(endpoint, config.request_timeout)
    }

    fn object_url(&self, target: &UploadTarget, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint_template.replace("{region}", &target.region),
            target.bucket,
            key.trim_start_matches('/')
        )
    }
}

impl ObjectStore for HttpObjectStore {
    fn upload(
        &self,
        local_path: &Path,
        target: &UploadTarget,
        key: &str,
        credentials: &Credentials,
    ) -> Result<(), DataportError> {
        let upload_error = |message: String| DataportError::Upload {
            path: local_path.to_path_buf(),
            bucket: target.bucket.clone(),
            key: key.to_string(),
            message,
        };

        let url = self.object_url(target, key);
        let mut file = File::open(local_path)?;
        info!(path = %local_path.display(), %url, "uploading");

        let response = self
            .agent
            .put(&url)
            .header("x-access-key", &credentials.access_key)
            .header("x-secret-key", &credentials.secret_key)
            .send(ureq::SendBody::from_reader(&mut file))
            .map_err(|source| upload_error(source.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(upload_error(format!("HTTP {status}")));
        }
        Ok(())
    }

    fn download(&self, url: &str, local_path: &Path) -> Result<u64, DataportError> {
        let download_error = |message: String| DataportError::Download {
            url: url.to_string(),
            path: local_path.to_path_buf(),
            message,
        };

        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|source| download_error(source.to_string()))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(download_error(format!("HTTP {status}")));
        }

        let parent = local_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut staging = NamedTempFile::new_in(parent)?;
        let written = io::copy(&mut response.body_mut().as_reader(), &mut staging)
            .map_err(|source| download_error(source.to_string()))?;
        staging.flush()?;
        staging
            .persist(local_path)
            .map_err(|source| download_error(source.error.to_string()))?;

        debug!(%url, bytes = written, "download complete");
        Ok(written)
    }

    fn shared_url(
        &self,
        target: &UploadTarget,
        key: &str,
        _credentials: &Credentials,
    ) -> Result<String, DataportError> {
        Ok(self.object_url(target, key))
    }

    fn fetch_text(&self, url: &str) -> Result<TextResponse, DataportError> {
        let mut response =
            self.agent
                .get(url)
                .call()
                .map_err(|source| DataportError::RemoteRequest {
                    operation: "fetch_text".to_string(),
                    message: format!("{url}: {source}"),
                })?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|source| DataportError::RemoteRequest {
                operation: "fetch_text".to_string(),
                message: format!("{url}: {source}"),
            })?;
        Ok(TextResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_placeholder_is_substituted() {
        let store =
            HttpObjectStore::new("https://{region}.store.test/", Duration::from_secs(1)).unwrap();
        let target = UploadTarget {
            bucket: "bkt".to_string(),
            path: "/prefix/".to_string(),
            region: "gz".to_string(),
        };
        assert_eq!(
            store.object_url(&target, "prefix/data.zip"),
            "https://gz.store.test/bkt/prefix/data.zip"
        );
    }
}
