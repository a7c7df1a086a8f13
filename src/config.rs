//! Transfer configuration.
//!
//! A [`TransferConfig`] value is built once (defaults, then an optional TOML
//! file, then `DATAPORT_*` environment variables) and passed explicitly to
//! every cache and transfer entry point.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::DataportError;
use crate::job::JobKind;

/// Upper bound on the unpacked size of an exported archive (2 GiB).
pub const DEFAULT_EXPORT_SIZE_LIMIT: u64 = 2 * 1024 * 1024 * 1024;
/// Attempts made per entity content fetch.
pub const DEFAULT_ENTITY_RETRY_TIMES: u32 = 3;
/// Region assumed for user-owned buckets when the remote does not report one.
pub const DEFAULT_REGION: &str = "bj";

const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_EVALUATION_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings shared by the cache manager and the transfer pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferConfig {
    /// Root of the local dataset cache tree.
    pub cache_root: PathBuf,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Bearer token for the dataset service.
    pub access_token: Option<String>,
    /// Base URL of the dataset service.
    pub endpoint: Option<String>,
    /// Base URL of the object store. `{region}` is substituted.
    pub object_store_endpoint: Option<String>,
    pub default_region: String,
    pub export_poll_interval: Duration,
    pub import_poll_interval: Duration,
    pub release_poll_interval: Duration,
    pub etl_poll_interval: Duration,
    pub evaluation_poll_interval: Duration,
    /// Overall limit on a single job wait. `None` waits indefinitely.
    pub poll_timeout: Option<Duration>,
    pub export_size_limit: u64,
    pub entity_retry_times: u32,
    pub request_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            access_key: None,
            secret_key: None,
            access_token: None,
            endpoint: None,
            object_store_endpoint: None,
            default_region: DEFAULT_REGION.to_string(),
            export_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            import_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            release_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            etl_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            evaluation_poll_interval: DEFAULT_EVALUATION_POLL_INTERVAL,
            poll_timeout: None,
            export_size_limit: DEFAULT_EXPORT_SIZE_LIMIT,
            entity_retry_times: DEFAULT_ENTITY_RETRY_TIMES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// On-disk shape of the config file. Durations are in seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    cache_dir: Option<PathBuf>,
    access_key: Option<String>,
    secret_key: Option<String>,
    access_token: Option<String>,
    endpoint: Option<String>,
    object_store_endpoint: Option<String>,
    default_region: Option<String>,
    export_poll_interval_secs: Option<f64>,
    import_poll_interval_secs: Option<f64>,
    release_poll_interval_secs: Option<f64>,
    etl_poll_interval_secs: Option<f64>,
    evaluation_poll_interval_secs: Option<f64>,
    poll_timeout_secs: Option<f64>,
    export_size_limit: Option<u64>,
    entity_retry_times: Option<u32>,
    request_timeout_secs: Option<f64>,
}

impl TransferConfig {
    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, DataportError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| DataportError::Config {
            message: format!("invalid config: {e}"),
        })?;
        Self::default().merge(file)
    }

    /// Load a TOML config file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, DataportError> {
        let content = std::fs::read_to_string(path).map_err(|e| DataportError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `DATAPORT_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, DataportError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `DATAPORT_*` overrides from an arbitrary lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, DataportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("DATAPORT_CACHE_DIR") {
            self.cache_root = PathBuf::from(value);
        }
        if let Some(value) = get("DATAPORT_ACCESS_KEY") {
            self.access_key = Some(value);
        }
        if let Some(value) = get("DATAPORT_SECRET_KEY") {
            self.secret_key = Some(value);
        }
        if let Some(value) = get("DATAPORT_TOKEN") {
            self.access_token = Some(value);
        }
        if let Some(value) = get("DATAPORT_ENDPOINT") {
            self.endpoint = Some(value);
        }
        if let Some(value) = get("DATAPORT_OBJECT_STORE_ENDPOINT") {
            self.object_store_endpoint = Some(value);
        }
        if let Some(value) = get("DATAPORT_EXPORT_FILE_SIZE_LIMIT") {
            self.export_size_limit = parse_env("DATAPORT_EXPORT_FILE_SIZE_LIMIT", &value)?;
        }
        if let Some(value) = get("DATAPORT_ENTITY_RETRY_TIMES") {
            self.entity_retry_times = parse_env("DATAPORT_ENTITY_RETRY_TIMES", &value)?;
        }
        if let Some(value) = get("DATAPORT_POLL_TIMEOUT") {
            let secs: f64 = parse_env("DATAPORT_POLL_TIMEOUT", &value)?;
            self.poll_timeout = Some(seconds("DATAPORT_POLL_TIMEOUT", secs)?);
        }

        self.validate()?;
        Ok(self)
    }

    /// Polling interval for a job kind.
    pub fn poll_interval(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Export => self.export_poll_interval,
            JobKind::Import => self.import_poll_interval,
            JobKind::Release => self.release_poll_interval,
            JobKind::Etl => self.etl_poll_interval,
            JobKind::Evaluation => self.evaluation_poll_interval,
        }
    }

    fn merge(mut self, file: ConfigFile) -> Result<Self, DataportError> {
        if let Some(dir) = file.cache_dir {
            self.cache_root = dir;
        }
        self.access_key = file.access_key.or(self.access_key);
        self.secret_key = file.secret_key.or(self.secret_key);
        self.access_token = file.access_token.or(self.access_token);
        self.endpoint = file.endpoint.or(self.endpoint);
        self.object_store_endpoint = file.object_store_endpoint.or(self.object_store_endpoint);
        if let Some(region) = file.default_region {
            self.default_region = region;
        }

        let intervals = [
            (
                "export_poll_interval_secs",
                file.export_poll_interval_secs,
                &mut self.export_poll_interval,
            ),
            (
                "import_poll_interval_secs",
                file.import_poll_interval_secs,
                &mut self.import_poll_interval,
            ),
            (
                "release_poll_interval_secs",
                file.release_poll_interval_secs,
                &mut self.release_poll_interval,
            ),
            ("etl_poll_interval_secs", file.etl_poll_interval_secs, &mut self.etl_poll_interval),
            (
                "evaluation_poll_interval_secs",
                file.evaluation_poll_interval_secs,
                &mut self.evaluation_poll_interval,
            ),
            ("request_timeout_secs", file.request_timeout_secs, &mut self.request_timeout),
        ];
        for (name, value, slot) in intervals {
            if let Some(secs) = value {
                *slot = seconds(name, secs)?;
            }
        }

        if let Some(secs) = file.poll_timeout_secs {
            self.poll_timeout = Some(seconds("poll_timeout_secs", secs)?);
        }
        if let Some(limit) = file.export_size_limit {
            self.export_size_limit = limit;
        }
        if let Some(retries) = file.entity_retry_times {
            self.entity_retry_times = retries;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), DataportError> {
        if self.entity_retry_times == 0 {
            return Err(DataportError::Config {
                message: "entity_retry_times must be at least 1".to_string(),
            });
        }
        if self.export_size_limit == 0 {
            return Err(DataportError::Config {
                message: "export_size_limit must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

fn default_cache_root() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".dataport").join("cache"),
        _ => PathBuf::from(".dataport").join("cache"),
    }
}

fn seconds(name: &str, secs: f64) -> Result<Duration, DataportError> {
    Duration::try_from_secs_f64(secs).map_err(|_| DataportError::Config {
        message: format!("{name} must be a non-negative number of seconds, got {secs}"),
    })
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, DataportError> {
    value.trim().parse().map_err(|_| DataportError::Config {
        message: format!("{name} has invalid value '{value}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = TransferConfig::default();
        assert_eq!(config.export_size_limit, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.entity_retry_times, 3);
        assert_eq!(config.export_poll_interval, Duration::from_secs(2));
        assert_eq!(config.evaluation_poll_interval, Duration::from_secs(30));
        assert_eq!(config.poll_timeout, None);
        assert_eq!(config.default_region, "bj");
    }

    #[test]
    fn toml_values_override_defaults() {
        let config = TransferConfig::from_toml_str(
            r#"
cache_dir = "/tmp/dp-cache"
access_key = "ak"
export_poll_interval_secs = 0.5
poll_timeout_secs = 600
export_size_limit = 1024
entity_retry_times = 5
"#,
        )
        .expect("parse config");

        assert_eq!(config.cache_root, PathBuf::from("/tmp/dp-cache"));
        assert_eq!(config.access_key.as_deref(), Some("ak"));
        assert_eq!(config.export_poll_interval, Duration::from_millis(500));
        assert_eq!(config.import_poll_interval, Duration::from_secs(2));
        assert_eq!(config.poll_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.export_size_limit, 1024);
        assert_eq!(config.entity_retry_times, 5);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TransferConfig::from_toml_str("colour = \"blue\"").expect_err("should fail");
        assert!(matches!(err, DataportError::Config { .. }));
    }

    #[test]
    fn negative_interval_is_rejected() {
        let err = TransferConfig::from_toml_str("etl_poll_interval_secs = -1.0")
            .expect_err("should fail");
        assert!(matches!(err, DataportError::Config { .. }));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let env = HashMap::from([
            ("DATAPORT_ACCESS_KEY", "env-ak"),
            ("DATAPORT_SECRET_KEY", "env-sk"),
            ("DATAPORT_ENTITY_RETRY_TIMES", "7"),
            ("DATAPORT_POLL_TIMEOUT", "30"),
            ("DATAPORT_ENDPOINT", "  "),
        ]);
        let config = TransferConfig::default()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .expect("apply env");

        assert_eq!(config.access_key.as_deref(), Some("env-ak"));
        assert_eq!(config.secret_key.as_deref(), Some("env-sk"));
        assert_eq!(config.entity_retry_times, 7);
        assert_eq!(config.poll_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.endpoint, None);

        let err = TransferConfig::default()
            .with_overrides_from(|key| {
                (key == "DATAPORT_ENTITY_RETRY_TIMES").then(|| "0".to_string())
            })
            .expect_err("zero retries");
        assert!(matches!(err, DataportError::Config { .. }));
    }
}
