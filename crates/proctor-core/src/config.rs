use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

pub const ENV_CLOUD_API_KEY: &str = "PROCTOR_CLOUD_API_KEY";
pub const ENV_CLOUD_API_SECRET: &str = "PROCTOR_CLOUD_API_SECRET";
pub const ENV_HTTP_BEARER_TOKEN: &str = "PROCTOR_HTTP_BEARER_TOKEN";
pub const ENV_LOG: &str = "PROCTOR_LOG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProctorConfig {
    #[serde(default, rename = "configVersion", alias = "version")]
    pub version: u32,

    /// Backend selector. Kept as text so that a bad value is reported by the
    /// worker without touching the queue, instead of failing the load.
    #[serde(default)]
    pub match_method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_api_secret: Option<String>,
    #[serde(default = "default_region")]
    pub cloud_region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_endpoint_url: Option<String>,
    #[serde(default = "default_threshold")]
    pub cloud_similarity_threshold: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_endpoint_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_bearer_token: Option<String>,

    #[serde(default = "default_sampling_limit")]
    pub sampling_limit: i64,
    #[serde(default)]
    pub sampling_order: SamplingOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image_template: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_parallel")]
    pub worker_parallel: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: i64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_threshold() -> i64 {
    80
}
fn default_sampling_limit() -> i64 {
    5
}
fn default_batch_size() -> usize {
    5
}
fn default_parallel() -> usize {
    1
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_lease_seconds() -> i64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            match_method: String::new(),
            cloud_api_key: None,
            cloud_api_secret: None,
            cloud_region: default_region(),
            cloud_endpoint_url: None,
            cloud_similarity_threshold: default_threshold(),
            http_endpoint_url: None,
            http_bearer_token: None,
            sampling_limit: default_sampling_limit(),
            sampling_order: SamplingOrder::default(),
            sampling_seed: None,
            reference_image_template: None,
            batch_size: default_batch_size(),
            worker_parallel: default_parallel(),
            timeout_seconds: default_timeout_seconds(),
            lease_seconds: default_lease_seconds(),
            log_level: default_log_level(),
        }
    }
}

/// Which match backend the worker talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    Cloud,
    Http,
}

impl MatchMethod {
    /// Accepts the plugin's historical names (`AWS`, `BS`) as aliases.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cloud" | "aws" => Ok(MatchMethod::Cloud),
            "http" | "bs" => Ok(MatchMethod::Http),
            "" => Err(ConfigError("match_method is not set".into())),
            other => Err(ConfigError(format!(
                "unknown match_method '{}' (expected: cloud, http)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Cloud => "cloud",
            MatchMethod::Http => "http",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingOrder {
    #[default]
    Random,
    Recent,
}

/// How many reports per (course, activity, student) get a face match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPolicy {
    All,
    Random(usize),
    MostRecent(usize),
}

impl ProctorConfig {
    pub fn match_method(&self) -> Result<MatchMethod, ConfigError> {
        MatchMethod::parse(&self.match_method)
    }

    /// `-1` and `0` both mean "every report"; a positive limit samples.
    pub fn sampling_policy(&self) -> SamplingPolicy {
        if self.sampling_limit <= 0 {
            return SamplingPolicy::All;
        }
        let n = self.sampling_limit as usize;
        match self.sampling_order {
            SamplingOrder::Random => SamplingPolicy::Random(n),
            SamplingOrder::Recent => SamplingPolicy::MostRecent(n),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.cloud_similarity_threshold.clamp(0, 100) as u8
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 0 && self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: 0, {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if !(0..=100).contains(&self.cloud_similarity_threshold) {
            return Err(ConfigError(format!(
                "cloud_similarity_threshold must be within 0..=100, got {}",
                self.cloud_similarity_threshold
            )));
        }
        if self.sampling_limit < -1 {
            return Err(ConfigError(format!(
                "sampling_limit must be -1, 0 or positive, got {}",
                self.sampling_limit
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError("batch_size must be at least 1".into()));
        }
        if self.worker_parallel == 0 {
            return Err(ConfigError("worker_parallel must be at least 1".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError("timeout_seconds must be at least 1".into()));
        }
        if self.lease_seconds <= 0 {
            return Err(ConfigError("lease_seconds must be at least 1".into()));
        }
        // Leases are renewed per task, so one task's fetch and compare must fit.
        if self.lease_seconds <= self.timeout_seconds as i64 {
            return Err(ConfigError(format!(
                "lease_seconds ({}) must exceed timeout_seconds ({})",
                self.lease_seconds, self.timeout_seconds
            )));
        }
        if let Some(t) = &self.reference_image_template {
            if !t.contains("{userid}") {
                return Err(ConfigError(format!(
                    "reference_image_template must contain '{{userid}}': {}",
                    t
                )));
            }
        }
        Ok(())
    }

    /// Secrets are usually injected by the scheduler's environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|k| std::env::var(k).ok());
    }

    fn apply_overrides_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get(ENV_CLOUD_API_KEY) {
            self.cloud_api_key = Some(v);
        }
        if let Some(v) = get(ENV_CLOUD_API_SECRET) {
            self.cloud_api_secret = Some(v);
        }
        if let Some(v) = get(ENV_HTTP_BEARER_TOKEN) {
            self.http_bearer_token = Some(v);
        }
        if let Some(v) = get(ENV_LOG) {
            self.log_level = v;
        }
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<ProctorConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let mut cfg = parse_config(&raw, strict)
        .map_err(|e| ConfigError(format!("{} (file: {})", e, path.display())))?;
    cfg.apply_env_overrides();
    Ok(cfg)
}

/// Parses and validates YAML without consulting the environment.
pub fn parse_config(raw: &str, strict: bool) -> Result<ProctorConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let cfg: ProctorConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let meaningful_unknowns: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();

    if !meaningful_unknowns.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "Unknown fields detected in strict mode: {:?}",
                meaningful_unknowns
            )));
        }
        tracing::warn!(
            event = "proctor.config.unknown_fields",
            fields = ?meaningful_unknowns,
            "ignored unknown config fields"
        );
    }

    cfg.validate()?;
    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"configVersion: 1
# cloud (AWS Rekognition CompareFaces) or http (multipart compare service)
match_method: cloud
cloud_region: us-east-1
cloud_similarity_threshold: 80
# credentials may also come from PROCTOR_CLOUD_API_KEY / PROCTOR_CLOUD_API_SECRET
cloud_api_key: ""
cloud_api_secret: ""
# http_endpoint_url: https://facematch.example.org/compare
# http_bearer_token comes from PROCTOR_HTTP_BEARER_TOKEN
reference_image_template: "https://lms.example.org/user/pix.php/{userid}/f1.jpg"
# -1 or 0: every snapshot; N > 0: N snapshots per student and quiz
sampling_limit: 5
sampling_order: random
batch_size: 5
worker_parallel: 1
timeout_seconds: 30
lease_seconds: 300
log_level: info
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}
