use crate::config::{MatchMethod, ProctorConfig};
use crate::errors::ConfigError;
use crate::model::MatchResult;
use async_trait::async_trait;
use std::sync::Arc;

pub mod cloud;
pub mod fake;
pub mod http;
pub mod sigv4;

/// What a backend hands back: the interpreted result and the raw payload
/// for the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub result: MatchResult,
    pub raw: serde_json::Value,
}

impl Comparison {
    pub fn error(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            raw: serde_json::json!({ "error": detail }),
            result: MatchResult::BackendError { detail },
        }
    }
}

/// A face comparison service. Implementations never return `Err`: transport
/// and parse failures come back as `MatchResult::BackendError`.
#[async_trait]
pub trait MatchBackend: Send + Sync {
    async fn compare(&self, reference: &[u8], target: &[u8], threshold: u8) -> Comparison;

    fn backend_name(&self) -> &'static str;

    /// Whether the worker writes the raw response to the api call log.
    fn audits_raw_response(&self) -> bool {
        false
    }
}

/// Builds the backend named by `match_method`.
pub fn build_backend(cfg: &ProctorConfig) -> Result<Arc<dyn MatchBackend>, ConfigError> {
    let timeout = std::time::Duration::from_secs(cfg.timeout_seconds);
    match cfg.match_method()? {
        MatchMethod::Cloud => {
            let key = non_empty(cfg.cloud_api_key.as_deref())
                .ok_or_else(|| ConfigError("cloud_api_key is required for match_method cloud".into()))?;
            let secret = non_empty(cfg.cloud_api_secret.as_deref()).ok_or_else(|| {
                ConfigError("cloud_api_secret is required for match_method cloud".into())
            })?;
            let api = cloud::RekognitionApi::new(
                sigv4::Credentials {
                    access_key: key.to_string(),
                    secret_key: secret.to_string(),
                },
                &cfg.cloud_region,
                cfg.cloud_endpoint_url.as_deref(),
                timeout,
            )
            .map_err(|e| ConfigError(format!("failed to build cloud client: {}", e)))?;
            Ok(Arc::new(cloud::CloudFaceCompareBackend::new(Arc::new(api))))
        }
        MatchMethod::Http => {
            let url = non_empty(cfg.http_endpoint_url.as_deref()).ok_or_else(|| {
                ConfigError("http_endpoint_url is required for match_method http".into())
            })?;
            let token = cfg.http_bearer_token.clone().unwrap_or_default();
            let backend = http::HttpCompareBackend::new(url.to_string(), token, timeout)
                .map_err(|e| ConfigError(format!("failed to build http client: {}", e)))?;
            Ok(Arc::new(backend))
        }
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
