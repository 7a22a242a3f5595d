use super::sigv4::{self, Credentials, SigningRequest};
use super::{Comparison, MatchBackend};
use crate::model::{to_percentage, MatchResult};
use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use std::sync::Arc;

const SERVICE: &str = "rekognition";
const TARGET: &str = "RekognitionService.CompareFaces";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Transport for the cloud CompareFaces call. Returns the service's JSON
/// body; any HTTP, auth or decode failure is an `Err`.
#[async_trait]
pub trait CompareFacesApi: Send + Sync {
    async fn compare_faces(
        &self,
        source: &[u8],
        target: &[u8],
        similarity_threshold: u8,
    ) -> anyhow::Result<serde_json::Value>;
}

pub struct RekognitionApi {
    credentials: Credentials,
    region: String,
    endpoint: String,
    host: String,
    client: reqwest::Client,
}

impl RekognitionApi {
    pub fn new(
        credentials: Credentials,
        region: &str,
        endpoint_override: Option<&str>,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let endpoint = endpoint_override
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{}.{}.amazonaws.com", SERVICE, region));
        let host = endpoint
            .split("://")
            .nth(1)
            .unwrap_or(endpoint.as_str())
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if host.is_empty() {
            anyhow::bail!("cloud endpoint has no host: {}", endpoint);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build cloud http client")?;
        Ok(Self {
            credentials,
            region: region.to_string(),
            endpoint,
            host,
            client,
        })
    }
}

#[async_trait]
impl CompareFacesApi for RekognitionApi {
    async fn compare_faces(
        &self,
        source: &[u8],
        target: &[u8],
        similarity_threshold: u8,
    ) -> anyhow::Result<serde_json::Value> {
        let body = serde_json::to_vec(&json!({
            "SimilarityThreshold": similarity_threshold,
            "SourceImage": { "Bytes": STANDARD.encode(source) },
            "TargetImage": { "Bytes": STANDARD.encode(target) },
        }))?;

        let amz_date = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let signed = sigv4::sign(
            &self.credentials,
            &SigningRequest {
                method: "POST",
                path: "/",
                query: "",
                headers: &[
                    ("content-type", CONTENT_TYPE),
                    ("host", self.host.as_str()),
                    ("x-amz-date", amz_date.as_str()),
                    ("x-amz-target", TARGET),
                ],
                payload: &body,
                region: &self.region,
                service: SERVICE,
                amz_date: &amz_date,
            },
        )?;

        let resp = self
            .client
            .post(format!("{}/", self.endpoint))
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Date", &amz_date)
            .header("X-Amz-Target", TARGET)
            .header("Authorization", signed.authorization)
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("CompareFaces API error {}: {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        Ok(json)
    }
}

/// Graduated 0–100 similarity from the cloud face comparison service.
pub struct CloudFaceCompareBackend {
    api: Arc<dyn CompareFacesApi>,
}

impl CloudFaceCompareBackend {
    pub fn new(api: Arc<dyn CompareFacesApi>) -> Self {
        Self { api }
    }
}

/// Maps a CompareFaces body: the first `FaceMatches` entry decides.
pub fn interpret_response(body: &serde_json::Value) -> MatchResult {
    let Some(matches) = body.get("FaceMatches").and_then(|v| v.as_array()) else {
        return MatchResult::BackendError {
            detail: "response has no FaceMatches array".into(),
        };
    };
    match matches
        .first()
        .and_then(|m| m.get("Similarity"))
        .and_then(|s| s.as_f64())
    {
        Some(similarity) => MatchResult::Matched {
            similarity: to_percentage(similarity),
        },
        None => MatchResult::NotMatched,
    }
}

#[async_trait]
impl MatchBackend for CloudFaceCompareBackend {
    async fn compare(&self, reference: &[u8], target: &[u8], threshold: u8) -> Comparison {
        match self.api.compare_faces(reference, target, threshold).await {
            Ok(body) => Comparison {
                result: interpret_response(&body),
                raw: body,
            },
            Err(e) => {
                tracing::debug!(event = "proctor.cloud.call_failed", error = %e);
                Comparison::error(format!("{:#}", e))
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "cloud"
    }

    fn audits_raw_response(&self) -> bool {
        true
    }
}
