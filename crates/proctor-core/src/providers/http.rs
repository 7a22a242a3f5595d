use super::{Comparison, MatchBackend};
use crate::model::MatchResult;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

/// Binary (0 or 100) verdict from a self-hosted compare service that takes
/// both images as a multipart upload.
pub struct HttpCompareBackend {
    pub endpoint: String,
    bearer_token: String,
    client: reqwest::Client,
}

impl HttpCompareBackend {
    pub fn new(
        endpoint: String,
        bearer_token: String,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build compare http client")?;
        Ok(Self {
            endpoint,
            bearer_token,
            client,
        })
    }

    async fn post_images(&self, reference: &[u8], target: &[u8]) -> anyhow::Result<String> {
        let form = Form::new()
            .part("image1", Part::bytes(reference.to_vec()).file_name("image1.jpg"))
            .part("image2", Part::bytes(target.to_vec()).file_name("image2.jpg"))
            .text("token", self.bearer_token.clone());

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("compare request to {} failed", self.endpoint))?;

        // The service reports its verdict in the body; status is not meaningful.
        let body = resp.text().await.context("failed to read compare response")?;
        Ok(body)
    }
}

/// `facematched` may arrive as a JSON boolean or as the string "True".
fn is_truthy(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn present<'a>(json: &'a serde_json::Value, name: &str) -> Option<&'a serde_json::Value> {
    json.get(name).filter(|v| !v.is_null())
}

/// Maps a compare service body. Both `process` and `facematched` must be
/// present and non-null; everything else, malformed JSON included, is a
/// non-match.
pub fn interpret_body(body: &str) -> MatchResult {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return MatchResult::NotMatched;
    };
    match (present(&json, "process"), present(&json, "facematched")) {
        (Some(_), Some(matched)) if is_truthy(matched) => MatchResult::Matched { similarity: 100 },
        _ => MatchResult::NotMatched,
    }
}

#[async_trait]
impl MatchBackend for HttpCompareBackend {
    async fn compare(&self, reference: &[u8], target: &[u8], _threshold: u8) -> Comparison {
        match self.post_images(reference, target).await {
            Ok(body) => {
                let raw = serde_json::from_str(&body)
                    .unwrap_or_else(|_| serde_json::Value::String(body.clone()));
                Comparison {
                    result: interpret_body(&body),
                    raw,
                }
            }
            Err(e) => {
                tracing::debug!(event = "proctor.http.call_failed", error = %e);
                Comparison::error(format!("{:#}", e))
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
