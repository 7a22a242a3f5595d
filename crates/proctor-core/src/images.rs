use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;

/// Supplies image bytes for a reference picture or a webcam snapshot.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads `http(s)://` URIs over the network, `file://` URIs and bare paths
/// from disk.
#[derive(Clone)]
pub struct DefaultImageSource {
    client: reqwest::Client,
}

impl DefaultImageSource {
    pub fn new(timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build image http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageSource for DefaultImageSource {
    async fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>> {
        let uri = uri.trim();
        if uri.is_empty() {
            anyhow::bail!("image uri is empty");
        }

        if uri.starts_with("http://") || uri.starts_with("https://") {
            let resp = self
                .client
                .get(uri)
                .send()
                .await
                .with_context(|| format!("failed to fetch image {}", uri))?;
            if !resp.status().is_success() {
                anyhow::bail!("image fetch {} returned {}", uri, resp.status());
            }
            let bytes = resp.bytes().await?;
            return Ok(bytes.to_vec());
        }

        let path = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read image {}", path.display()))
    }
}

/// Builds reference-picture URIs from a `{userid}` template.
#[derive(Debug, Clone)]
pub struct ReferenceImages {
    template: String,
}

impl ReferenceImages {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn for_user(&self, userid: i64) -> String {
        self.template.replace("{userid}", &userid.to_string())
    }
}
