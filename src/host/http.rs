use super::HostApi;
use crate::model::{FormFields, PosterRequest, ProgressSnapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// HTTP/JSON adapter for a host reachable over loopback or LAN. Non-2xx
/// responses surface as errors; the core treats them like any other facade
/// failure.
pub struct HttpHost {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHost {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("scrapedeck/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_ack<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?
            .error_for_status()
            .with_context(|| format!("host rejected {path}"))?;
        Ok(())
    }
}

#[async_trait]
impl HostApi for HttpHost {
    async fn start_job(&self, fields: &FormFields) -> Result<()> {
        self.post_ack("/api/scrape/start", fields).await
    }

    async fn get_progress(&self) -> Result<ProgressSnapshot> {
        let snap = self
            .client
            .get(self.url("/api/progress"))
            .send()
            .await
            .context("GET /api/progress")?
            .error_for_status()
            .context("host rejected /api/progress")?
            .json::<ProgressSnapshot>()
            .await
            .context("decode progress snapshot")?;
        Ok(snap)
    }

    async fn resume_after_pause(&self) -> Result<()> {
        self.post_ack("/api/scrape/resume", &serde_json::json!({})).await
    }

    async fn poster_login(&self, request: &PosterRequest) -> Result<()> {
        self.post_ack("/api/poster/login", request).await
    }

    async fn poster_generate_and_post(&self, request: &PosterRequest) -> Result<()> {
        self.post_ack("/api/poster/post", request).await
    }
}
