//! Capability surface of the host process that actually runs the scraper and
//! poster. The console core only ever talks to this trait; the HTTP adapter
//! below is one implementation, test mocks are another.

mod http;

pub use http::HttpHost;

use crate::model::{FormFields, PosterRequest, ProgressSnapshot};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait HostApi: Send + Sync {
    /// Ask the host to begin a scrape job with the given form fields.
    async fn start_job(&self, fields: &FormFields) -> Result<()>;

    /// Fetch the job's complete observable state.
    async fn get_progress(&self) -> Result<ProgressSnapshot>;

    /// Signal that the manual verification step has been completed.
    async fn resume_after_pause(&self) -> Result<()>;

    /// Warm up the posting session.
    async fn poster_login(&self, request: &PosterRequest) -> Result<()>;

    /// Generate content for `request.title` and post it.
    async fn poster_generate_and_post(&self, request: &PosterRequest) -> Result<()>;
}
