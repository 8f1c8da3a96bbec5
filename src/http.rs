//! `HttpGet` external collaborator contract (spec §6, §9).

use crate::error::HttpError;
use async_trait::async_trait;

/// Minimal HTTP GET contract used for server-config fetch and EXTDATA
/// indirection. Kept as a trait so callers can substitute a mock in tests
/// without a running HTTP stack.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, HttpError>;
}

/// Default implementation backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpGet {
    client: reqwest::Client,
}

impl ReqwestHttpGet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpGet for ReqwestHttpGet {
    async fn get(&self, url: &str) -> Result<String, HttpError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(HttpError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}
