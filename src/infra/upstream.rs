//! HTTP client for the upstream content service.

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::application::error::SiteError;
use crate::application::upstream::SubtreeSource;
use crate::config::UpstreamSettings;
use crate::domain::record_map::RecordMap;

use super::error::InfraError;

pub fn user_agent() -> &'static str {
    concat!("siteweave/", env!("CARGO_PKG_VERSION"))
}

/// Loads subtrees with `GET {base_url}/{id}`, expecting a record-map document.
#[derive(Clone, Debug)]
pub struct HttpSubtreeSource {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpSubtreeSource {
    pub fn new(base: Url, token: Option<String>, settings: &UpstreamSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    /// Builds the client from settings; the base URL is mandatory here.
    pub fn from_settings(settings: &UpstreamSettings) -> Result<Self, InfraError> {
        let base = settings
            .base_url
            .clone()
            .ok_or_else(|| InfraError::configuration("upstream.base_url is required"))?;
        Self::new(base, settings.api_token.clone(), settings)
    }

    fn url(&self, id: &str) -> Result<Url, String> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| format!("`{}` cannot be a base URL", self.base))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }
}

#[async_trait]
impl SubtreeSource for HttpSubtreeSource {
    async fn fetch_subtree(&self, id: &str) -> Result<RecordMap, SiteError> {
        let url = self.url(id).map_err(|message| SiteError::upstream(id, message))?;
        debug!(page_id = id, %url, "Requesting subtree over HTTP");

        let mut request = self.client.get(url);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| SiteError::upstream(id, err.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SiteError::upstream(id, err.to_string()))?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(SiteError::upstream(id, format!("status {status} body {body}")));
        }

        serde_json::from_slice(&bytes)
            .map_err(|err| SiteError::upstream(id, format!("failed to parse subtree: {err}")))
    }
}
