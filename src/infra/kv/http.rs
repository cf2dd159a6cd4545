//! Edge key-value store over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::cache::{KvBackend, StoreError};
use crate::config::EdgeKvSettings;
use crate::infra::error::InfraError;
use crate::infra::upstream::user_agent;

/// Namespace-scoped client for `.../storage/kv/namespaces/{ns}`.
#[derive(Clone, Debug)]
pub struct HttpKvBackend {
    client: Client,
    namespace: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct KeyListPage {
    #[serde(default)]
    result: Vec<KeyName>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct KeyName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

impl HttpKvBackend {
    pub fn new(
        base: &Url,
        account_id: &str,
        namespace_id: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let mut namespace = base.clone();
        namespace
            .path_segments_mut()
            .map_err(|()| InfraError::configuration(format!("`{base}` cannot be a base URL")))?
            .pop_if_empty()
            .extend([
                "accounts",
                account_id,
                "storage",
                "kv",
                "namespaces",
                namespace_id,
            ]);

        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        Ok(Self {
            client,
            namespace,
            token: token.into(),
        })
    }

    pub fn from_settings(settings: &EdgeKvSettings) -> Result<Self, InfraError> {
        match (
            settings.account_id.as_deref(),
            settings.namespace_id.as_deref(),
            settings.api_token.as_deref(),
        ) {
            (Some(account), Some(namespace), Some(token)) => {
                Self::new(&settings.base_url, account, namespace, token, settings.timeout)
            }
            _ => Err(InfraError::configuration(
                "edge_kv requires account_id, namespace_id and api_token",
            )),
        }
    }

    fn value_url(&self, key: &str) -> Url {
        let mut url = self.namespace.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(["values", key]);
        }
        url
    }

    fn keys_url(&self, prefix: &str, cursor: Option<&str>) -> Url {
        let mut url = self.namespace.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("keys");
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("prefix", prefix);
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl KvBackend for HttpKvBackend {
    fn name(&self) -> &'static str {
        "edge_kv"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let response = self
            .client
            .get(self.value_url(key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(StoreError::http)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let bytes = Self::check(response)
            .await?
            .bytes()
            .await
            .map_err(StoreError::http)?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put_raw(
        &self,
        key: &str,
        value: Vec<u8>,
        expiration_ttl: u64,
    ) -> Result<(), StoreError> {
        let mut url = self.value_url(key);
        url.query_pairs_mut()
            .append_pair("expiration_ttl", &expiration_ttl.to_string());

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .body(value)
            .send()
            .await
            .map_err(StoreError::http)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.value_url(key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(StoreError::http)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let response = self
                .client
                .get(self.keys_url(prefix, cursor.as_deref()))
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(StoreError::http)?;
            let bytes = Self::check(response)
                .await?
                .bytes()
                .await
                .map_err(StoreError::http)?;
            let page: KeyListPage = serde_json::from_slice(&bytes)?;

            keys.extend(page.result.into_iter().map(|entry| entry.name));
            cursor = page
                .result_info
                .and_then(|info| info.cursor)
                .filter(|cursor| !cursor.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(keys)
    }
}
