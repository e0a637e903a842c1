//! HTTP implementation of the [`Registry`] trait.

use crate::error::{ErrorKind, Result};
use crate::types::{ChangeBatch, PackageMetadata};
use crate::Registry;
use async_trait::async_trait;
use exn::ResultExt;
use serde::Deserialize;

/// How many packages the backfill search asks for. The search endpoint caps
/// page sizes at 250.
const SEARCH_PAGE_SIZE: u32 = 250;

#[derive(Debug, Deserialize)]
struct DatabaseInfo {
    update_seq: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    objects: Vec<SearchObject>,
}

#[derive(Debug, Deserialize)]
struct SearchObject {
    package: SearchPackage,
}

#[derive(Debug, Deserialize)]
struct SearchPackage {
    name: String,
}

/// Registry client over HTTP.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("drydock/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::trace!(url, "registry request");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .or_raise(|| ErrorKind::Http(url.to_string()))?
            .error_for_status()
            .or_raise(|| ErrorKind::Http(url.to_string()))?;
        response.json().await.or_raise(|| ErrorKind::Decode)
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn package(&self, name: &str) -> Result<PackageMetadata> {
        // Scoped names ("@scope/pkg") need their slash encoded.
        let url = format!("{}/{}", self.base_url, name.replace('/', "%2F"));
        self.get_json(&url).await
    }

    async fn current_sequence(&self) -> Result<u64> {
        let info: DatabaseInfo = self.get_json(&self.base_url).await?;
        Ok(info.update_seq)
    }

    async fn poll_changes(&self, since: u64, limit: u32) -> Result<ChangeBatch> {
        let url = format!("{}/_changes?since={}&limit={}", self.base_url, since, limit);
        self.get_json(&url).await
    }

    async fn addon_names(&self, keyword: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/-/v1/search?text=keywords:{}&size={}",
            self.base_url, keyword, SEARCH_PAGE_SIZE
        );
        let response: SearchResponse = self.get_json(&url).await?;
        Ok(response.objects.into_iter().map(|object| object.package.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = RegistryClient::new("https://registry.test/").unwrap();
        assert_eq!(client.base_url, "https://registry.test");
    }
}
