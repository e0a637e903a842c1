//! HTTP implementation of the [`RepoHost`] trait.

use crate::error::{ErrorKind, Result};
use crate::{Branch, RateLimit, RepoHost};
use async_trait::async_trait;
use exn::ResultExt;
use serde::Deserialize;

/// Where branch snapshot tarballs are served from.
const ARCHIVE_BASE: &str = "https://github.com";
/// The branch a repository's docs config is read from.
const DEFAULT_BRANCH: &str = "master";

#[derive(Debug, Deserialize)]
struct RateLimitEnvelope {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitWindow,
}

#[derive(Debug, Deserialize)]
struct RateLimitWindow {
    limit: u32,
    remaining: u32,
    reset: u64,
}

/// GitHub API client.
///
/// Works unauthenticated, but the unauthenticated core quota (60/hour) makes
/// a token all but mandatory for any real deployment.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    raw_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(api_url: impl Into<String>, raw_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            // GitHub rejects requests without a User-Agent outright.
            .user_agent(concat!("drydock/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            raw_url: raw_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn api_get(&self, url: &str) -> reqwest::RequestBuilder {
        tracing::trace!(url, "code-host request");
        let mut request = self.http.get(url).header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }
        request
    }
}

#[async_trait]
impl RepoHost for GithubClient {
    async fn branches(&self, slug: &str) -> Result<Vec<Branch>> {
        let url = format!("{}/repos/{}/branches", self.api_url, slug);
        let response = self
            .api_get(&url)
            .send()
            .await
            .or_raise(|| ErrorKind::Http(url.clone()))?
            .error_for_status()
            .or_raise(|| ErrorKind::Http(url.clone()))?;
        response.json().await.or_raise(|| ErrorKind::Decode)
    }

    async fn rate_limit(&self) -> Result<RateLimit> {
        let url = format!("{}/rate_limit", self.api_url);
        let response = self
            .api_get(&url)
            .send()
            .await
            .or_raise(|| ErrorKind::Http(url.clone()))?
            .error_for_status()
            .or_raise(|| ErrorKind::Http(url.clone()))?;
        let envelope: RateLimitEnvelope = response.json().await.or_raise(|| ErrorKind::Decode)?;
        Ok(RateLimit {
            limit: envelope.resources.core.limit,
            remaining: envelope.resources.core.remaining,
            resets_at: envelope.resources.core.reset,
        })
    }

    async fn docs_config(&self, slug: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/{}/{}/config/docs.json", self.raw_url, slug, DEFAULT_BRANCH);
        let response = self.http.get(&url).send().await.or_raise(|| ErrorKind::Http(url.clone()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().or_raise(|| ErrorKind::Http(url.clone()))?;
        let bytes = response.bytes().await.or_raise(|| ErrorKind::Http(url))?;
        Ok(Some(bytes.to_vec()))
    }

    fn archive_url(&self, slug: &str, branch: &str) -> String {
        format!("{}/{}/archive/{}.tar.gz", ARCHIVE_BASE, slug, branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_url() {
        let client = GithubClient::new("https://api.github.com", "https://raw.githubusercontent.com", None).unwrap();
        assert_eq!(
            client.archive_url("owner/repo", "master"),
            "https://github.com/owner/repo/archive/master.tar.gz"
        );
        assert_eq!(
            client.archive_url("owner/repo", "2.0.0"),
            "https://github.com/owner/repo/archive/2.0.0.tar.gz"
        );
    }

    #[test]
    fn test_parse_branches() {
        let raw = r#"[
            { "name": "master", "commit": { "sha": "aaa111", "url": "https://api.github.com/repos/o/r/commits/aaa111" } },
            { "name": "2.x", "commit": { "sha": "bbb222", "url": "https://api.github.com/repos/o/r/commits/bbb222" } }
        ]"#;
        let branches: Vec<Branch> = serde_json::from_str(raw).unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0], Branch::new("master", "aaa111"));
        assert_eq!(branches[1].commit.sha, "bbb222");
    }

    #[test]
    fn test_parse_rate_limit() {
        let raw = r#"{
            "resources": {
                "core": { "limit": 5000, "remaining": 4994, "reset": 1372700873, "used": 6 },
                "search": { "limit": 30, "remaining": 18, "reset": 1372697452, "used": 12 }
            },
            "rate": { "limit": 5000, "remaining": 4994, "reset": 1372700873, "used": 6 }
        }"#;
        let envelope: RateLimitEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.resources.core.limit, 5000);
        assert_eq!(envelope.resources.core.remaining, 4994);
        assert_eq!(envelope.resources.core.reset, 1372700873);
    }
}
