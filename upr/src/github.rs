//! GitHub REST v3 client implementing [`SourceHost`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use upr_core::contract::{Commit, CommitStatus, HostError, PullRequest, SourceHost};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const MEDIA_TYPE: &str = "application/vnd.github+json";

/// Credentials and base URL of the GitHub API.
#[derive(Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub token: String,
    pub api_url: String,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"***")
            .field("api_url", &self.api_url)
            .finish()
    }
}

pub struct GitHubClient {
    http: Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, HostError> {
        let request_error = |message: String| HostError::Request {
            url: config.api_url.clone(),
            message,
        };
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| request_error(format!("invalid token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE));

        let http = Client::builder()
            .user_agent(concat!("upr/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| request_error(e.to_string()))?;

        info!(api_url = %config.api_url, "Initialized GitHub client");
        Ok(GitHubClient {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<reqwest::Response, HostError> {
        let response = request.send().await.map_err(|e| HostError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Fetch every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, HostError> {
        let url = self.url(path);
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let per_page = PER_PAGE.to_string();
            let page_str = page.to_string();
            let request = self
                .http
                .get(&url)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let batch: Vec<T> = self
                .send(&url, request)
                .await?
                .json()
                .await
                .map_err(|e| HostError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
            let fetched = batch.len();
            all.extend(batch);
            debug!(url = %url, page, fetched, "Fetched page");
            if fetched < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), HostError> {
        let url = self.url(path);
        let request = self.http.post(&url).json(body);
        self.send(&url, request).await?;
        Ok(())
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<PullRequest>, HostError> {
        self.get_all(&format!("/repos/{owner}/{repo}/pulls"), &[("state", "open")])
            .await
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Commit>, HostError> {
        self.get_all(&format!("/repos/{owner}/{repo}/pulls/{number}/commits"), &[])
            .await
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), HostError> {
        self.post(
            &format!("/repos/{owner}/{repo}/issues/{number}/comments"),
            &json!({ "body": body }),
        )
        .await
    }

    async fn create_commit_status(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        status: &CommitStatus,
    ) -> Result<(), HostError> {
        self.post(&format!("/repos/{owner}/{repo}/statuses/{commit}"), status)
            .await
    }
}
