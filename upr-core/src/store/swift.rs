use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use super::{object_url, stored_key};
use crate::config::BackendConfig;
use crate::contract::{ObjectStore, StoreError, StoreResult};

const AUTH_TOKEN: &str = "X-Auth-Token";
const CONTAINER_READ: &str = "X-Container-Read";
const DELETE_AT: &str = "X-Delete-At";
/// Anyone may read objects and list the container.
const PUBLIC_READ_ACL: &str = ".r:*,.rlistings";
const OBJECT_STORE_SERVICE: &str = "object-store";

/// Authentication protocol, chosen from the auth endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVersion {
    /// Swift tempauth (`X-Auth-User` / `X-Auth-Key`).
    V1,
    /// Keystone v2.0 (`/tokens`).
    V2,
    /// Keystone v3 (`/auth/tokens`).
    V3,
}

impl AuthVersion {
    pub fn detect(auth_url: &str) -> Self {
        let path = auth_url.trim_end_matches('/');
        if path.ends_with("v3") || path.contains("/v3/") {
            AuthVersion::V3
        } else if path.ends_with("v2.0") || path.ends_with("v2") || path.contains("/v2") {
            AuthVersion::V2
        } else {
            AuthVersion::V1
        }
    }
}

/// OpenStack Swift backend.
pub struct SwiftStore {
    http: Client,
    storage_url: String,
    token: String,
    bucket: String,
    expires_at: Option<DateTime<Utc>>,
}

impl SwiftStore {
    /// Authenticate `tenant:username` / secret against the auth endpoint and resolve the
    /// storage URL. Fails before any network call when the identity is malformed.
    pub async fn authenticate(
        config: &BackendConfig,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Self> {
        let (tenant, username) = config.swift_identity()?;
        let secret = config.secret.clone().ok_or_else(|| {
            StoreError::Config("the 'uploads_secret' flag is required for the 'swift' api".into())
        })?;
        let http = Client::new();
        let auth = Credentials {
            auth_url: config.endpoint.trim_end_matches('/'),
            tenant: &tenant,
            username: &username,
            secret: &secret,
            region: config.region.as_deref(),
        };

        let version = AuthVersion::detect(auth.auth_url);
        debug!(?version, auth_url = %auth.auth_url, "Authenticating with Swift");
        let (storage_url, token) = match version {
            AuthVersion::V1 => auth.v1(&http).await,
            AuthVersion::V2 => auth.v2(&http).await,
            AuthVersion::V3 => auth.v3(&http).await,
        }
        .map_err(|e| {
            error!(error = %e, "Swift authentication failed. Validate your credentials are correct.");
            e
        })?;

        info!(storage_url = %storage_url, "Authenticated with Swift");
        Ok(SwiftStore {
            http,
            storage_url: storage_url.trim_end_matches('/').to_string(),
            token,
            bucket: config.bucket.clone(),
            expires_at,
        })
    }

    /// Assemble a store from an already known storage URL and token.
    pub fn with_token(
        storage_url: impl Into<String>,
        token: impl Into<String>,
        bucket: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let storage_url: String = storage_url.into();
        SwiftStore {
            http: Client::new(),
            storage_url: storage_url.trim_end_matches('/').to_string(),
            token: token.into(),
            bucket: bucket.into(),
            expires_at,
        }
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.storage_url, self.bucket)
    }

    fn bucket_error(&self, message: String) -> StoreError {
        error!(bucket = %self.bucket, error = %message, "Swift container setup failed");
        StoreError::Bucket {
            bucket: self.bucket.clone(),
            message,
        }
    }

    async fn check(&self, response: Response, action: &str) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Auth(format!("{action}: {status}")));
        }
        Err(self.bucket_error(format!("{action}: {status} {body}")))
    }
}

#[async_trait]
impl ObjectStore for SwiftStore {
    async fn ensure_bucket(&self) -> StoreResult<()> {
        let url = self.container_url();
        let head = self
            .http
            .head(&url)
            .header(AUTH_TOKEN, &self.token)
            .send()
            .await
            .map_err(|e| self.bucket_error(format!("checking container: {e}")))?;

        if head.status().is_success() {
            debug!(bucket = %self.bucket, "Swift container already exists");
            return Ok(());
        }
        if head.status() != StatusCode::NOT_FOUND {
            return self.check(head, "checking container").await.map(|_| ());
        }

        let created = self
            .http
            .put(&url)
            .header(AUTH_TOKEN, &self.token)
            .send()
            .await
            .map_err(|e| self.bucket_error(format!("problem creating container: {e}")))?;
        self.check(created, "problem creating container").await?;
        info!(bucket = %self.bucket, "Created Swift container");
        Ok(())
    }

    async fn make_public(&self) -> StoreResult<()> {
        let response = self
            .http
            .post(self.container_url())
            .header(AUTH_TOKEN, &self.token)
            .header(CONTAINER_READ, PUBLIC_READ_ACL)
            .send()
            .await
            .map_err(|e| self.bucket_error(format!("problem making container public: {e}")))?;
        self.check(response, "problem making container public").await?;
        debug!(bucket = %self.bucket, "Swift container is public");
        Ok(())
    }

    async fn configure_expiry(&self) -> StoreResult<()> {
        // Swift has no container-wide expiry; every object carries X-Delete-At instead.
        if let Some(expires_at) = self.expires_at {
            debug!(bucket = %self.bucket, expires_at = %expires_at, "Swift objects will carry X-Delete-At");
        }
        Ok(())
    }

    async fn put_object(&self, key: &str, body: tokio::fs::File) -> StoreResult<String> {
        let key = stored_key(key, self.expires_at);
        let url = object_url(&self.storage_url, &self.bucket, &key);
        let upload_error = |message: String| StoreError::Upload {
            key: key.clone(),
            message,
        };

        let length = body.metadata().await?.len();
        let mut request = self
            .http
            .put(&url)
            .header(AUTH_TOKEN, &self.token)
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(body)));
        if let Some(expires_at) = self.expires_at {
            request = request.header(DELETE_AT, expires_at.timestamp().to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upload_error(format!("{status} {body}")));
        }

        debug!(bucket = %self.bucket, key = %key, size_bytes = length, "Swift upload successful");
        Ok(url)
    }
}

struct Credentials<'a> {
    auth_url: &'a str,
    tenant: &'a str,
    username: &'a str,
    secret: &'a str,
    region: Option<&'a str>,
}

#[derive(Deserialize)]
struct V2Response {
    access: V2Access,
}

#[derive(Deserialize)]
struct V2Access {
    token: V2Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<V2Service>,
}

#[derive(Deserialize)]
struct V2Token {
    id: String,
}

#[derive(Deserialize)]
struct V2Service {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
}

#[derive(Deserialize)]
struct V2Endpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Deserialize)]
struct V3Response {
    token: V3Token,
}

#[derive(Deserialize)]
struct V3Token {
    #[serde(default)]
    catalog: Vec<V3Service>,
}

#[derive(Deserialize)]
struct V3Service {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<V3Endpoint>,
}

#[derive(Deserialize)]
struct V3Endpoint {
    interface: String,
    url: String,
    #[serde(default)]
    region: Option<String>,
}

impl Credentials<'_> {
    fn region_matches(&self, region: Option<&str>) -> bool {
        match self.region {
            Some(wanted) => region == Some(wanted),
            None => true,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> StoreResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Auth(format!("{}: {e}", self.auth_url)))?;
        if !response.status().is_success() {
            return Err(StoreError::Auth(format!(
                "{} returned {}",
                self.auth_url,
                response.status()
            )));
        }
        Ok(response)
    }

    async fn v1(&self, http: &Client) -> StoreResult<(String, String)> {
        let response = self
            .send(
                http.get(self.auth_url)
                    .header("X-Auth-User", format!("{}:{}", self.tenant, self.username))
                    .header("X-Auth-Key", self.secret),
            )
            .await?;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| StoreError::Auth(format!("auth response is missing {name}")))
        };
        Ok((header("X-Storage-Url")?, header(AUTH_TOKEN)?))
    }

    async fn v2(&self, http: &Client) -> StoreResult<(String, String)> {
        let body = json!({
            "auth": {
                "tenantName": self.tenant,
                "passwordCredentials": {
                    "username": self.username,
                    "password": self.secret,
                }
            }
        });
        let response = self
            .send(http.post(format!("{}/tokens", self.auth_url)).json(&body))
            .await?;
        let parsed: V2Response = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("decoding auth response: {e}")))?;

        let storage_url = parsed
            .access
            .service_catalog
            .into_iter()
            .filter(|service| service.kind == OBJECT_STORE_SERVICE)
            .flat_map(|service| service.endpoints)
            .find(|endpoint| self.region_matches(endpoint.region.as_deref()))
            .map(|endpoint| endpoint.public_url)
            .ok_or_else(|| StoreError::Auth("no object-store endpoint in service catalog".into()))?;
        Ok((storage_url, parsed.access.token.id))
    }

    async fn v3(&self, http: &Client) -> StoreResult<(String, String)> {
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.username,
                            "domain": { "id": "default" },
                            "password": self.secret,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.tenant,
                        "domain": { "id": "default" },
                    }
                }
            }
        });
        let response = self
            .send(http.post(format!("{}/auth/tokens", self.auth_url)).json(&body))
            .await?;
        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Auth("auth response is missing X-Subject-Token".into()))?;
        let parsed: V3Response = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("decoding auth response: {e}")))?;

        let storage_url = parsed
            .token
            .catalog
            .into_iter()
            .filter(|service| service.kind == OBJECT_STORE_SERVICE)
            .flat_map(|service| service.endpoints)
            .find(|endpoint| {
                endpoint.interface == "public" && self.region_matches(endpoint.region.as_deref())
            })
            .map(|endpoint| endpoint.url)
            .ok_or_else(|| StoreError::Auth("no object-store endpoint in service catalog".into()))?;
        Ok((storage_url, token))
    }
}
