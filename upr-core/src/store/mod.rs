//! Object store backends.
//!
//! Two interchangeable integrations implement [`ObjectStore`]:
//! - [`S3Store`]: S3 API; expiry is a bucket lifecycle rule scoped to the expiring prefix.
//! - [`SwiftStore`]: OpenStack Swift; expiry is an `X-Delete-At` header on every object.
//!
//! Both put expiring objects under the same [`crate::expiry::EXPIRING_PREFIX`] and use the same
//! expiry instant, so an upload is visible for the same window whichever backend is selected.
//! Object URLs are `<endpoint>/<bucket>/<key>` with any trailing slash of the endpoint removed.

pub mod s3;
pub mod swift;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{BackendConfig, BackendKind};
pub use crate::contract::{ObjectStore, StoreError, StoreResult};
pub use s3::S3Store;
pub use swift::SwiftStore;

/// Connect to the configured backend. Authentication problems surface here, before any upload.
pub async fn connect(
    config: &BackendConfig,
    expires_at: Option<DateTime<Utc>>,
) -> StoreResult<Arc<dyn ObjectStore>> {
    match config.kind {
        BackendKind::S3 => {
            let store = S3Store::new(config, expires_at).await?;
            Ok(Arc::new(store))
        }
        BackendKind::Swift => {
            let store = SwiftStore::authenticate(config, expires_at).await?;
            Ok(Arc::new(store))
        }
    }
}

/// A backend that connects on first use.
///
/// Swift authenticates and S3 loads its credential chain only once a capability is called, so a
/// run that finds nothing to comment on or nothing to upload never touches the object store.
/// The connection is made at most once and shared by every later call.
pub struct LazyStore {
    config: BackendConfig,
    expires_at: Option<DateTime<Utc>>,
    store: OnceCell<Arc<dyn ObjectStore>>,
}

impl LazyStore {
    pub fn new(config: BackendConfig, expires_at: Option<DateTime<Utc>>) -> Self {
        LazyStore {
            config,
            expires_at,
            store: OnceCell::new(),
        }
    }

    /// Whether the backend has been connected yet.
    pub fn is_connected(&self) -> bool {
        self.store.initialized()
    }

    async fn get(&self) -> StoreResult<&Arc<dyn ObjectStore>> {
        self.store
            .get_or_try_init(|| async {
                debug!(
                    api = %self.config.kind,
                    bucket = %self.config.bucket,
                    "Connecting to the object store"
                );
                connect(&self.config, self.expires_at).await
            })
            .await
    }
}

#[async_trait]
impl ObjectStore for LazyStore {
    async fn ensure_bucket(&self) -> StoreResult<()> {
        self.get().await?.ensure_bucket().await
    }

    async fn make_public(&self) -> StoreResult<()> {
        self.get().await?.make_public().await
    }

    async fn configure_expiry(&self) -> StoreResult<()> {
        self.get().await?.configure_expiry().await
    }

    async fn put_object(&self, key: &str, body: tokio::fs::File) -> StoreResult<String> {
        self.get().await?.put_object(key, body).await
    }
}

/// Make the bucket ready for uploads: create it if needed, make it public and, when
/// `expiring`, install expiry. Any failure here aborts the run before uploads start.
pub async fn prepare_bucket(store: &dyn ObjectStore, bucket: &str, expiring: bool) -> StoreResult<()> {
    store.ensure_bucket().await?;
    store.make_public().await?;
    if expiring {
        store.configure_expiry().await?;
    }
    info!(bucket = %bucket, "Using bucket");
    Ok(())
}

/// Public URL of `key` in `bucket`. Key segments are percent-encoded, `/` is kept.
pub fn object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
}

/// Key actually written for `key`, honouring the expiring prefix.
pub(crate) fn stored_key(key: &str, expires_at: Option<DateTime<Utc>>) -> String {
    match expires_at {
        Some(_) => crate::expiry::expiring_key(key),
        None => key.to_string(),
    }
}
