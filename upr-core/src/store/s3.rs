use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLifecycleConfiguration, BucketLocationConstraint,
    CreateBucketConfiguration, ExpirationStatus, LifecycleExpiration,
    LifecycleRule, LifecycleRuleFilter, ObjectCannedAcl,
};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::{object_url, stored_key};
use crate::config::BackendConfig;
use crate::contract::{ObjectStore, StoreError, StoreResult};
use crate::expiry::EXPIRING_PREFIX;

const LIFECYCLE_RULE_ID: &str = "upr-upload-expires";
/// Region in which buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// S3 backend
///
/// Talks path-style to the configured endpoint so S3-compatible providers work as well as AWS.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    endpoint: String,
    region: String,
    bucket: String,
    expires_at: Option<DateTime<Utc>>,
}

impl S3Store {
    /// Build a client for `config`.
    ///
    /// Uses `uploads_identity` / `uploads_secret` as access key pair when both are set,
    /// otherwise the default AWS provider chain (`~/.aws/credentials`, `AWS_ACCESS_KEY_ID`, ...).
    pub async fn new(
        config: &BackendConfig,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Self> {
        let region = config.region.clone().ok_or_else(|| {
            StoreError::Config("the 'uploads_region' flag is required for the 's3' api".into())
        })?;

        let builder = match (&config.identity, &config.secret) {
            (Some(access_key), Some(secret_key)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "upr",
                )),
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        let s3_config = builder
            .region(Region::new(region.clone()))
            .endpoint_url(config.endpoint.clone())
            .force_path_style(true)
            // S3-compatible stores frequently reject streaming checksum trailers.
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        Ok(S3Store {
            client: Client::from_conf(s3_config),
            endpoint: config.endpoint.clone(),
            region,
            bucket: config.bucket.clone(),
            expires_at,
        })
    }

    fn bucket_error(&self, message: String) -> StoreError {
        error!(bucket = %self.bucket, error = %message, "S3 bucket setup failed");
        StoreError::Bucket {
            bucket: self.bucket.clone(),
            message,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn ensure_bucket(&self) -> StoreResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!(bucket = %self.bucket, "S3 bucket already exists");
                Ok(())
            }
            Err(head_err) => {
                debug!(
                    bucket = %self.bucket,
                    error = %DisplayErrorContext(&head_err),
                    "S3 bucket not found, creating it"
                );
                let mut create = self.client.create_bucket().bucket(&self.bucket);
                if self.region != DEFAULT_REGION {
                    create = create.create_bucket_configuration(
                        CreateBucketConfiguration::builder()
                            .location_constraint(BucketLocationConstraint::from(
                                self.region.as_str(),
                            ))
                            .build(),
                    );
                }
                match create.send().await {
                    Ok(_) => {
                        info!(bucket = %self.bucket, "Created S3 bucket");
                        Ok(())
                    }
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
                    {
                        Ok(())
                    }
                    Err(e) => Err(self.bucket_error(format!(
                        "problem creating bucket: {}",
                        DisplayErrorContext(&e)
                    ))),
                }
            }
        }
    }

    async fn make_public(&self) -> StoreResult<()> {
        self.client
            .put_bucket_acl()
            .bucket(&self.bucket)
            .acl(BucketCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| {
                self.bucket_error(format!(
                    "problem updating ACLs to make the bucket public: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        debug!(bucket = %self.bucket, "S3 bucket is public-read");
        Ok(())
    }

    async fn configure_expiry(&self) -> StoreResult<()> {
        let Some(expires_at) = self.expires_at else {
            return Ok(());
        };

        let rule = LifecycleRule::builder()
            .id(LIFECYCLE_RULE_ID)
            .filter(LifecycleRuleFilter::builder().prefix(EXPIRING_PREFIX).build())
            .status(ExpirationStatus::Enabled)
            .expiration(
                LifecycleExpiration::builder()
                    .date(AwsDateTime::from_secs(expires_at.timestamp()))
                    .build(),
            )
            .build()
            .map_err(|e| self.bucket_error(format!("invalid lifecycle rule: {e}")))?;
        let lifecycle = BucketLifecycleConfiguration::builder()
            .rules(rule)
            .build()
            .map_err(|e| self.bucket_error(format!("invalid lifecycle configuration: {e}")))?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(&self.bucket)
            .lifecycle_configuration(lifecycle)
            .send()
            .await
            .map_err(|e| {
                self.bucket_error(format!(
                    "problem updating lifecycle to expire objects: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        info!(bucket = %self.bucket, expires_at = %expires_at, "S3 lifecycle expiry configured");
        Ok(())
    }

    async fn put_object(&self, key: &str, body: tokio::fs::File) -> StoreResult<String> {
        let key = stored_key(key, self.expires_at);
        let start = std::time::Instant::now();
        let upload_error = |message: String| StoreError::Upload {
            key: key.clone(),
            message,
        };

        let body = ByteStream::read_from()
            .file(body)
            .build()
            .await
            .map_err(|e| upload_error(format!("reading file: {e}")))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body);
        if let Some(expires_at) = self.expires_at {
            request = request.expires(AwsDateTime::from_secs(expires_at.timestamp()));
        }
        request
            .send()
            .await
            .map_err(|e| upload_error(DisplayErrorContext(&e).to_string()))?;

        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(&key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| {
                upload_error(format!(
                    "problem updating ACLs to make the object public: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );
        Ok(object_url(&self.endpoint, &self.bucket, &key))
    }
}
