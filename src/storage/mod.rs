//! Bucket listing — a trait seam over a `ListObjectsV2`-style API, the
//! pagination driver that follows continuation tokens to exhaustion, and the
//! concrete AWS SDK implementation.

pub mod error;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
pub use error::ListError;

/// One stored object's metadata, as returned by a bucket listing call.
///
/// `etag` is kept exactly as the API returns it — wrapped in literal double
/// quotes. Stripping happens when the value is used as a content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub key: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub entries: Vec<StorageEntry>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Minimal async listing seam. The concrete implementation is
/// [`S3BucketLister`]; tests substitute canned pages.
#[async_trait]
pub trait BucketLister: Send + Sync {
    /// Fetch a single page, resuming from `continuation_token` when given.
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage, ListError>;
}

/// Enumerate every object in the bucket, following pagination until the
/// response is no longer truncated. Buckets over the API's page size
/// (typically 1000 keys) would otherwise be silently clipped to one page.
pub async fn list_all_objects(
    lister: &dyn BucketLister,
    bucket: &str,
) -> Result<Vec<StorageEntry>, ListError> {
    let mut entries: Vec<StorageEntry> = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = lister.list_page(bucket, token.as_deref()).await?;
        tracing::debug!(
            bucket,
            page_entries = page.entries.len(),
            truncated = page.is_truncated,
            "listed bucket page"
        );
        entries.extend(page.entries);

        if !page.is_truncated {
            break;
        }
        match page.next_continuation_token {
            Some(next) => token = Some(next),
            None => {
                // Defensive: a truncated response must carry a token.
                tracing::warn!(
                    bucket,
                    "listing reported truncation without a continuation token, stopping"
                );
                break;
            }
        }
    }

    Ok(entries)
}

/// Bucket lister over the AWS SDK. Points at AWS proper or, with a non-AWS
/// domain configured, at any S3-compatible endpoint (path-style addressing).
pub struct S3BucketLister {
    client: aws_sdk_s3::Client,
}

impl S3BucketLister {
    /// Build a client from the sync configuration.
    ///
    /// Explicit credentials take precedence; otherwise the SDK's default
    /// provider chain applies (environment, profiles, instance metadata).
    pub async fn connect(config: &Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                id,
                secret,
                None,
                None,
                "s3-image-source-options",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if !config.is_aws_domain() {
            builder = builder
                .endpoint_url(format!("{}://{}", config.protocol, config.domain))
                .force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl BucketLister for S3BucketLister {
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage, ListError> {
        let mut request = self.client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ListError::request(bucket, e))?;

        let entries = response
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(object_to_entry)
            .collect();

        Ok(ObjectPage {
            entries,
            is_truncated: response.is_truncated.unwrap_or(false),
            next_continuation_token: response.next_continuation_token,
        })
    }
}

/// Convert an SDK listing object, dropping entries without a key or a
/// modification timestamp (the change check is meaningless without one).
fn object_to_entry(object: aws_sdk_s3::types::Object) -> Option<StorageEntry> {
    let key = object.key?;
    let last_modified = object
        .last_modified
        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))?;
    Some(StorageEntry {
        key,
        etag: object.e_tag.unwrap_or_default(),
        last_modified,
    })
}
