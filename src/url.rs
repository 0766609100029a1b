//! Object URL construction for S3 and S3-compatible endpoints.
//!
//! Two shapes: virtual-hosted-style for the AWS S3 host
//! (`https://bucket.s3.region.amazonaws.com/key`) and path-style for
//! everything else (`https://host/bucket/key` — MinIO, Spaces, CDN fronts).
//! Pure string composition, no network.

use thiserror::Error;

/// Host suffix identifying the first-party AWS S3 endpoint.
pub const AWS_S3_HOST: &str = "s3.amazonaws.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("cannot build object URL: object key is empty")]
    MissingKey,

    #[error("cannot build object URL: neither bucket name nor domain is configured")]
    MissingEndpoint,
}

/// Inputs for building a retrievable object URL.
///
/// `bucket_name` and `domain` are each optional, but at least one must be
/// present. `region` only participates in the virtual-hosted AWS form.
#[derive(Debug, Clone, Copy)]
pub struct UrlParams<'a> {
    pub bucket_name: Option<&'a str>,
    pub domain: Option<&'a str>,
    pub region: &'a str,
    pub key: &'a str,
    pub protocol: &'a str,
}

/// Build the HTTP(S) URL an object can be fetched from.
pub fn object_url(params: &UrlParams<'_>) -> Result<String, UrlError> {
    if params.key.is_empty() {
        return Err(UrlError::MissingKey);
    }
    let bucket = params.bucket_name.filter(|b| !b.is_empty());
    let domain = params.domain.filter(|d| !d.is_empty());
    if bucket.is_none() && domain.is_none() {
        return Err(UrlError::MissingEndpoint);
    }

    // A non-AWS domain means a third-party implementation of the protocol;
    // those are addressed path-style, with the bucket as a path segment.
    if let Some(domain) = domain {
        if !domain.contains(AWS_S3_HOST) {
            return Ok(match bucket {
                Some(bucket) => {
                    format!("{}://{}/{}/{}", params.protocol, domain, bucket, params.key)
                }
                None => format!("{}://{}/{}", params.protocol, domain, params.key),
            });
        }
    }

    match (bucket, domain) {
        (Some(bucket), _) => Ok(format!(
            "{}://{}.s3.{}.amazonaws.com/{}",
            params.protocol, bucket, params.region, params.key
        )),
        // AWS host with no bucket configured; fall back to path-style.
        (None, Some(domain)) => Ok(format!("{}://{}/{}", params.protocol, domain, params.key)),
        (None, None) => Err(UrlError::MissingEndpoint),
    }
}
