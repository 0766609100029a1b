use thiserror::Error;

/// Listing failures. Never caught inside a sync pass — a bucket that cannot
/// be enumerated fails the whole pass.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("listing bucket '{bucket}' failed: {source}")]
    Request {
        bucket: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ListError {
    pub fn request(
        bucket: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Request {
            bucket: bucket.to_string(),
            source: Box::new(source),
        }
    }
}
