use thiserror::Error;

/// Field-mapping failures. Synchronous invariant violations that abort the
/// affected entity only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("storage entry has an empty key")]
    MissingKey,

    #[error("no media type known for key '{0}'")]
    UnknownMediaType(String),
}
