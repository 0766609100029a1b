use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to open node store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("node store query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("node store lock poisoned: {0}")]
    Lock(String),

    #[error("no node with id '{0}'")]
    NotFound(String),

    #[error("node payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unsupported node store schema version {found} (expected {expected})")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}
