use thiserror::Error;

use crate::graph::GraphError;

/// Fetch failures. Caught per entity by the synchronizer — one failed
/// download never aborts the pass.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("refusing to place object key '{0}' outside the download root")]
    InvalidKey(String),

    #[error("node store rejected a directory node: {0}")]
    Graph(#[from] GraphError),
}
