//! File fetch seam — downloads one object to local disk on behalf of the
//! synchronizer, registering a directory node for every intermediate
//! directory it creates along the way.

pub mod error;
mod http;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::graph::NodeStore;
pub use error::FetchError;
pub use http::HttpFetcher;

/// The local file produced for an entry that needed (re)download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub id: String,
    pub absolute_path: PathBuf,
}

/// One fetch: the URL to pull and the object key that places the file under
/// the download root.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub key: &'a str,
}

/// Download capability, injected into the synchronizer. The store handle is
/// passed through so implementations can register the directory nodes they
/// create.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        store: &dyn NodeStore,
    ) -> Result<DownloadedFile, FetchError>;
}
