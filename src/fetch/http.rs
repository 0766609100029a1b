//! Streaming HTTP fetcher. Each download goes to a `.part` sibling first and
//! is renamed into place on completion, so an interrupted transfer never
//! leaves a half-written file at the destination path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{DownloadedFile, FetchError, FetchRequest, FileFetcher};
use crate::graph::{DirectoryNode, Node, NodeStore};

pub struct HttpFetcher {
    client: Client,
    root: PathBuf,
}

impl HttpFetcher {
    pub fn new(client: Client, root: PathBuf) -> Self {
        Self { client, root }
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        store: &dyn NodeStore,
    ) -> Result<DownloadedFile, FetchError> {
        let destination = destination_for_key(&self.root, request.key)?;
        ensure_directories(store, &self.root, &destination).await?;

        let part_path = part_path_for(&destination);
        // Always start fresh; there is no resume.
        let _ = fs::remove_file(&part_path).await;
        attempt_download(&self.client, request.url, &destination, &part_path).await?;

        tracing::debug!("Downloaded {}", destination.display());
        Ok(DownloadedFile {
            id: store.node_id(&destination.display().to_string()),
            absolute_path: destination,
        })
    }
}

/// Resolve an object key to its path under the download root. Keys are
/// untrusted input; empty, `.`, and `..` segments are rejected rather than
/// normalized.
fn destination_for_key(root: &Path, key: &str) -> Result<PathBuf, FetchError> {
    if key.is_empty() {
        return Err(FetchError::InvalidKey(key.to_string()));
    }
    let mut destination = root.to_path_buf();
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(FetchError::InvalidKey(key.to_string()));
        }
        destination.push(segment);
    }
    Ok(destination)
}

/// Sibling temp path for the in-flight transfer.
fn part_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    destination.with_file_name(format!("{name}.part"))
}

/// Create the destination's parent directories, registering a directory node
/// for each one that did not exist before this call.
async fn ensure_directories(
    store: &dyn NodeStore,
    root: &Path,
    destination: &Path,
) -> Result<(), FetchError> {
    fs::create_dir_all(root).await?;

    let Some(parent) = destination.parent() else {
        return Ok(());
    };
    let Ok(relative) = parent.strip_prefix(root) else {
        return Ok(());
    };

    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        if current.exists() {
            continue;
        }
        fs::create_dir(&current).await?;
        let node = DirectoryNode {
            id: store.node_id(&current.display().to_string()),
            absolute_path: current.clone(),
        };
        store.create_node(Node::Directory(node)).await?;
        tracing::debug!("Registered directory node for {}", current.display());
    }
    Ok(())
}

async fn attempt_download(
    client: &Client,
    url: &str,
    destination: &Path,
    part_path: &Path,
) -> Result<(), FetchError> {
    let response = client.get(url).send().await.map_err(|e| FetchError::Http {
        url: url.to_string(),
        source: e,
    })?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    fs::rename(part_path, destination).await?;
    Ok(())
}
