//! Node store — the graph-queryable content layer that asset and directory
//! nodes are registered into, with a SQLite-backed implementation that
//! persists nodes between sync passes.

pub mod error;
mod sqlite;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::node::AssetNode;
pub use error::GraphError;
pub use sqlite::{SqliteNodeStore, StoreSummary};

/// Owner tag stamped on every node this crate registers. Stores shared with
/// other producers use it to scope enumeration and garbage collection.
pub const NODE_OWNER: &str = "s3-image-source";

/// A node registered by the fetcher for each intermediate directory it
/// creates under the download root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub id: String,
    pub absolute_path: PathBuf,
}

/// Everything the store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Asset(AssetNode),
    Directory(DirectoryNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Asset(asset) => &asset.id,
            Node::Directory(dir) => &dir.id,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Node::Asset(_) => "asset",
            Node::Directory(_) => "directory",
        }
    }
}

/// A previously registered asset node, as visible to the change check.
/// Read-only to the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedNode {
    pub id: String,
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub owner: String,
}

/// The host graph seam. `create_node` registers, `touch_node` marks a node
/// as still current (keeping it alive through the store's sweep), and
/// `asset_nodes` enumerates prior assets for the incremental change check.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn create_node(&self, node: Node) -> Result<(), GraphError>;

    async fn touch_node(&self, id: &str) -> Result<(), GraphError>;

    async fn asset_nodes(&self) -> Result<Vec<CachedNode>, GraphError>;

    /// Deterministic id derivation: the same seed always yields the same id.
    fn node_id(&self, seed: &str) -> String {
        node_id(seed)
    }
}

/// Hex SHA-256 of the owner-namespaced seed.
pub fn node_id(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(NODE_OWNER.as_bytes());
    hasher.update(b":");
    hasher.update(seed.as_bytes());
    format!("{:x}", hasher.finalize())
}
