//! Asset node model — the image filter, the per-entity field mapper, and the
//! record ultimately registered into the node store.

pub mod error;
pub mod exif;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::DownloadedFile;
use crate::storage::StorageEntry;
pub use error::MapError;
pub use exif::ExifData;

/// Node type tag carried by every asset node.
pub const ASSET_NODE_TYPE: &str = "S3ImageAsset";

/// Image suffix allow-list, matched case-sensitively against the text after
/// the key's last `.`. The listing API exposes no Content-Type, and probing
/// each object over HTTP just to classify it is not worth the requests.
const IMAGE_EXTENSIONS: &[&str] = &["gif", "jpeg", "jpg", "png", "webp"];

/// Whether a storage entry looks like an image, judged by its key suffix.
pub fn is_image(entry: &StorageEntry) -> bool {
    entry
        .key
        .rsplit('.')
        .next()
        .is_some_and(|extension| IMAGE_EXTENSIONS.contains(&extension))
}

/// Canonical per-entity fields derived from a storage entry and the file the
/// fetcher produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFields {
    pub absolute_path: PathBuf,
    pub file_node_id: String,
    pub key: String,
    pub media_type: String,
    pub object_hash: String,
}

/// Derive [`NodeFields`] for one entity.
///
/// The media type comes from the key's extension. The object hash is the
/// listing ETag with its wrapping double quotes removed — the API always
/// quotes the hash, and the bare value is what serves as a content digest.
pub fn entity_node_fields(
    entry: &StorageEntry,
    file: &DownloadedFile,
) -> Result<NodeFields, MapError> {
    if entry.key.is_empty() {
        return Err(MapError::MissingKey);
    }
    let media_type = mime_guess::from_path(&entry.key)
        .first_raw()
        .ok_or_else(|| MapError::UnknownMediaType(entry.key.clone()))?;

    Ok(NodeFields {
        absolute_path: file.absolute_path.clone(),
        file_node_id: file.id.clone(),
        key: entry.key.clone(),
        media_type: media_type.to_string(),
        object_hash: entry.etag.replace('"', ""),
    })
}

/// The record registered into the node store — one per distinct, changed
/// storage entry, never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetNode {
    pub id: String,
    pub absolute_path: PathBuf,
    pub key: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    /// Bare content digest (the unquoted ETag).
    pub content_hash: String,
    pub media_type: String,
    /// Id of the downloaded file record this node was built from.
    pub parent_id: String,
    /// URL the object was fetched from.
    pub source_url: String,
    pub exif: Option<ExifData>,
}

impl AssetNode {
    /// Stable seed for deterministic id derivation.
    pub fn id_seed(key: &str) -> String {
        format!("{} >> {}", key, ASSET_NODE_TYPE)
    }
}
