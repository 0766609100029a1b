//! s3-image-source — source images from an S3-compatible object-storage
//! bucket into a local, graph-queryable content store.
//!
//! One sync pass lists the bucket (following pagination to exhaustion),
//! partitions entries against previously registered nodes so unchanged
//! objects are only touched, downloads changed images concurrently, and
//! registers one asset node per changed object with EXIF metadata attached.
//! The listing, download, and node-store capabilities are trait seams
//! ([`storage::BucketLister`], [`fetch::FileFetcher`], [`graph::NodeStore`])
//! so hosts can substitute their own implementations.

#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod fetch;
pub mod graph;
pub mod node;
pub mod storage;
pub mod sync;
pub mod url;
