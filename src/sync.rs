//! Sync pass orchestration: enumerate the bucket, partition entries against
//! previously registered nodes, then fan out per-entry download and node
//! registration.
//!
//! Per-entry failures (URL, fetch, mapping, registration) are contained —
//! one broken object never aborts the pass. A listing failure is fatal: a
//! bucket that cannot be enumerated cannot be synced.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;

use futures_util::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::config::Config;
use crate::fetch::{FetchRequest, FileFetcher};
use crate::graph::{CachedNode, GraphError, Node, NodeStore};
use crate::node::{self, exif::read_image_exif, AssetNode, ExifData};
use crate::storage::{self, BucketLister, ListError, StorageEntry};
use crate::url::{object_url, UrlParams};

/// Outcome counts for one sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Asset nodes registered this pass.
    pub created: usize,
    /// Previously registered nodes confirmed still current.
    pub touched: usize,
    /// Entries dropped by the image filter.
    pub skipped: usize,
    /// Entries that failed URL construction, fetch, mapping, or registration.
    pub failed: usize,
}

/// Pass-fatal failures. Everything else is absorbed per entry.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Listing(#[from] ListError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Run one sync pass: list, partition, fetch what changed, register nodes.
pub async fn source_nodes(
    config: &Config,
    lister: &dyn BucketLister,
    fetcher: &dyn FileFetcher,
    store: &dyn NodeStore,
) -> Result<SyncReport, SyncError> {
    let entries = storage::list_all_objects(lister, &config.bucket_name).await?;
    tracing::info!(
        "Listed {} entries in bucket '{}'",
        entries.len(),
        config.bucket_name
    );

    let cached = store.asset_nodes().await?;
    let (fresh, work) = partition_entries(entries, &cached);
    tracing::debug!(
        "Partitioned entries: {} cached-valid, {} to process",
        fresh.len(),
        work.len()
    );

    let mut report = SyncReport::default();

    if config.dry_run {
        report.touched = fresh.len();
        for hit in &fresh {
            tracing::info!("[DRY RUN] Would keep node for {}", hit.key);
        }
        for entry in &work {
            if node::is_image(entry) {
                tracing::info!("[DRY RUN] Would fetch {}", entry.key);
                report.created += 1;
            } else {
                report.skipped += 1;
            }
        }
        return Ok(report);
    }

    for hit in fresh {
        match store.touch_node(&hit.id).await {
            Ok(()) => report.touched += 1,
            Err(e) => {
                tracing::warn!("Could not touch node for {}: {}", hit.key, e);
                report.failed += 1;
            }
        }
    }

    let pb = create_progress_bar(config.no_progress_bar, work.len() as u64);
    let pb_ref = &pb;
    // All entries are dispatched at once and awaited en masse. Listing order
    // does not matter to the store, so there is no need to sequence them.
    let outcomes = join_all(work.iter().map(|entry| async move {
        let outcome = process_entry(config, fetcher, store, entry).await;
        pb_ref.inc(1);
        outcome
    }))
    .await;
    pb.finish_and_clear();

    for outcome in outcomes {
        match outcome {
            EntryOutcome::Created => report.created += 1,
            EntryOutcome::NotImage => report.skipped += 1,
            EntryOutcome::Failed => report.failed += 1,
        }
    }

    tracing::info!(
        "Sync pass complete: {} created, {} touched, {} skipped, {} failed",
        report.created,
        report.touched,
        report.skipped,
        report.failed
    );
    Ok(report)
}

/// A listed entry whose cached node is still current.
struct CacheHit {
    id: String,
    key: String,
}

/// Split entries into cached-valid hits and entries needing processing.
/// Validity requires a cached node with the same key and an exactly equal
/// modification timestamp; anything else (new key, timestamp drift) is
/// reprocessed.
fn partition_entries(
    entries: Vec<StorageEntry>,
    cached: &[CachedNode],
) -> (Vec<CacheHit>, Vec<StorageEntry>) {
    let by_key: HashMap<&str, &CachedNode> =
        cached.iter().map(|node| (node.key.as_str(), node)).collect();

    let mut fresh = Vec::new();
    let mut work = Vec::new();
    for entry in entries {
        match by_key.get(entry.key.as_str()) {
            Some(node) if node.last_modified == entry.last_modified => fresh.push(CacheHit {
                id: node.id.clone(),
                key: entry.key,
            }),
            _ => work.push(entry),
        }
    }
    (fresh, work)
}

enum EntryOutcome {
    Created,
    NotImage,
    Failed,
}

async fn process_entry(
    config: &Config,
    fetcher: &dyn FileFetcher,
    store: &dyn NodeStore,
    entry: &StorageEntry,
) -> EntryOutcome {
    if !node::is_image(entry) {
        tracing::trace!("Skipping non-image {}", entry.key);
        return EntryOutcome::NotImage;
    }

    let url = match object_url(&UrlParams {
        bucket_name: Some(&config.bucket_name),
        domain: Some(&config.domain),
        region: &config.region,
        key: &entry.key,
        protocol: &config.protocol,
    }) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Cannot build source URL for {}: {}", entry.key, e);
            return EntryOutcome::Failed;
        }
    };

    let file = match fetcher
        .fetch(
            FetchRequest {
                url: &url,
                key: &entry.key,
            },
            store,
        )
        .await
    {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!("Unable to fetch {}: {}", entry.key, e);
            return EntryOutcome::Failed;
        }
    };

    let fields = match node::entity_node_fields(entry, &file) {
        Ok(fields) => fields,
        Err(e) => {
            tracing::warn!("Cannot map node fields for {}: {}", entry.key, e);
            return EntryOutcome::Failed;
        }
    };

    let exif = read_exif_off_thread(file.absolute_path.clone()).await;

    let asset = AssetNode {
        id: store.node_id(&AssetNode::id_seed(&entry.key)),
        absolute_path: fields.absolute_path,
        key: fields.key,
        etag: entry.etag.clone(),
        last_modified: entry.last_modified,
        content_hash: fields.object_hash,
        media_type: fields.media_type,
        parent_id: fields.file_node_id,
        source_url: url,
        exif,
    };

    match store.create_node(Node::Asset(asset)).await {
        Ok(()) => EntryOutcome::Created,
        Err(e) => {
            tracing::warn!("Could not register node for {}: {}", entry.key, e);
            EntryOutcome::Failed
        }
    }
}

/// EXIF parsing is synchronous file I/O; keep it off the async workers.
/// Missing or malformed EXIF is normal and yields `None`.
async fn read_exif_off_thread(path: PathBuf) -> Option<ExifData> {
    match tokio::task::spawn_blocking(move || read_image_exif(&path)).await {
        Ok(Ok(data)) => data,
        Ok(Err(e)) => {
            tracing::debug!("EXIF read failed: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("EXIF task panicked: {}", e);
            None
        }
    }
}

/// Hidden when requested or when stdout is not a TTY, so piped output and
/// cron runs stay clean.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{DownloadedFile, FetchError};
    use crate::graph::{node_id, DirectoryNode, SqliteNodeStore};
    use crate::storage::ObjectPage;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn test_config() -> Config {
        Config {
            bucket_name: "fake-bucket".to_string(),
            domain: "s3.amazonaws.com".to_string(),
            region: "us-east-1".to_string(),
            protocol: "https".to_string(),
            access_key_id: Some("fake-access-key".to_string()),
            secret_access_key: Some("secret-access-key".to_string()),
            directory: PathBuf::from("/tmp/s3-image-source/sync_tests"),
            state_db: None,
            dry_run: false,
            no_progress_bar: true,
            sweep: false,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn entry(key: &str, secs: i64) -> StorageEntry {
        StorageEntry {
            key: key.to_string(),
            etag: "\"833816655f9709cb1b2b8ac9505a3c65\"".to_string(),
            last_modified: ts(secs),
        }
    }

    /// A previously registered node for the given key, as an earlier pass
    /// would have left it.
    fn seeded_asset(key: &str, secs: i64) -> AssetNode {
        AssetNode {
            id: node_id(&AssetNode::id_seed(key)),
            absolute_path: PathBuf::from("/tmp/s3-image-source/sync_tests").join(key),
            key: key.to_string(),
            etag: "\"833816655f9709cb1b2b8ac9505a3c65\"".to_string(),
            last_modified: ts(secs),
            content_hash: "833816655f9709cb1b2b8ac9505a3c65".to_string(),
            media_type: "image/jpeg".to_string(),
            parent_id: node_id("seed-parent"),
            source_url: format!("https://fake-bucket.s3.us-east-1.amazonaws.com/{key}"),
            exif: None,
        }
    }

    struct FakeLister {
        pages: Mutex<Vec<ObjectPage>>,
        calls: Mutex<usize>,
        fail_on_call: Option<usize>,
    }

    impl FakeLister {
        fn new(pages: Vec<ObjectPage>) -> Self {
            Self {
                pages: Mutex::new(pages),
                calls: Mutex::new(0),
                fail_on_call: None,
            }
        }

        fn single(entries: Vec<StorageEntry>) -> Self {
            Self::new(vec![ObjectPage {
                entries,
                is_truncated: false,
                next_continuation_token: None,
            }])
        }

        fn paged(first: Vec<StorageEntry>, second: Vec<StorageEntry>) -> Self {
            Self::new(vec![
                ObjectPage {
                    entries: first,
                    is_truncated: true,
                    next_continuation_token: Some("page-2".to_string()),
                },
                ObjectPage {
                    entries: second,
                    is_truncated: false,
                    next_continuation_token: None,
                },
            ])
        }
    }

    #[async_trait]
    impl BucketLister for FakeLister {
        async fn list_page(
            &self,
            bucket: &str,
            _continuation_token: Option<&str>,
        ) -> Result<ObjectPage, ListError> {
            {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if self.fail_on_call == Some(*calls) {
                    return Err(ListError::request(
                        bucket,
                        std::io::Error::other("listing denied"),
                    ));
                }
            }
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(ObjectPage::default())
            } else {
                Ok(pages.remove(0))
            }
        }
    }

    /// Hands back downloaded-file records without touching the network,
    /// mirroring the real fetcher's directory-node side effect.
    struct FakeFetcher {
        root: PathBuf,
        calls: Mutex<Vec<String>>,
        dirs_seen: Mutex<HashSet<String>>,
        fail_keys: HashSet<String>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                root: PathBuf::from("/tmp/s3-image-source/sync_tests"),
                calls: Mutex::new(Vec::new()),
                dirs_seen: Mutex::new(HashSet::new()),
                fail_keys: HashSet::new(),
            }
        }

        fn fetch_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl FileFetcher for FakeFetcher {
        async fn fetch(
            &self,
            request: FetchRequest<'_>,
            store: &dyn NodeStore,
        ) -> Result<DownloadedFile, FetchError> {
            if self.fail_keys.contains(request.key) {
                return Err(FetchError::HttpStatus {
                    status: 503,
                    url: request.url.to_string(),
                });
            }
            self.calls.lock().unwrap().push(request.key.to_string());

            let new_dir = match request.key.rsplit_once('/') {
                Some((dir, _)) => self
                    .dirs_seen
                    .lock()
                    .unwrap()
                    .insert(dir.to_string())
                    .then(|| dir.to_string()),
                None => None,
            };
            if let Some(dir) = new_dir {
                let path = self.root.join(&dir);
                store
                    .create_node(Node::Directory(DirectoryNode {
                        id: store.node_id(&path.display().to_string()),
                        absolute_path: path,
                    }))
                    .await?;
            }

            let path = self.root.join(request.key);
            Ok(DownloadedFile {
                id: store.node_id(&path.display().to_string()),
                absolute_path: path,
            })
        }
    }

    #[tokio::test]
    async fn test_two_page_listing_counts() {
        let first: Vec<_> = (0..10)
            .map(|i| entry(&format!("2019-04-10/DSC0{i:04}.jpg"), 100 + i as i64))
            .collect();
        let second: Vec<_> = (0..5)
            .map(|i| entry(&format!("2019-04-11/DSC1{i:04}.jpg"), 200 + i as i64))
            .collect();
        let lister = FakeLister::paged(first, second);
        let fetcher = FakeFetcher::new();
        let store = SqliteNodeStore::open_in_memory().unwrap();

        let report = source_nodes(&test_config(), &lister, &fetcher, &store)
            .await
            .unwrap();

        // One fetch per image across both pages.
        assert_eq!(fetcher.fetch_count(), 15);
        assert_eq!(report.created, 15);
        assert_eq!(report.failed, 0);

        // One node per image plus one per directory the fetcher created.
        let summary = store.summary().unwrap();
        assert_eq!(summary.assets, 15);
        assert_eq!(summary.directories, 2);
        assert_eq!(summary.total(), 17);
    }

    #[tokio::test]
    async fn test_empty_bucket_produces_nothing() {
        let lister = FakeLister::new(Vec::new());
        let fetcher = FakeFetcher::new();
        let store = SqliteNodeStore::open_in_memory().unwrap();

        let report = source_nodes(&test_config(), &lister, &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(fetcher.fetch_count(), 0);
        assert_eq!(store.summary().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_cached_valid_entry_is_touched_not_refetched() {
        let store = SqliteNodeStore::open_in_memory().unwrap();
        let seeded = seeded_asset("2019-04-10/DSC02943.jpg", 100);
        store
            .create_node(Node::Asset(seeded.clone()))
            .await
            .unwrap();
        store.begin_pass().unwrap();

        let lister = FakeLister::single(vec![entry("2019-04-10/DSC02943.jpg", 100)]);
        let fetcher = FakeFetcher::new();

        let report = source_nodes(&test_config(), &lister, &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(report.touched, 1);
        assert_eq!(report.created, 0);
        assert_eq!(fetcher.fetch_count(), 0);

        // Touched, so it survives the sweep.
        assert_eq!(store.sweep().unwrap(), 0);
        let cached = store.asset_nodes().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, seeded.id);
    }

    #[tokio::test]
    async fn test_timestamp_mismatch_triggers_reprocessing() {
        let store = SqliteNodeStore::open_in_memory().unwrap();
        store
            .create_node(Node::Asset(seeded_asset("2019-04-10/DSC02943.jpg", 100)))
            .await
            .unwrap();
        store.begin_pass().unwrap();

        let lister = FakeLister::single(vec![entry("2019-04-10/DSC02943.jpg", 999)]);
        let fetcher = FakeFetcher::new();

        let report = source_nodes(&test_config(), &lister, &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(report.touched, 0);
        assert_eq!(report.created, 1);
        assert_eq!(fetcher.fetch_count(), 1);

        // Recreated under the same deterministic id with the new timestamp.
        let cached = store.asset_nodes().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].last_modified, ts(999));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_only_that_entry() {
        let lister = FakeLister::single(vec![
            entry("2019-04-10/broken.jpg", 100),
            entry("2019-04-10/good.jpg", 101),
        ]);
        let mut fetcher = FakeFetcher::new();
        fetcher.fail_keys.insert("2019-04-10/broken.jpg".to_string());
        let store = SqliteNodeStore::open_in_memory().unwrap();

        let report = source_nodes(&test_config(), &lister, &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.failed, 1);
        let cached = store.asset_nodes().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].key, "2019-04-10/good.jpg");
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_the_pass() {
        let mut lister = FakeLister::paged(
            vec![entry("2019-04-10/a.jpg", 100)],
            vec![entry("2019-04-11/b.jpg", 101)],
        );
        lister.fail_on_call = Some(2);
        let fetcher = FakeFetcher::new();
        let store = SqliteNodeStore::open_in_memory().unwrap();

        let result = source_nodes(&test_config(), &lister, &fetcher, &store).await;

        assert!(matches!(result, Err(SyncError::Listing(_))));
        assert_eq!(fetcher.fetch_count(), 0);
        assert_eq!(store.summary().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_non_images_are_skipped() {
        let lister = FakeLister::single(vec![
            entry("notes.txt", 100),
            entry("2019-04-10/pic.jpg", 101),
        ]);
        let fetcher = FakeFetcher::new();
        let store = SqliteNodeStore::open_in_memory().unwrap();

        let report = source_nodes(&test_config(), &lister, &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 1);
        assert_eq!(
            *fetcher.calls.lock().unwrap(),
            vec!["2019-04-10/pic.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unbuildable_url_fails_only_that_entry() {
        let mut config = test_config();
        config.bucket_name = String::new();
        config.domain = String::new();

        let lister = FakeLister::single(vec![entry("2019-04-10/pic.jpg", 100)]);
        let fetcher = FakeFetcher::new();
        let store = SqliteNodeStore::open_in_memory().unwrap();

        let report = source_nodes(&config, &lister, &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = SqliteNodeStore::open_in_memory().unwrap();
        store
            .create_node(Node::Asset(seeded_asset("2019-04-10/cached.jpg", 100)))
            .await
            .unwrap();

        let mut config = test_config();
        config.dry_run = true;
        let lister = FakeLister::single(vec![
            entry("2019-04-10/cached.jpg", 100),
            entry("2019-04-10/new.jpg", 200),
            entry("notes.txt", 300),
        ]);
        let fetcher = FakeFetcher::new();

        let report = source_nodes(&config, &lister, &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(report.touched, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(fetcher.fetch_count(), 0);
        // Nothing actually registered beyond the seed.
        assert_eq!(store.summary().unwrap().total(), 1);
    }

    #[test]
    fn test_partition_exact_timestamp_match_required() {
        let cached = vec![CachedNode {
            id: "cached-id".to_string(),
            key: "a.jpg".to_string(),
            last_modified: ts(100),
            owner: "s3-image-source".to_string(),
        }];

        let (fresh, work) = partition_entries(
            vec![entry("a.jpg", 100), entry("b.jpg", 100), entry("a.jpg", 101)],
            &cached,
        );

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "cached-id");
        assert_eq!(
            work.iter().map(|e| e.key.as_str()).collect::<Vec<_>>(),
            ["b.jpg", "a.jpg"]
        );
    }
}
