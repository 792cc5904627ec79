use crate::error::{Error, ErrorKind, Result};
use crate::report::{Failure, Notice, Pass, Reconciliation};
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use shelf_remote::{SourceHandle, looks_remote};
use shelf_storage::{BackendHandle, validate_path};
use shelf_store::{LibraryEntry, Repository, SyncFlag};
use std::collections::{BTreeSet, VecDeque};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::instrument;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct CoverOptions {
    /// Pause between the first sweep and the single retry of its failures.
    pub retry_delay: Duration,
    /// Maximum simultaneous downloads.
    pub concurrency: usize,
}
impl Default for CoverOptions {
    fn default() -> Self {
        Self { retry_delay: DEFAULT_RETRY_DELAY, concurrency: DEFAULT_CONCURRENCY }
    }
}

/// Cache file name for an entry: `<id>.jpg`.
pub fn cache_key(id: &str) -> Result<PathBuf> {
    let raw = format!("{id}.jpg");
    let key = validate_path(&raw).or_raise(|| ErrorKind::InvalidId(id.to_string()))?;
    // Ids map to flat file names; anything that normalizes into a directory
    // (or away from the raw name) would alias another entry's file.
    if id.trim().is_empty() || key.components().count() != 1 || key.as_os_str() != OsStr::new(&raw) {
        exn::bail!(ErrorKind::InvalidId(id.to_string()));
    }
    Ok(key)
}

fn staging_key(key: &Path) -> PathBuf {
    let mut part = key.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Keeps each entry's cached artwork in line with the store and the remote
/// source.
///
/// One instance per process, shared behind an `Arc`. Passes are mutually
/// exclusive: a trigger that arrives while a pass runs is dropped, not queued.
pub struct CoverCache {
    repository: Repository,
    flag: SyncFlag,
    backend: BackendHandle,
    source: SourceHandle,
    options: CoverOptions,
    running: AtomicBool,
    passes_started: AtomicU64,
    in_flight: watch::Sender<BTreeSet<String>>,
}

impl CoverCache {
    pub fn new(
        repository: Repository,
        flag: SyncFlag,
        backend: BackendHandle,
        source: SourceHandle,
        options: CoverOptions,
    ) -> Self {
        Self {
            repository,
            flag,
            backend,
            source,
            options,
            running: AtomicBool::new(false),
            passes_started: AtomicU64::new(0),
            in_flight: watch::Sender::new(BTreeSet::new()),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Ids of entries whose cover is downloading right now.
    pub fn in_flight(&self) -> BTreeSet<String> {
        self.in_flight.borrow().clone()
    }

    /// Watch the in-flight set change, for progress indicators.
    pub fn subscribe(&self) -> watch::Receiver<BTreeSet<String>> {
        self.in_flight.subscribe()
    }

    /// Number of passes that actually ran (skipped triggers aren't counted).
    pub fn passes_started(&self) -> u64 {
        self.passes_started.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Staleness
    // =========================================================================

    /// Whether an entry's cover pointer can't be trusted.
    ///
    /// True when the pointer is empty, still holds a remote URL, names
    /// anything other than this cache's file for the entry (a store copied
    /// from another device, a moved cache directory), or that file is gone
    /// (the OS or the user may clear the cache directory at any time). Reads
    /// the cache directory, never the store.
    pub async fn is_stale(&self, entry: &LibraryEntry) -> Result<bool> {
        let Some(pointer) = entry.cover_pointer.as_deref().filter(|p| !p.trim().is_empty()) else {
            return Ok(true);
        };
        if looks_remote(pointer) {
            return Ok(true);
        }
        let key = cache_key(&entry.id)?;
        if pointer != self.pointer_for(&key)? {
            return Ok(true);
        }
        let cached = self.backend.exists(&key).await.or_raise(|| ErrorKind::Storage)?;
        Ok(!cached)
    }

    /// The pointer an entry cached under `key` should carry.
    fn pointer_for(&self, key: &Path) -> Result<String> {
        let location = self.backend.locate(key).or_raise(|| ErrorKind::Storage)?;
        location.to_str().map(str::to_string).ok_or_raise(|| ErrorKind::Pointer)
    }

    /// Stale and downloadable. Entries without a source keep their placeholder
    /// and are never attempted.
    pub async fn needs_download(&self, entry: &LibraryEntry) -> Result<bool> {
        if !entry.has_cover_source() {
            return Ok(false);
        }
        self.is_stale(entry).await
    }

    /// Errors count as "needs a download": the pass should try rather than skip.
    async fn needs_download_or_assume(&self, entry: &LibraryEntry) -> bool {
        match self.needs_download(entry).await {
            Ok(needed) => needed,
            Err(e) => {
                tracing::warn!(entry = %entry.id, error = ?e, "Couldn't check cached cover; assuming stale");
                true
            },
        }
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Reconcile every entry in the store (the "library list loaded" trigger).
    pub async fn reconcile_all(&self) -> Result<Pass> {
        if self.is_running() {
            tracing::debug!("Reconciliation already running; trigger dropped");
            return Ok(Pass::Skipped);
        }
        let entries = self.repository.list_entries().await.or_raise(|| ErrorKind::Store)?;
        self.reconcile(&entries).await
    }

    /// Download the cover of every given entry that needs one.
    ///
    /// Failures of the first sweep are retried once after
    /// [`retry_delay`](CoverOptions::retry_delay); anything still failing is
    /// left stale for a later pass and reported, never raised. Only store
    /// failures at the start or end of the pass are returned as errors.
    ///
    /// When the sync flag is pending, the pass also decides whether the whole
    /// store is consistent again, clears the flag if so, and carries a
    /// [`Notice`] for the user either way.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn reconcile(&self, entries: &[LibraryEntry]) -> Result<Pass> {
        let Some(_running) = RunningPass::try_start(&self.running) else {
            tracing::debug!("Reconciliation already running; trigger dropped");
            return Ok(Pass::Skipped);
        };
        self.passes_started.fetch_add(1, Ordering::SeqCst);
        let flag_driven = self.flag.read().await.or_raise(|| ErrorKind::Store)?.is_pending();

        let mut report = Reconciliation { checked: entries.len(), ..Default::default() };
        let mut candidates = Vec::new();
        for entry in entries {
            if self.needs_download_or_assume(entry).await {
                candidates.push(entry);
            }
        }
        tracing::info!(candidates = candidates.len(), flag_driven, "Reconciliation pass started");

        if !candidates.is_empty() {
            let first = self.sweep(candidates).await;
            report.downloaded = first.downloaded;
            report.relinked = first.relinked;
            let (retry, permanent): (Vec<_>, Vec<_>) =
                first.failed.into_iter().partition(|(_, e)| e.is_retryable());
            let mut failed = permanent;
            if !retry.is_empty() {
                tracing::debug!(failed = retry.len(), delay = ?self.options.retry_delay, "Retrying failed covers");
                tokio::time::sleep(self.options.retry_delay).await;
                let second = self.sweep(retry.into_iter().map(|(entry, _)| entry).collect()).await;
                report.downloaded += second.downloaded;
                report.relinked += second.relinked;
                report.recovered_on_retry = second.downloaded + second.relinked;
                failed.extend(second.failed);
            }
            for (entry, error) in failed {
                tracing::warn!(entry = %entry.id, error = ?error, "Cover still unavailable; leaving stale");
                report.failed.push(Failure { id: entry.id.clone(), error });
            }
        }

        if flag_driven {
            // The flag speaks for the whole store, not just the entries in view.
            let all = self.repository.list_entries().await.or_raise(|| ErrorKind::Store)?;
            report.remaining_stale = self.count_needing_download(&all).await;
            if report.remaining_stale == 0 {
                self.flag.clear().await.or_raise(|| ErrorKind::Store)?;
                report.notice = Some(Notice::Restored);
            } else {
                report.notice = Some(Notice::Incomplete { remaining: report.remaining_stale });
            }
        } else {
            report.remaining_stale = self.count_needing_download(entries).await;
        }

        tracing::info!(
            downloaded = report.downloaded,
            recovered = report.recovered_on_retry,
            failed = report.failed.len(),
            remaining = report.remaining_stale,
            "Reconciliation pass finished"
        );
        Ok(Pass::Completed(report))
    }

    async fn count_needing_download(&self, entries: &[LibraryEntry]) -> usize {
        let mut count = 0;
        for entry in entries {
            if self.needs_download_or_assume(entry).await {
                count += 1;
            }
        }
        count
    }

    /// Repair a batch at most `concurrency` at a time.
    async fn sweep<'e>(&self, entries: Vec<&'e LibraryEntry>) -> Sweep<'e> {
        let mut queue = VecDeque::from(entries);
        let mut processing = FuturesUnordered::new();
        while processing.len() < self.options.concurrency.max(1)
            && let Some(entry) = queue.pop_front()
        {
            processing.push(self.attempt(entry));
        }

        let mut sweep = Sweep::default();
        while let Some((entry, result)) = processing.next().await {
            match result {
                Ok(Repair::Downloaded) => sweep.downloaded += 1,
                Ok(Repair::Relinked) => sweep.relinked += 1,
                Err(e) => sweep.failed.push((entry, e)),
            }
            if let Some(next) = queue.pop_front() {
                processing.push(self.attempt(next));
            }
        }
        sweep
    }

    async fn attempt<'e>(&self, entry: &'e LibraryEntry) -> (&'e LibraryEntry, Result<Repair>) {
        (entry, self.repair(entry).await)
    }

    /// Point the entry at its cache file, downloading the file first unless
    /// it's already there.
    #[instrument(level = "debug", skip_all, fields(entry = %entry.id))]
    async fn repair(&self, entry: &LibraryEntry) -> Result<Repair> {
        let key = cache_key(&entry.id)?;
        let pointer = self.pointer_for(&key)?;
        let _tracked = InFlight::track(&self.in_flight, &entry.id);

        if self.backend.exists(&key).await.or_raise(|| ErrorKind::Storage)? {
            self.record_pointer(entry, &pointer).await?;
            tracing::debug!(pointer = %pointer, "Cover already cached; pointer rewritten");
            return Ok(Repair::Relinked);
        }

        let source = entry.cover_source.as_deref().ok_or_raise(|| ErrorKind::Download)?;
        let bytes = match self.source.fetch(source).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let kind = if e.is_retryable() { ErrorKind::Download } else { ErrorKind::Rejected };
                return Err(e.raise(kind));
            },
        };
        let part = staging_key(&key);
        let staged = match self.backend.write(&part, &bytes).await {
            Ok(()) => self.backend.rename(&part, &key).await,
            Err(e) => Err(e),
        };
        if let Err(e) = staged {
            if let Err(cleanup) = self.backend.delete(&part).await {
                tracing::debug!(error = ?cleanup, "Couldn't remove partial cover download");
            }
            return Err(e).or_raise(|| ErrorKind::Write);
        }

        self.record_pointer(entry, &pointer).await?;
        tracing::debug!(bytes = bytes.len(), pointer = %pointer, "Cover cached");
        Ok(Repair::Downloaded)
    }

    async fn record_pointer(&self, entry: &LibraryEntry, pointer: &str) -> Result<()> {
        self.repository.set_cover_pointer(&entry.id, Some(pointer)).await.or_raise(|| ErrorKind::Pointer)
    }
}

enum Repair {
    Downloaded,
    Relinked,
}

#[derive(Default)]
struct Sweep<'e> {
    downloaded: usize,
    relinked: usize,
    failed: Vec<(&'e LibraryEntry, Error)>,
}

/// Holds the reentrancy gate for the duration of a pass.
struct RunningPass<'a>(&'a AtomicBool);
impl<'a> RunningPass<'a> {
    fn try_start(gate: &'a AtomicBool) -> Option<Self> {
        gate.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(gate))
    }
}
impl Drop for RunningPass<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Membership of one id in the in-flight set, removed on drop.
struct InFlight<'a> {
    set: &'a watch::Sender<BTreeSet<String>>,
    id: String,
}
impl<'a> InFlight<'a> {
    fn track(set: &'a watch::Sender<BTreeSet<String>>, id: &str) -> Self {
        set.send_modify(|ids| {
            ids.insert(id.to_string());
        });
        Self { set, id: id.to_string() }
    }
}
impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.send_modify(|ids| {
            ids.remove(&self.id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use shelf_remote::source::MockSource;
    use shelf_storage::StorageBackend;
    use shelf_storage::backend::MockBackend;
    use shelf_store::{Database, SyncState};
    use std::sync::Arc;

    const URL_A: &str = "http://x/a.jpg";
    const URL_B: &str = "http://x/b.jpg";

    struct Harness {
        db: Database,
        repo: Repository,
        flag: SyncFlag,
        backend: Arc<MockBackend>,
        source: Arc<MockSource>,
        cache: Arc<CoverCache>,
    }

    async fn harness() -> Harness {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let flag = SyncFlag::from(&db);
        let backend = Arc::new(MockBackend::default().with_name("covers"));
        let source = Arc::new(MockSource::default());
        let options = CoverOptions { retry_delay: Duration::from_millis(5), concurrency: 2 };
        let cache =
            Arc::new(CoverCache::new(repo.clone(), flag.clone(), backend.clone(), source.clone(), options));
        Harness { db, repo, flag, backend, source, cache }
    }

    impl Harness {
        async fn add(&self, entry: LibraryEntry) {
            self.repo.upsert_entry(&entry).await.unwrap();
        }

        async fn pointer(&self, id: &str) -> Option<String> {
            self.repo.get_entry(id).await.unwrap().unwrap().cover_pointer
        }

        async fn pass(&self) -> Reconciliation {
            match self.cache.reconcile_all().await.unwrap() {
                Pass::Completed(report) => report,
                Pass::Skipped => panic!("pass unexpectedly skipped"),
            }
        }
    }

    #[rstest]
    #[case("a96676e5-8ae2-425e-b549-7f15dd34a6d8", true)]
    #[case("one-piece", true)]
    #[case("vol.2", true)]
    #[case("../library", false)]
    #[case("nested/id", false)]
    #[case("", false)]
    fn test_cache_key(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(cache_key(id).is_ok(), valid);
    }

    #[test]
    fn test_staging_key() {
        assert_eq!(staging_key(Path::new("vol.2.jpg")), Path::new("vol.2.jpg.part"));
    }

    #[tokio::test]
    async fn test_staleness() {
        let h = harness().await;
        h.backend.write(Path::new("cached.jpg"), b"jpeg").await.unwrap();

        let no_pointer = LibraryEntry::new("none", "None");
        let remote = LibraryEntry::new("remote", "Remote").with_cover_pointer(URL_A);
        let missing = LibraryEntry::new("missing", "Missing").with_cover_pointer("/covers/missing.jpg");
        let cached = LibraryEntry::new("cached", "Cached").with_cover_pointer("/covers/cached.jpg");

        assert!(h.cache.is_stale(&no_pointer).await.unwrap());
        assert!(h.cache.is_stale(&remote).await.unwrap());
        assert!(h.cache.is_stale(&missing).await.unwrap());
        assert!(!h.cache.is_stale(&cached).await.unwrap());
        // Stale, but nothing to download from.
        assert!(!h.cache.needs_download(&no_pointer).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_pointer_is_stale() {
        let h = harness().await;
        h.backend.write(Path::new("a.jpg"), b"jpeg").await.unwrap();
        let foreign = LibraryEntry::new("a", "A").with_cover_pointer("/other-device/covers/a.jpg");
        let own = LibraryEntry::new("a", "A").with_cover_pointer("/covers/a.jpg");
        assert!(h.cache.is_stale(&foreign).await.unwrap());
        assert!(!h.cache.is_stale(&own).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_pointer_relinked_without_download() {
        let h = harness().await;
        h.backend.write(Path::new("a.jpg"), b"jpeg-a").await.unwrap();
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A).with_cover_pointer("/other-device/covers/a.jpg"))
            .await;

        let report = h.pass().await;
        assert_eq!(report.relinked, 1);
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.remaining_stale, 0);
        assert_eq!(h.source.requests(), 0);
        assert_eq!(h.pointer("a").await.as_deref(), Some("/covers/a.jpg"));
    }

    #[tokio::test]
    async fn test_foreign_pointer_without_cached_file_downloads() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A).with_cover_pointer("/old-cache/a.jpg")).await;

        let report = h.pass().await;
        assert_eq!(report.downloaded, 1);
        assert_eq!(h.pointer("a").await.as_deref(), Some("/covers/a.jpg"));
        assert_eq!(h.backend.read(Path::new("a.jpg")).await.unwrap(), b"jpeg-a");
    }

    #[tokio::test]
    async fn test_downloads_missing_cover() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;

        let report = h.pass().await;
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.remaining_stale, 0);
        assert!(report.notice.is_none());

        let pointer = h.pointer("a").await.unwrap();
        assert_eq!(pointer, "/covers/a.jpg");
        assert_eq!(h.backend.read(Path::new("a.jpg")).await.unwrap(), b"jpeg-a");
        assert!(!h.backend.exists(Path::new("a.jpg.part")).await.unwrap());
        assert!(h.cache.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_remote_pointer_is_replaced() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A).with_cover_pointer(URL_A)).await;
        h.pass().await;
        assert_eq!(h.pointer("a").await.as_deref(), Some("/covers/a.jpg"));
    }

    #[tokio::test]
    async fn test_second_pass_makes_no_requests() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;
        h.add(LibraryEntry::new("placeholder", "No cover")).await;

        h.pass().await;
        let requests = h.source.requests();
        let report = h.pass().await;
        assert_eq!(h.source.requests(), requests);
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.checked, 2);
    }

    #[tokio::test]
    async fn test_failure_retried_once_then_deferred() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.source.take_down(URL_A).await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;

        let report = h.pass().await;
        assert_eq!(h.source.requests_for(URL_A).await, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "a");
        assert_eq!(report.remaining_stale, 1);
        assert_eq!(h.pointer("a").await, None);

        h.source.restore(URL_A).await;
        let report = h.pass().await;
        assert_eq!(report.downloaded, 1);
        assert!(report.failed.is_empty());
        assert_eq!(h.pointer("a").await.as_deref(), Some("/covers/a.jpg"));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let h = harness().await;
        // Nothing is served, so the source answers 404.
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;

        let report = h.pass().await;
        assert_eq!(h.source.requests_for(URL_A).await, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(&*report.failed[0].error, ErrorKind::Rejected));
        assert_eq!(report.recovered_on_retry, 0);
        assert_eq!(report.remaining_stale, 1);
    }

    #[tokio::test]
    async fn test_offline_pass_reports_without_error() {
        let h = harness().await;
        h.source.set_offline(true);
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;
        h.add(LibraryEntry::new("b", "B").with_cover_source(URL_B)).await;
        let report = h.pass().await;
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.downloaded, 0);
    }

    #[tokio::test]
    async fn test_external_deletion_is_repaired() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;
        h.pass().await;

        h.backend.evict("a.jpg").await;
        let report = h.pass().await;
        assert_eq!(report.downloaded, 1);
        assert!(h.backend.exists(Path::new("a.jpg")).await.unwrap());
    }

    #[tokio::test]
    async fn test_torn_write_leaves_no_partial_file() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.backend.fail_writes(true);
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;
        let report = h.pass().await;
        assert_eq!(report.failed.len(), 1);
        assert!(h.backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_dropped() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;
        let entries = h.repo.list_entries().await.unwrap();

        h.source.hold();
        let first = tokio::spawn({
            let cache = h.cache.clone();
            let entries = entries.clone();
            async move { cache.reconcile(&entries).await }
        });
        while h.source.requests() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(h.cache.is_running());
        assert!(h.cache.in_flight().contains("a"));

        assert!(h.cache.reconcile(&entries).await.unwrap().is_skipped());
        assert!(h.cache.reconcile_all().await.unwrap().is_skipped());
        assert_eq!(h.cache.passes_started(), 1);

        h.source.release();
        let pass = first.await.unwrap().unwrap();
        assert_eq!(pass.report().unwrap().downloaded, 1);
        assert!(!h.cache.is_running());
        assert!(h.cache.in_flight().is_empty());
        assert_eq!(h.source.requests(), 1);
    }

    #[tokio::test]
    async fn test_flag_driven_pass_clears_flag() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;
        h.flag.set("imported").await.unwrap();

        let report = h.pass().await;
        assert_eq!(report.notice, Some(Notice::Restored));
        assert_eq!(h.flag.read().await.unwrap(), SyncState::Clear);
    }

    #[tokio::test]
    async fn test_flag_stays_pending_while_store_is_stale() {
        let h = harness().await;
        h.source.serve(URL_A, b"jpeg-a").await;
        h.add(LibraryEntry::new("a", "A").with_cover_source(URL_A)).await;
        h.add(LibraryEntry::new("b", "B").with_cover_source(URL_B)).await;
        h.flag.set("imported").await.unwrap();

        // Only `a` is in view, but `b` is stale too and has no response.
        let only_a = vec![h.repo.get_entry("a").await.unwrap().unwrap()];
        let pass = h.cache.reconcile(&only_a).await.unwrap();
        let report = pass.report().unwrap();
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.notice, Some(Notice::Incomplete { remaining: 1 }));
        assert!(h.flag.read().await.unwrap().is_pending());

        h.source.serve(URL_B, b"jpeg-b").await;
        assert_eq!(h.pass().await.notice, Some(Notice::Restored));
        assert!(!h.flag.read().await.unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_store_failure_is_raised() {
        let h = harness().await;
        h.db.close().await;
        let err = h.cache.reconcile_all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Store));
        assert!(!h.cache.is_running());
    }
}
