use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::catalog::{DEFAULT_DELIMITER, parse_catalog};
use crate::db::Database;
use crate::models::Product;

/// How long a successful sync keeps the catalog fresh, in days.
pub const DEFAULT_VALIDITY_DAYS: u32 = 1;

const MILLIS_PER_DAY: i64 = 1000 * 60 * 60 * 24;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected http status {0}")]
    Status(u16),
}

/// Outcome of a remote catalog fetch.
pub enum RemoteResponse {
    /// Full payload, with the server's cache-validation token if it sent one.
    Payload { text: String, etag: Option<String> },
    /// The conditional request matched; the previous payload is still valid.
    NotModified,
    /// Already-decoded records from a document-store source.
    Records(Vec<Product>),
}

/// A remote catalog source: the HTTP endpoint or a document store.
///
/// Implementations issue a conditional request when given a validation
/// token. Callers invoke this off the interactive thread; see
/// [`SyncManager::initialize`].
pub trait CatalogSource: Send + Sync {
    fn fetch_catalog(&self, etag: Option<&str>) -> Result<RemoteResponse, FetchError>;
}

/// Persisted record of the last successful fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Epoch millis of the last successful fetch; 0 means never.
    #[serde(default)]
    pub last_fetch_ms: i64,
    /// Cache-validation token from the last successful fetch.
    #[serde(default)]
    pub etag: Option<String>,
}

/// Tracks catalog staleness across process restarts.
///
/// State lives in a small JSON file; a missing or corrupt file reads as
/// never-fetched.
pub struct FreshnessTracker {
    path: PathBuf,
}

impl FreshnessTracker {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn load(&self) -> SyncState {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Corrupt sync state file, treating as never synced: {e}");
                SyncState::default()
            }),
            Err(_) => SyncState::default(),
        }
    }

    /// True when no fetch has ever succeeded or the validity window has
    /// elapsed since the last one.
    #[must_use]
    pub fn should_refresh(&self, validity_days: u32) -> bool {
        let state = self.load();
        if state.last_fetch_ms == 0 {
            return true;
        }
        let elapsed_days = (Utc::now().timestamp_millis() - state.last_fetch_ms) / MILLIS_PER_DAY;
        elapsed_days >= i64::from(validity_days)
    }

    pub fn record_success(&self, fetched_at_ms: i64, etag: Option<String>) -> Result<()> {
        let state = SyncState {
            last_fetch_ms: fetched_at_ms,
            etag,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }
        fs::write(&self.path, serde_json::to_string(&state)?)
            .with_context(|| format!("Failed to write sync state: {}", self.path.display()))?;
        Ok(())
    }

    /// Human-readable timestamp of the last successful fetch.
    #[must_use]
    pub fn last_fetch_display(&self) -> String {
        let state = self.load();
        if state.last_fetch_ms == 0 {
            return "Never".to_string();
        }
        Local
            .timestamp_millis_opt(state.last_fetch_ms)
            .single()
            .map_or_else(
                || "Never".to_string(),
                |ts| ts.format("%b %d, %Y %H:%M").to_string(),
            )
    }

    /// Explicitly forget the sync state (next cycle fetches unconditionally).
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove sync state file"),
        }
    }
}

/// The raw last-fetched catalog payload, persisted next to the sync state.
///
/// Written only after a fully successful download; deleted when its
/// contents fail to parse, so a corrupt file is not retried forever.
pub struct PayloadCache {
    path: PathBuf,
}

impl PayloadCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read catalog cache: {}", self.path.display()))
    }

    /// Overwrite the cache wholesale via temp-file-then-rename, so a crash
    /// mid-write never leaves a truncated cache behind.
    pub fn write_atomic(&self, text: &str) -> Result<()> {
        let parent = self.path.parent().context("Cache path has no parent")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&temp_path, text)
            .with_context(|| format!("Failed to write temp cache: {}", temp_path.display()))?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e).with_context(|| {
                format!("Failed to move cache into place: {}", self.path.display())
            });
        }
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove catalog cache"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub validity_days: u32,
    pub delimiter: u8,
    /// Packaged default catalog, used only when every other stage left the
    /// store empty.
    pub bundled_catalog: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_VALIDITY_DAYS,
            delimiter: DEFAULT_DELIMITER,
            bundled_catalog: None,
        }
    }
}

enum StageError {
    /// Zero records extracted; the existing catalog must be kept.
    Parse,
    /// The store rejected the replace; the payload itself was fine.
    Store(anyhow::Error),
}

/// Orchestrates the fallback chain: network, then the on-disk cache, then
/// the bundled defaults. Owns the sync state and the payload cache; the
/// store is only ever updated through an atomic replace, so a failed cycle
/// leaves it exactly as it was.
pub struct SyncManager<'a> {
    db: &'a Database,
    tracker: FreshnessTracker,
    cache: PayloadCache,
    config: SyncConfig,
    gate: Mutex<()>,
}

impl<'a> SyncManager<'a> {
    pub fn new(
        db: &'a Database,
        tracker: FreshnessTracker,
        cache: PayloadCache,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            tracker,
            cache,
            config,
            gate: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &FreshnessTracker {
        &self.tracker
    }

    /// Run one sync cycle. Idempotent and safe to call on every start:
    /// a fresh, non-empty store is a no-op, every failure is absorbed and
    /// logged, and concurrent callers are serialized behind the in-flight
    /// cycle.
    pub fn initialize(&self, source: &dyn CatalogSource) {
        self.run_cycle(source, false);
    }

    /// Like [`Self::initialize`] but ignores the freshness window.
    pub fn refresh(&self, source: &dyn CatalogSource) {
        self.run_cycle(source, true);
    }

    fn run_cycle(&self, source: &dyn CatalogSource, force: bool) {
        let _guard = match self.gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let rows = self.db.count().unwrap_or(0);
        if !force && rows > 0 && !self.tracker.should_refresh(self.config.validity_days) {
            debug!(rows, "Catalog is fresh, skipping sync");
            return;
        }

        let state = self.tracker.load();
        match source.fetch_catalog(state.etag.as_deref()) {
            Ok(RemoteResponse::Payload { text, etag }) => {
                if let Err(e) = self.cache.write_atomic(&text) {
                    warn!("Failed to persist catalog cache: {e:#}");
                }
                match self.parse_and_store(&text) {
                    Ok(count) => {
                        debug!(products = count, "Catalog replaced from network");
                        self.record(etag);
                    }
                    Err(StageError::Parse) => {
                        warn!("Downloaded catalog yielded no records, discarding it");
                        self.discard_cache();
                    }
                    Err(StageError::Store(e)) => {
                        // Cache stays put: the next cycle retries from it.
                        error!("Failed to store downloaded catalog: {e:#}");
                    }
                }
            }
            Ok(RemoteResponse::NotModified) => {
                debug!("Catalog unchanged upstream, reusing cache");
                if self.restore_from_cache() {
                    self.record(state.etag);
                }
            }
            Ok(RemoteResponse::Records(products)) if !products.is_empty() => {
                match self.db.replace_all(&products) {
                    Ok(()) => {
                        debug!(products = products.len(), "Catalog replaced from document store");
                        self.record(None);
                    }
                    Err(e) => error!("Failed to store fetched catalog: {e:#}"),
                }
            }
            Ok(RemoteResponse::Records(_)) => {
                warn!("Remote returned an empty catalog, falling back to cache");
                self.restore_from_cache();
            }
            Err(e) => {
                warn!("Catalog fetch failed ({e}), falling back to cache");
                self.restore_from_cache();
            }
        }

        if !self.cache.exists() && self.db.count().unwrap_or(0) == 0 {
            self.load_bundled();
        }
    }

    /// Parse the active payload and atomically replace the catalog.
    /// Zero records is a failure: the existing catalog is never cleared.
    fn parse_and_store(&self, text: &str) -> Result<usize, StageError> {
        let products = match parse_catalog(text.as_bytes(), self.config.delimiter) {
            Ok(products) => products,
            Err(e) => {
                warn!("Catalog parse failed: {e:#}");
                return Err(StageError::Parse);
            }
        };
        if products.is_empty() {
            return Err(StageError::Parse);
        }
        self.db.replace_all(&products).map_err(StageError::Store)?;
        Ok(products.len())
    }

    fn restore_from_cache(&self) -> bool {
        let text = match self.cache.read() {
            Ok(text) => text,
            Err(e) => {
                debug!("No usable catalog cache: {e:#}");
                return false;
            }
        };
        match self.parse_and_store(&text) {
            Ok(count) => {
                debug!(products = count, "Catalog restored from cache");
                true
            }
            Err(StageError::Parse) => {
                warn!("Cached catalog is corrupt, deleting it");
                self.discard_cache();
                false
            }
            Err(StageError::Store(e)) => {
                error!("Failed to store cached catalog: {e:#}");
                false
            }
        }
    }

    fn load_bundled(&self) {
        let Some(bundled) = &self.config.bundled_catalog else {
            return;
        };
        let products = match parse_catalog(bundled.as_bytes(), self.config.delimiter) {
            Ok(products) if !products.is_empty() => products,
            Ok(_) => {
                warn!("Bundled catalog contains no records");
                return;
            }
            Err(e) => {
                error!("Bundled catalog failed to parse: {e:#}");
                return;
            }
        };
        match self.db.insert_all(&products) {
            Ok(()) => debug!(products = products.len(), "Store seeded from bundled catalog"),
            Err(e) => error!("Failed to seed store from bundled catalog: {e:#}"),
        }
    }

    fn record(&self, etag: Option<String>) {
        let now = Utc::now().timestamp_millis();
        if let Err(e) = self.tracker.record_success(now, etag) {
            warn!("Failed to persist sync state: {e:#}");
        }
    }

    fn discard_cache(&self) {
        if let Err(e) = self.cache.remove() {
            warn!("Failed to delete catalog cache: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::test_support::sample_product;

    const REMOTE_CSV: &str = "\
id,name,category,nutrition
r1,Remote Muesli,Cereal,\"{\"\"energy_kcal\"\": 360}\"
r2,Remote Juice,Drinks,\"{\"\"sugars_g\"\": 9}\"
";

    const CACHED_CSV: &str = "\
id,name,category,nutrition
c1,Cached Beans,Canned,\"{\"\"protein_g\"\": 6}\"
";

    const BUNDLED_CSV: &str = "\
id,name,category,nutrition
b1,Bundled Oats,Cereal,{}
b2,Bundled Rice,Pantry,{}
";

    struct MockSource {
        response: Box<dyn Fn(Option<&str>) -> Result<RemoteResponse, FetchError> + Send + Sync>,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn new(
            response: impl Fn(Option<&str>) -> Result<RemoteResponse, FetchError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                response: Box::new(response),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CatalogSource for MockSource {
        fn fetch_catalog(&self, etag: Option<&str>) -> Result<RemoteResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.response)(etag)
        }
    }

    struct Fixture {
        _dir: TempDir,
        db: Database,
        tracker_path: PathBuf,
        cache_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let tracker_path = dir.path().join("sync_state.json");
            let cache_path = dir.path().join("catalog_cache.csv");
            Self {
                db: Database::open_in_memory().unwrap(),
                tracker_path,
                cache_path,
                _dir: dir,
            }
        }

        fn manager(&self, config: SyncConfig) -> SyncManager<'_> {
            SyncManager::new(
                &self.db,
                FreshnessTracker::new(&self.tracker_path),
                PayloadCache::new(&self.cache_path),
                config,
            )
        }

        fn tracker(&self) -> FreshnessTracker {
            FreshnessTracker::new(&self.tracker_path)
        }

        fn cache(&self) -> PayloadCache {
            PayloadCache::new(&self.cache_path)
        }
    }

    #[test]
    fn test_stale_fetch_replaces_store_and_records_state() {
        let fx = Fixture::new();
        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| {
            Ok(RemoteResponse::Payload {
                text: REMOTE_CSV.to_string(),
                etag: Some("tok-1".to_string()),
            })
        });

        manager.initialize(&source);

        assert_eq!(source.calls(), 1);
        assert_eq!(fx.db.count().unwrap(), 2);
        assert!(fx.db.get_product("r1").unwrap().is_some());

        let state = fx.tracker().load();
        assert!(state.last_fetch_ms > 0);
        assert_eq!(state.etag.as_deref(), Some("tok-1"));
        assert_eq!(fx.cache().read().unwrap(), REMOTE_CSV);
    }

    #[test]
    fn test_fresh_store_skips_network_entirely() {
        let fx = Fixture::new();
        fx.db.insert_all(&[sample_product("p1", "Snacks")]).unwrap();
        fx.tracker()
            .record_success(Utc::now().timestamp_millis(), None)
            .unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| {
            panic!("fetch must not be called while fresh");
        });

        manager.initialize(&source);
        manager.initialize(&source);

        assert_eq!(source.calls(), 0);
        assert_eq!(fx.db.count().unwrap(), 1);
    }

    #[test]
    fn test_empty_store_fetches_even_when_fresh() {
        let fx = Fixture::new();
        fx.tracker()
            .record_success(Utc::now().timestamp_millis(), None)
            .unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| {
            Ok(RemoteResponse::Payload {
                text: REMOTE_CSV.to_string(),
                etag: None,
            })
        });

        manager.initialize(&source);

        assert_eq!(source.calls(), 1);
        assert_eq!(fx.db.count().unwrap(), 2);
    }

    #[test]
    fn test_conditional_request_carries_stored_token() {
        let fx = Fixture::new();
        fx.tracker().record_success(1, Some("tok-9".to_string())).unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|etag| {
            assert_eq!(etag, Some("tok-9"));
            Ok(RemoteResponse::NotModified)
        });

        manager.initialize(&source);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_not_modified_reuses_cache_and_keeps_token() {
        let fx = Fixture::new();
        fx.db.insert_all(&[sample_product("old", "Snacks")]).unwrap();
        fx.cache().write_atomic(CACHED_CSV).unwrap();
        fx.tracker().record_success(1, Some("tok-2".to_string())).unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| Ok(RemoteResponse::NotModified));

        manager.initialize(&source);

        // Store now mirrors the cache, not the pre-existing contents.
        assert_eq!(fx.db.count().unwrap(), 1);
        assert!(fx.db.get_product("c1").unwrap().is_some());
        assert!(fx.db.get_product("old").unwrap().is_none());

        let state = fx.tracker().load();
        assert_eq!(state.etag.as_deref(), Some("tok-2"));
        assert!(state.last_fetch_ms > 1);
    }

    #[test]
    fn test_transport_error_falls_back_to_cache() {
        let fx = Fixture::new();
        fx.db.insert_all(&[sample_product("stale", "Snacks")]).unwrap();
        fx.cache().write_atomic(CACHED_CSV).unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source =
            MockSource::new(|_| Err(FetchError::Transport("connection refused".to_string())));

        manager.initialize(&source);

        assert_eq!(fx.db.count().unwrap(), 1);
        assert!(fx.db.get_product("c1").unwrap().is_some());
        assert!(fx.db.get_product("stale").unwrap().is_none());
        // No successful fetch happened, so nothing was recorded.
        assert_eq!(fx.tracker().load().last_fetch_ms, 0);
    }

    #[test]
    fn test_http_error_status_falls_back_to_cache() {
        let fx = Fixture::new();
        fx.cache().write_atomic(CACHED_CSV).unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| Err(FetchError::Status(500)));

        manager.initialize(&source);

        assert_eq!(fx.db.count().unwrap(), 1);
        assert!(fx.db.get_product("c1").unwrap().is_some());
    }

    #[test]
    fn test_bootstrap_from_bundled_catalog() {
        let fx = Fixture::new();
        let manager = fx.manager(SyncConfig {
            bundled_catalog: Some(BUNDLED_CSV.to_string()),
            ..SyncConfig::default()
        });
        let source =
            MockSource::new(|_| Err(FetchError::Transport("network unreachable".to_string())));

        manager.initialize(&source);

        assert_eq!(fx.db.count().unwrap(), 2);
        assert!(fx.db.get_product("b1").unwrap().is_some());
        assert!(fx.db.get_product("b2").unwrap().is_some());
        assert_eq!(fx.tracker().load().last_fetch_ms, 0);
    }

    #[test]
    fn test_bundled_catalog_not_used_when_cache_recovers() {
        let fx = Fixture::new();
        fx.cache().write_atomic(CACHED_CSV).unwrap();

        let manager = fx.manager(SyncConfig {
            bundled_catalog: Some(BUNDLED_CSV.to_string()),
            ..SyncConfig::default()
        });
        let source = MockSource::new(|_| Err(FetchError::Transport("offline".to_string())));

        manager.initialize(&source);

        assert_eq!(fx.db.count().unwrap(), 1);
        assert!(fx.db.get_product("c1").unwrap().is_some());
        assert!(fx.db.get_product("b1").unwrap().is_none());
    }

    #[test]
    fn test_unparseable_download_keeps_catalog_and_state() {
        let fx = Fixture::new();
        fx.db.insert_all(&[sample_product("keep", "Snacks")]).unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| {
            Ok(RemoteResponse::Payload {
                text: "totally,not,a\ncatalog".to_string(),
                etag: Some("bad".to_string()),
            })
        });

        manager.initialize(&source);

        assert_eq!(fx.db.count().unwrap(), 1);
        assert!(fx.db.get_product("keep").unwrap().is_some());
        // The bad payload was cached, detected, and discarded.
        assert!(!fx.cache().exists());
        let state = fx.tracker().load();
        assert_eq!(state.last_fetch_ms, 0);
        assert!(state.etag.is_none());
    }

    #[test]
    fn test_corrupt_cache_is_deleted_not_retried() {
        let fx = Fixture::new();
        fx.db.insert_all(&[sample_product("keep", "Snacks")]).unwrap();
        fx.cache().write_atomic("][ this is not a catalog").unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| Err(FetchError::Transport("offline".to_string())));

        manager.initialize(&source);

        assert!(fx.db.get_product("keep").unwrap().is_some());
        assert!(!fx.cache().exists());
    }

    #[test]
    fn test_document_store_records_replace_catalog() {
        let fx = Fixture::new();
        fx.db.insert_all(&[sample_product("old", "Snacks")]).unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| {
            Ok(RemoteResponse::Records(vec![
                sample_product("d1", "Drinks"),
                sample_product("d2", "Drinks"),
            ]))
        });

        manager.initialize(&source);

        assert_eq!(fx.db.count().unwrap(), 2);
        assert!(fx.db.get_product("d1").unwrap().is_some());
        assert!(fx.db.get_product("old").unwrap().is_none());
        assert!(fx.tracker().load().last_fetch_ms > 0);
    }

    #[test]
    fn test_empty_document_store_result_falls_back() {
        let fx = Fixture::new();
        fx.cache().write_atomic(CACHED_CSV).unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| Ok(RemoteResponse::Records(Vec::new())));

        manager.initialize(&source);

        assert_eq!(fx.db.count().unwrap(), 1);
        assert!(fx.db.get_product("c1").unwrap().is_some());
        assert_eq!(fx.tracker().load().last_fetch_ms, 0);
    }

    #[test]
    fn test_refresh_ignores_freshness_window() {
        let fx = Fixture::new();
        fx.db.insert_all(&[sample_product("p1", "Snacks")]).unwrap();
        fx.tracker()
            .record_success(Utc::now().timestamp_millis(), None)
            .unwrap();

        let manager = fx.manager(SyncConfig::default());
        let source = MockSource::new(|_| {
            Ok(RemoteResponse::Payload {
                text: REMOTE_CSV.to_string(),
                etag: None,
            })
        });

        manager.refresh(&source);

        assert_eq!(source.calls(), 1);
        assert_eq!(fx.db.count().unwrap(), 2);
    }

    #[test]
    fn test_freshness_tracker_windows() {
        let dir = TempDir::new().unwrap();
        let tracker = FreshnessTracker::new(dir.path().join("state.json"));

        assert!(tracker.should_refresh(1));
        assert_eq!(tracker.last_fetch_display(), "Never");

        let now = Utc::now().timestamp_millis();
        tracker.record_success(now, None).unwrap();
        assert!(!tracker.should_refresh(1));
        assert_ne!(tracker.last_fetch_display(), "Never");

        let eight_days_ago = now - 8 * MILLIS_PER_DAY;
        tracker.record_success(eight_days_ago, None).unwrap();
        assert!(tracker.should_refresh(7));
        assert!(!tracker.should_refresh(30));
    }

    #[test]
    fn test_freshness_tracker_survives_corrupt_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let tracker = FreshnessTracker::new(&path);
        assert!(tracker.should_refresh(1));
        assert_eq!(tracker.last_fetch_display(), "Never");
    }

    #[test]
    fn test_freshness_tracker_reset() {
        let dir = TempDir::new().unwrap();
        let tracker = FreshnessTracker::new(dir.path().join("state.json"));
        tracker
            .record_success(Utc::now().timestamp_millis(), Some("tok".to_string()))
            .unwrap();
        assert!(!tracker.should_refresh(1));

        tracker.reset().unwrap();
        assert!(tracker.should_refresh(1));
        // Resetting twice is fine.
        tracker.reset().unwrap();
    }

    #[test]
    fn test_payload_cache_atomic_overwrite() {
        let dir = TempDir::new().unwrap();
        let cache = PayloadCache::new(dir.path().join("cache.csv"));
        assert!(!cache.exists());
        assert!(cache.read().is_err());

        cache.write_atomic("first").unwrap();
        assert_eq!(cache.read().unwrap(), "first");

        cache.write_atomic("second").unwrap();
        assert_eq!(cache.read().unwrap(), "second");

        // No temp files left behind.
        let stray: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(stray.is_empty());

        cache.remove().unwrap();
        assert!(!cache.exists());
        cache.remove().unwrap();
    }
}
