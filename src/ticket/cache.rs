//! # Ticket Cache
//!
//! TTL-bounded, LRU-evicting cache keyed by `(platform, ticket id)`.
//!
//! Two implementations share the [`TicketCache`] trait:
//!
//! - [`InMemoryTicketCache`] - process-local, insertion-ordered map
//! - [`FileTicketCache`] - one JSON file per entry, survives restarts
//!
//! Both are thread-safe behind a single mutex; lock hold times are short so
//! a reader-writer split is not worth the complexity. Callers never observe
//! a partially written entry, and tickets returned from the cache are deep
//! copies; mutating them cannot corrupt cached state.
//!
//! Filesystem and JSON-decode failures are logged and treated as cache
//! misses; they never propagate to callers.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{GenericTicket, Platform};

/// Default entry lifetime when the caller does not pass one.
pub const DEFAULT_TTL_HOURS: i64 = 1;

// ============================================================================
// CACHE KEY
// ============================================================================

/// Unique cache key for ticket data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub platform: Platform,
    pub ticket_id: String,
}

impl CacheKey {
    pub fn new(platform: Platform, ticket_id: impl Into<String>) -> Self {
        Self { platform, ticket_id: ticket_id.into() }
    }

    pub fn from_ticket(ticket: &GenericTicket) -> Self {
        Self::new(ticket.platform, ticket.id.clone())
    }

    /// Stable string rendering used for storage: `"<PLATFORM>:<id>"`.
    pub fn as_storage_key(&self) -> String {
        format!("{}:{}", self.platform.name(), self.ticket_id)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform.name(), self.ticket_id)
    }
}

// ============================================================================
// CACHED TICKET
// ============================================================================

/// Cached ticket with expiration metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTicket {
    pub ticket: GenericTicket,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub etag: Option<String>,
}

impl CachedTicket {
    fn new(ticket: GenericTicket, ttl: Duration, etag: Option<String>) -> Self {
        let now = Utc::now();
        Self { ticket, cached_at: now, expires_at: now + ttl, etag }
    }

    /// True once wall-clock time reaches `expires_at`.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Remaining time-to-live, clamped at zero.
    pub fn ttl_remaining(&self) -> Duration {
        let remaining = self.expires_at - Utc::now();
        if remaining > Duration::zero() { remaining } else { Duration::zero() }
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// Thread-safe ticket cache.
pub trait TicketCache: Send + Sync {
    /// Retrieve the cached ticket if present and not expired. Expired
    /// entries are removed on access.
    fn get(&self, key: &CacheKey) -> Option<GenericTicket> {
        self.get_cached(key).map(|c| c.ticket)
    }

    /// Retrieve the full entry with metadata, or `None` if missing/expired.
    fn get_cached(&self, key: &CacheKey) -> Option<CachedTicket>;

    /// Store a ticket with an optional TTL override and ETag.
    fn set(&self, ticket: &GenericTicket, ttl: Option<Duration>, etag: Option<String>);

    /// Remove a specific entry.
    fn invalidate(&self, key: &CacheKey);

    /// Remove every entry.
    fn clear(&self);

    /// Remove every entry for one platform.
    fn clear_platform(&self, platform: Platform);

    /// ETag for conditional requests, if one was stored.
    fn get_etag(&self, key: &CacheKey) -> Option<String> {
        self.get_cached(key).and_then(|c| c.etag)
    }

    /// Current number of live entries.
    fn size(&self) -> usize;

    /// Entry counts per platform name.
    fn stats(&self) -> BTreeMap<String, usize>;
}

// ============================================================================
// IN-MEMORY VARIANT
// ============================================================================

struct MemoryInner {
    entries: HashMap<String, CachedTicket>,
    /// Access order, least-recently-used first.
    order: Vec<String>,
}

/// In-memory ticket cache with LRU eviction.
///
/// The default implementation for process-local caching.
pub struct InMemoryTicketCache {
    default_ttl: Duration,
    /// Maximum entries before eviction; 0 means unlimited.
    max_size: usize,
    inner: Mutex<MemoryInner>,
}

impl InMemoryTicketCache {
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            default_ttl,
            max_size,
            inner: Mutex::new(MemoryInner { entries: HashMap::new(), order: Vec::new() }),
        }
    }

    fn touch(order: &mut Vec<String>, key: &str) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            let k = order.remove(pos);
            order.push(k);
        }
    }

    fn remove_entry(inner: &mut MemoryInner, key: &str) {
        inner.entries.remove(key);
        if let Some(pos) = inner.order.iter().position(|k| k == key) {
            inner.order.remove(pos);
        }
    }
}

impl Default for InMemoryTicketCache {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_TTL_HOURS), 0)
    }
}

impl TicketCache for InMemoryTicketCache {
    fn get_cached(&self, key: &CacheKey) -> Option<CachedTicket> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let key_str = key.as_storage_key();

        let cached = inner.entries.get(&key_str)?.clone();
        if cached.is_expired() {
            Self::remove_entry(&mut inner, &key_str);
            debug!(%key, "cache expired");
            return None;
        }

        Self::touch(&mut inner.order, &key_str);
        debug!(%key, "cache hit");
        Some(cached)
    }

    fn set(&self, ticket: &GenericTicket, ttl: Option<Duration>, etag: Option<String>) {
        let key = CacheKey::from_ticket(ticket);
        let key_str = key.as_storage_key();
        let effective_ttl = ttl.unwrap_or(self.default_ttl);
        let cached = CachedTicket::new(ticket.clone(), effective_ttl, etag);

        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        Self::remove_entry(&mut inner, &key_str);

        while self.max_size > 0 && inner.entries.len() >= self.max_size {
            let Some(oldest) = inner.order.first().cloned() else { break };
            Self::remove_entry(&mut inner, &oldest);
            debug!(key = %oldest, "LRU evicted");
        }

        inner.entries.insert(key_str.clone(), cached);
        inner.order.push(key_str);
        debug!(%key, ttl_secs = effective_ttl.num_seconds(), "cached ticket");
    }

    fn invalidate(&self, key: &CacheKey) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        Self::remove_entry(&mut inner, &key.as_storage_key());
        debug!(%key, "invalidated cache entry");
    }

    fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let count = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        debug!(count, "cleared cache");
    }

    fn clear_platform(&self, platform: Platform) {
        let prefix = format!("{}:", platform.name());
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let keys: Vec<String> =
            inner.entries.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
        for key in &keys {
            Self::remove_entry(&mut inner, key);
        }
        debug!(count = keys.len(), platform = platform.name(), "cleared platform entries");
    }

    fn size(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").entries.len()
    }

    fn stats(&self) -> BTreeMap<String, usize> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        let mut stats = BTreeMap::new();
        for key in inner.entries.keys() {
            let platform = key.split(':').next().unwrap_or("").to_string();
            *stats.entry(platform).or_insert(0) += 1;
        }
        stats
    }
}

// ============================================================================
// FILE-BACKED VARIANT
// ============================================================================

/// File-based persistent ticket cache.
///
/// Each entry lives in `<cache_dir>/<PLATFORM>_<sha256(id)[..16]>.json`.
/// The id hash keeps filenames filesystem-safe regardless of what the
/// platform puts in a ticket id. File mtime is the LRU indicator.
pub struct FileTicketCache {
    cache_dir: PathBuf,
    default_ttl: Duration,
    max_size: usize,
    lock: Mutex<()>,
}

impl FileTicketCache {
    /// Create the cache, creating `cache_dir` if needed. Falls back to an
    /// unwritable-dir-tolerant state: failures surface later as misses.
    pub fn new(cache_dir: impl Into<PathBuf>, default_ttl: Duration, max_size: usize) -> Self {
        let cache_dir = cache_dir.into();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            warn!(dir = %cache_dir.display(), error = %e, "failed to create cache dir");
        }
        Self { cache_dir, default_ttl, max_size, lock: Mutex::new(()) }
    }

    /// Default directory: `~/.ingot-cache`.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".ingot-cache")
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.ticket_id.as_bytes());
        let safe_id = hex_prefix(&digest, 16);
        self.cache_dir.join(format!("{}_{}.json", key.platform.name(), safe_id))
    }

    fn read_entry(path: &Path) -> Option<CachedTicket> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "failed to read cache file");
                return None;
            }
        };
        match serde_json::from_str::<CachedTicket>(&data) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache file, removing");
                let _ = std::fs::remove_file(path);
                None
            }
        }
    }

    fn json_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.cache_dir) else { return Vec::new() };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    fn evict_lru(&self) {
        if self.max_size == 0 {
            return;
        }
        let mut files = self.json_files();
        if files.len() <= self.max_size {
            return;
        }
        files.sort_by_key(|p| {
            p.metadata().and_then(|m| m.modified()).unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
        let to_remove = files.len() - self.max_size;
        for path in files.into_iter().take(to_remove) {
            let _ = std::fs::remove_file(&path);
            debug!(path = %path.display(), "LRU evicted cache file");
        }
    }
}

impl TicketCache for FileTicketCache {
    fn get_cached(&self, key: &CacheKey) -> Option<CachedTicket> {
        let _guard = self.lock.lock().expect("cache mutex poisoned");
        let path = self.entry_path(key);
        if !path.exists() {
            return None;
        }
        let cached = Self::read_entry(&path)?;
        if cached.is_expired() {
            let _ = std::fs::remove_file(&path);
            debug!(%key, "cache expired");
            return None;
        }
        debug!(%key, "cache hit");
        Some(cached)
    }

    fn set(&self, ticket: &GenericTicket, ttl: Option<Duration>, etag: Option<String>) {
        let key = CacheKey::from_ticket(ticket);
        let cached = CachedTicket::new(ticket.clone(), ttl.unwrap_or(self.default_ttl), etag);
        let path = self.entry_path(&key);

        let _guard = self.lock.lock().expect("cache mutex poisoned");
        match serde_json::to_string_pretty(&cached) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    warn!(path = %path.display(), error = %e, "failed to write cache file");
                    return;
                }
                debug!(%key, path = %path.display(), "cached ticket");
                self.evict_lru();
            }
            Err(e) => warn!(%key, error = %e, "failed to serialize cache entry"),
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        let _guard = self.lock.lock().expect("cache mutex poisoned");
        let path = self.entry_path(key);
        if path.exists() {
            let _ = std::fs::remove_file(&path);
            debug!(%key, "invalidated cache entry");
        }
    }

    fn clear(&self) {
        let _guard = self.lock.lock().expect("cache mutex poisoned");
        let mut count = 0usize;
        for path in self.json_files() {
            let _ = std::fs::remove_file(&path);
            count += 1;
        }
        debug!(count, "cleared cache files");
    }

    fn clear_platform(&self, platform: Platform) {
        let prefix = format!("{}_", platform.name());
        let _guard = self.lock.lock().expect("cache mutex poisoned");
        let mut count = 0usize;
        for path in self.json_files() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with(&prefix) {
                let _ = std::fs::remove_file(&path);
                count += 1;
            }
        }
        debug!(count, platform = platform.name(), "cleared platform cache files");
    }

    fn size(&self) -> usize {
        let _guard = self.lock.lock().expect("cache mutex poisoned");
        self.json_files().len()
    }

    fn stats(&self) -> BTreeMap<String, usize> {
        let _guard = self.lock.lock().expect("cache mutex poisoned");
        let mut stats = BTreeMap::new();
        for path in self.json_files() {
            let name = path.file_stem().and_then(|n| n.to_str()).unwrap_or("");
            // Filename format: PLATFORM_hash. AZURE_DEVOPS contains an
            // underscore itself, so split from the right.
            let platform = name.rsplit_once('_').map(|(p, _)| p).unwrap_or(name).to_string();
            *stats.entry(platform).or_insert(0) += 1;
        }
        stats
    }
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

// ============================================================================
// GLOBAL SINGLETON
// ============================================================================

/// Which cache implementation backs the global singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Memory,
    File,
}

struct GlobalCache {
    cache: Arc<dyn TicketCache>,
    kind: CacheKind,
}

static GLOBAL_CACHE: Mutex<Option<GlobalCache>> = Mutex::new(None);

/// Get or create the global cache singleton.
///
/// After the first call, subsequent calls return the existing instance; a
/// differing `kind` logs a warning but does not reinitialise. Call
/// [`clear_global_cache`] first to start over with different settings.
pub fn get_global_cache(kind: CacheKind, default_ttl: Duration, max_size: usize) -> Arc<dyn TicketCache> {
    let mut slot = GLOBAL_CACHE.lock().expect("global cache mutex poisoned");
    match slot.as_ref() {
        Some(global) => {
            if global.kind != kind {
                warn!(
                    requested = ?kind,
                    initialized = ?global.kind,
                    "global cache already initialized with a different kind; \
                     returning existing cache (clear_global_cache() to reinitialize)"
                );
            }
            Arc::clone(&global.cache)
        }
        None => {
            let cache: Arc<dyn TicketCache> = match kind {
                CacheKind::File => {
                    info!("initialized file-based ticket cache");
                    Arc::new(FileTicketCache::new(FileTicketCache::default_dir(), default_ttl, max_size))
                }
                CacheKind::Memory => {
                    info!("initialized in-memory ticket cache");
                    Arc::new(InMemoryTicketCache::new(default_ttl, max_size))
                }
            };
            *slot = Some(GlobalCache { cache: Arc::clone(&cache), kind });
            cache
        }
    }
}

/// Replace the global cache instance (primarily for tests).
pub fn set_global_cache(cache: Arc<dyn TicketCache>, kind: CacheKind) {
    let mut slot = GLOBAL_CACHE.lock().expect("global cache mutex poisoned");
    *slot = Some(GlobalCache { cache, kind });
}

/// Clear and reset the global cache singleton.
pub fn clear_global_cache() {
    let mut slot = GLOBAL_CACHE.lock().expect("global cache mutex poisoned");
    if let Some(global) = slot.take() {
        global.cache.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================
