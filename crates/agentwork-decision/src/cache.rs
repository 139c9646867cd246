//! TTL cache of function-calling decisions, backed by [`moka`].
//!
//! Entries carry an absolute expiry.  Reads reject expired entries even if
//! moka has not evicted them yet; eviction (inline or via
//! [`DecisionCache::spawn_sweeper`]) only bounds memory.  Reads never remove
//! entries, so a concurrent `put` under the same key is never lost.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use ring::digest;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::FunctionCallDecision;
use crate::tier::ModelTier;

/// Default sweep interval for [`DecisionCache::spawn_sweeper`].
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ── key ──────────────────────────────────────────────────────────────

/// Stable hash of `(lowercased-trimmed message, tool count, tier)`.
///
/// Messages differing only in inner whitespace or punctuation hash to
/// different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for a decision request.  Total.
    pub fn new(message: &str, tool_count: usize, tier: ModelTier) -> Self {
        let normalized = message.trim().to_lowercase();

        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(normalized.as_bytes());
        ctx.update(&[0x1f]);
        ctx.update(tool_count.to_string().as_bytes());
        ctx.update(&[0x1f]);
        ctx.update(tier.as_str().as_bytes());

        let hex = ctx
            .finish()
            .as_ref()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        Self(hex)
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Total cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total cache misses since creation (expired reads included).
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Reads that found an entry past its expiry.
    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0 (0.0 if no lookups).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} expired={} rate={:.2}%",
            self.hits(),
            self.misses(),
            self.expired(),
            self.hit_rate() * 100.0,
        )
    }
}

// ── entries ──────────────────────────────────────────────────────────

/// A decision plus its absolute expiry.  Never leaves this module.
#[derive(Debug, Clone)]
struct CachedDecision {
    decision: FunctionCallDecision,
    expires_at: Instant,
}

/// Per-entry expiry for moka, derived from [`CachedDecision::expires_at`].
struct DecisionExpiry;

impl Expiry<CacheKey, CachedDecision> for DecisionExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CachedDecision,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CachedDecision,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

// ── cache ────────────────────────────────────────────────────────────

/// Shared, concurrent decision cache.  Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct DecisionCache {
    inner: Cache<CacheKey, CachedDecision>,
    stats: Arc<CacheStats>,
}

impl DecisionCache {
    /// Create a cache holding at most `max_capacity` decisions.
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(DecisionExpiry)
            .build();

        debug!(max_capacity, "decision cache created");

        Self {
            inner,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Look up a live decision.  Expired entries are reported as a miss and
    /// left for moka's per-entry expiry to evict.
    pub async fn get(&self, key: &CacheKey) -> Option<FunctionCallDecision> {
        match self.inner.get(key).await {
            Some(entry) if Instant::now() < entry.expires_at => {
                self.stats.record_hit();
                debug!(key = %key, "decision cache hit");
                Some(entry.decision)
            }
            Some(_) => {
                self.stats.record_expired();
                self.stats.record_miss();
                debug!(key = %key, "decision cache entry expired");
                None
            }
            None => {
                self.stats.record_miss();
                debug!(key = %key, "decision cache miss");
                None
            }
        }
    }

    /// Store a decision for `ttl`.  A zero TTL, or one too large to
    /// represent as a deadline, stores nothing.
    pub async fn put(&self, key: CacheKey, decision: FunctionCallDecision, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            warn!(key = %key, ttl_secs = ttl.as_secs(), "decision ttl overflows, not caching");
            return;
        };
        debug!(key = %key, ttl_secs = ttl.as_secs_f64(), "decision cache insert");
        let entry = CachedDecision {
            decision,
            expires_at,
        };
        self.inner.insert(key, entry).await;
    }

    /// Remove all entries.
    pub async fn invalidate_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        debug!("decision cache invalidate_all");
    }

    /// Run pending evictions now, removing expired entries.
    pub async fn sweep(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Approximate number of stored entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Spawn a task that sweeps every `interval`.  Abort the returned handle
    /// to stop it.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep().await;
                debug!(entries = cache.entry_count(), "decision cache swept");
            }
        })
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

// ── tests ────────────────────────────────────────────────────────────
