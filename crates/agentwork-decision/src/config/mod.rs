//! Function-calling configuration.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. the persistent [`ConfigStore`], when reachable and the key is set
//! 2. [`EnvDefaults`], the equivalently-named uppercase environment variable
//! 3. built-in defaults (no tier models, stripping and caching enabled)
//!
//! [`TieredConfigCache`] holds the merged result in memory for a fixed TTL.
//! Concurrent callers that find the entry stale share a single reload.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DecisionError, Result};
use crate::tier::ModelAssignment;

pub use store::{MemoryConfigStore, SqliteConfigStore};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Configuration key names shared by the store and the environment.
pub mod keys {
    /// Model id for the cheap tier.
    pub const MODEL_CHEAP: &str = "function_calling_model_cheap";
    /// Model id for the balanced tier.
    pub const MODEL_BALANCED: &str = "function_calling_model_balanced";
    /// Model id for the premium tier.
    pub const MODEL_PREMIUM: &str = "function_calling_model_premium";
    /// Whether tool definitions may be stripped from chat-only turns.
    pub const TOOL_STRIPPING_ENABLED: &str = "tool_stripping_enabled";
    /// Whether decisions are cached.
    pub const DECISION_CACHE_ENABLED: &str = "function_decision_cache_enabled";
    /// Lifetime of a cached decision, in seconds.
    pub const DECISION_CACHE_TTL_SECONDS: &str = "function_decision_cache_ttl_seconds";

    /// Every key, in a stable order.
    pub const ALL: [&str; 6] = [
        MODEL_CHEAP,
        MODEL_BALANCED,
        MODEL_PREMIUM,
        TOOL_STRIPPING_ENABLED,
        DECISION_CACHE_ENABLED,
        DECISION_CACHE_TTL_SECONDS,
    ];
}

/// Default lifetime of a cached decision.
pub const DEFAULT_DECISION_TTL_SECONDS: u64 = 300;

/// Upper bound on the decision cache TTL (one week).
pub const MAX_DECISION_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Default lifetime of the in-memory configuration snapshot.
pub const DEFAULT_CONFIG_TTL: Duration = Duration::from_secs(60);

const CONFIG_CACHE_KEY: &str = "function_calling";

// ---------------------------------------------------------------------------
// Merged configuration
// ---------------------------------------------------------------------------

/// Effective function-calling settings after layering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallingConfig {
    /// Tier → model assignments.
    pub models: ModelAssignment,
    /// Whether tool definitions may be omitted for chat-only turns.
    pub tool_stripping_enabled: bool,
    /// Whether decisions are cached.
    pub decision_cache_enabled: bool,
    /// Lifetime of a cached decision, in seconds.
    pub decision_cache_ttl_seconds: u64,
}

impl Default for FunctionCallingConfig {
    fn default() -> Self {
        Self {
            models: ModelAssignment::default(),
            tool_stripping_enabled: true,
            decision_cache_enabled: true,
            decision_cache_ttl_seconds: DEFAULT_DECISION_TTL_SECONDS,
        }
    }
}

impl FunctionCallingConfig {
    /// Merge store values over environment values over built-in defaults.
    ///
    /// Blank or unparseable values are logged and treated as unset, so the
    /// next layer down applies.
    pub fn from_layers(stored: &HashMap<String, String>, env: &EnvDefaults) -> Self {
        let defaults = Self::default();
        let model = |key: &str| layered(key, stored, env, |_, v| Ok(v.to_owned()));

        Self {
            models: ModelAssignment {
                cheap: model(keys::MODEL_CHEAP),
                balanced: model(keys::MODEL_BALANCED),
                premium: model(keys::MODEL_PREMIUM),
            },
            tool_stripping_enabled: layered(keys::TOOL_STRIPPING_ENABLED, stored, env, parse_flag)
                .unwrap_or(defaults.tool_stripping_enabled),
            decision_cache_enabled: layered(keys::DECISION_CACHE_ENABLED, stored, env, parse_flag)
                .unwrap_or(defaults.decision_cache_enabled),
            decision_cache_ttl_seconds: layered(
                keys::DECISION_CACHE_TTL_SECONDS,
                stored,
                env,
                parse_ttl,
            )
            .unwrap_or(defaults.decision_cache_ttl_seconds),
        }
    }

    /// Decision cache lifetime as a [`Duration`].
    pub fn decision_ttl(&self) -> Duration {
        Duration::from_secs(self.decision_cache_ttl_seconds)
    }
}

/// First value for `key` that parses, checking the store then the
/// environment.
fn layered<T>(
    key: &str,
    stored: &HashMap<String, String>,
    env: &EnvDefaults,
    parse: impl Fn(&str, &str) -> Result<T>,
) -> Option<T> {
    let from_store = stored
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty());

    for (layer, value) in [("store", from_store), ("env", env.get(key))] {
        let Some(value) = value else { continue };
        match parse(key, value) {
            Ok(parsed) => return Some(parsed),
            Err(e) => warn!(layer, error = %e, "ignoring config value"),
        }
    }
    None
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DecisionError::InvalidConfigValue {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

/// Parse a TTL in seconds, clamped to [`MAX_DECISION_TTL_SECONDS`].
fn parse_ttl(key: &str, value: &str) -> Result<u64> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|_| DecisionError::InvalidConfigValue {
            key: key.to_owned(),
            value: value.to_owned(),
        })?;
    if secs > MAX_DECISION_TTL_SECONDS {
        warn!(key, secs, max = MAX_DECISION_TTL_SECONDS, "ttl too large, clamping");
        return Ok(MAX_DECISION_TTL_SECONDS);
    }
    Ok(secs)
}

// ---------------------------------------------------------------------------
// Environment layer
// ---------------------------------------------------------------------------

/// Values captured from environment variables named like the store keys,
/// uppercased (`FUNCTION_CALLING_MODEL_CHEAP`, ...).
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    values: HashMap<String, String>,
}

impl EnvDefaults {
    /// Capture the current process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Capture values through an arbitrary lookup, keyed by the uppercase
    /// variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let values = keys::ALL
            .iter()
            .filter_map(|key| {
                lookup(&key.to_ascii_uppercase())
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (key.to_string(), v))
            })
            .collect();
        Self { values }
    }

    /// No environment overrides.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value for a store key, if the environment set it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// A persistent, read-only (from this crate's perspective) configuration
/// source.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Load the requested keys.  Missing keys are simply absent from the map;
    /// an error means the store itself could not be reached.
    async fn load(&self, keys: &[&str]) -> Result<HashMap<String, String>>;
}

// ---------------------------------------------------------------------------
// TTL cache with single-flight reload
// ---------------------------------------------------------------------------

/// In-memory, TTL-bounded snapshot of [`FunctionCallingConfig`].
///
/// Backed by `moka::future::Cache::get_with`, which coalesces concurrent
/// initialisations of the same key: when the snapshot is stale, the first
/// caller reloads and every concurrent caller awaits that same load.
pub struct TieredConfigCache {
    store: Option<Arc<dyn ConfigStore>>,
    env: EnvDefaults,
    inner: Cache<&'static str, Arc<FunctionCallingConfig>>,
    reloads: AtomicU64,
}

impl TieredConfigCache {
    /// Create a cache with the default 60 s TTL.
    pub fn new(store: Option<Arc<dyn ConfigStore>>, env: EnvDefaults) -> Self {
        Self::with_ttl(store, env, DEFAULT_CONFIG_TTL)
    }

    /// Create a cache with an explicit TTL.
    pub fn with_ttl(store: Option<Arc<dyn ConfigStore>>, env: EnvDefaults, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(1)
            .time_to_live(ttl)
            .build();

        debug!(
            store = store.as_ref().map(|s| s.name()).unwrap_or("none"),
            ttl_ms = ttl.as_millis() as u64,
            "tiered config cache created"
        );

        Self {
            store,
            env,
            inner,
            reloads: AtomicU64::new(0),
        }
    }

    /// Current configuration, reloading at most once per stale period.
    pub async fn get(&self) -> Arc<FunctionCallingConfig> {
        self.inner.get_with(CONFIG_CACHE_KEY, self.reload()).await
    }

    /// Drop the cached snapshot so the next [`get`](Self::get) reloads.
    pub async fn invalidate(&self) {
        self.inner.invalidate(CONFIG_CACHE_KEY).await;
        debug!("tiered config cache invalidated");
    }

    /// How many reloads have run since creation.
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    async fn reload(&self) -> Arc<FunctionCallingConfig> {
        self.reloads.fetch_add(1, Ordering::Relaxed);

        let stored = match &self.store {
            Some(store) => match store.load(&keys::ALL).await {
                Ok(values) => values,
                Err(e) => {
                    warn!(store = store.name(), error = %e, "config store unavailable, using environment defaults");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let config = FunctionCallingConfig::from_layers(&stored, &self.env);
        info!(
            cheap = config.models.cheap.as_deref().unwrap_or(""),
            balanced = config.models.balanced.as_deref().unwrap_or(""),
            premium = config.models.premium.as_deref().unwrap_or(""),
            stripping = config.tool_stripping_enabled,
            cache = config.decision_cache_enabled,
            "function calling config loaded"
        );
        Arc::new(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
