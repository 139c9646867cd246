//! Integration tests for the agentwork-decision crate.
//!
//! These tests exercise the decision engine end to end: classification,
//! tier selection, layered configuration, single-flight reloads and the
//! decision cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use agentwork_decision::config::keys;
use agentwork_decision::{
    ConfigStore, DecisionEngine, DecisionError, EnvDefaults, MemoryConfigStore, ModelTier,
    SliderConfig, SqliteConfigStore, TieredConfigCache, ToolSpec,
};

// ═══════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════

fn tools(n: usize) -> Vec<ToolSpec> {
    (0..n)
        .map(|i| ToolSpec::new(format!("tool_{i}"), "test tool"))
        .collect()
}

fn engine_with_store(store: Arc<dyn ConfigStore>) -> DecisionEngine {
    DecisionEngine::new(Arc::new(TieredConfigCache::new(
        Some(store),
        EnvDefaults::empty(),
    )))
}

/// Store that counts loads and takes a while to answer.
struct SlowCountingStore {
    loads: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl ConfigStore for SlowCountingStore {
    fn name(&self) -> &str {
        "slow"
    }

    async fn load(&self, _keys: &[&str]) -> agentwork_decision::Result<HashMap<String, String>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(HashMap::from([(
            keys::MODEL_PREMIUM.to_string(),
            "large-model".to_string(),
        )]))
    }
}

/// Store that is always unreachable.
struct DownStore;

#[async_trait]
impl ConfigStore for DownStore {
    fn name(&self) -> &str {
        "down"
    }

    async fn load(&self, _keys: &[&str]) -> agentwork_decision::Result<HashMap<String, String>> {
        Err(DecisionError::StoreUnavailable {
            reason: "connection refused".into(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Scenarios
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn greeting_without_tools() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::new()));
    let d = engine.decide("hi there", None, SliderConfig::new(50)).await;
    assert!(!d.requires_tools);
    assert_eq!(d.tier, ModelTier::Balanced);
    assert!(!d.strip_tools);
}

#[tokio::test]
async fn azure_request_on_cheap_tier() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::with_values([(
        keys::MODEL_CHEAP,
        "small-model",
    )])));
    let tools = tools(5);
    let d = engine
        .decide("list my azure vms", Some(&tools), SliderConfig::new(20))
        .await;
    assert!(d.requires_tools);
    assert_eq!(d.tier, ModelTier::Cheap);
    assert!(!d.strip_tools);
    assert_eq!(d.selected_model, "small-model");
    assert_eq!(d.reasoning, "cloud/infrastructure keyword");
}

#[tokio::test]
async fn thanks_with_stripping_enabled() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::with_values([(
        keys::TOOL_STRIPPING_ENABLED,
        "true",
    )])));
    let tools = tools(5);
    let d = engine
        .decide("thanks so much", Some(&tools), SliderConfig::new(50))
        .await;
    assert!(!d.requires_tools);
    assert!(d.strip_tools);
}

#[tokio::test]
async fn stripping_disabled_keeps_tools() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::with_values([(
        keys::TOOL_STRIPPING_ENABLED,
        "false",
    )])));
    let tools = tools(5);
    let d = engine
        .decide("thanks so much", Some(&tools), SliderConfig::new(50))
        .await;
    assert!(!d.requires_tools);
    assert!(!d.strip_tools);
}

#[tokio::test]
async fn tool_patterns_ignore_slider_position() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::new()));
    for position in [0, 40, 41, 60, 61, 100] {
        let d = engine
            .decide(
                "deploy the terraform plan",
                None,
                SliderConfig::new(position),
            )
            .await;
        assert!(d.requires_tools, "position {position}");
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Decision caching
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn cached_within_ttl_then_recomputed() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::with_values([(
        keys::DECISION_CACHE_TTL_SECONDS,
        "1",
    )])));
    let tools = tools(3);

    let first = engine
        .decide("check my storage accounts", Some(&tools), SliderConfig::new(70))
        .await;
    let second = engine
        .decide("check my storage accounts", Some(&tools), SliderConfig::new(90))
        .await;
    assert!(!first.cached_decision);
    assert!(second.cached_decision);
    assert_eq!(second.requires_tools, first.requires_tools);
    assert_eq!(second.tier, first.tier);
    assert_eq!(second.strip_tools, first.strip_tools);
    assert_eq!(second.reasoning, first.reasoning);
    assert_eq!(second.selected_model, first.selected_model);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let third = engine
        .decide("check my storage accounts", Some(&tools), SliderConfig::new(70))
        .await;
    assert!(!third.cached_decision);
}

#[tokio::test]
async fn different_tier_is_a_different_entry() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::new()));
    engine.decide("hello", None, SliderConfig::new(10)).await;
    let d = engine.decide("hello", None, SliderConfig::new(90)).await;
    assert!(!d.cached_decision);
    assert_eq!(d.tier, ModelTier::Premium);
}

#[tokio::test]
async fn cache_disabled_never_serves_cached() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::with_values([(
        keys::DECISION_CACHE_ENABLED,
        "false",
    )])));
    for _ in 0..3 {
        let d = engine.decide("hello", None, SliderConfig::new(50)).await;
        assert!(!d.cached_decision);
    }
    assert_eq!(engine.cache().entry_count(), 0);
    assert_eq!(engine.cache().stats().hits(), 0);
}

#[tokio::test]
async fn oversized_ttl_still_decides_and_caches() {
    let engine = engine_with_store(Arc::new(MemoryConfigStore::with_values([(
        keys::DECISION_CACHE_TTL_SECONDS,
        u64::MAX.to_string(),
    )])));

    let first = engine.decide("hi there", None, SliderConfig::new(50)).await;
    assert!(!first.requires_tools);
    assert!(!first.cached_decision);

    let second = engine.decide("hi there", None, SliderConfig::new(50)).await;
    assert!(second.cached_decision);
}

// ═══════════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn concurrent_stale_reads_share_one_reload() {
    let store = Arc::new(SlowCountingStore {
        loads: AtomicUsize::new(0),
        delay: Duration::from_millis(50),
    });
    let cache = Arc::new(TieredConfigCache::new(
        Some(store.clone() as Arc<dyn ConfigStore>),
        EnvDefaults::empty(),
    ));

    let readers = (0..32).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get().await })
    });
    let results = futures::future::join_all(readers).await;

    assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    for result in results {
        let config = result.unwrap();
        assert_eq!(config.models.premium.as_deref(), Some("large-model"));
    }
}

#[tokio::test]
async fn config_reloads_after_ttl() {
    let store = Arc::new(SlowCountingStore {
        loads: AtomicUsize::new(0),
        delay: Duration::ZERO,
    });
    let cache = TieredConfigCache::with_ttl(
        Some(store.clone() as Arc<dyn ConfigStore>),
        EnvDefaults::empty(),
        Duration::from_millis(100),
    );

    cache.get().await;
    cache.get().await;
    assert_eq!(store.loads.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    cache.get().await;
    assert_eq!(store.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_store_falls_back_to_env() {
    let env = EnvDefaults::from_lookup(|name| {
        (name == "FUNCTION_CALLING_MODEL_BALANCED").then(|| "env-mid".to_string())
    });
    let engine = DecisionEngine::new(Arc::new(TieredConfigCache::new(
        Some(Arc::new(DownStore)),
        env,
    )));

    let d = engine.decide("hi there", None, SliderConfig::new(50)).await;
    assert_eq!(d.selected_model, "env-mid");
    assert!(!d.requires_tools);
}

#[tokio::test]
async fn unassigned_tier_resolves_empty() {
    let engine = engine_with_store(Arc::new(DownStore));
    let d = engine.decide("hi there", None, SliderConfig::new(99)).await;
    assert_eq!(d.tier, ModelTier::Premium);
    assert!(d.selected_model.is_empty());
}

#[tokio::test]
async fn sqlite_store_drives_model_selection() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteConfigStore::open(dir.path().join("config.db")).unwrap();
    store.set(keys::MODEL_BALANCED, "db-mid").await.unwrap();

    let config = Arc::new(TieredConfigCache::new(
        Some(Arc::new(store.clone())),
        EnvDefaults::empty(),
    ));
    let engine = DecisionEngine::new(Arc::clone(&config));

    let d = engine.decide("hello", None, SliderConfig::new(55)).await;
    assert_eq!(d.selected_model, "db-mid");

    store.set(keys::MODEL_BALANCED, "db-mid-v2").await.unwrap();
    config.invalidate().await;
    let d = engine.decide("good morning", None, SliderConfig::new(55)).await;
    assert_eq!(d.selected_model, "db-mid-v2");
}
