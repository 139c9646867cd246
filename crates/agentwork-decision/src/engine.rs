//! The function-calling decision engine.
//!
//! For each inbound chat turn the engine decides whether the provider call
//! needs tool definitions and which model tier serves it:
//!
//! ```text
//! message, tools, slider
//!        │
//!        ├──> tier (slider) ──> cache key ──> cache hit? ──> return (cached)
//!        │                                         │ miss
//!        ├──> classify intent <────────────────────┘
//!        ├──> strip = stripping enabled && !required && tools > 0
//!        ├──> resolve tier model (may be empty)
//!        └──> cache (if enabled) ──> return
//! ```
//!
//! `decide` never fails.  Configuration problems degrade to defaults inside
//! [`TieredConfigCache`] and the classifier is total.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CacheKey, DecisionCache};
use crate::classifier::IntentClassifier;
use crate::config::TieredConfigCache;
use crate::tier::{ModelTier, SliderConfig, TieredModelSelector};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The engine's verdict for one chat turn.  Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallDecision {
    /// Whether the turn needs tool access.
    pub requires_tools: bool,
    /// Model id for the selected tier.  Empty means "use the system default".
    pub selected_model: String,
    /// Selected cost/capability tier.
    pub tier: ModelTier,
    /// Whether tool definitions should be omitted from the provider call.
    pub strip_tools: bool,
    /// Why the classifier reached its verdict.
    pub reasoning: String,
    /// Whether this decision was served from the cache.
    pub cached_decision: bool,
}

/// A tool definition offered to the model.  Only the count influences the
/// decision; the rest is carried for callers that build provider requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the tool's input.
    #[serde(default)]
    pub input_schema: Value,
}

impl ToolSpec {
    /// Create a tool spec with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Composes classifier, tier selector, configuration and decision cache.
///
/// Construct once at startup and share (`Arc<DecisionEngine>`) across request
/// handlers; all internal state is safe for concurrent use.
pub struct DecisionEngine {
    classifier: IntentClassifier,
    selector: TieredModelSelector,
    config: Arc<TieredConfigCache>,
    cache: DecisionCache,
}

impl DecisionEngine {
    /// Create an engine with the built-in classifier table and a default
    /// decision cache.
    pub fn new(config: Arc<TieredConfigCache>) -> Self {
        Self {
            classifier: IntentClassifier::default(),
            selector: TieredModelSelector::new(Arc::clone(&config)),
            config,
            cache: DecisionCache::default(),
        }
    }

    /// Replace the classifier.
    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the decision cache (e.g. to share one across engines).
    pub fn with_cache(mut self, cache: DecisionCache) -> Self {
        self.cache = cache;
        self
    }

    /// The decision cache, for statistics and sweeping.
    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Decide how to serve one chat turn.
    pub async fn decide(
        &self,
        message: &str,
        tools: Option<&[ToolSpec]>,
        slider: SliderConfig,
    ) -> FunctionCallDecision {
        let tool_count = tools.map_or(0, <[ToolSpec]>::len);
        let tier = self.selector.select_tier(slider.position);
        let config = self.config.get().await;
        let key = CacheKey::new(message, tool_count, tier);

        if config.decision_cache_enabled {
            if let Some(mut cached) = self.cache.get(&key).await {
                cached.cached_decision = true;
                debug!(%tier, tool_count, "serving cached decision");
                return cached;
            }
        }

        let classification = self.classifier.classify(message);
        let strip_tools =
            config.tool_stripping_enabled && !classification.required && tool_count > 0;
        let selected_model = self.selector.resolve_model(tier).await;

        let decision = FunctionCallDecision {
            requires_tools: classification.required,
            selected_model,
            tier,
            strip_tools,
            reasoning: classification.reasoning,
            cached_decision: false,
        };

        info!(
            %tier,
            tool_count,
            requires_tools = decision.requires_tools,
            strip_tools = decision.strip_tools,
            model = %decision.selected_model,
            reasoning = %decision.reasoning,
            "function calling decision"
        );

        if config.decision_cache_enabled {
            self.cache
                .put(key, decision.clone(), config.decision_ttl())
                .await;
        }

        decision
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvDefaults;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(Arc::new(TieredConfigCache::new(None, EnvDefaults::empty())))
    }

    fn tools(n: usize) -> Vec<ToolSpec> {
        (0..n).map(|i| ToolSpec::new(format!("tool_{i}"), "test tool")).collect()
    }

    #[tokio::test]
    async fn chat_without_tools_is_not_stripped() {
        let d = engine().decide("hi there", None, SliderConfig::new(50)).await;
        assert!(!d.requires_tools);
        assert_eq!(d.tier, ModelTier::Balanced);
        assert!(!d.strip_tools);
        assert!(d.selected_model.is_empty());
    }

    #[tokio::test]
    async fn chat_with_tools_is_stripped() {
        let tools = tools(5);
        let d = engine()
            .decide("thanks so much", Some(&tools), SliderConfig::new(50))
            .await;
        assert!(!d.requires_tools);
        assert!(d.strip_tools);
    }

    #[tokio::test]
    async fn second_call_is_cached() {
        let engine = engine();
        let tools = tools(2);
        let first = engine.decide("hello", Some(&tools), SliderConfig::new(10)).await;
        let second = engine.decide("  HELLO ", Some(&tools), SliderConfig::new(30)).await;
        assert!(!first.cached_decision);
        assert!(second.cached_decision);
        assert_eq!(
            FunctionCallDecision {
                cached_decision: false,
                ..second
            },
            first
        );
    }

    #[test]
    fn decision_serializes_camel_case() {
        let d = FunctionCallDecision {
            requires_tools: true,
            selected_model: String::new(),
            tier: ModelTier::Cheap,
            strip_tools: false,
            reasoning: "r".into(),
            cached_decision: false,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["requiresTools"], true);
        assert_eq!(json["tier"], "cheap");
        assert_eq!(json["cachedDecision"], false);
    }
}
