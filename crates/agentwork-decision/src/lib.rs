//! Tiered function-calling decision engine for AgentWork.
//!
//! Decides, for each inbound chat turn, whether the provider call needs tool
//! definitions and which cost/capability tier serves it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │  DecisionEngine                                │
//! ├──────────────────┬─────────────────────────────┤
//! │ IntentClassifier │ TieredModelSelector         │
//! │ (regex table)    │   └─ TieredConfigCache      │
//! │                  │        (moka, single-flight)│
//! │                  │        ├─ ConfigStore       │
//! │                  │        └─ EnvDefaults       │
//! ├──────────────────┴─────────────────────────────┤
//! │  DecisionCache (moka, per-entry expiry)        │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`classifier`] -- Ordered `(pattern, verdict)` intent rules.
//! - [`tier`] -- Slider → tier mapping and tier → model resolution.
//! - [`config`] -- Layered configuration, stores, and the TTL snapshot cache.
//! - [`cache`] -- Decision cache keyed by message hash, tool count and tier.
//! - [`engine`] -- [`DecisionEngine::decide`].
//! - [`error`] -- Error types.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod tier;

pub use cache::{CacheKey, CacheStats, DecisionCache};
pub use classifier::{Classification, IntentClassifier, IntentRule, Verdict};
pub use config::{
    ConfigStore, EnvDefaults, FunctionCallingConfig, MemoryConfigStore, SqliteConfigStore,
    TieredConfigCache,
};
pub use engine::{DecisionEngine, FunctionCallDecision, ToolSpec};
pub use error::{DecisionError, Result};
pub use tier::{ModelAssignment, ModelTier, SliderConfig, TieredModelSelector, select_tier};
