//! TOML configuration file for the `decide` subcommand.
//!
//! ```toml
//! [function_calling]
//! model_cheap = "small-model"
//! model_balanced = "mid-model"
//! model_premium = "large-model"
//! tool_stripping_enabled = true
//! decision_cache_enabled = true
//! decision_cache_ttl_seconds = 300
//! ```
//!
//! The file seeds a [`MemoryConfigStore`], so it sits at the same precedence
//! as a persistent store: above environment variables, below nothing.

use std::path::Path;

use agentwork_decision::MemoryConfigStore;
use agentwork_decision::config::keys;
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub function_calling: FunctionCallingSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct FunctionCallingSection {
    pub model_cheap: Option<String>,
    pub model_balanced: Option<String>,
    pub model_premium: Option<String>,
    pub tool_stripping_enabled: Option<bool>,
    pub decision_cache_enabled: Option<bool>,
    pub decision_cache_ttl_seconds: Option<u64>,
}

impl SettingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Flatten the section into a store keyed like the database table.
    pub fn into_store(self) -> MemoryConfigStore {
        let fc = self.function_calling;
        let store = MemoryConfigStore::new();

        let strings = [
            (keys::MODEL_CHEAP, fc.model_cheap),
            (keys::MODEL_BALANCED, fc.model_balanced),
            (keys::MODEL_PREMIUM, fc.model_premium),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                store.set(key, value);
            }
        }

        let flags = [
            (keys::TOOL_STRIPPING_ENABLED, fc.tool_stripping_enabled),
            (keys::DECISION_CACHE_ENABLED, fc.decision_cache_enabled),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                store.set(key, value.to_string());
            }
        }

        if let Some(ttl) = fc.decision_cache_ttl_seconds {
            store.set(keys::DECISION_CACHE_TTL_SECONDS, ttl.to_string());
        }

        store
    }
}
