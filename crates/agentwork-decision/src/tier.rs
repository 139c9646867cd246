//! Tiered model selection.
//!
//! Maps the 0–100 intelligence slider to a cost/capability [`ModelTier`] and
//! resolves the configured model identifier for that tier.  An empty model id
//! means "no assignment for this tier, the caller uses the system default".

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::TieredConfigCache;

/// Highest slider position that still selects [`ModelTier::Cheap`].
pub const CHEAP_MAX_POSITION: u8 = 40;

/// Highest slider position that still selects [`ModelTier::Balanced`].
pub const BALANCED_MAX_POSITION: u8 = 60;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Cost/capability bucket a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fast, inexpensive models.
    Cheap,
    /// Mid-range models.
    Balanced,
    /// Most capable models.
    Premium,
}

impl ModelTier {
    /// Lowercase name, as used in configuration keys and cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Balanced => "balanced",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied cost/quality preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliderConfig {
    /// Slider position, 0 (cheapest) to 100 (most capable).  Values above 100
    /// are treated as 100.
    pub position: u8,
}

impl SliderConfig {
    /// Create a slider config at the given position.
    pub fn new(position: u8) -> Self {
        Self { position }
    }

    /// The tier this slider position selects.
    pub fn tier(self) -> ModelTier {
        select_tier(self.position)
    }
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self { position: 50 }
    }
}

/// Map a slider position to a tier.
///
/// `0..=40` is cheap, `41..=60` is balanced, `61..=100` is premium.
pub fn select_tier(position: u8) -> ModelTier {
    match position.min(100) {
        p if p <= CHEAP_MAX_POSITION => ModelTier::Cheap,
        p if p <= BALANCED_MAX_POSITION => ModelTier::Balanced,
        _ => ModelTier::Premium,
    }
}

// ---------------------------------------------------------------------------
// Model assignment
// ---------------------------------------------------------------------------

/// Tier → model id mapping.  `None` means "fall back to the default model".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAssignment {
    /// Model for the cheap tier.
    #[serde(default)]
    pub cheap: Option<String>,
    /// Model for the balanced tier.
    #[serde(default)]
    pub balanced: Option<String>,
    /// Model for the premium tier.
    #[serde(default)]
    pub premium: Option<String>,
}

impl ModelAssignment {
    /// The configured model for a tier, if any.
    pub fn model_for(&self, tier: ModelTier) -> Option<&str> {
        let slot = match tier {
            ModelTier::Cheap => &self.cheap,
            ModelTier::Balanced => &self.balanced,
            ModelTier::Premium => &self.premium,
        };
        slot.as_deref().filter(|m| !m.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Resolves tiers to model ids through the TTL-cached configuration.
#[derive(Clone)]
pub struct TieredModelSelector {
    config: Arc<TieredConfigCache>,
}

impl TieredModelSelector {
    /// Create a selector backed by a shared configuration cache.
    pub fn new(config: Arc<TieredConfigCache>) -> Self {
        Self { config }
    }

    /// Map a slider position to a tier.
    pub fn select_tier(&self, position: u8) -> ModelTier {
        select_tier(position)
    }

    /// Resolve the configured model id for a tier.
    ///
    /// Returns an empty string when the tier has no assignment.  Never fails:
    /// configuration problems have already degraded to defaults inside the
    /// cache.
    pub async fn resolve_model(&self, tier: ModelTier) -> String {
        let config = self.config.get().await;
        let model = config.models.model_for(tier).unwrap_or_default().to_owned();
        tracing::debug!(%tier, model = %model, "resolved tier model");
        model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert_eq!(select_tier(0), ModelTier::Cheap);
        assert_eq!(select_tier(40), ModelTier::Cheap);
        assert_eq!(select_tier(41), ModelTier::Balanced);
        assert_eq!(select_tier(60), ModelTier::Balanced);
        assert_eq!(select_tier(61), ModelTier::Premium);
        assert_eq!(select_tier(100), ModelTier::Premium);
    }

    #[test]
    fn out_of_range_position_is_premium() {
        assert_eq!(select_tier(255), ModelTier::Premium);
    }

    #[test]
    fn slider_default_is_balanced() {
        assert_eq!(SliderConfig::default().tier(), ModelTier::Balanced);
    }

    #[test]
    fn assignment_ignores_blank_models() {
        let assignment = ModelAssignment {
            cheap: Some("small-model".into()),
            balanced: Some("   ".into()),
            premium: None,
        };
        assert_eq!(assignment.model_for(ModelTier::Cheap), Some("small-model"));
        assert_eq!(assignment.model_for(ModelTier::Balanced), None);
        assert_eq!(assignment.model_for(ModelTier::Premium), None);
    }

    #[test]
    fn tier_serializes_lowercase() {
        let json = serde_json::to_string(&ModelTier::Premium).unwrap();
        assert_eq!(json, "\"premium\"");
    }
}
