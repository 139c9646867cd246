//! Table-driven intent classifier.
//!
//! Decides whether an inbound chat message needs tool access.  The decision
//! is driven entirely by an ordered table of `(pattern, verdict)` rules so
//! that new rules can be added without touching control flow:
//!
//! | Step | Source | Outcome |
//! |------|--------|---------|
//! | 1 | first matching rule in table order | the rule's verdict + description |
//! | 2 | no rule matched, fewer than 10 words | tools not required |
//! | 3 | no rule matched, 10 words or more | tools required |
//!
//! The built-in table lists every tool-requiring rule before any pure-chat
//! rule, so a message like "what is my azure bill?" requires tools.
//!
//! # Example
//!
//! ```rust
//! # use agentwork_decision::classifier::IntentClassifier;
//! let classifier = IntentClassifier::default();
//! assert!(classifier.classify("list my azure vms").required);
//! assert!(!classifier.classify("hi there").required);
//! ```

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{DecisionError, Result};

/// Messages shorter than this (in whitespace-separated words) that match no
/// rule are treated as plain chat.
pub const SHORT_MESSAGE_WORDS: usize = 10;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What a matching rule concludes about the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The message needs tool definitions in the provider call.
    RequiresTools,
    /// The message is conversational and can be answered without tools.
    PureChat,
}

/// A single, uncompiled classification rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRule {
    /// Regex source.  Matching is case-insensitive.
    pub pattern: String,
    /// Conclusion when the pattern matches.
    pub verdict: Verdict,
    /// Human-readable description, reported as the classification reasoning.
    pub description: String,
}

impl IntentRule {
    /// Create a rule from its parts.
    pub fn new(
        pattern: impl Into<String>,
        verdict: Verdict,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            verdict,
            description: description.into(),
        }
    }
}

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the message needs tool access.
    pub required: bool,
    /// Why the classifier reached this verdict.
    pub reasoning: String,
}

/// A rule with its regex compiled.
#[derive(Debug, Clone)]
struct CompiledRule {
    compiled: Regex,
    verdict: Verdict,
    description: String,
}

// ---------------------------------------------------------------------------
// Built-in rule table
// ---------------------------------------------------------------------------

const TOOL_RULES: &[(&str, &str)] = &[
    (
        r"\b(?:azure|aws|gcp|google cloud|kubernetes|k8s|aks|eks|docker|terraform|vms?|virtual machines?|subscriptions?|resource groups?|storage accounts?|clusters?|entra|active directory)\b",
        "cloud/infrastructure keyword",
    ),
    (
        r"\b(?:create|write|generate|build|make|draft|edit|update|modify)\b.*\b(?:files?|scripts?|code|functions?|class(?:es)?|programs?|documents?|diagrams?|charts?|reports?|spreadsheets?|templates?)\b",
        "file or code creation request",
    ),
    (
        r"\b(?:tools?|mcps?|function call(?:s|ing)?)\b",
        "explicit tool mention",
    ),
    (
        r"\b(?:search (?:the )?(?:web|internet|online)|look up|browse|scrape|download|fetch)\b",
        "web or data retrieval request",
    ),
    (
        r"\b(?:run|execute)\b.*\b(?:commands?|scripts?|quer(?:y|ies)|code|tests?)\b",
        "execution request",
    ),
    (
        r"\b(?:python|javascript|typescript|rust|golang|java|kotlin|swift|sql|bash|powershell|react|vue|angular|node\.?js|django|flask|fastapi|kubectl)\b|\bc(?:\+\+|#)",
        "programming language or framework",
    ),
    (
        r"\.(?:py|js|ts|tsx|jsx|rs|go|java|json|ya?ml|toml|csv|md|sql|sh|ps1|tf|xlsx|docx|pdf)\b",
        "file extension",
    ),
];

const CHAT_RULES: &[(&str, &str)] = &[
    (
        r"^\s*(?:hi|hello|hey|howdy|yo|greetings|good (?:morning|afternoon|evening))\b",
        "greeting",
    ),
    (
        r"\b(?:thanks|thank you|thx|cheers|appreciate it)\b",
        "thanks",
    ),
    (r"^\s*(?:what|who) (?:is|are|was|were)\b", "what-is question"),
    (
        r"^\s*how (?:do|does|did|can|could|should|would)\b",
        "how-do question",
    ),
    (
        r"^\s*(?:explain|define|describe|tell me about)\b",
        "explanation request",
    ),
    (r"\?\s*$", "question"),
];

/// The built-in rule table: tool-requiring rules first, then pure-chat rules.
pub fn default_rules() -> Vec<IntentRule> {
    TOOL_RULES
        .iter()
        .map(|(p, d)| IntentRule::new(*p, Verdict::RequiresTools, *d))
        .chain(
            CHAT_RULES
                .iter()
                .map(|(p, d)| IntentRule::new(*p, Verdict::PureChat, *d)),
        )
        .collect()
}

// ---------------------------------------------------------------------------
// IntentClassifier
// ---------------------------------------------------------------------------

/// Ordered, first-match-wins intent classifier.
///
/// Immutable once built; share it behind an `Arc` or clone it freely.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<CompiledRule>,
}

impl IntentClassifier {
    /// Build a classifier from an ordered rule table.
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn with_rules(rules: impl IntoIterator<Item = IntentRule>) -> Result<Self> {
        let mut compiled_rules = Vec::new();
        for rule in rules {
            let compiled = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| DecisionError::InvalidPattern {
                    pattern: rule.pattern.clone(),
                    reason: e.to_string(),
                })?;

            compiled_rules.push(CompiledRule {
                compiled,
                verdict: rule.verdict,
                description: rule.description,
            });
        }

        tracing::debug!(rules = compiled_rules.len(), "intent classifier built");
        Ok(Self {
            rules: compiled_rules,
        })
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table is empty (every message falls through to the
    /// word-count default).
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify a message.  Pure and total.
    pub fn classify(&self, message: &str) -> Classification {
        if let Some(rule) = self.rules.iter().find(|r| r.compiled.is_match(message)) {
            return Classification {
                required: rule.verdict == Verdict::RequiresTools,
                reasoning: rule.description.clone(),
            };
        }

        if message.split_whitespace().count() < SHORT_MESSAGE_WORDS {
            Classification {
                required: false,
                reasoning: "short message unlikely to need tools".into(),
            }
        } else {
            Classification {
                required: true,
                reasoning: "default: include tools for complex messages".into(),
            }
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::with_rules(default_rules()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "built-in intent rules failed to compile");
            Self { rules: Vec::new() }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
