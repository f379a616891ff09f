//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs to mention the values it changes.

use relay_core::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Which kind of remote object a session streams into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderSurface {
    /// A rich entity (card) with sequenced partial updates.
    #[default]
    Structured,
    /// An ordinary message edited in place.
    Plain,
}

impl RenderSurface {
    /// Parse the wire name (`"structured"` / `"plain"`), case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "structured" | "card" => Some(Self::Structured),
            "plain" | "text" => Some(Self::Plain),
            _ => None,
        }
    }
}

/// Root settings for the streaming delivery controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingSettings {
    /// Whether incremental delivery is enabled at all.
    pub enabled: bool,
    /// Surface each session streams into.
    pub render_surface: RenderSurface,
    /// Throttle window between outbound updates, in ms.
    pub throttle_ms: u64,
    /// Create the entity eagerly with placeholder content.
    pub eager_placeholder: bool,
    /// Content of an eagerly created entity.
    pub placeholder_text: String,
    /// Content an abandoned entity is cleared to.
    pub abandoned_text: String,
    /// Maximum characters of the summary sent on finalize.
    pub summary_max_chars: usize,
    /// Whether callers should disable block-mode delivery while streaming.
    pub disable_block_streaming: bool,
    /// Stream-smoothing thresholds.
    pub filter: FilterSettings,
    /// Retry budgets per mutation class.
    pub retry: RetrySettings,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            render_surface: RenderSurface::Structured,
            throttle_ms: 500,
            eager_placeholder: false,
            placeholder_text: "…".to_string(),
            abandoned_text: "(no response)".to_string(),
            summary_max_chars: 50,
            disable_block_streaming: true,
            filter: FilterSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl StreamingSettings {
    /// Check that every value is within range.
    pub fn validate(&self) -> Result<()> {
        if self.throttle_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "throttleMs must be positive".into(),
            ));
        }
        self.filter.validate()?;
        self.retry.validate()
    }
}

/// Stream-smoothing thresholds.
///
/// These are tuned heuristics rather than protocol requirements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    /// Minimum normalized length ratio (candidate / previous) for a
    /// non-prefix candidate to be considered at all.
    pub min_length_ratio: f64,
    /// Minimum share of the previous text a candidate must preserve as a prefix.
    pub min_prefix_ratio: f64,
    /// Consecutive rejections needed to arm a rotation.
    pub rotation_streak: u32,
    /// Minimum normalized candidate length that may arm a rotation.
    pub rotation_min_chars: usize,
    /// Maximum trimmed length of a punctuation-only snapshot treated as noise.
    pub noise_max_chars: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_length_ratio: 0.85,
            min_prefix_ratio: 0.85,
            rotation_streak: 2,
            rotation_min_chars: 32,
            noise_max_chars: 6,
        }
    }
}

impl FilterSettings {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("minLengthRatio", self.min_length_ratio),
            ("minPrefixRatio", self.min_prefix_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SettingsError::InvalidValue(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.rotation_streak == 0 {
            return Err(SettingsError::InvalidValue(
                "rotationStreak must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Retry budgets per mutation class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Content, summary, and close mutations.
    pub sequenced: RetryPolicy,
    /// Plain-message edits and placeholder clears.
    pub element: RetryPolicy,
    /// Message deletion.
    pub cleanup: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            sequenced: RetryPolicy::sequenced(),
            element: RetryPolicy::element(),
            cleanup: RetryPolicy::cleanup(),
        }
    }
}

impl RetrySettings {
    fn validate(&self) -> Result<()> {
        for (name, policy) in [
            ("sequenced", self.sequenced),
            ("element", self.element),
            ("cleanup", self.cleanup),
        ] {
            if policy.max_attempts == 0 {
                return Err(SettingsError::InvalidValue(format!(
                    "retry.{name}.maxAttempts must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
