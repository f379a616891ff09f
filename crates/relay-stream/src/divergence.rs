//! Divergence tracking and rotation arming.
//!
//! A snapshot the filter rejects while a segment is live is a divergence. A
//! single divergence is usually a transient hiccup, so rotation is only armed
//! once the streak reaches `rotation_streak` and the latest candidate is long
//! enough (normalized) to be a real restart rather than a fragment. Arming is
//! re-evaluated on every rejection; an armed rotation executes on the next
//! throttle flush.

use relay_settings::FilterSettings;

/// Result of recording a rejected snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DivergenceVerdict {
    /// Keep waiting; treat the candidate as noise for now.
    Waiting {
        /// Consecutive rejections so far.
        streak: u32,
    },
    /// Rotation will run on the next flush.
    Armed {
        /// Consecutive rejections so far.
        streak: u32,
    },
}

/// Consecutive-rejection counter plus the text a rotation would start with.
#[derive(Clone, Debug, Default)]
pub struct DivergenceTracker {
    streak: u32,
    target: Option<String>,
    armed: bool,
    required_streak: u32,
    min_chars: usize,
}

impl DivergenceTracker {
    /// Build from configured thresholds.
    #[must_use]
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            streak: 0,
            target: None,
            armed: false,
            required_streak: settings.rotation_streak,
            min_chars: settings.rotation_min_chars,
        }
    }

    /// Record a rejected `candidate` whose normalized form is `normalized_chars` long.
    pub fn record_rejection(&mut self, candidate: &str, normalized_chars: usize) -> DivergenceVerdict {
        self.streak = self.streak.saturating_add(1);
        self.target = Some(candidate.to_owned());
        self.armed = self.streak >= self.required_streak && normalized_chars >= self.min_chars;
        if self.armed {
            DivergenceVerdict::Armed {
                streak: self.streak,
            }
        } else {
            DivergenceVerdict::Waiting {
                streak: self.streak,
            }
        }
    }

    /// Clear the streak and any armed rotation (an accepted snapshot arrived).
    pub fn reset(&mut self) {
        self.streak = 0;
        self.target = None;
        self.armed = false;
    }

    /// Take the rotation target if armed, resetting the tracker.
    pub fn take_rotation(&mut self) -> Option<String> {
        if !self.armed {
            return None;
        }
        let target = self.target.take();
        self.reset();
        target
    }

    /// Current streak.
    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Whether a rotation is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}
