//! Non-regression filter and noise-token guard.
//!
//! Generation streams deliver snapshots that are usually growing prefixes of
//! one another, but re-tokenization near the edit boundary, trailing markdown
//! churn, and outright restarts all happen. [`SnapshotFilter::accepts`]
//! decides whether a candidate continues the previous snapshot:
//!
//! 1. Empty previous text accepts anything.
//! 2. A verbatim prefix relationship accepts.
//! 3. Otherwise both sides are normalized (trailing whitespace and soft
//!    markdown markers stripped) and the prefix test is retried.
//! 4. A normalized candidate shorter than `min_length_ratio` of the previous
//!    text is a restart and is rejected.
//! 5. Otherwise the candidate must preserve at least `min_prefix_ratio` of the
//!    previous text as a common prefix.
//!
//! Lengths are measured in `char`s.

use relay_settings::FilterSettings;

/// Markdown control characters that churn at the tail of a stream.
pub const SOFT_MARKERS: &[char] = &[
    '*', '_', '~', '`', '#', '>', '-', '+', '=', '|', '.', ',', ':', ';', '!', '?',
];

/// Whether `c` is a soft markdown control character.
#[must_use]
pub fn is_soft_marker(c: char) -> bool {
    SOFT_MARKERS.contains(&c)
}

/// Strip trailing whitespace and soft markdown markers.
#[must_use]
pub fn normalize(text: &str) -> &str {
    text.trim_end_matches(|c: char| c.is_whitespace() || is_soft_marker(c))
}

/// Length of the longest common prefix of `a` and `b`, in chars.
#[must_use]
pub fn common_prefix_chars(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Pure predicates over text snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotFilter {
    min_length_ratio: f64,
    min_prefix_ratio: f64,
    noise_max_chars: usize,
}

impl Default for SnapshotFilter {
    fn default() -> Self {
        Self::new(&FilterSettings::default())
    }
}

impl SnapshotFilter {
    /// Build from configured thresholds.
    #[must_use]
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            min_length_ratio: settings.min_length_ratio,
            min_prefix_ratio: settings.min_prefix_ratio,
            noise_max_chars: settings.noise_max_chars,
        }
    }

    /// Whether `candidate` is an acceptable continuation of `previous`.
    #[must_use]
    pub fn accepts(&self, previous: &str, candidate: &str) -> bool {
        if previous.is_empty() || candidate.starts_with(previous) {
            return true;
        }

        let prev = normalize(previous);
        let cand = normalize(candidate);
        if prev.is_empty() || cand.starts_with(prev) {
            return true;
        }

        let prev_len = char_len(prev) as f64;
        let length_ratio = char_len(cand) as f64 / prev_len;
        if length_ratio < self.min_length_ratio {
            return false;
        }

        let preserved = common_prefix_chars(prev, cand) as f64 / prev_len;
        preserved >= self.min_prefix_ratio
    }

    /// Whether `text` is a short run of markdown punctuation.
    ///
    /// Noise snapshots are never delivered and never count as divergence.
    #[must_use]
    pub fn is_noise(&self, text: &str) -> bool {
        let trimmed = text.trim();
        char_len(trimmed) <= self.noise_max_chars
            && trimmed.chars().all(|c| is_soft_marker(c) || c.is_whitespace())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> SnapshotFilter {
        SnapshotFilter::default()
    }

    #[test]
    fn empty_previous_accepts_anything() {
        assert!(filter().accepts("", "anything at all"));
        assert!(filter().accepts("", ""));
    }

    #[test]
    fn verbatim_prefix_accepts() {
        assert!(filter().accepts("Hello", "Hello world"));
        assert!(filter().accepts("Hello", "Hello"));
    }

    #[test]
    fn trailing_markdown_churn_accepts() {
        // Emphasis opened then re-tokenized without the marker.
        assert!(filter().accepts("The answer is **", "The answer is 42"));
        assert!(filter().accepts("Steps:\n- ", "Steps:\n1. First"));
        assert!(filter().accepts("Done.  ", "Done"));
    }

    #[test]
    fn much_shorter_candidate_rejects() {
        let prev = "a".repeat(100);
        let cand = "b".repeat(50);
        assert!(!filter().accepts(&prev, &cand));
    }

    #[test]
    fn truncation_below_length_ratio_rejects() {
        let prev = "x".repeat(100);
        let cand = "x".repeat(84);
        // A shorter prefix of the previous text is still a regression.
        assert!(!filter().accepts(&prev, &cand));
    }

    #[test]
    fn minor_edit_near_boundary_accepts() {
        let prev = format!("{}abc", "x".repeat(97));
        let cand = format!("{}xyz and more", "x".repeat(97));
        assert!(filter().accepts(&prev, &cand));
    }

    #[test]
    fn rewrite_of_same_length_rejects() {
        let prev = "X".repeat(50);
        assert!(!filter().accepts(&prev, &"Y".repeat(45)));
        assert!(!filter().accepts(&prev, &"Z".repeat(46)));
    }

    #[test]
    fn boundary_ratios() {
        // 17 of 20 chars preserved = 0.85 exactly → accept
        let prev = "abcdefghijklmnopqrst";
        let cand = "abcdefghijklmnopqXYZ";
        assert!(filter().accepts(prev, cand));
        // 16 of 20 = 0.80 → reject
        let cand = "abcdefghijklmnopWXYZ";
        assert!(!filter().accepts(prev, cand));
    }

    #[test]
    fn counts_chars_not_bytes() {
        let prev = "héllo wörld ünïcode";
        let cand = "héllo wörld ünïcodé";
        assert_eq!(common_prefix_chars(prev, cand), 18);
        assert!(filter().accepts(prev, cand));
    }

    #[test]
    fn normalize_strips_soft_tail() {
        assert_eq!(normalize("Hello **"), "Hello");
        assert_eq!(normalize("List:\n- "), "List");
        assert_eq!(normalize("```"), "");
        assert_eq!(normalize("keep me"), "keep me");
    }

    #[test]
    fn noise_detection() {
        let f = filter();
        assert!(f.is_noise("**"));
        assert!(f.is_noise("```"));
        assert!(f.is_noise("  - "));
        assert!(f.is_noise(""));
        assert!(!f.is_noise("ok"));
        assert!(!f.is_noise("*******"));
        assert!(!f.is_noise("**a**"));
    }

    #[test]
    fn thresholds_are_configurable() {
        let strict = SnapshotFilter::new(&FilterSettings {
            min_prefix_ratio: 0.99,
            ..FilterSettings::default()
        });
        let prev = format!("{}abc", "x".repeat(97));
        let cand = format!("{}xyz and more", "x".repeat(97));
        assert!(!strict.accepts(&prev, &cand));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn growth_is_always_accepted(base in ".{0,64}", tail in ".{0,32}") {
                let grown = format!("{base}{tail}");
                prop_assert!(filter().accepts(&base, &grown));
            }

            #[test]
            fn accepted_candidates_never_look_shorter(prev in "[a-z *_#]{1,80}", cand in "[a-z *_#]{0,80}") {
                if filter().accepts(&prev, &cand) && !cand.starts_with(prev.as_str()) {
                    let np = normalize(&prev).chars().count();
                    let nc = normalize(&cand).chars().count();
                    let prefix_ok = normalize(&cand).starts_with(normalize(&prev));
                    prop_assert!(prefix_ok || nc as f64 >= np as f64 * 0.85);
                }
            }

            #[test]
            fn noise_is_short(text in ".{0,16}") {
                if filter().is_noise(&text) {
                    prop_assert!(text.trim().chars().count() <= 6);
                }
            }
        }
    }
}
