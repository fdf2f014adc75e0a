//! Score scraping from the model's grading narrative.
//!
//! The comparison prompt asks the model to finish with
//! `Total Score : 'score'/100`, but models vary the casing and spacing. The
//! label is matched case-insensitively with optional whitespace before the
//! colon, and the **last** occurrence wins because models often restate the
//! format instructions before giving the real total.

use once_cell::sync::Lazy;
use regex::Regex;

/// Returned when no score can be found.
pub const NO_SCORE: &str = "N/A";

/// Longest score string shown in result headings.
pub const DISPLAY_SCORE_MAX_CHARS: usize = 20;

static TOTAL_SCORE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)total[ \t]+score[ \t]*:").expect("valid regex"));

static FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)").expect("valid regex"));

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

/// Extract the text following the last "Total Score:" label.
///
/// Leading whitespace is skipped, then everything up to the next line break
/// is taken. Returns [`NO_SCORE`] when there is no label or nothing after it.
///
/// ```rust
/// use pdf_autograder::score::extract_score;
///
/// assert_eq!(extract_score("Q1 ok\nTotal Score: 87/100\n"), "87/100");
/// assert_eq!(extract_score("no total here"), "N/A");
/// ```
pub fn extract_score(analysis: &str) -> String {
    let Some(last) = TOTAL_SCORE_LABEL.find_iter(analysis).last() else {
        return NO_SCORE.to_string();
    };

    let rest = analysis[last.end()..].trim_start();
    let line = rest.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        NO_SCORE.to_string()
    } else {
        line.to_string()
    }
}

/// Reduce a raw score to digits and slash, e.g. `"**87/100** points"` → `"87/100"`.
///
/// A fraction is preferred; otherwise the first number is returned. Returns
/// [`NO_SCORE`] when the input holds no digits.
pub fn clean_score(raw: &str) -> String {
    let raw: String = raw
        .chars()
        .filter(|c| !matches!(c, '*' | '\'' | '"' | '`'))
        .collect();
    if let Some(caps) = FRACTION.captures(&raw) {
        return format!("{}/{}", &caps[1], &caps[2]);
    }
    match NUMBER.find(&raw) {
        Some(m) => m.as_str().to_string(),
        None => NO_SCORE.to_string(),
    }
}

/// Truncate a score for display in a heading, on a character boundary.
pub fn display_score(raw: &str) -> String {
    if raw.is_empty() {
        return NO_SCORE.to_string();
    }
    raw.chars().take(DISPLAY_SCORE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_label() {
        assert_eq!(extract_score("Total Score: 87/100"), "87/100");
        assert_eq!(clean_score(&extract_score("Total Score: 87/100")), "87/100");
    }

    #[test]
    fn no_label_is_sentinel() {
        assert_eq!(extract_score("The student did well overall."), NO_SCORE);
        assert_eq!(extract_score(""), NO_SCORE);
    }

    #[test]
    fn last_occurrence_wins() {
        let text = "Format: Total Score: 'score'/100\nQ1: 10/10\nQ2: 5/10\nTotal Score: 15/20\n";
        assert_eq!(extract_score(text), "15/20");
    }

    #[test]
    fn case_variants() {
        assert_eq!(extract_score("Total score: 70/100"), "70/100");
        assert_eq!(extract_score("TOTAL SCORE: 70/100"), "70/100");
    }

    #[test]
    fn spacing_variants() {
        assert_eq!(extract_score("Total Score : 64/100"), "64/100");
        assert_eq!(extract_score("Total Score :64/100"), "64/100");
        assert_eq!(extract_score("Total  Score:   64/100  \nnext"), "64/100");
    }

    #[test]
    fn mixed_variants_still_use_last() {
        let text = "Total score: 10/100\n...\nTotal Score : 90/100";
        assert_eq!(extract_score(text), "90/100");
    }

    #[test]
    fn stops_at_line_break() {
        assert_eq!(
            extract_score("Total Score: 87/100\nGreat work on Q3."),
            "87/100"
        );
    }

    #[test]
    fn label_with_nothing_after_is_sentinel() {
        assert_eq!(extract_score("Total Score:"), NO_SCORE);
        assert_eq!(extract_score("Total Score:   \n"), NO_SCORE);
    }

    #[test]
    fn label_on_its_own_line_reads_next_line() {
        assert_eq!(extract_score("Total Score:\n**72/100**"), "**72/100**");
    }

    #[test]
    fn markdown_emphasis_is_kept_raw_and_removed_when_cleaned() {
        let raw = extract_score("**Total Score:** 87/100");
        // The label regex stops at the colon, so the closing asterisks remain.
        assert_eq!(raw, "** 87/100");
        assert_eq!(clean_score(&raw), "87/100");
    }

    #[test]
    fn clean_score_variants() {
        assert_eq!(clean_score("87 / 100 points"), "87/100");
        assert_eq!(clean_score("'92'/100"), "92/100");
        assert_eq!(clean_score("8.5/10"), "8.5/10");
        assert_eq!(clean_score("about 40"), "40");
        assert_eq!(clean_score("N/A"), NO_SCORE);
    }

    #[test]
    fn display_truncates_to_twenty_chars() {
        let long = "87/100 (with partial credit on question 4)";
        assert_eq!(display_score(long).chars().count(), DISPLAY_SCORE_MAX_CHARS);
        assert_eq!(display_score("87/100"), "87/100");
        assert_eq!(display_score(""), NO_SCORE);
    }
}
