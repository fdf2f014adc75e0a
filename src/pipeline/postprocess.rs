//! Post-processing: deterministic cleanup of model transcriptions.
//!
//! Vision models sometimes wrap the transcription in a code fence, emit
//! `\r\n`, or leave zero-width characters behind. None of that is the
//! student's writing, so it is removed before the text is shown or graded.
//! Wording, numbering, and line structure are never touched.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! only has to match `\n`, and invisible characters are removed before the
//! final trim so a trailing BOM cannot hide trailing whitespace.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to one page of transcribed handwriting.
///
/// Rules (applied in order):
/// 1. Strip an outer code fence (```` ``` ```` or ```` ```text ````)
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse runs of 3+ blank lines to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim leading and trailing blank space
pub fn clean_transcript(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fence ───────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*\r?\n(.*?)\r?\n```\s*$").expect("valid fence regex")
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("valid blank-line regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_with_and_without_tag() {
        assert_eq!(strip_outer_fence("```\nQ1. 42\n```"), "Q1. 42");
        assert_eq!(strip_outer_fence("```text\nQ1. 42\nQ2. 7\n```\n"), "Q1. 42\nQ2. 7");
    }

    #[test]
    fn inner_fences_are_left_alone() {
        let input = "Q3 working:\n```\nx = 2\n```\nanswer 4";
        assert_eq!(strip_outer_fence(input), input);
    }

    #[test]
    fn line_endings_are_normalised() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn blank_runs_are_collapsed() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn invisible_chars_are_removed() {
        assert_eq!(remove_invisible_chars("\u{FEFF}Q1\u{200B}. 5"), "Q1. 5");
    }

    #[test]
    fn full_cleanup_keeps_the_words() {
        let raw = "```\r\n1. Photosynthesis   \r\n\r\n\r\n\r\n\r\n2. Mitochondria\u{200B}\r\n```";
        assert_eq!(
            clean_transcript(raw),
            "1. Photosynthesis\n\n\n2. Mitochondria"
        );
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(clean_transcript("  \n \n"), "");
    }
}
