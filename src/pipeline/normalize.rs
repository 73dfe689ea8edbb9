//! Text normalisation shared by both extraction paths.
//!
//! pdfium text layers and tesseract output carry different noise: CRLF line
//! endings, form feeds between pages, zero-width characters, runs of blank
//! lines from empty table cells. These rules make the two paths produce text
//! of the same shape so the summary prompt sees consistent input.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Replace form feeds and vertical tabs with newlines
//! 3. Strip control characters other than `\n` and `\t`
//! 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 5. Trim trailing whitespace per line
//! 6. Collapse runs of blank lines down to one
//! 7. Trim leading/trailing whitespace of the whole text

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every normalisation rule. The result is trimmed.
pub fn normalize_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = replace_page_breaks(&s);
    let s = strip_control_chars(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Page breaks ──────────────────────────────────────────────────────

fn replace_page_breaks(input: &str) -> String {
    input.replace(['\x0c', '\x0b'], "\n")
}

// ── Rule 3: Control characters ───────────────────────────────────────────────

fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

// ── Rule 4: Invisible Unicode ────────────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

// ── Rule 5: Trailing whitespace ──────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Blank lines ──────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}
