//! Escalating fallbacks for frames the transport rejects.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::escape::is_reserved;
use crate::scan::{links, scan, Class, ScanState};
use crate::split::Frame;

static URL_IN_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((https?://[^)\s]+)\)").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// How far a frame has been degraded from its rendered form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Rendered,
    /// Heading and sentence terminators escaped.
    Structural,
    /// Every residual reserved character escaped.
    Reserved,
    /// Unstyled plain text.
    Plain,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Rendered,
        Stage::Structural,
        Stage::Reserved,
        Stage::Plain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Rendered => "rendered",
            Stage::Structural => "structural",
            Stage::Reserved => "reserved",
            Stage::Plain => "plain",
        }
    }

    pub fn is_markup(self) -> bool {
        self != Stage::Plain
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The text to send for `frame` at `stage`.
pub fn degrade(frame: &Frame, stage: Stage) -> String {
    match stage {
        Stage::Rendered => frame.text(),
        Stage::Structural => escape_structural(&frame.text()),
        Stage::Reserved => escape_residual(&escape_structural(&frame.text())),
        Stage::Plain => plain_text(&frame.source),
    }
}

/// Insert a backslash before every prose character `pick` selects. Code,
/// escapes, link syntax and link targets are never touched.
fn escape_prose_where(text: &str, pick: impl Fn(&[char], usize) -> bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let scan = scan(&chars, ScanState::default());

    let mut protected = vec![false; chars.len()];
    for link in links(&chars, &scan.classes) {
        protected[link.open] = true;
        for slot in &mut protected[link.target_open - 1..=link.close] {
            *slot = true;
        }
    }

    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for (i, &c) in chars.iter().enumerate() {
        if scan.classes[i] == Class::Text && !protected[i] && pick(&chars, i) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Stage one: escape `#`, `.` and `!` outside code and link targets.
pub fn escape_structural(text: &str) -> String {
    escape_prose_where(text, |chars, i| matches!(chars[i], '#' | '.' | '!'))
}

/// Stage two: escape every remaining reserved character outside code and
/// link constructs. A quote marker at the start of a line keeps its meaning.
pub fn escape_residual(text: &str) -> String {
    escape_prose_where(text, |chars, i| {
        let c = chars[i];
        let quote_marker = c == '>' && (i == 0 || chars[i - 1] == '\n');
        is_reserved(c) && !quote_marker
    })
}

/// Final stage: strip markup control characters, drop parenthesised URLs
/// that only served as link targets, drop `---` rules and collapse blank
/// runs. Applying it twice gives the same text as applying it once.
pub fn plain_text(text: &str) -> String {
    let mut out: String = text.chars().filter(|c| !matches!(c, '\\' | '*')).collect();

    loop {
        let next = URL_IN_PARENS.replace_all(&out, "");
        if next == out {
            break;
        }
        out = next.into_owned();
    }

    let kept: Vec<&str> = out.split('\n').filter(|line| line.trim() != "---").collect();
    BLANK_RUNS.replace_all(&kept.join("\n"), "\n\n").into_owned()
}
