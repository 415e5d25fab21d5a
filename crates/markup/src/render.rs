//! Render generated text into the outbound markup dialect.

use std::sync::LazyLock;

use regex::Regex;

use crate::escape::{escape_code, escape_link_target, escape_text};
use crate::tokenize::{tokenize, Marker, Span};

static THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());

/// Remove hidden reasoning annotations and surrounding whitespace.
pub fn strip_think(text: &str) -> String {
    THINK.replace_all(text, "").trim().to_owned()
}

/// Map look-alike spaces and the non-breaking hyphen to their ASCII forms.
pub fn normalize_whitespace(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{00A0}' | '\u{202F}' | '\u{2009}' => ' ',
            '\u{2011}' => '-',
            other => other,
        })
        .collect()
}

/// Full render pipeline: strip, normalize, tokenize, lay out, escape.
pub fn render(text: &str) -> String {
    let text = normalize_whitespace(&strip_think(text));
    let lines = layout(tokenize(&text));

    let mut out = String::with_capacity(text.len() + text.len() / 4);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for span in line {
            render_span(span, &mut out);
        }
    }
    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    out
}

fn is_emphasis_line(line: &[Span]) -> bool {
    matches!(line, [Span::Emphasis(_) | Span::Heading(_)])
}

/// Group spans into lines, put a blank line before an emphasis-only line
/// that is itself followed by a blank line, and keep at most one blank line
/// in a row.
fn layout(spans: Vec<Span>) -> Vec<Vec<Span>> {
    let mut lines: Vec<Vec<Span>> = vec![Vec::new()];
    for span in spans {
        if span == Span::Newline {
            lines.push(Vec::new());
        } else if let Some(line) = lines.last_mut() {
            line.push(span);
        }
    }

    let followed_by_blank: Vec<bool> = (0..lines.len())
        .map(|i| lines.get(i + 1).is_some_and(|next| next.is_empty()))
        .collect();

    let mut out: Vec<Vec<Span>> = Vec::with_capacity(lines.len());
    for (i, line) in lines.into_iter().enumerate() {
        if line.is_empty() {
            if out.last().is_some_and(|prev| prev.is_empty()) {
                continue;
            }
        } else if is_emphasis_line(&line)
            && followed_by_blank[i]
            && out.last().is_some_and(|prev| !prev.is_empty())
        {
            out.push(Vec::new());
        }
        out.push(line);
    }
    out
}

fn render_span(span: &Span, out: &mut String) {
    match span {
        Span::Text(text) => out.push_str(&escape_text(text)),
        Span::Emphasis(text) | Span::Heading(text) => {
            out.push('*');
            out.push_str(&escape_text(text));
            out.push('*');
        }
        Span::Code(code) => {
            out.push('`');
            out.push_str(&escape_code(code));
            out.push('`');
        }
        Span::Fence(body) => {
            out.push_str("```");
            out.push_str(&escape_code(body));
            out.push_str("```");
        }
        Span::Link { label, target } => {
            out.push('[');
            out.push_str(&escape_text(label));
            out.push_str("](");
            out.push_str(&escape_link_target(target));
            out.push(')');
        }
        Span::Marker(Marker::Bullet(bullet)) => {
            out.push('\\');
            out.push(*bullet);
        }
        Span::Marker(Marker::Quote(depth)) => {
            out.push('>');
            for _ in 1..*depth {
                out.push_str("\\>");
            }
        }
        Span::Marker(Marker::Ordinal(number)) => {
            out.push_str(number);
            out.push_str("\\.");
        }
        Span::Newline => out.push('\n'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_punctuation() {
        assert_eq!(render("Hello. World!"), "Hello\\. World\\!");
        assert_eq!(render("a_b (c) = d"), "a\\_b \\(c\\) \\= d");
    }

    #[test]
    fn emphasis_uses_single_star() {
        assert_eq!(render("**bold** and *soft*"), "*bold* and *soft*");
        assert_eq!(render("2 * 3"), "2 \\* 3");
    }

    #[test]
    fn strips_hidden_reasoning() {
        assert_eq!(render("<think>plan\nsteps</think>\nAnswer."), "Answer\\.");
        assert_eq!(strip_think("<THINK>x</THINK> y "), "y");
    }

    #[test]
    fn normalizes_lookalike_whitespace() {
        assert_eq!(normalize_whitespace("a\u{a0}b\u{202f}c\u{2009}d\u{2011}e"), "a b c d-e");
    }

    #[test]
    fn heading_becomes_separated_emphasis() {
        assert_eq!(render("# Title\nBody"), "*Title*\n\nBody");
        assert_eq!(render("Intro\n## Part\ntext"), "Intro\n\n*Part*\n\ntext");
    }

    #[test]
    fn line_markers_keep_their_visual_form() {
        assert_eq!(render("- one\n  + two"), "\\- one\n\\+ two");
        assert_eq!(render("1. first\n10. tenth"), "1\\. first\n10\\. tenth");
        assert_eq!(render("> quoted\n>> deeper"), "> quoted\n>\\> deeper");
    }

    #[test]
    fn source_lines_become_links() {
        assert_eq!(
            render("Sources:\n1. https://example.com/a%20b"),
            "Sources:\n[https://example\\.com/a b](https://example.com/a%20b)"
        );
    }

    #[test]
    fn code_is_left_alone() {
        assert_eq!(render("Use `a.b()` here."), "Use `a.b()` here\\.");
        assert_eq!(
            render("```rust\nfn main() {}\n```"),
            "```rust\nfn main() {}\n```"
        );
        assert_eq!(render("```\nunclosed"), "```\nunclosed```");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(render("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn inline_links_survive() {
        assert_eq!(
            render("see [the docs](https://docs.rs)."),
            "see [the docs](https://docs.rs)\\."
        );
    }
}
