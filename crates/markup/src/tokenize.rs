//! Tokenizer turning generated text into typed spans.
//!
//! Code spans are carved out first so nothing inside them is rewritten. The
//! remaining prose is read line by line: line-start constructs (source lines,
//! headings, list/quote/ordinal markers) are recognised before inline ones
//! (emphasis, links).

use std::sync::LazyLock;

use regex::Regex;

static SOURCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s+(https?://\S+)\s*$").unwrap());
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s*#+\s*)+(\S.*?)\s*$").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]*([-+*])\s").unwrap());
static QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]*(>+)\s").unwrap());
static ORDINAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]*(\d+)\.\s").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Emphasis(String),
    /// A heading line, rendered as emphasis on a line of its own.
    Heading(String),
    Code(String),
    /// Everything between the fences, language tag line included.
    Fence(String),
    Link { label: String, target: String },
    Marker(Marker),
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Bullet(char),
    Quote(usize),
    Ordinal(String),
}

enum Segment<'a> {
    Prose(&'a str),
    Inline(&'a str),
    Fence(&'a str),
}

pub fn tokenize(text: &str) -> Vec<Span> {
    let mut out = Vec::new();
    for (i, segment) in segments(text).into_iter().enumerate() {
        match segment {
            Segment::Prose(s) => prose(s, i == 0, &mut out),
            Segment::Inline(s) => out.push(Span::Code(s.to_owned())),
            Segment::Fence(s) => out.push(Span::Fence(s.to_owned())),
        }
    }
    out
}

/// Split into prose and code. A fence runs to the next fence or to the end
/// of the text; an inline span needs a closing backtick, otherwise the
/// backtick stays in the prose.
fn segments(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut prose_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let (code, next) = if text[i..].starts_with("```") {
            let body = i + 3;
            match text[body..].find("```") {
                Some(off) => (Segment::Fence(&text[body..body + off]), body + off + 3),
                None => (Segment::Fence(&text[body..]), text.len()),
            }
        } else {
            match text[i + 1..].find('`') {
                Some(off) if off > 0 => (Segment::Inline(&text[i + 1..i + 1 + off]), i + off + 2),
                _ => {
                    i += 1;
                    continue;
                }
            }
        };
        if prose_start < i {
            out.push(Segment::Prose(&text[prose_start..i]));
        }
        out.push(code);
        i = next;
        prose_start = next;
    }
    if prose_start < text.len() {
        out.push(Segment::Prose(&text[prose_start..]));
    }
    out
}

fn prose(segment: &str, at_line_start: bool, out: &mut Vec<Span>) {
    for (i, line) in segment.split('\n').enumerate() {
        if i > 0 {
            out.push(Span::Newline);
        }
        if i > 0 || at_line_start {
            line_start(line, out);
        } else {
            inline(line, out);
        }
    }
}

fn line_start(line: &str, out: &mut Vec<Span>) {
    if let Some(caps) = SOURCE_LINE.captures(line) {
        let target = caps[1].to_owned();
        let label = urlencoding::decode(&target)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| target.clone());
        out.push(Span::Link { label, target });
        return;
    }

    if let Some(caps) = HEADING.captures(line) {
        let title: String = caps[1].chars().filter(|&c| c != '*').collect();
        if !title.trim().is_empty() {
            out.push(Span::Heading(title.trim().to_owned()));
            out.push(Span::Newline);
            return;
        }
    }

    let marker = if let Some(caps) = BULLET.captures(line) {
        let bullet = caps[1].chars().next().unwrap_or('-');
        Some((Marker::Bullet(bullet), caps.get(1).map_or(0, |m| m.end())))
    } else if let Some(caps) = QUOTE.captures(line) {
        Some((Marker::Quote(caps[1].len()), caps.get(1).map_or(0, |m| m.end())))
    } else if let Some(caps) = ORDINAL.captures(line) {
        // Past the dot.
        Some((Marker::Ordinal(caps[1].to_owned()), caps.get(1).map_or(0, |m| m.end() + 1)))
    } else {
        None
    };

    match marker {
        Some((marker, end)) => {
            out.push(Span::Marker(marker));
            inline(&line[end..], out);
        }
        None => inline(unindent(line), out),
    }
}

/// Drop an indentation of two or more whitespace characters.
fn unindent(line: &str) -> &str {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    if !trimmed.is_empty() && indent.chars().count() >= 2 {
        trimmed
    } else {
        line
    }
}

fn inline(s: &str, out: &mut Vec<Span>) {
    let chars: Vec<char> = s.chars().collect();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        let found = match chars[i] {
            '*' => emphasis(&chars, i).map(|(inner, next)| (Span::Emphasis(inner), next)),
            '[' => link(&chars, i)
                .map(|(label, target, next)| (Span::Link { label, target }, next)),
            _ => None,
        };
        match found {
            Some((span, next)) => {
                if !text.is_empty() {
                    out.push(Span::Text(std::mem::take(&mut text)));
                }
                out.push(span);
                i = next;
            }
            None => {
                text.push(chars[i]);
                i += 1;
            }
        }
    }
    if !text.is_empty() {
        out.push(Span::Text(text));
    }
}

fn find_star(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&j| chars[j] == '*')
}

/// `**inner**` or `*inner*`; the inner run never contains a star and a
/// single-star run may not open on whitespace.
fn emphasis(chars: &[char], i: usize) -> Option<(String, usize)> {
    if chars.get(i + 1) == Some(&'*') {
        let start = i + 2;
        if let Some(end) = find_star(chars, start) {
            if end > start && chars.get(end + 1) == Some(&'*') {
                return Some((chars[start..end].iter().collect(), end + 2));
            }
        }
    }

    let start = i + 1;
    let first = *chars.get(start)?;
    if first.is_whitespace() || first == '*' {
        return None;
    }
    let end = find_star(chars, start)?;
    Some((chars[start..end].iter().collect(), end + 1))
}

/// `[label](http://target)` with a non-empty label and a target free of
/// whitespace and closing parentheses.
fn link(chars: &[char], i: usize) -> Option<(String, String, usize)> {
    let close = (i + 1..chars.len()).find(|&j| chars[j] == ']')?;
    if close == i + 1 || chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let target_start = close + 2;
    let end = (target_start..chars.len()).find(|&j| chars[j] == ')' || chars[j].is_whitespace())?;
    if chars[end] != ')' {
        return None;
    }
    let target: String = chars[target_start..end].iter().collect();
    let rest = target
        .strip_prefix("https://")
        .or_else(|| target.strip_prefix("http://"))?;
    if rest.is_empty() {
        return None;
    }
    let label = chars[i + 1..close].iter().collect();
    Some((label, target, end + 1))
}
