//! Escaping rules of the outbound markup dialect.

/// Characters that must be escaped in prose.
pub const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

pub fn is_reserved(c: char) -> bool {
    RESERVED.contains(&c)
}

/// Escape prose: the backslash itself plus every reserved character.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        if c == '\\' || is_reserved(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape the body of an inline or fenced code span.
pub fn escape_code(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '`' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape the target of a link: only `)` and `\` are significant there, `(`
/// is escaped too so the splitter never mistakes it for a nested target.
/// `*` and backticks are percent-encoded; left raw they would read as
/// emphasis or code delimiters to anything scanning the rendered text.
pub fn escape_link_target(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '*' => out.push_str("%2A"),
            '`' => out.push_str("%60"),
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
