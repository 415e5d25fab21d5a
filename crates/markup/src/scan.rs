//! Character scanner over rendered markup.
//!
//! Tracks which paired constructs are open at every position: fenced code,
//! inline code, emphasis and a pending escape. The splitter uses it to find
//! cut points and repair frames, the fallback stages to skip code and link
//! targets.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pub fence: bool,
    pub inline: bool,
    pub emphasis: bool,
    /// The previous character was an unescaped backslash.
    pub escape: bool,
}

impl ScanState {
    pub fn in_code(self) -> bool {
        self.fence || self.inline
    }

    pub fn is_balanced(self) -> bool {
        !(self.fence || self.inline || self.emphasis || self.escape)
    }

    /// Markup that reopens the constructs still open at a frame boundary.
    pub fn reopen(self) -> String {
        let mut out = String::new();
        if self.emphasis {
            out.push('*');
        }
        if self.fence {
            out.push_str("```\n");
        } else if self.inline {
            out.push('`');
        }
        out
    }

    /// Markup that closes them, innermost first. A dangling escape is
    /// doubled so it escapes itself.
    pub fn close(self) -> String {
        let mut out = String::new();
        if self.escape {
            out.push('\\');
        }
        if self.fence {
            out.push_str("\n```");
        } else if self.inline {
            out.push('`');
        }
        if self.emphasis {
            out.push('*');
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    /// A backslash escaping the next character.
    Escape,
    Escaped,
    /// Backticks or a star opening/closing a construct.
    Delimiter,
    Code,
    Text,
}

#[derive(Debug, Clone)]
pub struct Scan {
    pub classes: Vec<Class>,
    /// `states[i]` is the state before character `i`; one extra entry holds
    /// the state at the end.
    pub states: Vec<ScanState>,
}

impl Scan {
    pub fn end(&self) -> ScanState {
        self.states.last().copied().unwrap_or_default()
    }
}

fn is_triple(chars: &[char], i: usize) -> bool {
    chars.len() >= i + 3 && chars[i..i + 3] == ['`', '`', '`']
}

pub fn scan(chars: &[char], from: ScanState) -> Scan {
    let mut classes = Vec::with_capacity(chars.len());
    let mut states = Vec::with_capacity(chars.len() + 1);
    let mut st = from;
    let mut i = 0;

    while i < chars.len() {
        states.push(st);
        if st.escape {
            st.escape = false;
            classes.push(Class::Escaped);
            i += 1;
            continue;
        }
        match chars[i] {
            '\\' => {
                st.escape = true;
                classes.push(Class::Escape);
            }
            '`' if !st.inline && is_triple(chars, i) => {
                st.fence = !st.fence;
                classes.extend([Class::Delimiter; 3]);
                states.push(st);
                states.push(st);
                i += 3;
                continue;
            }
            '`' if !st.fence => {
                st.inline = !st.inline;
                classes.push(Class::Delimiter);
            }
            '*' if !st.in_code() => {
                st.emphasis = !st.emphasis;
                classes.push(Class::Delimiter);
            }
            _ if st.in_code() => classes.push(Class::Code),
            _ => classes.push(Class::Text),
        }
        i += 1;
    }
    states.push(st);
    Scan { classes, states }
}

pub fn scan_str(text: &str) -> Scan {
    let chars: Vec<char> = text.chars().collect();
    scan(&chars, ScanState::default())
}

/// A complete `[label](target)` construct; indices of `[`, `(` and `)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSpan {
    pub open: usize,
    pub target_open: usize,
    pub close: usize,
}

impl LinkSpan {
    /// Whether cutting before character `at` would split the construct.
    pub fn straddles(&self, at: usize) -> bool {
        self.open < at && at <= self.close
    }
}

/// Find link constructs made of unescaped brackets outside code.
pub fn links(chars: &[char], classes: &[Class]) -> Vec<LinkSpan> {
    let syntax = |j: usize, c: char| chars[j] == c && classes[j] == Class::Text;
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !syntax(i, '[') {
            i += 1;
            continue;
        }
        let Some(end) = (i + 1..chars.len())
            .find(|&j| syntax(j, ']') || syntax(j, '[') || chars[j] == '\n')
        else {
            break;
        };
        if !syntax(end, ']') || end + 1 >= chars.len() || !syntax(end + 1, '(') {
            i = end;
            continue;
        }
        let target_open = end + 1;
        match (target_open + 1..chars.len())
            .find(|&j| syntax(j, ')') || chars[j].is_whitespace())
        {
            Some(close) if chars[close] == ')' => {
                out.push(LinkSpan {
                    open: i,
                    target_open,
                    close,
                });
                i = close + 1;
            }
            _ => i = target_open + 1,
        }
    }
    out
}
