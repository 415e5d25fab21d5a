//! Split rendered markup into frames that fit the transport ceiling.
//!
//! A frame is cut after the nearest line break or space, then walked back
//! until no code span, emphasis or escape is open at the cut. The cut is
//! pulled out of digit runs and link constructs. When no such point exists
//! within the window the frame is hard-cut and repaired: constructs open at
//! the cut are closed at the end of the frame and reopened at the start of
//! the next one.

use crate::scan::{links, scan, LinkSpan, Scan, ScanState};

/// Characters kept free in every frame for repair markers. The largest
/// repair is a reopened emphasis and fence (`*` + "```\n") plus a doubled
/// escape and the matching closers (`\` + "\n```" + `*`).
pub const REPAIR_RESERVE: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Synthetic markup reopening constructs carried over from the
    /// previous frame.
    pub prefix: String,
    /// The slice of the input this frame carries.
    pub source: String,
    /// Synthetic markup closing constructs left open at the cut.
    pub suffix: String,
}

impl Frame {
    pub fn text(&self) -> String {
        let mut out =
            String::with_capacity(self.prefix.len() + self.source.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(&self.source);
        out.push_str(&self.suffix);
        out
    }

    pub fn is_repaired(&self) -> bool {
        !(self.prefix.is_empty() && self.suffix.is_empty())
    }
}

/// Split `text` into frames of at most `limit` characters each.
///
/// `limit` must exceed [`REPAIR_RESERVE`].
pub fn split(text: &str, limit: usize) -> Vec<Frame> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    let scan = scan(&chars, ScanState::default());
    let cutter = Cutter {
        links: links(&chars, &scan.classes),
        chars: &chars,
        scan: &scan,
    };
    let budget = limit.saturating_sub(REPAIR_RESERVE).max(1);
    let tail_close = scan.end().close().chars().count();

    let mut frames = Vec::new();
    let mut start = 0;
    while start < n {
        let reopen = scan.states[start].reopen().chars().count();
        if reopen + (n - start) + tail_close <= limit {
            frames.push(cutter.frame(start, n));
            break;
        }
        let cut = cutter.find(start, (start + budget).min(n));
        frames.push(cutter.frame(start, cut));
        start = cut;
    }

    tracing::debug!(
        chars = n,
        limit,
        frames = frames.len(),
        repaired = frames.iter().filter(|f| f.is_repaired()).count(),
        "split rendered text"
    );
    frames
}

struct Cutter<'a> {
    chars: &'a [char],
    scan: &'a Scan,
    links: Vec<LinkSpan>,
}

impl Cutter<'_> {
    fn frame(&self, start: usize, end: usize) -> Frame {
        Frame {
            prefix: self.scan.states[start].reopen(),
            source: self.chars[start..end].iter().collect(),
            suffix: self.scan.states[end].close(),
        }
    }

    /// Cutting before a backtick that follows a backtick would tear a fence
    /// delimiter apart.
    fn splits_backticks(&self, at: usize) -> bool {
        self.chars[at - 1] == '`' && self.chars.get(at) == Some(&'`')
    }

    fn is_safe(&self, at: usize) -> bool {
        self.scan.states[at].is_balanced() && !self.splits_backticks(at)
    }

    /// Nearest safe cut at or before `from`, strictly after `start`.
    fn walk_back(&self, start: usize, from: usize) -> Option<usize> {
        (start + 1..=from).rev().find(|&at| self.is_safe(at))
    }

    fn find(&self, start: usize, end: usize) -> usize {
        let near_space = (start + 1..=end)
            .rev()
            .find(|&at| matches!(self.chars[at - 1], '\n' | ' '))
            .unwrap_or(end);

        match self.walk_back(start, near_space) {
            Some(cut) => self.adjust(start, cut),
            None => self.hard_cut(start, end, near_space),
        }
    }

    /// Pull a safe cut out of digit runs and link constructs. Falls back to
    /// the last cut when an adjustment would empty the frame.
    fn adjust(&self, start: usize, mut cut: usize) -> usize {
        loop {
            let mut next = cut;
            if self.chars[next - 1].is_ascii_digit()
                && self.chars.get(next).is_some_and(|c| c.is_ascii_digit())
            {
                while next > start && self.chars[next - 1].is_ascii_digit() {
                    next -= 1;
                }
            }
            if let Some(link) = self.links.iter().find(|link| link.straddles(next)) {
                // Inside the label: keep the whole link together. Inside the
                // target: cut just before `(`.
                if next < link.target_open {
                    next = link.open;
                } else if next > link.target_open {
                    next = link.target_open;
                }
            }

            if next == cut || next <= start {
                return cut;
            }
            match self.walk_back(start, next) {
                Some(safe) => cut = safe,
                None => return cut,
            }
        }
    }

    fn hard_cut(&self, start: usize, end: usize, near_space: usize) -> usize {
        let mut cut = if (near_space - start) * 2 >= end - start {
            near_space
        } else {
            end
        };
        while cut > start + 1 && (self.scan.states[cut].escape || self.splits_backticks(cut)) {
            cut -= 1;
        }
        tracing::debug!(start, cut, "no safe cut point, frame will be repaired");
        cut
    }
}
