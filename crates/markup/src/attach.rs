//! Extraction of oversized fenced code blocks into file attachments.

use std::sync::LazyLock;

use regex::Regex;

/// Left in the body where a code block was extracted.
pub const PLACEHOLDER: &str = "👆📄📎\n";

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([A-Za-z0-9_+\-]*)\n(.*?)\n```").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub language: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// File extension for a code block's language tag.
pub fn guess_extension(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "py" | "python" => "py",
        "js" | "javascript" => "js",
        "ts" | "typescript" => "ts",
        "json" => "json",
        "bash" | "sh" | "shell" => "sh",
        "html" => "html",
        "css" => "css",
        "java" => "java",
        "c" => "c",
        "cpp" | "c++" => "cpp",
        "go" | "golang" => "go",
        "rs" | "rust" => "rs",
        "rb" | "ruby" => "rb",
        "php" => "php",
        "kt" | "kotlin" => "kt",
        "swift" => "swift",
        "sql" => "sql",
        "yaml" | "yml" => "yml",
        "md" | "markdown" => "md",
        _ => "txt",
    }
}

/// Pull every fenced block whose body has at least `threshold` characters
/// out of `text`, numbering attachments from one.
pub fn extract_attachments(text: &str, threshold: usize) -> Extracted {
    let mut body = String::with_capacity(text.len());
    let mut attachments = Vec::new();
    let mut last = 0;

    for caps in CODE_BLOCK.captures_iter(text) {
        let (Some(whole), Some(code)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        if code.as_str().chars().count() < threshold {
            continue;
        }
        let language = caps.get(1).map_or("", |m| m.as_str());
        let name = format!(
            "snippet_{}.{}",
            attachments.len() + 1,
            guess_extension(language)
        );

        body.push_str(&text[last..whole.start()]);
        body.push_str(PLACEHOLDER);
        last = whole.end();

        attachments.push(Attachment {
            name,
            language: language.to_owned(),
            content: code.as_str().to_owned(),
        });
    }
    body.push_str(&text[last..]);

    Extracted { body, attachments }
}
