//! Minimal `key: value` frontmatter parser.
//!
//! Only flat, single-line string values are supported. Lists, nesting and
//! multi-line values are outside the source format.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Flat frontmatter mapping.
pub type Frontmatter = BTreeMap<String, String>;

/// A source file split into its metadata and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSource {
    pub frontmatter: Frontmatter,
    /// Body text after the closing delimiter, trimmed.
    pub body: String,
}

/// Split `raw` into frontmatter and body.
///
/// The opening `---` must be the first line. Without a delimited block the
/// whole trimmed text is the body.
pub fn parse_frontmatter(raw: &str) -> ParsedSource {
    static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A---\n(.*?)\n---(?:\n(.*))?\z").expect("valid regex")
    });

    let text = raw.replace("\r\n", "\n");

    let Some(caps) = BLOCK_RE.captures(&text) else {
        return ParsedSource {
            frontmatter: Frontmatter::new(),
            body: text.trim().to_string(),
        };
    };

    let block = caps.get(1).map_or("", |m| m.as_str());
    let body = caps.get(2).map_or("", |m| m.as_str());

    ParsedSource {
        frontmatter: parse_block(block),
        body: body.trim().to_string(),
    }
}

fn parse_block(block: &str) -> Frontmatter {
    let mut frontmatter = Frontmatter::new();

    for line in block.lines() {
        // A colon in column 0 has no key.
        let Some(colon) = line.find(':').filter(|&i| i > 0) else {
            continue;
        };
        let key = line[..colon].trim();
        if key.is_empty() {
            continue;
        }
        let value = unquote(line[colon + 1..].trim());
        frontmatter.insert(key.to_string(), value.to_string());
    }

    frontmatter
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.starts_with(quote) && value.ends_with(quote) {
            return value.get(1..value.len().saturating_sub(1)).unwrap_or("");
        }
    }
    value
}
