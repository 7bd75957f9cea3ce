//! Line-oriented body → rich-text block conversion.

use std::sync::LazyLock;

use regex::Regex;

use cmsmigrate_shared::{Block, BlockStyle};

/// Convert a body into blocks, one per non-empty line.
///
/// Inline Markdown is kept as literal text and consecutive lines are not
/// merged into paragraphs.
pub fn body_to_blocks(body: &str) -> Vec<Block> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(line_to_block)
        .collect()
}

fn line_to_block(line: &str) -> Block {
    if let Some(block) = vimeo_block(line) {
        return block;
    }

    if line.starts_with('#') {
        let level = line.chars().take_while(|&c| c == '#').count();
        let text = line.trim_start_matches('#').trim_start();
        return Block::text(BlockStyle::heading(level), text);
    }

    Block::text(BlockStyle::Normal, line)
}

/// `<Vimeo url="..." />` at the start of a line. Bare ids expand to a
/// vimeo.com URL.
fn vimeo_block(line: &str) -> Option<Block> {
    static VIMEO_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^<Vimeo\s+url=(?:"([^"]+)"|'([^']+)')\s*/?>"#).expect("valid regex")
    });

    let caps = VIMEO_RE.captures(line)?;
    let value = caps.get(1).or_else(|| caps.get(2))?.as_str();
    let url = if value.starts_with("http") {
        value.to_string()
    } else {
        format!("https://vimeo.com/{value}")
    };
    Some(Block::vimeo(url, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(block: &Block) -> (BlockStyle, &str) {
        match block {
            Block::Text { style, children } => (*style, children[0].text.as_str()),
            other => panic!("expected text block, got {other:?}"),
        }
    }

    #[test]
    fn headings_and_paragraphs() {
        let blocks = body_to_blocks("# Header 1\n## Header 2\n\nRegular paragraph.");
        assert_eq!(blocks.len(), 3);
        assert_eq!(text_of(&blocks[0]), (BlockStyle::H1, "Header 1"));
        assert_eq!(text_of(&blocks[1]), (BlockStyle::H2, "Header 2"));
        assert_eq!(text_of(&blocks[2]), (BlockStyle::Normal, "Regular paragraph."));
    }

    #[test]
    fn deep_headings_cap_at_h6() {
        let blocks = body_to_blocks("######## Very deep");
        assert_eq!(text_of(&blocks[0]), (BlockStyle::H6, "Very deep"));
    }

    #[test]
    fn each_line_is_its_own_block() {
        let blocks = body_to_blocks("first line\n   second **bold** line   \n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(text_of(&blocks[1]), (BlockStyle::Normal, "second **bold** line"));
    }

    #[test]
    fn vimeo_tags_become_embeds() {
        let blocks = body_to_blocks(
            "<Vimeo url=\"123456\" />\n<Vimeo url='https://vimeo.com/987'/>\nSee <Vimeo url=\"1\" /> inline",
        );
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], Block::vimeo("https://vimeo.com/123456", "123456"));
        assert_eq!(
            blocks[1],
            Block::vimeo("https://vimeo.com/987", "https://vimeo.com/987")
        );
        assert_eq!(text_of(&blocks[2]).0, BlockStyle::Normal);
    }

    #[test]
    fn empty_body_has_no_blocks() {
        assert!(body_to_blocks("\n \n\t\n").is_empty());
    }
}
