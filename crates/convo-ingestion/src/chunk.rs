//! Format detection, text extraction, and paragraph-aware chunking.
//!
//! Chunking mirrors the line-accumulation shape of the teacher's ingestion
//! loop (`spacebot/src/agent/ingestion.rs::chunk_text`), generalized with a
//! token-budget overlap so retrieval chunks don't lose context at a boundary,
//! and with paragraph rather than line granularity so a short FAQ entry
//! survives as one unit instead of being split mid-answer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("unreadable pdf: {0}")]
    Pdf(String),

    #[error("not valid utf-8 text: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Markdown,
    PlainText,
    Html,
    Pdf,
}

/// Detect format from the asset's title (which carries the original
/// filename) falling back to the content-addressed object key's extension.
pub fn detect_format(title: &str, object_key: &str) -> AssetFormat {
    let ext = title
        .rsplit('.')
        .next()
        .filter(|e| *e != title)
        .or_else(|| object_key.rsplit('.').next().filter(|e| *e != object_key))
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "md" | "markdown" => AssetFormat::Markdown,
        "html" | "htm" => AssetFormat::Html,
        "pdf" => AssetFormat::Pdf,
        _ => AssetFormat::PlainText,
    }
}

/// Extract plain text from raw bytes according to `format`. Callers
/// processing a `Pdf` should run this on a blocking thread; the others are
/// cheap enough to call inline.
pub fn extract_text(format: AssetFormat, bytes: &[u8]) -> Result<String, ChunkError> {
    match format {
        AssetFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ChunkError::Pdf(e.to_string()))
        }
        AssetFormat::Html => {
            let text = std::str::from_utf8(bytes).map_err(|e| ChunkError::Encoding(e.to_string()))?;
            let document = scraper::Html::parse_document(text);
            Ok(document.root_element().text().collect::<Vec<_>>().join(" "))
        }
        AssetFormat::Markdown => {
            let text = std::str::from_utf8(bytes).map_err(|e| ChunkError::Encoding(e.to_string()))?;
            Ok(markdown_to_text(text))
        }
        AssetFormat::PlainText => {
            std::str::from_utf8(bytes).map(str::to_string).map_err(|e| ChunkError::Encoding(e.to_string()))
        }
    }
}

/// Strip markdown syntax down to plain paragraphs, one blank line per block
/// (heading, paragraph, list item) so `chunk_text`'s paragraph splitter sees
/// the same section boundaries a reader would.
fn markdown_to_text(markdown: &str) -> String {
    use pulldown_cmark::{Event, Parser, Tag, TagEnd};

    let mut out = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => out.push_str("\n\n"),
            Event::Start(Tag::Heading { .. }) => {}
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            _ => {}
        }
    }
    out
}

fn approx_tokens(s: &str) -> u32 {
    ((s.len() as u32) + 3) / 4
}

/// Split `text` into paragraphs (blank-line separated), then greedily pack
/// paragraphs into chunks up to `max_tokens`, carrying the last `overlap_tokens`
/// worth of trailing text from one chunk into the next so retrieval doesn't
/// lose the sentence a boundary fell on. A paragraph that alone exceeds
/// `max_tokens` (e.g. a dense FAQ answer) is kept whole as its own chunk
/// rather than split mid-sentence.
pub fn chunk_text(text: &str, max_tokens: u32, overlap_tokens: u32) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect();
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in paragraphs {
        let candidate_tokens = approx_tokens(&current) + approx_tokens(para);
        if !current.is_empty() && candidate_tokens > max_tokens {
            chunks.push(std::mem::take(&mut current));
            current = trailing_overlap(chunks.last().unwrap(), overlap_tokens);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// The last `overlap_tokens` worth of characters from `chunk`, snapped to a
/// whitespace boundary so the carried-over text doesn't start mid-word.
fn trailing_overlap(chunk: &str, overlap_tokens: u32) -> String {
    if overlap_tokens == 0 {
        return String::new();
    }
    let overlap_chars = (overlap_tokens as usize) * 4;
    if chunk.len() <= overlap_chars {
        return chunk.to_string();
    }
    let start = chunk.len() - overlap_chars;
    let boundary = chunk[start..].find(char::is_whitespace).map(|i| start + i + 1).unwrap_or(start);
    chunk[boundary..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_title_extension() {
        assert_eq!(detect_format("faq.md", "knowledge/t/b/abc"), AssetFormat::Markdown);
        assert_eq!(detect_format("manual.pdf", "knowledge/t/b/abc"), AssetFormat::Pdf);
        assert_eq!(detect_format("page.html", "knowledge/t/b/abc"), AssetFormat::Html);
        assert_eq!(detect_format("notes", "knowledge/t/b/abc.txt"), AssetFormat::PlainText);
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunks = chunk_text("# FAQ\n\nQ: reset?\nA: press hold 5s.", 512, 64);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn long_document_splits_with_overlap() {
        let para = "word ".repeat(200); // ~1000 chars, well over one chunk at max_tokens=50
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        // Every chunk after the first carries some trailing text from its predecessor.
        for window in chunks.windows(2) {
            assert!(!window[1].is_empty());
        }
    }

    #[test]
    fn markdown_extraction_strips_syntax_and_keeps_paragraph_breaks() {
        let text = extract_text(AssetFormat::Markdown, b"# FAQ\n\nQ: reset?\nA: press hold 5s.").unwrap();
        assert!(!text.contains('#'));
        assert!(text.contains("FAQ"));
        assert!(text.contains("reset?"));
    }

    #[test]
    fn oversized_single_paragraph_is_kept_whole() {
        let para = "x".repeat(5000);
        let chunks = chunk_text(&para, 10, 5);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], para);
    }
}
