//! PDF text extraction.
//!
//! `pdf-extract` handles the text layer; `lopdf` supplies the page count.
//! Extraction artifacts (null bytes, blank lines, ligatures) are cleaned
//! before the text reaches the chunker.

use std::fs;
use std::path::Path;

use crate::core::errors::RagError;

use super::Segment;

pub fn load(path: &Path, source: &str) -> Result<Vec<Segment>, RagError> {
    let data = fs::read(path).map_err(|e| RagError::Load(format!("{}: {}", source, e)))?;

    let raw = pdf_extract::extract_text_from_mem(&data)
        .map_err(|e| RagError::Load(format!("{}: {}", source, e)))?;

    let page_count = lopdf::Document::load_mem(&data)
        .map(|doc| doc.get_pages().len() as u32)
        .unwrap_or(1);

    // pdf-extract emits a form feed between pages; split on it so each
    // segment keeps its page number.
    let mut segments = Vec::new();
    for (i, page_text) in raw.split('\u{c}').enumerate() {
        let cleaned = cleanup(page_text);
        if cleaned.is_empty() {
            continue;
        }
        segments.push(Segment::text(cleaned, source, Some(i as u32 + 1)));
    }

    if segments.is_empty() {
        return Err(RagError::Load(format!(
            "{}: no extractable text layer ({} pages, likely scanned)",
            source, page_count
        )));
    }

    Ok(segments)
}

fn cleanup(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_drops_blank_lines_and_nulls() {
        let text = "First line\0\n\n   \n  Second line  \n";
        assert_eq!(cleanup(text), "First line\nSecond line");
    }

    #[test]
    fn cleanup_expands_ligatures() {
        assert_eq!(cleanup("e\u{FB01}cient"), "eficient");
        assert_eq!(cleanup("o\u{FB02}ine"), "ofline");
    }
}
