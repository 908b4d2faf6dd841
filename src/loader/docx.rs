//! DOCX text extraction via docx-rs.

use std::fs;
use std::path::Path;

use crate::core::errors::RagError;

use super::Segment;

pub fn load(path: &Path, source: &str) -> Result<Vec<Segment>, RagError> {
    let data = fs::read(path).map_err(|e| RagError::Load(format!("{}: {}", source, e)))?;

    let doc = docx_rs::read_docx(&data)
        .map_err(|e| RagError::Load(format!("{}: {}", source, e)))?;

    let mut text = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            line.push_str(&t.text);
                        }
                    }
                }
            }
            if !line.trim().is_empty() {
                text.push_str(line.trim());
                text.push('\n');
            }
        }
    }

    if text.trim().is_empty() {
        return Err(RagError::Load(format!("{}: document contains no text", source)));
    }

    // Word does not expose page boundaries in the XML; the whole body is
    // one segment on page 1.
    Ok(vec![Segment::text(text, source, Some(1))])
}
