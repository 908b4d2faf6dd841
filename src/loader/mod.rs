//! Document loading: extension dispatch + per-format extraction.
//!
//! Every supported format yields plain-text [`Segment`]s carrying source
//! and page/slide metadata. Image-derived text additionally carries an
//! OCR confidence estimate so retrieval can filter likely noise.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

pub mod docx;
pub mod ocr;
pub mod pdf;
pub mod pptx;

/// Where a segment's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Native text layer of the document.
    Text,
    /// Text recovered from an image via OCR.
    Image,
}

/// One extracted span of document text with positional metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    /// File name of the originating document.
    pub source: String,
    /// 1-based page or slide number, when the format has one.
    pub page: Option<u32>,
    pub kind: SegmentKind,
    /// Heuristic OCR confidence for image-derived segments.
    pub ocr_confidence: Option<f32>,
}

impl Segment {
    pub fn text(text: String, source: &str, page: Option<u32>) -> Self {
        Self {
            text,
            source: source.to_string(),
            page,
            kind: SegmentKind::Text,
            ocr_confidence: None,
        }
    }

    pub fn image(text: String, source: &str, page: Option<u32>, confidence: f32) -> Self {
        Self {
            text,
            source: source.to_string(),
            page,
            kind: SegmentKind::Image,
            ocr_confidence: Some(confidence),
        }
    }
}

/// Extract text segments from a document, dispatching by extension.
pub fn load(file_path: &Path) -> Result<Vec<Segment>, RagError> {
    let source = file_name(file_path);
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "pdf" => pdf::load(file_path, &source),
        "docx" => docx::load(file_path, &source),
        "pptx" => pptx::load(file_path, &source),
        // Legacy .ppt is an OLE compound file, not a zip; the pptx parser
        // cannot read it.
        "ppt" => Err(RagError::UnsupportedFormat(
            ".ppt (legacy PowerPoint; convert to .pptx)".to_string(),
        )),
        "png" | "jpg" | "jpeg" => load_image(file_path, &source),
        "txt" | "md" => load_text(file_path, &source),
        other => Err(RagError::UnsupportedFormat(if other.is_empty() {
            "file has no extension".to_string()
        } else {
            format!(".{}", other)
        })),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn load_text(path: &Path, source: &str) -> Result<Vec<Segment>, RagError> {
    let text = fs::read_to_string(path)
        .map_err(|e| RagError::Load(format!("{}: {}", source, e)))?;
    Ok(vec![Segment::text(text, source, Some(1))])
}

fn load_image(path: &Path, source: &str) -> Result<Vec<Segment>, RagError> {
    let size = fs::metadata(path)
        .map_err(|e| RagError::Load(format!("{}: {}", source, e)))?
        .len();
    if size > ocr::MAX_IMAGE_BYTES {
        tracing::warn!("{} exceeds the OCR size limit, skipping extraction", source);
        return Ok(vec![Segment::image(String::new(), source, Some(1), 0.0)]);
    }

    let text = ocr::image_file(path)?;
    let confidence = ocr::estimate_confidence(&text);
    Ok(vec![Segment::image(text, source, Some(1), confidence)])
}
