//! OCR via the system `tesseract` binary.
//!
//! Used as a fallback only: callers invoke this when a document (or slide)
//! has no native text layer. Confidence is a length heuristic, not a real
//! recognition score.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use crate::core::errors::RagError;

/// Images larger than this are not OCR'd (cost cap from the original product).
pub const MAX_IMAGE_BYTES: u64 = 3_000_000;

/// Run OCR over an image file. Fails with `Load` when tesseract is not
/// installed or exits abnormally.
pub fn image_file(path: &Path) -> Result<String, RagError> {
    let binary = which::which("tesseract").map_err(|_| {
        RagError::Load("image has no text layer and OCR is unavailable (tesseract not found)".into())
    })?;

    // `stdout` makes tesseract write recognized text to standard output;
    // --psm 6 assumes a uniform block of text, which suits slides.
    let output = Command::new(binary)
        .arg(path)
        .arg("stdout")
        .args(["--psm", "6"])
        .output()
        .map_err(|e| RagError::Load(format!("failed to run tesseract: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RagError::Load(format!(
            "tesseract failed: {}",
            stderr.trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.chars().filter(|c| !c.is_control() || *c == '\n').collect())
}

/// OCR in-memory image bytes (e.g. media extracted from a slide archive)
/// by staging them in a scratch file.
pub fn image_bytes(bytes: &[u8], extension: &str) -> Result<String, RagError> {
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{}", extension))
        .tempfile()
        .map_err(RagError::internal)?;
    file.write_all(bytes).map_err(RagError::internal)?;
    image_file(file.path())
}

/// Length-based confidence heuristic: empty or near-empty output usually
/// means the recognizer found noise, not text.
pub fn estimate_confidence(text: &str) -> f32 {
    let trimmed = text.trim();
    if trimmed.len() < 20 {
        0.2
    } else if trimmed.len() < 100 {
        0.5
    } else {
        0.8
    }
}
