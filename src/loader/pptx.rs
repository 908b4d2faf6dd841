//! PowerPoint extraction: one segment per slide.
//!
//! A .pptx is a zip archive; slide text lives in `<a:t>` runs inside
//! `ppt/slides/slideN.xml`. Slides with no text layer fall back to OCR
//! over the images their relationship file references — OCR is never run
//! when native text exists.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use zip::ZipArchive;

use crate::core::errors::RagError;

use super::{ocr, Segment};

pub fn load(path: &Path, source: &str) -> Result<Vec<Segment>, RagError> {
    let file = File::open(path).map_err(|e| RagError::Load(format!("{}: {}", source, e)))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| RagError::Load(format!("{}: {}", source, e)))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    if slides.is_empty() {
        return Err(RagError::Load(format!("{}: no slides found", source)));
    }

    let mut segments = Vec::new();
    for (number, name) in slides {
        let xml = match read_entry(&mut archive, &name) {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => continue,
        };
        let text = extract_text_runs(&xml);

        if !text.trim().is_empty() {
            segments.push(Segment::text(text, source, Some(number)));
            continue;
        }

        // No text layer on this slide; try OCR over its referenced images.
        match ocr_slide_images(&mut archive, number) {
            Ok(Some((text, confidence))) => {
                segments.push(Segment::image(
                    format!("[Image Content: {}]", text.trim()),
                    source,
                    Some(number),
                    confidence,
                ));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("OCR fallback failed for slide {} of {}: {}", number, source, err);
            }
        }
    }

    Ok(segments)
}

/// Pull the text of every `<a:t>` run, with paragraph breaks preserved.
fn extract_text_runs(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parts: Vec<String> = Vec::new();
    let mut in_text_run = false;
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                    current.clear();
                }
            }
            Ok(Event::Text(e)) => {
                if in_text_run {
                    if let Ok(text) = e.unescape() {
                        current.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" && in_text_run {
                    if !current.trim().is_empty() {
                        parts.push(current.trim().to_string());
                    }
                    in_text_run = false;
                }
                if name.as_ref() == b"p" && !parts.is_empty() {
                    parts.push("\n".to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    parts
        .join(" ")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// OCR the media images a slide's relationship file points at. Returns the
/// combined recognized text and the weakest confidence seen, or `None`
/// when the slide references no images.
fn ocr_slide_images(
    archive: &mut ZipArchive<File>,
    slide_number: u32,
) -> Result<Option<(String, f32)>, RagError> {
    let rels_name = format!("ppt/slides/_rels/slide{}.xml.rels", slide_number);
    let rels = match read_entry(archive, &rels_name) {
        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        None => return Ok(None),
    };

    let target_re = Regex::new(r#"Target="\.\./media/([^"]+)""#).map_err(RagError::internal)?;
    let mut combined = String::new();
    let mut confidence = f32::MAX;

    for capture in target_re.captures_iter(&rels) {
        let media_name = &capture[1];
        let extension = media_name.rsplit('.').next().unwrap_or("").to_lowercase();
        if !matches!(extension.as_str(), "png" | "jpg" | "jpeg") {
            continue;
        }

        let media_path = format!("ppt/media/{}", media_name);
        let Some(bytes) = read_entry(archive, &media_path) else {
            continue;
        };
        if bytes.len() as u64 > ocr::MAX_IMAGE_BYTES {
            continue;
        }

        let text = ocr::image_bytes(&bytes, &extension)?;
        if text.trim().is_empty() {
            continue;
        }
        confidence = confidence.min(ocr::estimate_confidence(&text));
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(text.trim());
    }

    if combined.is_empty() {
        Ok(None)
    } else {
        Ok(Some((combined, confidence)))
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Option<Vec<u8>> {
    let mut entry = archive.by_name(name).ok()?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}
