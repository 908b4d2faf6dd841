//! Groundedness scoring: what fraction of an answer is supported by the
//! retrieved chunks.
//!
//! The answer is split into sentence fragments; each fragment counts as
//! grounded when it appears verbatim in the normalized source text or its
//! fuzzy similarity against a sliding word window of the source meets the
//! threshold. The score is advisory — it drives a confidence indicator
//! and, only in strict mode, a refusal.

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::config::RagConfig;

/// Grounded/general split in whole percentage points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub grounded_pct: u8,
    pub general_pct: u8,
}

impl Coverage {
    pub fn ungrounded() -> Self {
        Self {
            grounded_pct: 0,
            general_pct: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroundingScorer {
    threshold: f32,
    min_fragment_chars: usize,
}

impl GroundingScorer {
    pub fn new(config: &RagConfig) -> Self {
        Self {
            threshold: config.grounding_threshold,
            min_fragment_chars: config.min_fragment_chars,
        }
    }

    /// Score an answer against the retrieved chunk texts.
    pub fn score(&self, answer: &str, chunk_texts: &[&str]) -> Coverage {
        let fragments = self.analyze(answer, chunk_texts);
        if fragments.is_empty() {
            return Coverage::ungrounded();
        }

        let grounded = fragments.iter().filter(|(_, ok)| *ok).count();
        let grounded_pct =
            ((100.0 * grounded as f64 / fragments.len() as f64).round() as u8).min(100);
        Coverage {
            grounded_pct,
            general_pct: 100 - grounded_pct,
        }
    }

    /// The answer fragments that matched source text, in answer order.
    pub fn grounded_spans(&self, answer: &str, chunk_texts: &[&str]) -> Vec<String> {
        self.analyze(answer, chunk_texts)
            .into_iter()
            .filter_map(|(fragment, ok)| ok.then_some(fragment))
            .collect()
    }

    /// Fragment the answer and mark each fragment grounded or not.
    /// Empty answer or empty sources yield no fragments.
    fn analyze(&self, answer: &str, chunk_texts: &[&str]) -> Vec<(String, bool)> {
        if answer.trim().is_empty() || chunk_texts.is_empty() {
            return Vec::new();
        }

        let source = normalize(&chunk_texts.join(" "));
        if source.is_empty() {
            return Vec::new();
        }
        let source_words: Vec<&str> = source.split_whitespace().collect();

        fragments(answer)
            .into_iter()
            .filter_map(|fragment| {
                let normalized = normalize(&fragment);
                if normalized.len() < self.min_fragment_chars {
                    return None;
                }
                let grounded = source.contains(&normalized)
                    || partial_ratio(&normalized, &source_words) >= self.threshold;
                Some((fragment, grounded))
            })
            .collect()
    }
}

/// Split an answer into candidate fragments: sentences, with line breaks
/// also acting as boundaries so bullets and table rows fragment cleanly.
fn fragments(answer: &str) -> Vec<String> {
    answer
        .lines()
        .flat_map(|line| line.split_sentence_bounds())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Canonical form for matching: lowercase, markdown and extraction
/// artifacts stripped, whitespace collapsed.
fn normalize(text: &str) -> String {
    let mut cleaned = text.to_lowercase();
    for artifact in ["[image content:", "image content:"] {
        cleaned = cleaned.replace(artifact, " ");
    }
    let stripped: String = cleaned
        .chars()
        .map(|c| match c {
            '*' | '#' | '`' | '|' | '_' | '>' | '[' | ']' => ' ',
            _ => c,
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best similarity between the needle and any same-length word window of
/// the haystack. Word-level diffing tolerates minor rephrasing and word
/// order changes the way a partial-ratio comparison does.
fn partial_ratio(needle: &str, haystack_words: &[&str]) -> f32 {
    let needle_words: Vec<&str> = needle.split_whitespace().collect();
    if needle_words.is_empty() {
        return 0.0;
    }
    if haystack_words.len() <= needle_words.len() {
        return TextDiff::from_slices(&needle_words, haystack_words).ratio();
    }

    let window = needle_words.len();
    let mut best = 0.0f32;
    for start in 0..=(haystack_words.len() - window) {
        let ratio =
            TextDiff::from_slices(&needle_words, &haystack_words[start..start + window]).ratio();
        if ratio > best {
            best = ratio;
        }
        if best >= 0.999 {
            break;
        }
    }
    best
}
