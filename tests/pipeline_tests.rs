//! End-to-end pipeline tests over the engine with in-process service
//! doubles: a deterministic term-count embedder and a scripted generator,
//! so no network is involved.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use deckmind_backend::core::config::RagConfig;
use deckmind_backend::core::errors::RagError;
use deckmind_backend::embedding::Embedder;
use deckmind_backend::engine::{AnswerOutcome, ConfidenceLabel, RagEngine, NOT_FOUND_TEXT};
use deckmind_backend::generation::GenerativeModel;
use deckmind_backend::index::VectorIndex;
use deckmind_backend::prompt::AnswerStyle;

/// Embeds text as term counts over a fixed vocabulary. Deterministic, and
/// cosine similarity behaves the way a real embedding roughly does: texts
/// sharing vocabulary terms score high together.
struct TermEmbedder {
    vocabulary: Vec<&'static str>,
}

impl TermEmbedder {
    fn biology() -> Self {
        Self {
            vocabulary: vec![
                "mitochondria",
                "powerhouse",
                "atp",
                "photosynthesis",
                "chlorophyll",
                "ribosome",
                "protein",
                "napoleon",
                "waterloo",
            ],
        }
    }
}

#[async_trait]
impl Embedder for TermEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lowered = text.to_lowercase();
                self.vocabulary
                    .iter()
                    .map(|term| lowered.matches(term).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Returns a fixed answer. With `expect_no_call` set it fails the test if
/// the engine reaches generation at all.
struct ScriptedGenerator {
    reply: String,
    expect_no_call: bool,
}

impl ScriptedGenerator {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            expect_no_call: false,
        }
    }

    fn must_not_be_called() -> Self {
        Self {
            reply: String::new(),
            expect_no_call: true,
        }
    }
}

#[async_trait]
impl GenerativeModel for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, RagError> {
        assert!(
            !self.expect_no_call,
            "generation was invoked but the call should have short-circuited"
        );
        Ok(self.reply.clone())
    }
}

fn write_doc(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn write_pptx(dir: &TempDir, slides: &[&str]) -> PathBuf {
    use std::io::Write;

    let path = dir.path().join("deck.pptx");
    let file = fs::File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    for (i, content) in slides.iter().enumerate() {
        writer
            .start_file(format!("ppt/slides/slide{}.xml", i + 1), options)
            .unwrap();
        let xml = format!(
            "<p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\">\
             <p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sld>",
            content
        );
        writer.write_all(xml.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn engine_with(
    index_dir: &TempDir,
    generator: ScriptedGenerator,
) -> (RagEngine, Arc<VectorIndex>) {
    let index = Arc::new(VectorIndex::open(index_dir.path()).unwrap());
    let engine = RagEngine::new(
        RagConfig::default(),
        Arc::new(TermEmbedder::biology()),
        Arc::new(generator),
        index.clone(),
    );
    (engine, index)
}

const CELL_NOTES: &str = "The mitochondria is the powerhouse of the cell. \
    It produces ATP through cellular respiration.\n\n\
    Photosynthesis converts light into chemical energy using chlorophyll.\n\n\
    Ribosomes assemble protein chains from amino acids.";

#[tokio::test]
async fn ingesting_the_same_document_twice_does_not_duplicate_chunks() {
    let docs = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let (engine, index) = engine_with(&store, ScriptedGenerator::replying("ok"));
    let path = write_doc(&docs, "cells.txt", CELL_NOTES);

    let first = engine.ingest(&path, "alice").await.unwrap();
    let second = engine.ingest(&path, "alice").await.unwrap();

    assert_eq!(first.chunks_indexed, second.chunks_indexed);
    assert_eq!(first.fingerprint, second.fingerprint);

    let snapshot = index.snapshot("alice").await.unwrap();
    assert_eq!(snapshot.records.len(), first.chunks_indexed);
}

#[tokio::test]
async fn owners_never_see_each_others_documents() {
    let docs = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let (engine, _index) = engine_with(
        &store,
        ScriptedGenerator::replying("The mitochondria is the powerhouse of the cell."),
    );

    let alice_doc = write_doc(&docs, "cells.txt", CELL_NOTES);
    let bob_doc = write_doc(
        &docs,
        "history.txt",
        "Napoleon commanded the French army at Waterloo in 1815. \
         The battle ended the Napoleonic Wars.",
    );
    engine.ingest(&alice_doc, "alice").await.unwrap();
    engine.ingest(&bob_doc, "bob").await.unwrap();

    // Bob asks about Alice's material; nothing of hers may surface.
    let outcome = engine
        .answer("What is the mitochondria?", AnswerStyle::Concise, "bob", &[], false)
        .await
        .unwrap();

    match outcome {
        AnswerOutcome::Answered(result) => {
            assert_eq!(result.text, NOT_FOUND_TEXT);
            assert_eq!(result.confidence_label, ConfidenceLabel::NoDocuments);
            assert!(result.sources.is_empty());
        }
        AnswerOutcome::Refused { .. } => panic!("expected the not-found answer"),
    }
}

#[tokio::test]
async fn index_survives_a_restart() {
    let docs = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let path = write_doc(&docs, "cells.txt", CELL_NOTES);

    let report = {
        let (engine, _index) = engine_with(&store, ScriptedGenerator::replying("ok"));
        engine.ingest(&path, "alice").await.unwrap()
    };

    // Fresh index handle over the same directory, as after a restart.
    let (engine, index) = engine_with(
        &store,
        ScriptedGenerator::replying("The mitochondria is the powerhouse of the cell."),
    );
    let snapshot = index.snapshot("alice").await.unwrap();
    assert_eq!(snapshot.records.len(), report.chunks_indexed);

    let outcome = engine
        .answer("What is the mitochondria?", AnswerStyle::Concise, "alice", &[], false)
        .await
        .unwrap();
    match outcome {
        AnswerOutcome::Answered(result) => {
            assert_eq!(result.coverage.grounded_pct, 100);
            assert_eq!(result.sources[0].source, "cells.txt");
        }
        AnswerOutcome::Refused { .. } => panic!("expected an answer"),
    }
}

#[tokio::test]
async fn no_documents_short_circuits_without_calling_the_model() {
    let store = TempDir::new().unwrap();
    let (engine, _index) = engine_with(&store, ScriptedGenerator::must_not_be_called());

    let outcome = engine
        .answer("What is ATP?", AnswerStyle::Detailed, "nobody", &[], false)
        .await
        .unwrap();

    match outcome {
        AnswerOutcome::Answered(result) => {
            assert_eq!(result.text, NOT_FOUND_TEXT);
            assert_eq!(result.coverage.grounded_pct, 0);
            assert!(result.grounded_spans.is_empty());
        }
        AnswerOutcome::Refused { .. } => panic!("expected the not-found answer"),
    }
}

#[tokio::test]
async fn grounded_answer_reports_full_coverage_and_spans() {
    let docs = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let (engine, _index) = engine_with(
        &store,
        ScriptedGenerator::replying(
            "The mitochondria is the powerhouse of the cell. \
             It produces ATP through cellular respiration.",
        ),
    );
    let path = write_doc(&docs, "cells.txt", CELL_NOTES);
    engine.ingest(&path, "alice").await.unwrap();

    let outcome = engine
        .answer("What does the mitochondria do?", AnswerStyle::Detailed, "alice", &[], false)
        .await
        .unwrap();

    match outcome {
        AnswerOutcome::Answered(result) => {
            assert_eq!(result.coverage.grounded_pct, 100);
            assert!(!result.grounded_spans.is_empty());
            assert!(result.grounded_spans[0].contains("powerhouse"));
            assert_eq!(result.sources[0].source, "cells.txt");
        }
        AnswerOutcome::Refused { .. } => panic!("expected an answer"),
    }
}

#[tokio::test]
async fn slide_deck_end_to_end_ranks_the_relevant_slide_first() {
    let docs = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();

    let index = Arc::new(VectorIndex::open(store.path()).unwrap());
    let mut config = RagConfig::default();
    config.top_k = 2;
    let engine = RagEngine::new(
        config,
        Arc::new(TermEmbedder::biology()),
        Arc::new(ScriptedGenerator::replying(
            "The mitochondria is the powerhouse of the cell.",
        )),
        index,
    );

    let deck = write_pptx(&docs, &[
        "The mitochondria is the powerhouse of the cell. It produces ATP.",
        "Chloroplasts perform photosynthesis using chlorophyll and also produce ATP.",
        "Ribosomes assemble protein chains from amino acids.",
    ]);
    let report = engine.ingest(&deck, "alice").await.unwrap();
    assert_eq!(report.chunks_indexed, 3);
    assert_eq!(report.source_document, "deck.pptx");

    let outcome = engine
        .answer(
            "Does the mitochondria powerhouse produce ATP?",
            AnswerStyle::Concise,
            "alice",
            &[],
            false,
        )
        .await
        .unwrap();

    match outcome {
        AnswerOutcome::Answered(result) => {
            // k = 2: slide 1 is the best hit, slide 2 shares only "ATP",
            // slide 3 shares nothing and must not appear.
            assert_eq!(result.sources.len(), 2);
            assert_eq!(result.sources[0].source, "deck.pptx");
            assert_eq!(result.sources[0].page, Some(1));
            assert_eq!(result.sources[1].page, Some(2));
            assert_eq!(result.coverage.grounded_pct, 100);
            assert!(result.grounded_spans[0].contains("powerhouse"));
        }
        AnswerOutcome::Refused { .. } => panic!("expected an answer"),
    }
}

#[tokio::test]
async fn strict_mode_refuses_an_ungrounded_answer() {
    let docs = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let (engine, _index) = engine_with(
        &store,
        ScriptedGenerator::replying(
            "Napoleon commanded the French army at Waterloo in 1815.",
        ),
    );
    let path = write_doc(&docs, "cells.txt", CELL_NOTES);
    engine.ingest(&path, "alice").await.unwrap();

    let outcome = engine
        .answer("What is the mitochondria?", AnswerStyle::Concise, "alice", &[], true)
        .await
        .unwrap();

    match outcome {
        AnswerOutcome::Refused { coverage, sources } => {
            assert_eq!(coverage.grounded_pct, 0);
            assert!(!sources.is_empty());
        }
        AnswerOutcome::Answered(_) => panic!("strict mode should refuse"),
    }
}
