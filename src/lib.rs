//! Retrieval-augmented question answering over a user's own documents.
//!
//! The pipeline: [`loader`] extracts text (with OCR fallback for image
//! content), [`chunker`] splits it into overlapping chunks, [`embedding`]
//! turns chunks into vectors, [`index`] stores them per owner, [`retrieval`]
//! finds the relevant ones, [`context`] and [`prompt`] build the model
//! input, [`generation`] produces the answer, and [`grounding`] scores how
//! much of it the sources actually support. [`engine`] ties the stages
//! together behind two entry points, `ingest` and `answer`.

pub mod chunker;
pub mod context;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod generation;
pub mod grounding;
pub mod index;
pub mod loader;
pub mod logging;
pub mod prompt;
pub mod retrieval;

pub use crate::core::config::{AppPaths, Config, RagConfig};
pub use crate::core::errors::RagError;
pub use crate::engine::{AnswerOutcome, AnswerResult, IngestReport, RagEngine};
pub use crate::prompt::{AnswerStyle, Turn};
