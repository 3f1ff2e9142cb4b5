//! docsift: persona-driven section extraction and ranking for PDF collections
//!
//! Documents are read as layout (text blocks with boxes plus a heading
//! outline), cut into sections, scored against a persona and a job to be
//! done, and emitted as one ranked list per case.

pub mod cases;
pub mod error;
pub mod keywords;
pub mod layout;
pub mod layout_file;
#[cfg(feature = "local-embeddings")]
pub mod local_embeddings;
#[cfg(feature = "pdf")]
pub mod pdf_layout;
pub mod persona;
pub mod pipeline;
pub mod scoring;
pub mod sectionizer;
pub mod settings;
pub mod similarity;
pub mod utils;

pub use error::{DocsiftError, Result};
pub use persona::{Persona, PersonaJob};
pub use pipeline::{Pipeline, RankedSection, RunResult};
pub use settings::Settings;
pub use similarity::{Embedder, EmbeddingIndex};
