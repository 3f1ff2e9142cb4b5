//! Semantic similarity for section embeddings
//!
//! Provides the [`Embedder`] capability, cosine similarity, and the per-run
//! [`EmbeddingIndex`] used for nearest-neighbour lookups between sections.

use crate::error::{DocsiftError, Result};
use crate::sectionizer::Section;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Maps text to a fixed-length vector with cosine-similarity semantics
pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts. The default embeds them one at a time.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl<F> Embedder for F
where
    F: Fn(&str) -> Result<Vec<f32>>,
{
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self(text)
    }
}

/// Cosine similarity between two embedding vectors
/// Returns a value between -1.0 and 1.0 (1.0 = identical, 0.0 = orthogonal)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Section metadata stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSection {
    pub document: String,
    pub page_number: u32,
    pub section_title: String,
    pub section_text_raw: String,
}

impl From<&Section> for IndexedSection {
    fn from(s: &Section) -> Self {
        Self {
            document: s.document.clone(),
            page_number: s.page,
            section_title: s.title.clone(),
            section_text_raw: s.text.clone(),
        }
    }
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarSection {
    pub document: String,
    pub page_number: u32,
    pub section_title: String,
    pub score: f32,
}

/// Parallel arrays of sections and their embeddings, rebuilt every run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    pub sections: Vec<IndexedSection>,
    pub embeddings: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, section: IndexedSection, embedding: Vec<f32>) {
        self.sections.push(section);
        self.embeddings.push(embedding);
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Top `top_k` entries by cosine similarity to `query`, minus entries whose
    /// raw text equals `query_text`. The exclusion is applied after the top-k
    /// cut, so a self-match costs one result slot.
    pub fn find_similar(&self, query: &[f32], query_text: &str, top_k: usize) -> Vec<SimilarSection> {
        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, emb)| (i, cosine_similarity(query, emb)))
            .collect();

        // Sort by similarity descending
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .filter(|(i, _)| self.sections[*i].section_text_raw != query_text)
            .map(|(i, score)| {
                let s = &self.sections[i];
                SimilarSection {
                    document: s.document.clone(),
                    page_number: s.page_number,
                    section_title: s.section_title.clone(),
                    score,
                }
            })
            .collect()
    }

    /// Neighbours of the stored section at `position`, using its stored embedding
    pub fn find_similar_to_section(&self, position: usize, top_k: usize) -> Result<Vec<SimilarSection>> {
        let (section, embedding) = self
            .sections
            .get(position)
            .zip(self.embeddings.get(position))
            .ok_or_else(|| {
                DocsiftError::Index(format!(
                    "section {} out of range (index holds {})",
                    position,
                    self.len()
                ))
            })?;
        Ok(self.find_similar(embedding, &section.section_text_raw, top_k))
    }

    /// Embed `text` and look up its neighbours
    pub fn query(&self, embedder: &dyn Embedder, text: &str, top_k: usize) -> Result<Vec<SimilarSection>> {
        let query = embedder.embed(text)?;
        Ok(self.find_similar(&query, text, top_k))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self).map_err(|e| DocsiftError::Index(e.to_string()))?;
        fs::write(path, bytes).map_err(|source| DocsiftError::Persistence {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let index: EmbeddingIndex =
            bincode::deserialize(&bytes).map_err(|e| DocsiftError::Index(e.to_string()))?;
        if index.sections.len() != index.embeddings.len() {
            return Err(DocsiftError::Index(format!(
                "{} sections but {} embeddings",
                index.sections.len(),
                index.embeddings.len()
            )));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, text: &str) -> IndexedSection {
        IndexedSection {
            document: "a.pdf".to_string(),
            page_number: 1,
            section_title: title.to_string(),
            section_text_raw: text.to_string(),
        }
    }

    fn sample_index() -> EmbeddingIndex {
        let mut index = EmbeddingIndex::new();
        index.push(entry("a", "alpha"), vec![1.0, 0.0, 0.0]); // identical
        index.push(entry("b", "beta"), vec![0.9, 0.1, 0.0]); // very similar
        index.push(entry("c", "gamma"), vec![0.0, 1.0, 0.0]); // orthogonal
        index.push(entry("d", "delta"), vec![-1.0, 0.0, 0.0]); // opposite
        index
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_find_similar_excludes_self_text() {
        let index = sample_index();
        let similar = index.find_similar(&[1.0, 0.0, 0.0], "alpha", 2);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].section_title, "b");
    }

    #[test]
    fn test_find_similar_orders_by_score() {
        let index = sample_index();
        let similar = index.find_similar(&[1.0, 0.0, 0.0], "unrelated query", 10);
        let titles: Vec<&str> = similar.iter().map(|s| s.section_title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c", "d"]);
        assert!((similar[3].score + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_find_similar_to_section() {
        let index = sample_index();
        let similar = index.find_similar_to_section(1, 3).unwrap();
        assert_eq!(similar[0].section_title, "a");
        assert!(similar.iter().all(|s| s.section_title != "b"));
        assert!(matches!(index.find_similar_to_section(9, 3), Err(DocsiftError::Index(_))));
    }

    #[test]
    fn test_query_with_closure_embedder() {
        let index = sample_index();
        let embedder = |_: &str| -> Result<Vec<f32>> { Ok(vec![0.0, 1.0, 0.0]) };
        let similar = index.query(&embedder, "something", 1).unwrap();
        assert_eq!(similar[0].section_title, "c");
    }

    #[test]
    fn test_find_similar_with_nan_entry() {
        let mut index = sample_index();
        index.push(entry("e", "epsilon"), vec![f32::NAN, 0.0, 0.0]);
        let results = index.find_similar(&[1.0, 0.0, 0.0], "query", 10);
        assert_eq!(results.len(), 5);
        let finite: Vec<&str> = results
            .iter()
            .filter(|r| r.score.is_finite())
            .map(|r| r.section_title.as_str())
            .collect();
        assert_eq!(finite, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_find_similar_empty() {
        let index = EmbeddingIndex::new();
        assert!(index.find_similar(&[1.0], "x", 5).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case_index.bin");
        let index = sample_index();
        index.save(&path).unwrap();
        assert_eq!(EmbeddingIndex::load(&path).unwrap(), index);
    }
}
