//! Relevance scoring of sections against a persona and job
//!
//! The score is additive and unbounded:
//! - `keyword_match_weight` per query keyword present as an exact token
//! - `embedding_weight × (cos + 1) / 2` when an embedder is available
//! - `short_section_bonus` for short sections that mention any keyword
//!
//! Scores are only comparable within one run; ranking happens in the pipeline.

use crate::persona::PersonaJob;
use crate::settings::Settings;
use crate::similarity::{cosine_similarity, Embedder};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Lowercased word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// Result of the embedding term for one section
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingOutcome {
    /// No embedder configured
    Unavailable,
    /// Cosine similarity in [-1, 1]
    Scored(f32),
    /// Embedding failed; the term contributes nothing
    Failed(String),
}

impl EmbeddingOutcome {
    pub fn cosine(&self) -> Option<f32> {
        match self {
            EmbeddingOutcome::Scored(c) => Some(*c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceScore {
    pub total: f32,
    /// Distinct query keywords found as tokens
    pub keyword_matches: usize,
    pub embedding: EmbeddingOutcome,
    pub short_bonus: bool,
    /// The section's own embedding, reused for the similarity index
    pub section_embedding: Option<Vec<f32>>,
}

/// Scores sections against one persona/job. Query keywords and the query
/// embedding are computed once at construction.
pub struct RelevanceScorer<'a> {
    settings: &'a Settings,
    embedder: Option<&'a dyn Embedder>,
    keywords: HashSet<String>,
    query_embedding: Option<Result<Vec<f32>, String>>,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(query: &PersonaJob, embedder: Option<&'a dyn Embedder>, settings: &'a Settings) -> Self {
        let keywords = query_keywords(query);
        let query_embedding = embedder.map(|e| {
            e.embed(&combined_query(query)).map_err(|err| {
                tracing::warn!("[Scoring] Query embedding failed: {}", err);
                err.to_string()
            })
        });

        Self { settings, embedder, keywords, query_embedding }
    }

    /// Embed every section text through one `embed_batch` call. When the
    /// batch fails the texts are embedded one at a time, so a bad text only
    /// degrades its own section. `None` entries mean no embedder is configured.
    pub fn embed_sections(&self, texts: &[&str]) -> Vec<Option<Result<Vec<f32>, String>>> {
        let Some(embedder) = self.embedder else {
            return vec![None; texts.len()];
        };

        match embedder.embed_batch(texts) {
            Ok(vectors) if vectors.len() == texts.len() => {
                return vectors.into_iter().map(|v| Some(Ok(v))).collect();
            }
            Ok(vectors) => tracing::warn!(
                "[Scoring] Batch embedding returned {} vectors for {} sections, retrying one by one",
                vectors.len(),
                texts.len()
            ),
            Err(e) => tracing::debug!("[Scoring] Batch embedding failed ({}), retrying one by one", e),
        }

        texts
            .iter()
            .map(|t| Some(embedder.embed(t).map_err(|e| e.to_string())))
            .collect()
    }

    /// Score `text`, embedding it with the configured embedder
    pub fn score(&self, text: &str) -> RelevanceScore {
        let section = self.embedder.map(|e| e.embed(text).map_err(|err| err.to_string()));
        self.score_embedded(text, section)
    }

    /// Score `text` with an already computed section embedding
    pub fn score_embedded(
        &self,
        text: &str,
        section: Option<Result<Vec<f32>, String>>,
    ) -> RelevanceScore {
        let tokens: HashSet<String> = tokenize(text).into_iter().collect();
        let keyword_matches = self.keywords.iter().filter(|kw| tokens.contains(*kw)).count();
        let mut total = keyword_matches as f32 * self.settings.keyword_match_weight;

        let (embedding, section_embedding) = self.embedding_term(section);
        if let Some(cos) = embedding.cosine() {
            total += (cos + 1.0) / 2.0 * self.settings.embedding_weight;
        }

        let lower = text.to_lowercase();
        let short_bonus = text.split_whitespace().count() < self.settings.short_section_words
            && self.keywords.iter().any(|kw| lower.contains(kw.as_str()));
        if short_bonus {
            total += self.settings.short_section_bonus;
        }

        RelevanceScore { total, keyword_matches, embedding, short_bonus, section_embedding }
    }

    fn embedding_term(
        &self,
        section: Option<Result<Vec<f32>, String>>,
    ) -> (EmbeddingOutcome, Option<Vec<f32>>) {
        let (Some(section), Some(query)) = (section, self.query_embedding.as_ref()) else {
            return (EmbeddingOutcome::Unavailable, None);
        };

        let section = match section {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("[Scoring] Semantic similarity failed for a section: {}", e);
                return (EmbeddingOutcome::Failed(e), None);
            }
        };

        match query {
            Ok(q) => {
                let cos = cosine_similarity(q, &section);
                if cos.is_finite() {
                    (EmbeddingOutcome::Scored(cos), Some(section))
                } else {
                    (EmbeddingOutcome::Failed("non-finite similarity".to_string()), None)
                }
            }
            Err(e) => (EmbeddingOutcome::Failed(e.clone()), Some(section)),
        }
    }
}

/// Job tokens unioned with focus-area tokens
pub fn query_keywords(query: &PersonaJob) -> HashSet<String> {
    let mut keywords: HashSet<String> = tokenize(&query.job).into_iter().collect();
    if let Some(focus) = query.persona.focus_areas() {
        keywords.extend(tokenize(&focus));
    }
    keywords
}

/// Query text for the embedding term: the job plus labelled persona fragments
pub fn combined_query(query: &PersonaJob) -> String {
    let mut parts = vec![query.job.clone()];
    if let Some(d) = query.persona.description() {
        parts.push(format!("Persona description: {}", d));
    }
    if let Some(r) = query.persona.role() {
        parts.push(format!("Role: {}", r));
    }
    if let Some(f) = query.persona.focus_areas() {
        parts.push(format!("Focus areas: {}", f));
    }
    parts.join(". ")
}

/// Score a single section without keeping a scorer around
pub fn calculate_relevance(
    text: &str,
    query: &PersonaJob,
    embedder: Option<&dyn Embedder>,
    settings: &Settings,
) -> RelevanceScore {
    RelevanceScorer::new(query, embedder, settings).score(text)
}
