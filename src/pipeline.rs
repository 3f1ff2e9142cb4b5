//! Ranking & refinement pipeline
//!
//! For one persona/job and a set of documents:
//! 1. Sectionize every document independently (a failing document is
//!    recorded and skipped, its siblings continue)
//! 2. Score, embed and keyword each section
//! 3. Stable-sort all sections by score, descending, and assign dense ranks
//! 4. Attach a refined excerpt (first sentences) to every section

use crate::error::Result;
use crate::keywords::extract_keywords;
use crate::layout::{extract_items, LayoutSource};
use crate::persona::{Persona, PersonaJob};
use crate::scoring::{EmbeddingOutcome, RelevanceScorer};
use crate::sectionizer::{sectionize, Section};
use crate::settings::Settings;
use crate::similarity::{Embedder, EmbeddingIndex, IndexedSection};
use serde::{Deserialize, Serialize};

/// A section with its raw relevance score, before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSection {
    pub section: Section,
    pub score: f32,
    pub keywords: Vec<String>,
}

/// Final annotated section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSection {
    pub document: String,
    pub page_number: u32,
    pub section_title: String,
    /// Dense 1-based rank
    pub importance_rank: u32,
    pub section_text_raw: String,
    pub refined_text: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub input_documents: Vec<String>,
    pub persona: Persona,
    pub job_to_be_done: String,
    pub processing_timestamp: String,
}

/// Result object of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub metadata: RunMetadata,
    pub extracted_sections: Vec<RankedSection>,
}

impl RunResult {
    /// Pretty JSON; non-ASCII characters are written as-is
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A document that could not be sectioned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentFailure {
    pub document: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub result: RunResult,
    /// Present when an embedder was configured and at least one section embedded
    pub index: Option<EmbeddingIndex>,
    pub failures: Vec<DocumentFailure>,
    /// Sections whose embedding term failed
    pub degraded_sections: usize,
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, embedder: Option<&'a dyn Embedder>) -> Self {
        Self { settings, embedder }
    }

    /// Sections of a single document, in document order
    pub fn extract_sections(&self, source: &dyn LayoutSource) -> Result<Vec<Section>> {
        let stream = extract_items(source, self.settings)?;
        Ok(sectionize(&stream, self.settings))
    }

    /// Score every section and compute keywords. Also returns the embedding
    /// index (extraction order) and the number of degraded sections.
    pub fn score_sections(
        &self,
        sections: Vec<Section>,
        query: &PersonaJob,
    ) -> (Vec<ScoredSection>, Option<EmbeddingIndex>, usize) {
        let scorer = RelevanceScorer::new(query, self.embedder, self.settings);
        let mut index = EmbeddingIndex::new();
        let mut degraded = 0;

        let texts: Vec<&str> = sections.iter().map(|s| s.text.as_str()).collect();
        let embeddings = scorer.embed_sections(&texts);

        let scored = sections
            .into_iter()
            .zip(embeddings)
            .map(|(section, embedding)| {
                let relevance = scorer.score_embedded(&section.text, embedding);
                if matches!(relevance.embedding, EmbeddingOutcome::Failed(_)) {
                    degraded += 1;
                }
                if let Some(embedding) = relevance.section_embedding {
                    index.push(IndexedSection::from(&section), embedding);
                }
                let keywords = extract_keywords(&section.text, self.settings);
                ScoredSection { section, score: relevance.total, keywords }
            })
            .collect();

        let index = (self.embedder.is_some() && !index.is_empty()).then_some(index);
        (scored, index, degraded)
    }

    /// Sort by score (stable, descending) and assign ranks and refined text
    pub fn rank(&self, mut scored: Vec<ScoredSection>) -> Vec<RankedSection> {
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        scored
            .into_iter()
            .enumerate()
            .map(|(i, s)| RankedSection {
                refined_text: refine_text(&s.section.text, self.settings.refined_sentence_cap),
                document: s.section.document,
                page_number: s.section.page,
                section_title: s.section.title,
                importance_rank: (i + 1) as u32,
                section_text_raw: s.section.text,
                keywords: s.keywords,
            })
            .collect()
    }

    /// Run the whole pipeline over named documents. Each entry is a document
    /// name and either an opened layout source or the error from opening it.
    pub fn run<I>(&self, documents: I, query: &PersonaJob) -> PipelineOutput
    where
        I: IntoIterator<Item = (String, Result<Box<dyn LayoutSource>>)>,
    {
        let mut input_documents = Vec::new();
        let mut failures = Vec::new();
        let mut sections = Vec::new();

        for (name, source) in documents {
            tracing::info!("[Pipeline] Processing document: {}", name);
            match source.and_then(|s| self.extract_sections(s.as_ref())) {
                Ok(doc_sections) => {
                    tracing::debug!("[Pipeline] {}: {} sections", name, doc_sections.len());
                    sections.extend(doc_sections);
                }
                Err(e) => {
                    tracing::error!("[Pipeline] Skipping document {}: {}", name, e);
                    failures.push(DocumentFailure { document: name.clone(), error: e.to_string() });
                }
            }
            input_documents.push(name);
        }

        tracing::info!("[Pipeline] Extracted {} potential sections", sections.len());

        let (scored, index, degraded_sections) = self.score_sections(sections, query);
        if degraded_sections > 0 {
            tracing::warn!(
                "[Pipeline] {} sections scored without the embedding term",
                degraded_sections
            );
        }
        let extracted_sections = self.rank(scored);

        let result = RunResult {
            metadata: RunMetadata {
                input_documents,
                persona: query.persona.clone(),
                job_to_be_done: query.job.clone(),
                processing_timestamp: timestamp(),
            },
            extracted_sections,
        };

        PipelineOutput { result, index, failures, degraded_sections }
    }
}

/// Local time, ISO-8601 without offset
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Split after `.`, `!` or `?` when followed by whitespace; the whitespace is dropped
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(end, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }

        sentences.push(&text[start..end]);
        start = end;
        while let Some(&(i, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            start = i + w.len_utf8();
            chars.next();
        }
    }

    sentences.push(&text[start..]);
    sentences
}

/// First `cap` sentences joined with a single space
pub fn refine_text(text: &str, cap: usize) -> String {
    split_sentences(text)
        .into_iter()
        .take(cap)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocsiftError;
    use crate::layout::tests::{block, heading, MemSource};
    use crate::layout::HeadingLevel;
    use serde_json::json;

    fn section(document: &str, title: &str, text: &str) -> Section {
        Section {
            document: document.to_string(),
            page: 1,
            title: title.to_string(),
            level: HeadingLevel(1),
            text: text.to_string(),
        }
    }

    fn scored(document: &str, title: &str, score: f32) -> ScoredSection {
        ScoredSection { section: section(document, title, "text"), score, keywords: vec![] }
    }

    fn query() -> PersonaJob {
        PersonaJob::new(
            Persona(json!({"role": "Travel Planner", "focus_areas": "nightlife"})),
            "Plan a trip with beaches and nightlife",
        )
    }

    #[test]
    fn test_rank_stable_on_ties() {
        let settings = Settings::default();
        let pipeline = Pipeline::new(&settings, None);
        let ranked = pipeline.rank(vec![
            scored("A.pdf", "s1", 3.0),
            scored("A.pdf", "s2", 8.5),
            scored("A.pdf", "s3", 1.0),
            scored("B.pdf", "s4", 8.5),
            scored("B.pdf", "s5", 4.0),
        ]);
        let order: Vec<(&str, u32)> = ranked
            .iter()
            .map(|r| (r.section_title.as_str(), r.importance_rank))
            .collect();
        assert_eq!(order, vec![("s2", 1), ("s4", 2), ("s5", 3), ("s1", 4), ("s3", 5)]);
    }

    #[test]
    fn test_ranks_are_contiguous() {
        let settings = Settings::default();
        let pipeline = Pipeline::new(&settings, None);
        let input: Vec<ScoredSection> =
            (0..17).map(|i| scored("a.pdf", &format!("s{}", i), (i % 4) as f32)).collect();
        let ranks: Vec<u32> = pipeline.rank(input).iter().map(|r| r.importance_rank).collect();
        assert_eq!(ranks, (1..=17).collect::<Vec<u32>>());
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(split_sentences("One. Two! Three? Four."), vec!["One.", "Two!", "Three?", "Four."]);
        assert_eq!(split_sentences("v1.2 is out.\nNext line"), vec!["v1.2 is out.", "Next line"]);
        assert_eq!(split_sentences("no terminal punctuation"), vec!["no terminal punctuation"]);
        assert_eq!(split_sentences(""), vec![""]);
        assert_eq!(split_sentences("Wait...   what"), vec!["Wait...", "what"]);
    }

    #[test]
    fn test_refine_text_caps_sentences() {
        let text = "First. Second! Third? Fourth. Fifth.";
        assert_eq!(refine_text(text, 3), "First. Second! Third?");
        assert_eq!(refine_text("Only one", 3), "Only one");

        let refined = refine_text("a. b. c. d. e. f.", 3);
        assert!(split_sentences(&refined).len() <= 3);
    }

    #[test]
    fn test_run_end_to_end_without_embeddings() {
        let settings = Settings::default();
        let pipeline = Pipeline::new(&settings, None);

        let doc_a = MemSource {
            name: "A.pdf".into(),
            pages: vec![vec![
                block("Beaches along the coast are perfect for a relaxing trip.", 100.0, 12.0),
                block("Museums and history tours fill the afternoons.", 200.0, 12.0),
            ]],
            outline: vec![heading("Coastal Adventures", 1, 1)],
        };
        let doc_b = MemSource {
            name: "B.pdf".into(),
            pages: vec![vec![block("Nightlife in the old town. Bars open late! Clubs too.", 100.0, 12.0)]],
            outline: vec![heading("Nightlife", 1, 1)],
        };

        let documents: Vec<(String, Result<Box<dyn LayoutSource>>)> = vec![
            ("A.pdf".to_string(), Ok(Box::new(doc_a) as Box<dyn LayoutSource>)),
            (
                "Broken.pdf".to_string(),
                Err(DocsiftError::Layout { document: "Broken.pdf".into(), message: "bad xref".into() }),
            ),
            ("B.pdf".to_string(), Ok(Box::new(doc_b) as Box<dyn LayoutSource>)),
        ];

        let output = pipeline.run(documents, &query());
        let result = &output.result;

        assert_eq!(result.metadata.input_documents, vec!["A.pdf", "Broken.pdf", "B.pdf"]);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].document, "Broken.pdf");
        assert!(output.index.is_none());

        // Keywords: {plan, a, trip, with, beaches, and, nightlife}
        // Coastal: beaches+a+trip = 6.0; gap "Content": and + short bonus = 3.0; Nightlife: 2.0
        let titles: Vec<&str> =
            result.extracted_sections.iter().map(|s| s.section_title.as_str()).collect();
        assert_eq!(titles, vec!["Coastal Adventures", "Content", "Nightlife"]);

        let top = &result.extracted_sections[0];
        assert_eq!(top.importance_rank, 1);
        assert_eq!(top.keywords[0], "beaches");

        let last = &result.extracted_sections[2];
        assert_eq!(last.importance_rank, 3);
        assert_eq!(last.refined_text, "Nightlife in the old town. Bars open late! Clubs too.");
        assert_eq!(last.keywords[0], "nightlife");

        let json = result.to_json().unwrap();
        assert!(json.contains("\"importance_rank\": 1"));
        assert!(json.contains("\"job_to_be_done\""));
    }

    #[test]
    fn test_run_builds_index_with_embedder() {
        let settings = Settings::default();
        let embedder = |t: &str| -> Result<Vec<f32>> {
            Ok(vec![t.len() as f32, 1.0])
        };
        let pipeline = Pipeline::new(&settings, Some(&embedder));
        let doc = MemSource {
            name: "A.pdf".into(),
            pages: vec![vec![block("first", 0.0, 12.0), block("second", 100.0, 12.0)]],
            outline: vec![],
        };
        let documents: Vec<(String, Result<Box<dyn LayoutSource>>)> =
            vec![("A.pdf".to_string(), Ok(Box::new(doc) as Box<dyn LayoutSource>))];

        let output = pipeline.run(documents, &query());
        let index = output.index.expect("index");
        assert_eq!(index.len(), 2);
        assert_eq!(index.sections[0].section_text_raw, "first");
        assert_eq!(output.degraded_sections, 0);
    }

    #[test]
    fn test_run_with_failing_embedder_degrades_to_keywords() {
        let settings = Settings::default();
        let failing = |_: &str| -> Result<Vec<f32>> { Err(DocsiftError::Embedding("model unavailable".into())) };
        let pipeline = Pipeline::new(&settings, Some(&failing));
        let doc = MemSource {
            name: "A.pdf".into(),
            pages: vec![vec![
                block("Quiet museums downtown with long opening hours for visitors.", 100.0, 12.0),
                block("Beaches and nightlife near the harbour.", 200.0, 12.0),
            ]],
            outline: vec![heading("Overview", 1, 1)],
        };
        let documents: Vec<(String, Result<Box<dyn LayoutSource>>)> =
            vec![("A.pdf".to_string(), Ok(Box::new(doc) as Box<dyn LayoutSource>))];

        let output = pipeline.run(documents, &query());
        assert_eq!(output.degraded_sections, 2);
        assert!(output.index.is_none());

        let titles: Vec<&str> =
            output.result.extracted_sections.iter().map(|s| s.section_title.as_str()).collect();
        assert_eq!(titles, vec!["Content", "Overview"]);
        let ranks: Vec<u32> =
            output.result.extracted_sections.iter().map(|s| s.importance_rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn test_rank_tolerates_nan_scores() {
        let settings = Settings::default();
        let pipeline = Pipeline::new(&settings, None);
        let ranked = pipeline.rank(vec![
            scored("A.pdf", "s1", 1.0),
            scored("A.pdf", "s2", f32::NAN),
            scored("A.pdf", "s3", 2.0),
            scored("A.pdf", "s4", 2.0),
        ]);
        let ranks: Vec<u32> = ranked.iter().map(|r| r.importance_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        let titles: Vec<&str> = ranked.iter().map(|r| r.section_title.as_str()).collect();
        assert_eq!(&titles[1..], &["s3", "s4", "s1"]);
    }

    #[test]
    fn test_non_ascii_preserved_in_json() {
        let settings = Settings::default();
        let pipeline = Pipeline::new(&settings, None);
        let ranked = pipeline.rank(vec![ScoredSection {
            section: section("café.pdf", "Crème brûlée", "Déjà vu. Ça va."),
            score: 1.0,
            keywords: vec!["déjà".into()],
        }]);
        let result = RunResult {
            metadata: RunMetadata {
                input_documents: vec!["café.pdf".into()],
                persona: Persona(json!({})),
                job_to_be_done: "goûter".into(),
                processing_timestamp: timestamp(),
            },
            extracted_sections: ranked,
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("Crème brûlée"));
        assert!(!json.contains("\\u"));
    }
}
