//! Run settings
//!
//! Every sectioning and scoring heuristic is a named value here. Settings are
//! read from an optional JSON file; absent fields fall back to the defaults.

use crate::error::{DocsiftError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// A same-page gap larger than this many average line heights starts a new section
    #[serde(default = "default_gap_multiplier")]
    pub gap_multiplier: f32,
    /// Line height used for pages without any text lines
    #[serde(default = "default_fallback_line_height")]
    pub fallback_line_height: f32,
    #[serde(default = "default_keyword_min_len")]
    pub keyword_min_len: usize,
    #[serde(default = "default_keyword_max_len")]
    pub keyword_max_len: usize,
    /// Keywords kept per section
    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,
    /// Sentences kept in refined_text
    #[serde(default = "default_refined_sentence_cap")]
    pub refined_sentence_cap: usize,
    /// Added once per query keyword found as a token in the section
    #[serde(default = "default_keyword_match_weight")]
    pub keyword_match_weight: f32,
    /// Multiplier for the rescaled cosine similarity
    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: f32,
    /// Sections with fewer words than this may receive the short-section bonus
    #[serde(default = "default_short_section_words")]
    pub short_section_words: usize,
    #[serde(default = "default_short_section_bonus")]
    pub short_section_bonus: f32,
    #[serde(default = "default_similar_top_k")]
    pub similar_top_k: usize,
    /// Persist the embedding index next to the case output
    #[serde(default = "default_true")]
    pub write_index: bool,
}

fn default_gap_multiplier() -> f32 {
    2.5
}

fn default_fallback_line_height() -> f32 {
    12.0
}

fn default_keyword_min_len() -> usize {
    3
}

fn default_keyword_max_len() -> usize {
    15
}

fn default_keyword_count() -> usize {
    5
}

fn default_refined_sentence_cap() -> usize {
    3
}

fn default_keyword_match_weight() -> f32 {
    2.0
}

fn default_embedding_weight() -> f32 {
    10.0
}

fn default_short_section_words() -> usize {
    10
}

fn default_short_section_bonus() -> f32 {
    1.0
}

fn default_similar_top_k() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gap_multiplier: default_gap_multiplier(),
            fallback_line_height: default_fallback_line_height(),
            keyword_min_len: default_keyword_min_len(),
            keyword_max_len: default_keyword_max_len(),
            keyword_count: default_keyword_count(),
            refined_sentence_cap: default_refined_sentence_cap(),
            keyword_match_weight: default_keyword_match_weight(),
            embedding_weight: default_embedding_weight(),
            short_section_words: default_short_section_words(),
            short_section_bonus: default_short_section_bonus(),
            similar_top_k: default_similar_top_k(),
            write_index: true,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| DocsiftError::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gap_multiplier <= 0.0 {
            return Err(DocsiftError::Config("gap_multiplier must be positive".into()));
        }
        if self.fallback_line_height <= 0.0 {
            return Err(DocsiftError::Config("fallback_line_height must be positive".into()));
        }
        if self.keyword_min_len == 0 || self.keyword_min_len > self.keyword_max_len {
            return Err(DocsiftError::Config(format!(
                "keyword length bounds {}..={} are invalid",
                self.keyword_min_len, self.keyword_max_len
            )));
        }
        Ok(())
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }
}
