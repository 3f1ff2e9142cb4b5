//! Persona and job-to-be-done inputs
//!
//! A case folder holds `persona_definition.json` (or a plain-text
//! `persona_definition.txt`) and `job_to_be_done.txt`.

use crate::error::{DocsiftError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

pub const PERSONA_JSON: &str = "persona_definition.json";
pub const PERSONA_TXT: &str = "persona_definition.txt";
pub const JOB_TXT: &str = "job_to_be_done.txt";

/// Free-form persona object; echoed verbatim into output metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Persona(pub Value);

impl Persona {
    /// Persona built from a plain-text description
    pub fn from_description(description: &str) -> Self {
        Persona(json!({
            "description": description,
            "role": "Unspecified Role",
            "focus_areas": "",
        }))
    }

    /// Text value of `key`, as written. Empty strings and empty arrays count
    /// as absent; whitespace-only values do not. Arrays of strings are joined
    /// with ", ".
    pub fn field(&self, key: &str) -> Option<String> {
        let text = match self.0.get(key)? {
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn description(&self) -> Option<String> {
        self.field("description")
    }

    pub fn role(&self) -> Option<String> {
        self.field("role")
    }

    pub fn focus_areas(&self) -> Option<String> {
        self.field("focus_areas")
    }
}

/// Read-only query input for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaJob {
    pub persona: Persona,
    pub job: String,
}

impl PersonaJob {
    pub fn new(persona: Persona, job: impl Into<String>) -> Self {
        Self { persona, job: job.into() }
    }

    /// Load persona and job from a case folder
    pub fn load(case_dir: &Path) -> Result<Self> {
        let case = case_name(case_dir);
        let json_path = case_dir.join(PERSONA_JSON);
        let txt_path = case_dir.join(PERSONA_TXT);

        let persona = if json_path.exists() {
            let content = fs::read_to_string(&json_path)?;
            let value: Value = serde_json::from_str(&content)?;
            tracing::info!("[Persona] Loaded persona from {}", PERSONA_JSON);
            Persona(value)
        } else if txt_path.exists() {
            let content = fs::read_to_string(&txt_path)?;
            tracing::info!("[Persona] Loaded persona from {} (as text description)", PERSONA_TXT);
            Persona::from_description(content.trim())
        } else {
            return Err(DocsiftError::MissingInput {
                case,
                what: format!("{} or {}", PERSONA_JSON, PERSONA_TXT),
            });
        };

        let job_path = case_dir.join(JOB_TXT);
        if !job_path.exists() {
            return Err(DocsiftError::MissingInput { case, what: JOB_TXT.to_string() });
        }
        let job = fs::read_to_string(&job_path)?.trim().to_string();
        tracing::info!("[Persona] Loaded job-to-be-done from {}", JOB_TXT);

        Ok(Self { persona, job })
    }
}

/// Folder name of a case directory
pub fn case_name(case_dir: &Path) -> String {
    case_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| case_dir.display().to_string())
}
