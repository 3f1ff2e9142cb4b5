//! Batch driver over case folders
//!
//! Input layout:
//!
//! ```text
//! input/
//!   <case>/
//!     persona_definition.json | persona_definition.txt
//!     job_to_be_done.txt
//!     documents/*.pdf
//! ```
//!
//! Each case produces `<case>_output.json` (and `<case>_index.bin` when
//! embeddings were computed) in the output directory. Cases with missing
//! inputs or no PDFs are skipped and reported; other cases continue.

use crate::error::{DocsiftError, Result};
use crate::layout::LayoutSource;
use crate::layout_file::{file_name, find_sidecar, is_layout_file, LayoutDocument};
use crate::persona::{case_name, PersonaJob};
use crate::pipeline::{DocumentFailure, Pipeline, RunResult};
use crate::settings::Settings;
use crate::similarity::Embedder;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DOCUMENTS_DIR: &str = "documents";

/// Outcome of one processed case
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case: String,
    pub output_path: PathBuf,
    /// False when the output artifact could not be written
    pub output_written: bool,
    pub index_path: Option<PathBuf>,
    pub documents: usize,
    pub sections: usize,
    pub failures: Vec<DocumentFailure>,
    pub degraded_sections: usize,
    #[serde(skip)]
    pub result: RunResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedCase {
    pub case: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub completed: Vec<CaseReport>,
    pub skipped: Vec<SkippedCase>,
}

/// Subdirectories of `input_root` that contain a documents folder, sorted by name
pub fn discover_cases(input_root: &Path) -> Result<Vec<PathBuf>> {
    let mut cases: Vec<PathBuf> = fs::read_dir(input_root)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(DOCUMENTS_DIR).is_dir())
        .collect();
    cases.sort();
    Ok(cases)
}

/// PDF files of a documents folder, sorted by file name
pub fn collect_pdfs(documents_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs: Vec<PathBuf> = fs::read_dir(documents_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

/// Open a document's layout: a layout file directly, a PDF's sidecar, or the
/// PDF itself when direct reading is compiled in
pub fn open_document(path: &Path) -> Result<Box<dyn LayoutSource>> {
    if is_layout_file(path) {
        return Ok(Box::new(LayoutDocument::load(path)?));
    }

    if let Some(sidecar) = find_sidecar(path) {
        tracing::debug!("[Cases] Using layout sidecar {}", sidecar.display());
        let mut doc = LayoutDocument::load(&sidecar)?;
        doc.document = file_name(path);
        return Ok(Box::new(doc));
    }

    open_pdf(path)
}

#[cfg(feature = "pdf")]
fn open_pdf(path: &Path) -> Result<Box<dyn LayoutSource>> {
    Ok(Box::new(crate::pdf_layout::PdfLayout::open(path)?))
}

#[cfg(not(feature = "pdf"))]
fn open_pdf(path: &Path) -> Result<Box<dyn LayoutSource>> {
    Err(DocsiftError::Layout {
        document: file_name(path),
        message: "no layout sidecar found and direct PDF reading is not enabled (feature `pdf`)"
            .to_string(),
    })
}

/// Process one case folder and write its artifacts
pub fn process_case(
    case_dir: &Path,
    output_dir: &Path,
    settings: &Settings,
    embedder: Option<&dyn Embedder>,
) -> Result<CaseReport> {
    let case = case_name(case_dir);
    tracing::info!("[Cases] --- Processing case: {} ---", case);

    let query = PersonaJob::load(case_dir)?;

    let documents_dir = case_dir.join(DOCUMENTS_DIR);
    if !documents_dir.is_dir() {
        return Err(DocsiftError::MissingInput { case, what: format!("{}/ folder", DOCUMENTS_DIR) });
    }
    let pdfs = collect_pdfs(&documents_dir)?;
    if pdfs.is_empty() {
        return Err(DocsiftError::EmptyDocumentSet { case, dir: documents_dir });
    }

    let pipeline = Pipeline::new(settings, embedder);
    let documents = pdfs.iter().map(|p| (file_name(p), open_document(p)));
    let output = pipeline.run(documents, &query);

    let output_path = output_dir.join(format!("{}_output.json", case));
    let output_written = match write_output(&output.result, output_dir, &output_path) {
        Ok(()) => {
            tracing::info!("[Cases] Case '{}' complete. Output saved to {}", case, output_path.display());
            true
        }
        Err(e) => {
            tracing::error!("[Cases] Error saving output for {}: {}", case, e);
            false
        }
    };

    let index_path = match output.index.as_ref() {
        Some(index) if settings.write_index && output_written => {
            let path = output_dir.join(format!("{}_index.bin", case));
            match index.save(&path) {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::error!("[Cases] Error saving similarity index for {}: {}", case, e);
                    None
                }
            }
        }
        _ => None,
    };

    Ok(CaseReport {
        case,
        output_path,
        output_written,
        index_path,
        documents: pdfs.len(),
        sections: output.result.extracted_sections.len(),
        failures: output.failures,
        degraded_sections: output.degraded_sections,
        result: output.result,
    })
}

fn write_output(result: &RunResult, output_dir: &Path, path: &Path) -> Result<()> {
    let json = result.to_json()?;
    let persistence = |source| DocsiftError::Persistence { path: path.to_path_buf(), source };
    fs::create_dir_all(output_dir).map_err(persistence)?;
    fs::write(path, json).map_err(persistence)
}

/// Process every case under `input_root`; per-case failures are recorded as skips
pub fn run_batch(
    input_root: &Path,
    output_dir: &Path,
    settings: &Settings,
    embedder: Option<&dyn Embedder>,
) -> Result<BatchSummary> {
    let cases = discover_cases(input_root)?;
    if cases.is_empty() {
        tracing::warn!(
            "[Cases] No case directories found in {}. Expected <input>/<case>/{}/...",
            input_root.display(),
            DOCUMENTS_DIR
        );
    }

    let mut summary = BatchSummary::default();
    for case_dir in cases {
        match process_case(&case_dir, output_dir, settings, embedder) {
            Ok(report) => summary.completed.push(report),
            Err(e) => {
                let case = case_name(&case_dir);
                if e.is_case_skip() {
                    tracing::warn!("[Cases] Skipping case {}: {}", case, e);
                } else {
                    tracing::error!("[Cases] Case {} failed: {}", case, e);
                }
                summary.skipped.push(SkippedCase { case, reason: e.to_string() });
            }
        }
    }

    tracing::info!(
        "[Cases] Finished: {} completed, {} skipped",
        summary.completed.len(),
        summary.skipped.len()
    );
    Ok(summary)
}
