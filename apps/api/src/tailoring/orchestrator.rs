//! Tailoring Orchestrator: sequences one tailoring request through its stages:
//!
//! Uploaded → Extracted → Analyzed → Edited → Exported
//!
//! - Uploaded → Extracted: `extract_resume` converts source bytes to the text model.
//! - Extracted → Analyzed: `analyze_resume` runs gap analysis. A failed analysis still
//!   advances (with zero sections); it is unproductive, not fatal.
//! - Analyzed → Edited: `generate_tailored_resume` flattens the section edits and applies
//!   them to a fresh copy of the original document.
//! - Edited → Exported: `export_resume` converts the edited copy back to the source format.
//!
//! There is no rollback; re-running starts again from the original source bytes.
//! Each stage blocks until complete before the next begins.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::format::{converter_for, ConversionError, Exported, SourceFormat};
use crate::document::{extract_text, Document};
use crate::llm_client::LlmCompletion;
use crate::tailoring::analyzer::analyze_gaps;
use crate::tailoring::applicator::{apply_edits, AppendPolicy};
use crate::tailoring::models::{flatten_edits, AnalysisResult, ApplyReport, SectionAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Uploaded,
    Extracted,
    Analyzed,
    Edited,
    Exported,
}

/// A source document after Uploaded → Extracted.
#[derive(Debug, Clone)]
pub struct ExtractedResume {
    pub format: SourceFormat,
    pub document: Document,
    /// Prompt text; built from the same paragraph text the applicator matches against.
    pub text: String,
}

/// An edited document copy after Analyzed → Edited.
#[derive(Debug, Clone)]
pub struct TailoredResume {
    pub document: Document,
    pub report: ApplyReport,
}

pub fn extract_resume(
    format: SourceFormat,
    source: &[u8],
) -> Result<ExtractedResume, ConversionError> {
    let document = converter_for(format).to_editable(source)?;
    let text = extract_text(&document);
    info!(
        "Stage {:?} -> {:?}: {:?} source, {} paragraphs, {} chars",
        PipelineStage::Uploaded,
        PipelineStage::Extracted,
        format,
        document.paragraphs.len(),
        text.len()
    );
    Ok(ExtractedResume {
        format,
        document,
        text,
    })
}

pub async fn analyze_resume(
    llm: &dyn LlmCompletion,
    resume: &ExtractedResume,
    job_description: &str,
) -> AnalysisResult {
    let analysis = analyze_gaps(llm, &resume.text, job_description).await;
    info!(
        "Stage {:?} -> {:?}: {} sections",
        PipelineStage::Extracted,
        PipelineStage::Analyzed,
        analysis.sections.len()
    );
    analysis
}

/// Applies every section's edits, in section order then edit order, to a copy of
/// `original`. The original document is never modified.
pub fn generate_tailored_resume(
    original: &Document,
    sections: &[SectionAnalysis],
    policy: AppendPolicy,
) -> TailoredResume {
    let edits = flatten_edits(sections);
    let mut document = original.clone();
    let report = apply_edits(&mut document, &edits, policy);
    info!(
        "Stage {:?} -> {:?}: {} of {} edits applied ({} skipped)",
        PipelineStage::Analyzed,
        PipelineStage::Edited,
        report.applied_count(),
        edits.len(),
        report.skipped_count()
    );
    TailoredResume { document, report }
}

pub fn export_resume(
    format: SourceFormat,
    source: &[u8],
    tailored: &TailoredResume,
) -> Result<Exported, ConversionError> {
    let exported = converter_for(format).from_editable(source, &tailored.document)?;
    info!(
        "Stage {:?} -> {:?}: {} bytes as {:?}",
        PipelineStage::Edited,
        PipelineStage::Exported,
        exported.bytes.len(),
        exported.format
    );
    Ok(exported)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
