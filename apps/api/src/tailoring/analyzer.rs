//! Gap Analyzer: maps (resume text, job description) to an `AnalysisResult` via two LLM calls:
//!
//! 1. Structure call: per-section gaps, suggestions and edits.
//! 2. Scoring call: given a summary of the proposed changes, estimate initial and projected
//!    ATS scores.
//!
//! Failure policy: degrade, never propagate. If the structure call fails or its output does
//! not parse, the result is `AnalysisResult::empty()`. If only scoring fails, the sections
//! are kept and both scores are zero. There are no retries at this layer.

use serde::Deserialize;
use tracing::{info, warn};

use crate::llm_client::prompts::{
    JSON_ONLY_SYSTEM, TRUTHFULNESS_INSTRUCTION, VERBATIM_TARGET_INSTRUCTION,
};
use crate::llm_client::{complete_json, LlmCompletion};
use crate::tailoring::models::{AnalysisResult, SectionAnalysis};
use crate::tailoring::prompts::{
    fill_template, GAP_ANALYSIS_PROMPT_TEMPLATE, GAP_ANALYSIS_ROLE, SCORING_PROMPT_TEMPLATE,
    SCORING_ROLE,
};

/// Max characters of advice per section included in the scoring summary.
const ADVICE_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct StructureResponse {
    #[serde(default)]
    sections: Vec<SectionAnalysis>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    initial_score: f64,
    projected_score: f64,
    #[serde(default)]
    reasoning: String,
}

pub async fn analyze_gaps(
    llm: &dyn LlmCompletion,
    resume_text: &str,
    job_description: &str,
) -> AnalysisResult {
    let prompt = fill_template(
        GAP_ANALYSIS_PROMPT_TEMPLATE,
        &[
            ("truthfulness_instruction", TRUTHFULNESS_INSTRUCTION),
            ("verbatim_instruction", VERBATIM_TARGET_INSTRUCTION),
            ("job_description", job_description),
            ("resume_text", resume_text),
        ],
    );
    let system = format!("{GAP_ANALYSIS_ROLE} {JSON_ONLY_SYSTEM}");

    let sections = match complete_json::<StructureResponse>(llm, &prompt, &system).await {
        Ok(response) => response.sections,
        Err(e) => {
            warn!("Gap analysis failed, degrading to empty analysis: {e}");
            return AnalysisResult::empty();
        }
    };

    if sections.is_empty() {
        info!("Gap analysis proposed no sections; skipping scoring");
        return AnalysisResult::empty();
    }

    let summary = summarize_changes(&sections);
    let prompt = fill_template(
        SCORING_PROMPT_TEMPLATE,
        &[
            ("changes_summary", summary.as_str()),
            ("job_description", job_description),
        ],
    );
    let system = format!("{SCORING_ROLE} {JSON_ONLY_SYSTEM}");

    let result = match complete_json::<ScoreResponse>(llm, &prompt, &system).await {
        Ok(score) => AnalysisResult {
            sections,
            initial_score: clamp_score(score.initial_score),
            projected_score: clamp_score(score.projected_score),
            score_reasoning: Some(score.reasoning).filter(|r| !r.trim().is_empty()),
        },
        Err(e) => {
            warn!("Score estimation failed, keeping sections with zero scores: {e}");
            AnalysisResult {
                sections,
                ..AnalysisResult::empty()
            }
        }
    };

    info!(
        "Gap analysis: {} sections, {} edits, score {} -> {}",
        result.sections.len(),
        result.edit_count(),
        result.initial_score,
        result.projected_score
    );
    result
}

/// One line per section: name, gap count, and the start of the advice given.
pub fn summarize_changes(sections: &[SectionAnalysis]) -> String {
    sections
        .iter()
        .map(|section| {
            let advice: String = section
                .suggestions
                .join("; ")
                .chars()
                .take(ADVICE_SUMMARY_CHARS)
                .collect();
            format!(
                "- {}: {} gaps, {} edits; advice: {}",
                section.section_name,
                section.gaps.len(),
                section.edits.len(),
                advice
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
