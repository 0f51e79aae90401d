//! Data models shared by the gap analyzer, the edit applicator and the HTTP layer.
//!
//! These are the single typed representation of LLM output: payloads are parsed into them
//! once at the external-call boundary and nothing downstream inspects raw JSON.

use serde::{Deserialize, Deserializer, Serialize};

/// What an edit does with its `new_content` once `target_text` is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "Option<String>")]
pub enum EditAction {
    #[default]
    Replace,
    Append,
}

impl From<Option<String>> for EditAction {
    /// Models are inconsistent about casing and sometimes send `null`; anything that is
    /// not "append" is a replace.
    fn from(value: Option<String>) -> Self {
        match value {
            Some(value) if value.trim().eq_ignore_ascii_case("append") => EditAction::Append,
            _ => EditAction::Replace,
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single target/replacement instruction produced by gap analysis.
///
/// Missing fields deserialize as empty so one bad edit does not sink the whole analysis;
/// the applicator reports such edits as `Malformed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub target_text: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub new_content: String,
    #[serde(default)]
    pub action: EditAction,
    /// Informational only; never used when applying.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rationale: String,
}

impl Edit {
    #[cfg(test)]
    pub fn replace(target_text: &str, new_content: &str) -> Self {
        Self {
            target_text: target_text.to_string(),
            new_content: new_content.to_string(),
            action: EditAction::Replace,
            rationale: String::new(),
        }
    }

    #[cfg(test)]
    pub fn append(target_text: &str, new_content: &str) -> Self {
        Self {
            action: EditAction::Append,
            ..Self::replace(target_text, new_content)
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.target_text.trim().is_empty() && !self.new_content.trim().is_empty()
    }
}

/// One LLM-identified resume section (e.g. "Experience") and its proposed changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionAnalysis {
    pub section_name: String,
    /// The section's text as the model saw it. Used for redline previews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub edits: Vec<Edit>,
}

/// Full gap analysis output. Scores are advisory estimates, 0–100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sections: Vec<SectionAnalysis>,
    pub initial_score: u8,
    pub projected_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_reasoning: Option<String>,
}

impl AnalysisResult {
    /// The degraded result used whenever analysis output cannot be parsed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn edit_count(&self) -> usize {
        self.sections.iter().map(|s| s.edits.len()).sum()
    }
}

/// Flattens per-section edit lists into one ordered sequence: section order first,
/// then edit order within each section.
pub fn flatten_edits(sections: &[SectionAnalysis]) -> Vec<Edit> {
    sections
        .iter()
        .flat_map(|s| s.edits.iter().cloned())
        .collect()
}

/// How a successfully applied edit was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMethod {
    /// Target sat inside one run; replaced there with the run's formatting untouched.
    RunLocal,
    /// Target spanned runs; the paragraph was rewritten with one representative profile.
    ParagraphRewrite,
    /// New content appended as a trailing run of the matched paragraph.
    AppendRun,
    /// New content inserted as a new paragraph after the matched one.
    AppendParagraph,
}

/// Per-edit result of an application pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditOutcome {
    Applied {
        paragraph_index: usize,
        method: ApplyMethod,
    },
    /// `target_text` is not in any paragraph (stale or paraphrased model output).
    NotFound,
    /// Empty `target_text` or `new_content`.
    Malformed,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }
}

/// Outcomes of one application pass, index-aligned with the input edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub outcomes: Vec<EditOutcome>,
}

impl ApplyReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.applied_count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
