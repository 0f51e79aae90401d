//! Edit Locator/Applicator: patches a document copy with target/replacement edits while
//! keeping visual formatting as close to the source as possible.
//!
//! Per edit:
//! 1. Locate: the FIRST paragraph (document order) whose plain text contains `target_text`.
//!    Later occurrences, in the same or other paragraphs, are never touched.
//! 2. Replace: prefer a run-local replacement when a single run contains the whole target;
//!    otherwise rewrite the paragraph text as one run carrying a representative profile.
//! 3. Append: add the new content after the matched paragraph's text, either as a trailing
//!    run or as a new paragraph, depending on `AppendPolicy`.
//!
//! Edits that cannot be placed are skipped, never fatal; each gets an `EditOutcome`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, Paragraph, Run};
use crate::tailoring::models::{ApplyMethod, ApplyReport, Edit, EditAction, EditOutcome};

/// Where appended content goes relative to the matched paragraph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendPolicy {
    /// A trailing run, separated by a single space.
    #[default]
    SameParagraph,
    /// A new paragraph directly after the matched one, with the same paragraph style.
    NewParagraph,
}

impl FromStr for AppendPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "same_paragraph" => Ok(AppendPolicy::SameParagraph),
            "new_paragraph" => Ok(AppendPolicy::NewParagraph),
            other => Err(format!(
                "unknown append policy '{other}' (expected same_paragraph or new_paragraph)"
            )),
        }
    }
}

/// Applies edits in order to `document`, returning one outcome per edit.
pub fn apply_edits(document: &mut Document, edits: &[Edit], policy: AppendPolicy) -> ApplyReport {
    let outcomes = edits
        .iter()
        .map(|edit| {
            let outcome = apply_edit(document, edit, policy);
            debug!(
                "Edit {:?} -> {:?}",
                edit.target_text.chars().take(60).collect::<String>(),
                outcome
            );
            outcome
        })
        .collect();
    ApplyReport { outcomes }
}

pub fn apply_edit(document: &mut Document, edit: &Edit, policy: AppendPolicy) -> EditOutcome {
    if !edit.is_well_formed() {
        return EditOutcome::Malformed;
    }
    let Some(index) = locate(document, &edit.target_text) else {
        return EditOutcome::NotFound;
    };

    match (edit.action, policy) {
        (EditAction::Replace, _) => {
            let method = replace_in_paragraph(
                &mut document.paragraphs[index],
                &edit.target_text,
                &edit.new_content,
            );
            EditOutcome::Applied {
                paragraph_index: index,
                method,
            }
        }
        (EditAction::Append, AppendPolicy::SameParagraph) => {
            append_run(&mut document.paragraphs[index], &edit.new_content);
            EditOutcome::Applied {
                paragraph_index: index,
                method: ApplyMethod::AppendRun,
            }
        }
        (EditAction::Append, AppendPolicy::NewParagraph) => {
            let inserted = following_paragraph(&document.paragraphs[index], &edit.new_content);
            document.paragraphs.insert(index + 1, inserted);
            EditOutcome::Applied {
                paragraph_index: index + 1,
                method: ApplyMethod::AppendParagraph,
            }
        }
    }
}

/// Index of the first paragraph whose plain text contains `target`.
pub fn locate(document: &Document, target: &str) -> Option<usize> {
    document
        .paragraphs
        .iter()
        .position(|p| p.text().contains(target))
}

fn replace_in_paragraph(paragraph: &mut Paragraph, target: &str, replacement: &str) -> ApplyMethod {
    if let Some(run) = paragraph.runs.iter_mut().find(|r| r.text.contains(target)) {
        run.text = run.text.replacen(target, replacement, 1);
        return ApplyMethod::RunLocal;
    }

    // The target crosses run boundaries: flatten, replace, and re-apply one profile.
    let text = paragraph.text().replacen(target, replacement, 1);
    let run = match representative_run(&paragraph.runs) {
        Some(representative) => representative.restyle(text),
        None => Run::plain(text),
    };
    paragraph.runs = vec![run];
    ApplyMethod::ParagraphRewrite
}

fn append_run(paragraph: &mut Paragraph, content: &str) {
    let text = format!(" {content}");
    let run = match representative_run(&paragraph.runs) {
        Some(representative) => representative.restyle(text),
        None => Run::plain(text),
    };
    paragraph.runs.push(run);
}

fn following_paragraph(anchor: &Paragraph, content: &str) -> Paragraph {
    let run = match representative_run(&anchor.runs) {
        Some(representative) => representative.restyle(content),
        None => Run::plain(content),
    };
    Paragraph {
        style: anchor.style.clone(),
        runs: vec![run],
        origin: None,
    }
}

/// The run whose styling stands for the whole paragraph: the first run, unless it is a
/// lone bullet or symbol glyph (≤ 1 visible character) followed by real text.
fn representative_run(runs: &[Run]) -> Option<&Run> {
    match runs {
        [first, second, ..] if first.text.trim().chars().count() <= 1 => Some(second),
        [first, ..] => Some(first),
        [] => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
