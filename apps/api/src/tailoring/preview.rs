//! Redline previews: shows each section's proposed edits inline against its original text,
//! before anything is applied to the document.

use serde::Serialize;

use crate::tailoring::models::{Edit, SectionAnalysis};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedlineSegment {
    Unchanged {
        text: String,
    },
    Replaced {
        from: String,
        to: String,
        /// Index of the edit within its section.
        edit_index: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionRedline {
    pub section_name: String,
    pub segments: Vec<RedlineSegment>,
    /// Edits whose target is not in the section text, or that overlap an earlier edit.
    pub unplaced_edits: Vec<usize>,
}

/// Builds redlines for every section. Sections without `original_text` are previewed
/// against `fallback_text` (normally the whole extracted resume).
pub fn redline_sections(sections: &[SectionAnalysis], fallback_text: &str) -> Vec<SectionRedline> {
    sections
        .iter()
        .map(|section| {
            let text = section.original_text.as_deref().unwrap_or(fallback_text);
            let (segments, unplaced_edits) = redline(text, &section.edits);
            SectionRedline {
                section_name: section.section_name.clone(),
                segments,
                unplaced_edits,
            }
        })
        .collect()
}

/// Splits `text` into unchanged and replaced segments.
///
/// Each edit is placed at the first occurrence of its target. Placed edits are ordered by
/// position; an edit starting inside an earlier kept edit is dropped (earliest start wins,
/// ties keep the earlier edit).
pub fn redline(text: &str, edits: &[Edit]) -> (Vec<RedlineSegment>, Vec<usize>) {
    let mut unplaced = Vec::new();
    let mut placed: Vec<(usize, usize)> = Vec::new();
    for (index, edit) in edits.iter().enumerate() {
        match text.find(edit.target_text.as_str()) {
            Some(pos) if edit.is_well_formed() => placed.push((pos, index)),
            _ => unplaced.push(index),
        }
    }
    placed.sort();

    let mut segments = Vec::new();
    let mut cursor = 0;
    for (pos, index) in placed {
        if pos < cursor {
            unplaced.push(index);
            continue;
        }
        let edit = &edits[index];
        if pos > cursor {
            segments.push(RedlineSegment::Unchanged {
                text: text[cursor..pos].to_string(),
            });
        }
        segments.push(RedlineSegment::Replaced {
            from: edit.target_text.clone(),
            to: edit.new_content.clone(),
            edit_index: index,
        });
        cursor = pos + edit.target_text.len();
    }
    if cursor < text.len() {
        segments.push(RedlineSegment::Unchanged {
            text: text[cursor..].to_string(),
        });
    }
    unplaced.sort_unstable();
    (segments, unplaced)
}
