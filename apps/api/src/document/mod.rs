//! Document Text Model: an ordered list of paragraphs, each an ordered list of styled runs.
//!
//! Every source format is converted into this model before analysis and edit application,
//! and converted back on export (see `format::FormatConverter`).
//!
//! Invariants:
//! - `Paragraph::text()` is always the in-order concatenation of its run texts.
//! - Run text is never empty outside of a mutation in progress.
//! - The plain text handed to the LLM and the text searched by the edit applicator are built
//!   from the same `Paragraph::text()`, so a target quoted back by the model can be found.

use serde::{Deserialize, Serialize};

pub mod docx;
pub mod format;
pub mod pdf;
pub mod plain;

/// Separator placed between non-blank paragraphs in extracted text.
pub const PARAGRAPH_SEPARATOR: &str = "\n";

/// Font attributes shared by every character of a run. `None` means "inherited".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontProfile {
    pub font_family: Option<String>,
    /// Points, not half-points.
    pub font_size: Option<f32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    /// Hex RGB as stored by the source format, e.g. "1F3864" or "auto".
    pub color: Option<String>,
}

impl FontProfile {
    pub fn is_inherited(&self) -> bool {
        *self == FontProfile::default()
    }
}

/// A contiguous span of text sharing one font profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    pub font: FontProfile,
    /// Format-specific property payload captured by a converter (e.g. the raw `w:rPr` of a
    /// DOCX run). Converters re-emit it verbatim while `font` still matches it.
    #[serde(skip)]
    pub native_properties: Option<String>,
    /// Index of the source run this one was loaded from, within its source paragraph.
    /// `None` for runs created by edits.
    #[serde(skip)]
    pub origin: Option<usize>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn styled(text: impl Into<String>, font: FontProfile) -> Self {
        Self {
            text: text.into(),
            font,
            ..Default::default()
        }
    }

    /// Copies this run's styling (font profile and native payload) onto new text.
    /// The result is a new run with no source origin.
    pub fn restyle(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: self.font.clone(),
            native_properties: self.native_properties.clone(),
            origin: None,
        }
    }
}

/// Paragraph-level style inherited from the source format. Edits never modify it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParagraphStyle {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub style: ParagraphStyle,
    pub runs: Vec<Run>,
    /// Index of the source paragraph this one was loaded from. `None` for paragraphs
    /// inserted after loading; converters place those after the preceding sourced paragraph.
    #[serde(skip)]
    pub origin: Option<usize>,
}

impl Paragraph {
    /// A single-run, unstyled paragraph. Blank text yields a paragraph with no runs.
    pub fn plain(text: &str) -> Self {
        let runs = if text.is_empty() {
            vec![]
        } else {
            vec![Run::plain(text)]
        };
        Self {
            runs,
            ..Default::default()
        }
    }

    /// The paragraph's plain text: all run texts concatenated in order.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub paragraphs: Vec<Paragraph>,
}

impl Document {
    /// One unstyled paragraph per line of `text`, each tagged with its line index as origin.
    pub fn from_lines(text: &str) -> Self {
        let paragraphs = text
            .lines()
            .enumerate()
            .map(|(i, line)| Paragraph {
                origin: Some(i),
                ..Paragraph::plain(line)
            })
            .collect();
        Self { paragraphs }
    }
}

/// Flattens a document to plain text for prompting.
///
/// Blank paragraphs are dropped; the rest are joined with `PARAGRAPH_SEPARATOR`.
pub fn extract_text(document: &Document) -> String {
    document
        .paragraphs
        .iter()
        .filter(|p| !p.is_blank())
        .map(Paragraph::text)
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bold() -> FontProfile {
        FontProfile {
            bold: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_paragraph_text_concatenates_runs_in_order() {
        let paragraph = Paragraph {
            runs: vec![
                Run::styled("Senior ", bold()),
                Run::plain("Engineer, "),
                Run::plain("Acme Corp"),
            ],
            ..Default::default()
        };
        assert_eq!(paragraph.text(), "Senior Engineer, Acme Corp");
    }

    #[test]
    fn test_extract_text_drops_blank_paragraphs() {
        let document = Document {
            paragraphs: vec![
                Paragraph::plain("EXPERIENCE"),
                Paragraph::plain(""),
                Paragraph::plain("   "),
                Paragraph::plain("Managed a team of 5 developers."),
            ],
        };
        assert_eq!(
            extract_text(&document),
            "EXPERIENCE\nManaged a team of 5 developers."
        );
    }

    #[test]
    fn test_extract_text_of_empty_document_is_empty() {
        assert_eq!(extract_text(&Document::default()), "");
    }

    #[test]
    fn test_from_lines_tags_origins() {
        let document = Document::from_lines("Jane Doe\n\nSKILLS");
        assert_eq!(document.paragraphs.len(), 3);
        assert_eq!(document.paragraphs[2].origin, Some(2));
        assert!(document.paragraphs[1].runs.is_empty());
        assert_eq!(document.paragraphs[2].text(), "SKILLS");
    }

    #[test]
    fn test_restyle_keeps_font_and_native_payload() {
        let run = Run {
            text: "old".to_string(),
            font: bold(),
            native_properties: Some("<w:rPr><w:b/></w:rPr>".to_string()),
            origin: Some(2),
        };
        let restyled = run.restyle("new");
        assert_eq!(restyled.text, "new");
        assert_eq!(restyled.font, run.font);
        assert_eq!(restyled.native_properties, run.native_properties);
        assert_eq!(restyled.origin, None);
    }

    #[test]
    fn test_default_font_profile_is_inherited() {
        assert!(FontProfile::default().is_inherited());
        assert!(!bold().is_inherited());
    }
}
