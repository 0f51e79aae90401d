//! PDF import via `pdf-extract`.
//!
//! A PDF cannot be re-rendered from the text model, so export produces a fresh DOCX package
//! holding the (possibly edited) paragraphs.

use tracing::debug;

use crate::document::docx::render_docx;
use crate::document::format::{ConversionError, Exported, FormatConverter, SourceFormat};
use crate::document::{Document, Paragraph};

pub struct PdfConverter;

impl FormatConverter for PdfConverter {
    fn to_editable(&self, source: &[u8]) -> Result<Document, ConversionError> {
        let text = pdf_extract::extract_text_from_mem(source)
            .map_err(|e| ConversionError::Pdf(e.to_string()))?;
        let document = document_from_extracted_text(&text);
        debug!(
            "Extracted {} paragraphs from PDF ({} bytes)",
            document.paragraphs.len(),
            source.len()
        );
        Ok(document)
    }

    fn from_editable(
        &self,
        _source: &[u8],
        document: &Document,
    ) -> Result<Exported, ConversionError> {
        Ok(Exported {
            format: SourceFormat::Docx,
            bytes: render_docx(document)?,
        })
    }
}

/// One unstyled paragraph per non-blank line. Extracted PDF text is full of layout blank
/// lines that carry no meaning once the page geometry is gone.
fn document_from_extracted_text(text: &str) -> Document {
    let paragraphs = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| Paragraph {
            origin: Some(i),
            ..Paragraph::plain(line)
        })
        .collect();
    Document { paragraphs }
}
