//! Plain-text format: one paragraph per line, exported by joining paragraph texts.
//!
//! Export uses the source's line ending (`\r\n` when the source has any, else `\n`)
//! and keeps its trailing newline.

use crate::document::format::{ConversionError, Exported, FormatConverter, SourceFormat};
use crate::document::{Document, Paragraph};

pub struct PlainTextConverter;

impl FormatConverter for PlainTextConverter {
    fn to_editable(&self, source: &[u8]) -> Result<Document, ConversionError> {
        let text = std::str::from_utf8(source)?;
        Ok(Document::from_lines(text))
    }

    fn from_editable(
        &self,
        source: &[u8],
        document: &Document,
    ) -> Result<Exported, ConversionError> {
        let newline = line_ending(source);
        let mut text = document
            .paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join(newline);
        if source.ends_with(b"\n") {
            text.push_str(newline);
        }
        Ok(Exported {
            format: SourceFormat::PlainText,
            bytes: text.into_bytes(),
        })
    }
}

fn line_ending(source: &[u8]) -> &'static str {
    if source.windows(2).any(|pair| pair == b"\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: &str = "Jane Doe\n\nEXPERIENCE\nManaged a team of 5 developers.\n";

    #[test]
    fn test_unedited_text_exports_identically() {
        let converter = PlainTextConverter;
        let document = converter.to_editable(RESUME.as_bytes()).unwrap();
        let exported = converter
            .from_editable(RESUME.as_bytes(), &document)
            .unwrap();
        assert_eq!(exported.format, SourceFormat::PlainText);
        assert_eq!(String::from_utf8(exported.bytes).unwrap(), RESUME);
    }

    #[test]
    fn test_blank_lines_become_empty_paragraphs() {
        let document = PlainTextConverter.to_editable(RESUME.as_bytes()).unwrap();
        assert_eq!(document.paragraphs.len(), 4);
        assert!(document.paragraphs[1].is_blank());
    }

    #[test]
    fn test_crlf_source_keeps_crlf_line_endings() {
        let source = "Jane Doe\r\n\r\nEXPERIENCE\r\nManaged a team of 5 developers.\r\n";
        let converter = PlainTextConverter;
        let mut document = converter.to_editable(source.as_bytes()).unwrap();
        assert_eq!(document.paragraphs[3].text(), "Managed a team of 5 developers.");

        let unedited = converter.from_editable(source.as_bytes(), &document).unwrap();
        assert_eq!(unedited.bytes, source.as_bytes());

        document.paragraphs[3].runs[0].text = "Led a team of 5 developers.".to_string();
        let edited = converter.from_editable(source.as_bytes(), &document).unwrap();
        assert_eq!(
            String::from_utf8(edited.bytes).unwrap(),
            "Jane Doe\r\n\r\nEXPERIENCE\r\nLed a team of 5 developers.\r\n"
        );
    }

    #[test]
    fn test_invalid_utf8_is_an_encoding_error() {
        let result = PlainTextConverter.to_editable(&[0xc3, 0x28]);
        assert!(matches!(result, Err(ConversionError::Encoding(_))));
    }
}
