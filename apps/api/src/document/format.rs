//! Format conversion: detects the source format of an upload and converts between
//! source bytes and the Document Text Model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::docx::DocxConverter;
use crate::document::pdf::PdfConverter;
use crate::document::plain::PlainTextConverter;
use crate::document::Document;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Unsupported document format: {0}")]
    Unsupported(String),

    #[error("Invalid package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Package is missing required part '{0}'")]
    MissingPart(String),

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("Text is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ConversionError {
    fn from(e: quick_xml::Error) -> Self {
        ConversionError::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ConversionError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        ConversionError::Xml(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Docx,
    Pdf,
    PlainText,
}

impl SourceFormat {
    /// Detects the format from the leading bytes. `filename` only feeds the error message.
    pub fn detect(bytes: &[u8], filename: Option<&str>) -> Result<Self, ConversionError> {
        if bytes.starts_with(b"PK\x03\x04") {
            Ok(SourceFormat::Docx)
        } else if bytes.starts_with(b"%PDF") {
            Ok(SourceFormat::Pdf)
        } else if std::str::from_utf8(bytes).is_ok() {
            Ok(SourceFormat::PlainText)
        } else {
            Err(ConversionError::Unsupported(
                filename.unwrap_or("<unnamed upload>").to_string(),
            ))
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Docx => "docx",
            SourceFormat::Pdf => "pdf",
            SourceFormat::PlainText => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            SourceFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            SourceFormat::Pdf => "application/pdf",
            SourceFormat::PlainText => "text/plain; charset=utf-8",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "docx" => Some(SourceFormat::Docx),
            "pdf" => Some(SourceFormat::Pdf),
            "txt" => Some(SourceFormat::PlainText),
            _ => None,
        }
    }
}

/// Bytes produced by an export, tagged with the format they are actually in.
/// A PDF source exports as DOCX, so this can differ from the source format.
#[derive(Debug, Clone)]
pub struct Exported {
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
}

/// A format-conversion collaborator.
///
/// `from_editable` receives the original source bytes as a template so that content the
/// model does not represent (headers, tables, images, untouched paragraphs) survives export.
pub trait FormatConverter: Send + Sync {
    fn to_editable(&self, source: &[u8]) -> Result<Document, ConversionError>;

    fn from_editable(&self, source: &[u8], document: &Document)
        -> Result<Exported, ConversionError>;
}

static DOCX: DocxConverter = DocxConverter;
static PDF: PdfConverter = PdfConverter;
static PLAIN_TEXT: PlainTextConverter = PlainTextConverter;

pub fn converter_for(format: SourceFormat) -> &'static dyn FormatConverter {
    match format {
        SourceFormat::Docx => &DOCX,
        SourceFormat::Pdf => &PDF,
        SourceFormat::PlainText => &PLAIN_TEXT,
    }
}
