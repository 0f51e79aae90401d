//! DOCX conversion: reads body paragraphs out of `word/document.xml` and splices edited
//! paragraphs back into the original package.
//!
//! # Round-trip contract
//! Export re-scans the original `word/document.xml` and walks its body-level paragraphs:
//! - a paragraph whose model is unchanged is copied byte-for-byte;
//! - a changed paragraph whose runs still line up with the source runs is patched in place:
//!   only the changed runs are rewritten, appended runs go just before `</w:p>`, and all
//!   other bytes (inline wrappers, runs without text, bookmarks) are kept;
//! - a paragraph rewritten across runs keeps its opening tag and `w:pPr` bytes, and its
//!   runs are regenerated from the model;
//! - paragraphs inserted after loading follow their anchor and copy its `w:pPr`.
//!
//! A rewritten run re-uses its captured `w:rPr` bytes while its font profile still matches
//! them; otherwise a fresh `w:rPr` is written from the profile.
//!
//! Runs are collected whether they sit directly under `w:p` or inside inline wrappers
//! (`w:hyperlink`, `w:ins`, `w:smartTag`, `w:sdt`, `w:fldSimple`). Runs nested inside other
//! runs (text boxes in drawings) are not.
//!
//! Everything outside body paragraphs (tables, section properties, other package parts) is
//! copied unchanged.

use std::io::{Cursor, Read, Write};
use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::document::format::{ConversionError, Exported, FormatConverter, SourceFormat};
use crate::document::{Document, FontProfile, Paragraph, ParagraphStyle, Run};

const DOCUMENT_PART: &str = "word/document.xml";

const WORDPROCESSING_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

pub struct DocxConverter;

impl FormatConverter for DocxConverter {
    fn to_editable(&self, source: &[u8]) -> Result<Document, ConversionError> {
        let package = DocxPackage::read(source)?;
        let xml = package.part(DOCUMENT_PART)?;
        let body = scan_body(xml)?;
        let paragraphs = body
            .iter()
            .enumerate()
            .map(|(i, p)| p.to_model(xml, i))
            .collect();
        Ok(Document { paragraphs })
    }

    fn from_editable(
        &self,
        source: &[u8],
        document: &Document,
    ) -> Result<Exported, ConversionError> {
        let package = DocxPackage::read(source)?;
        let xml = package.part(DOCUMENT_PART)?;
        let spliced = splice_document(xml, document)?;
        Ok(Exported {
            format: SourceFormat::Docx,
            bytes: package.write_with_replacement(DOCUMENT_PART, spliced)?,
        })
    }
}

/// Builds a minimal standalone DOCX package from a document (used when the source format
/// cannot be written back, e.g. PDF).
pub fn render_docx(document: &Document) -> Result<Vec<u8>, ConversionError> {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(&format!(r#"<w:document xmlns:w="{WORDPROCESSING_NS}"><w:body>"#));
    for paragraph in &document.paragraphs {
        xml.push_str("<w:p>");
        if let Some(name) = &paragraph.style.name {
            xml.push_str(&format!(
                r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#,
                escape_attr(name)
            ));
        }
        for run in &paragraph.runs {
            write_run(&mut xml, run);
        }
        xml.push_str("</w:p>");
    }
    xml.push_str("</w:body></w:document>");

    let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in [
        ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
        ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
        (DOCUMENT_PART, xml.as_bytes()),
    ] {
        zout.start_file(name, opts)?;
        zout.write_all(data)?;
    }
    Ok(zout.finish()?.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Package
// ────────────────────────────────────────────────────────────────────────────

struct DocxPackage {
    entries: Vec<DocxEntry>,
}

struct DocxEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    last_modified: zip::DateTime,
    unix_mode: Option<u32>,
    is_dir: bool,
}

impl DocxPackage {
    fn read(source: &[u8]) -> Result<Self, ConversionError> {
        let mut zip = ZipArchive::new(Cursor::new(source))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    fn part(&self, name: &str) -> Result<&[u8], ConversionError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
            .ok_or_else(|| ConversionError::MissingPart(name.to_string()))
    }

    /// Re-writes the package with one part replaced, keeping entry order and metadata.
    fn write_with_replacement(
        &self,
        name: &str,
        replacement: Vec<u8>,
    ) -> Result<Vec<u8>, ConversionError> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = if ent.name == name {
                replacement.as_slice()
            } else {
                ent.data.as_slice()
            };
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)?;
            } else {
                zout.start_file(ent.name.as_str(), opts)?;
                zout.write_all(data)?;
            }
        }
        Ok(zout.finish()?.into_inner())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Body scan
// ────────────────────────────────────────────────────────────────────────────

/// A body-level `w:p` located in the source XML by byte ranges.
#[derive(Debug)]
struct SourceParagraph {
    span: Range<usize>,
    open_tag: Range<usize>,
    properties: Option<Range<usize>>,
    style_name: Option<String>,
    runs: Vec<SourceRun>,
}

#[derive(Debug, Default)]
struct SourceRun {
    span: Range<usize>,
    text: String,
    font: FontProfile,
    properties: Option<Range<usize>>,
}

impl SourceRun {
    fn to_model(&self, xml: &[u8], index: usize) -> Run {
        Run {
            text: self.text.clone(),
            font: self.font.clone(),
            native_properties: self
                .properties
                .clone()
                .map(|range| String::from_utf8_lossy(&xml[range]).into_owned()),
            origin: Some(index),
        }
    }
}

impl SourceParagraph {
    /// Runs without text (drawings, field characters, deletions) stay out of the model.
    fn to_model(&self, xml: &[u8], index: usize) -> Paragraph {
        let runs = self
            .runs
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.text.is_empty())
            .map(|(i, r)| r.to_model(xml, i))
            .collect();
        Paragraph {
            style: ParagraphStyle {
                name: self.style_name.clone(),
            },
            runs,
            origin: Some(index),
        }
    }
}

/// Where the scanner currently is, relative to the paragraph being collected.
struct ParagraphCursor {
    paragraph: SourceParagraph,
    depth: usize,
    properties_start: Option<usize>,
    run: Option<RunCursor>,
}

struct RunCursor {
    run: SourceRun,
    depth: usize,
    properties_start: Option<usize>,
    in_properties: bool,
    in_text: bool,
}

/// Scans `word/document.xml` and returns its body-level paragraphs in document order.
fn scan_body(xml: &[u8]) -> Result<Vec<SourceParagraph>, ConversionError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<ParagraphCursor> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf)?;
        let end = reader.buffer_position() as usize;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                let start = tag_start(xml, end)?;
                if current.is_none() && name == b"w:p" && is_last(&stack, b"w:body") {
                    current = Some(ParagraphCursor {
                        paragraph: SourceParagraph {
                            span: start..end,
                            open_tag: start..end,
                            properties: None,
                            style_name: None,
                            runs: Vec::new(),
                        },
                        depth: stack.len() + 1,
                        properties_start: None,
                        run: None,
                    });
                } else if let Some(cursor) = current.as_mut() {
                    cursor.on_open(&name, &e, start, stack.len())?;
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let qname = e.name();
                let name = qname.as_ref();
                if current.is_none() && name == b"w:p" && is_last(&stack, b"w:body") {
                    let start = tag_start(xml, end)?;
                    paragraphs.push(SourceParagraph {
                        span: start..end,
                        open_tag: start..end,
                        properties: None,
                        style_name: None,
                        runs: Vec::new(),
                    });
                } else if let Some(cursor) = current.as_mut() {
                    cursor.on_empty(name, &e, stack.len())?;
                }
            }
            Event::Text(t) => {
                if let Some(run) = current.as_mut().and_then(|c| c.run.as_mut()) {
                    if run.in_text {
                        run.run.text.push_str(&t.unescape()?);
                    }
                }
            }
            Event::End(e) => {
                stack.pop();
                let depth = stack.len();
                let name = e.name();
                let finished = match current.as_mut() {
                    Some(cursor) if depth + 1 == cursor.depth && name.as_ref() == b"w:p" => {
                        cursor.paragraph.span.end = end;
                        true
                    }
                    Some(cursor) => {
                        cursor.on_close(name.as_ref(), depth, end);
                        false
                    }
                    None => false,
                };
                if finished {
                    if let Some(cursor) = current.take() {
                        paragraphs.push(cursor.paragraph);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

impl ParagraphCursor {
    /// `depth` is the stack depth before the element is pushed.
    fn on_open(
        &mut self,
        name: &[u8],
        e: &BytesStart<'_>,
        start: usize,
        depth: usize,
    ) -> Result<(), ConversionError> {
        if let Some(run) = self.run.as_mut() {
            return run.on_open(name, e, start, depth);
        }
        match name {
            b"w:pPr" if depth == self.depth => self.properties_start = Some(start),
            b"w:pStyle" if self.properties_start.is_some() => {
                self.paragraph.style_name = attr_value(e, b"w:val")?;
            }
            // Directly under the paragraph or inside an inline wrapper.
            b"w:r" => {
                self.run = Some(RunCursor {
                    run: SourceRun {
                        span: start..start,
                        ..Default::default()
                    },
                    depth: depth + 1,
                    properties_start: None,
                    in_properties: false,
                    in_text: false,
                })
            }
            _ => {}
        }
        Ok(())
    }

    fn on_empty(
        &mut self,
        name: &[u8],
        e: &BytesStart<'_>,
        depth: usize,
    ) -> Result<(), ConversionError> {
        if self.properties_start.is_some() && name == b"w:pStyle" {
            self.paragraph.style_name = attr_value(e, b"w:val")?;
        }
        if let Some(run) = self.run.as_mut() {
            run.on_empty(name, e, depth)?;
        }
        Ok(())
    }

    /// `depth` is the stack depth after the element is popped.
    fn on_close(&mut self, name: &[u8], depth: usize, end: usize) {
        let closes_run = self
            .run
            .as_ref()
            .is_some_and(|run| depth + 1 == run.depth && name == b"w:r");
        if closes_run {
            if let Some(mut cursor) = self.run.take() {
                cursor.run.span.end = end;
                self.paragraph.runs.push(cursor.run);
            }
        } else if let Some(run) = self.run.as_mut() {
            run.on_close(name, depth, end);
        } else if depth == self.depth && name == b"w:pPr" {
            if let Some(start) = self.properties_start.take() {
                self.paragraph.properties = Some(start..end);
            }
        }
    }
}

impl RunCursor {
    fn on_open(
        &mut self,
        name: &[u8],
        e: &BytesStart<'_>,
        start: usize,
        depth: usize,
    ) -> Result<(), ConversionError> {
        if depth == self.depth {
            match name {
                b"w:rPr" => {
                    self.properties_start = Some(start);
                    self.in_properties = true;
                }
                b"w:t" => self.in_text = true,
                _ => {}
            }
        } else if self.in_properties {
            apply_run_property(&mut self.run.font, name, e)?;
        }
        Ok(())
    }

    fn on_empty(
        &mut self,
        name: &[u8],
        e: &BytesStart<'_>,
        depth: usize,
    ) -> Result<(), ConversionError> {
        if depth == self.depth {
            match name {
                b"w:tab" => self.run.text.push('\t'),
                b"w:br" | b"w:cr" => self.run.text.push('\n'),
                _ => {}
            }
        } else if self.in_properties {
            apply_run_property(&mut self.run.font, name, e)?;
        }
        Ok(())
    }

    fn on_close(&mut self, name: &[u8], depth: usize, end: usize) {
        if depth != self.depth {
            return;
        }
        match name {
            b"w:rPr" => {
                self.in_properties = false;
                if let Some(start) = self.properties_start.take() {
                    self.run.properties = Some(start..end);
                }
            }
            b"w:t" => self.in_text = false,
            _ => {}
        }
    }
}

/// Reads one `w:rPr` child into the font profile.
fn apply_run_property(
    font: &mut FontProfile,
    name: &[u8],
    e: &BytesStart<'_>,
) -> Result<(), ConversionError> {
    match name {
        b"w:rFonts" => {
            let family = match attr_value(e, b"w:ascii")? {
                Some(family) => Some(family),
                None => attr_value(e, b"w:hAnsi")?,
            };
            if family.is_some() {
                font.font_family = family;
            }
        }
        b"w:sz" => {
            font.font_size = attr_value(e, b"w:val")?
                .and_then(|v| v.parse::<f32>().ok())
                .map(|half_points| half_points / 2.0);
        }
        b"w:b" => font.bold = Some(toggle_value(attr_value(e, b"w:val")?)),
        b"w:i" => font.italic = Some(toggle_value(attr_value(e, b"w:val")?)),
        b"w:color" => font.color = attr_value(e, b"w:val")?,
        _ => {}
    }
    Ok(())
}

/// OOXML on/off properties: present without `w:val` means on.
fn toggle_value(val: Option<String>) -> bool {
    !matches!(val.as_deref(), Some("0" | "false" | "off"))
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, ConversionError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn is_last(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.last().map(|n| n.as_slice() == name).unwrap_or(false)
}

/// Byte offset of the `<` opening the markup that ends at `end`.
/// `<` cannot appear unescaped inside a tag, so the nearest one is the tag's own.
fn tag_start(xml: &[u8], end: usize) -> Result<usize, ConversionError> {
    xml[..end]
        .iter()
        .rposition(|b| *b == b'<')
        .ok_or_else(|| ConversionError::Xml(format!("no tag start before offset {end}")))
}

/// Parses a captured `w:rPr` fragment back into a font profile.
fn font_from_properties(fragment: &str) -> Result<FontProfile, ConversionError> {
    let mut reader = Reader::from_str(fragment);
    let mut font = FontProfile::default();
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                apply_run_property(&mut font, e.name().as_ref(), &e)?;
            }
            _ => {}
        }
    }
    Ok(font)
}

// ────────────────────────────────────────────────────────────────────────────
// Export
// ────────────────────────────────────────────────────────────────────────────

fn splice_document(xml: &[u8], document: &Document) -> Result<Vec<u8>, ConversionError> {
    let body = scan_body(xml)?;

    // Assign each model paragraph to the source paragraph it replaces or follows.
    let mut placements: Vec<Vec<&Paragraph>> = vec![Vec::new(); body.len()];
    let mut anchor: Option<usize> = None;
    let mut leading: Vec<&Paragraph> = Vec::new();
    for paragraph in &document.paragraphs {
        match paragraph.origin {
            Some(i) if i < body.len() => {
                anchor = Some(i);
                placements[i].push(paragraph);
            }
            _ => match anchor {
                Some(i) => placements[i].push(paragraph),
                None => leading.push(paragraph),
            },
        }
    }
    if let Some(first) = placements.first_mut() {
        leading.append(first);
        *first = leading;
    }

    let mut out = Vec::with_capacity(xml.len() + 1024);
    let mut cursor = 0;
    for (index, (source, placed)) in body.iter().zip(&placements).enumerate() {
        out.extend_from_slice(&xml[cursor..source.span.start]);
        cursor = source.span.end;
        for paragraph in placed {
            if paragraph.origin == Some(index) {
                if source.to_model(xml, index) == **paragraph {
                    out.extend_from_slice(&xml[source.span.clone()]);
                    continue;
                }
                if let Some(patched) = patch_runs(xml, source, paragraph) {
                    out.extend_from_slice(&patched);
                    continue;
                }
            }
            let mut text = String::new();
            if paragraph.origin == Some(index) {
                write_open_tag(&mut text, &xml[source.open_tag.clone()]);
            } else {
                text.push_str("<w:p>");
            }
            if let Some(properties) = source.properties.clone() {
                text.push_str(&String::from_utf8_lossy(&xml[properties]));
            }
            for run in &paragraph.runs {
                write_run(&mut text, run);
            }
            text.push_str("</w:p>");
            out.extend_from_slice(text.as_bytes());
        }
    }
    out.extend_from_slice(&xml[cursor..]);
    Ok(out)
}

/// Rewrites only the changed runs inside the source paragraph's bytes and adds new runs
/// just before `</w:p>`.
///
/// Returns `None` when the model's sourced runs are not exactly the source's text runs in
/// order (a cross-run rewrite), or when the source paragraph is self-closing.
fn patch_runs(xml: &[u8], source: &SourceParagraph, paragraph: &Paragraph) -> Option<Vec<u8>> {
    if source.open_tag == source.span {
        return None;
    }
    let sourced = paragraph
        .runs
        .iter()
        .take_while(|r| r.origin.is_some())
        .count();
    let (kept, added) = paragraph.runs.split_at(sourced);
    let text_runs = source
        .runs
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.text.is_empty())
        .map(|(i, _)| Some(i));
    if added.iter().any(|r| r.origin.is_some()) || !kept.iter().map(|r| r.origin).eq(text_runs) {
        return None;
    }

    let close = tag_start(xml, source.span.end).ok()?;
    let mut out = Vec::with_capacity(source.span.len() + 256);
    let mut cursor = source.span.start;
    for run in kept {
        let origin = run.origin?;
        let source_run = &source.runs[origin];
        if source_run.to_model(xml, origin) == *run {
            continue;
        }
        let mut text = String::new();
        write_run(&mut text, run);
        out.extend_from_slice(&xml[cursor..source_run.span.start]);
        out.extend_from_slice(text.as_bytes());
        cursor = source_run.span.end;
    }
    out.extend_from_slice(&xml[cursor..close]);
    let mut text = String::new();
    for run in added {
        write_run(&mut text, run);
    }
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(&xml[close..source.span.end]);
    Some(out)
}

/// Writes a paragraph's original opening tag, expanding `<w:p .../>` to `<w:p ...>`.
fn write_open_tag(out: &mut String, tag: &[u8]) {
    let tag = String::from_utf8_lossy(tag);
    match tag.strip_suffix("/>") {
        Some(open) => {
            out.push_str(open.trim_end());
            out.push('>');
        }
        None => out.push_str(&tag),
    }
}

fn write_run(out: &mut String, run: &Run) {
    out.push_str("<w:r>");
    match &run.native_properties {
        Some(native) if font_from_properties(native).ok().as_ref() == Some(&run.font) => {
            out.push_str(native);
        }
        _ => write_run_properties(out, &run.font),
    }
    let mut segment = String::new();
    for ch in run.text.chars() {
        match ch {
            '\t' | '\n' => {
                write_text(out, &segment);
                segment.clear();
                out.push_str(if ch == '\t' { "<w:tab/>" } else { "<w:br/>" });
            }
            _ => segment.push(ch),
        }
    }
    write_text(out, &segment);
    out.push_str("</w:r>");
}

fn write_run_properties(out: &mut String, font: &FontProfile) {
    if font.is_inherited() {
        return;
    }
    out.push_str("<w:rPr>");
    if let Some(family) = &font.font_family {
        let family = escape_attr(family);
        out.push_str(&format!(
            r#"<w:rFonts w:ascii="{family}" w:hAnsi="{family}" w:cs="{family}"/>"#
        ));
    }
    if let Some(bold) = font.bold {
        out.push_str(if bold { "<w:b/>" } else { r#"<w:b w:val="0"/>"# });
    }
    if let Some(italic) = font.italic {
        out.push_str(if italic { "<w:i/>" } else { r#"<w:i w:val="0"/>"# });
    }
    if let Some(color) = &font.color {
        out.push_str(&format!(r#"<w:color w:val="{}"/>"#, escape_attr(color)));
    }
    if let Some(size) = font.font_size {
        let half_points = (size * 2.0).round() as u32;
        out.push_str(&format!(
            r#"<w:sz w:val="{half_points}"/><w:szCs w:val="{half_points}"/>"#
        ));
    }
    out.push_str("</w:rPr>");
}

fn write_text(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str(r#"<w:t xml:space="preserve">"#);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out.push_str("</w:t>");
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
