//! crates/manuscript_core/src/extract.rs
//!
//! Turns uploaded manuscript bytes into the plain text the generation service consumes.
//!
//! Plain text is decoded with an ordered fallback chain: UTF-8, then Shift-JIS, then a
//! lossy Shift-JIS pass that drops whatever still cannot be decoded. Word documents are
//! opened as a ZIP container and the visible text of every body paragraph is collected
//! from `word/document.xml`; formatting and embedded images are ignored.

use std::io::{Cursor, Read};

use encoding_rs::SHIFT_JIS;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::domain::{ManuscriptInput, SourceType};

const DOCUMENT_PART: &str = "word/document.xml";
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Upper bound on the inflated size of `word/document.xml`.
pub const MAX_DOCUMENT_XML_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("The document could not be read: {0}")]
    MalformedDocument(String),
}

/// Extracts the text of an uploaded manuscript.
pub fn extract(input: &ManuscriptInput) -> Result<String, ExtractError> {
    match input.source_type {
        SourceType::PlainText => Ok(decode_text(&input.bytes)),
        SourceType::StructuredDocument => extract_document(&input.bytes),
    }
}

/// Decodes plain-text bytes. Never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if let Some(text) = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes) {
        debug!("Manuscript decoded as Shift-JIS.");
        return text.into_owned();
    }

    warn!("Manuscript is neither UTF-8 nor Shift-JIS; undecodable bytes are dropped.");
    let (lossy, _) = SHIFT_JIS.decode_without_bom_handling(bytes);
    lossy
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

/// Joins the non-empty body paragraphs of a Word document with a blank line.
pub fn extract_document(bytes: &[u8]) -> Result<String, ExtractError> {
    let xml = read_document_part(bytes, MAX_DOCUMENT_XML_BYTES)?;
    let paragraphs = body_paragraphs(&xml)?;

    let text = paragraphs
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR);

    debug!(
        "Extracted {} characters from {} paragraphs.",
        text.chars().count(),
        paragraphs.len()
    );
    Ok(text)
}

fn read_document_part(bytes: &[u8], max_len: u64) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        ExtractError::MalformedDocument(format!("not a Word document container ({})", e))
    })?;

    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ExtractError::MalformedDocument(format!("{} is missing", DOCUMENT_PART)))?;

    let too_large = || {
        ExtractError::MalformedDocument(format!(
            "{} is larger than {} bytes",
            DOCUMENT_PART, max_len
        ))
    };
    if part.size() > max_len {
        return Err(too_large());
    }

    // Declared sizes are untrusted.
    let mut buf = Vec::new();
    part.by_ref().take(max_len + 1).read_to_end(&mut buf).map_err(|e| {
        ExtractError::MalformedDocument(format!("failed to read {} ({})", DOCUMENT_PART, e))
    })?;
    if buf.len() as u64 > max_len {
        return Err(too_large());
    }

    String::from_utf8(buf).map_err(|e| {
        ExtractError::MalformedDocument(format!("{} is not UTF-8 ({})", DOCUMENT_PART, e))
    })
}

/// Collects the text of each top-level body paragraph, in document order.
///
/// Paragraphs inside tables and nested text boxes are skipped. Tabs and line
/// breaks inside runs become `\t` and `\n`.
fn body_paragraphs(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut paragraph_depth = 0usize;
    let mut table_depth = 0usize;
    let mut in_run = false;
    let mut in_text = false;

    loop {
        let collecting = paragraph_depth == 1 && table_depth == 0;
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"p" => {
                    paragraph_depth += 1;
                    if paragraph_depth == 1 {
                        current.clear();
                    }
                }
                b"r" => in_run = true,
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                b"p" => {
                    if collecting {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    paragraph_depth = paragraph_depth.saturating_sub(1);
                }
                b"r" => in_run = false,
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Empty(e)) if collecting && in_run => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if collecting && in_text => {
                let text = t.unescape().map_err(|e| {
                    ExtractError::MalformedDocument(format!("bad text content ({})", e))
                })?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::MalformedDocument(format!(
                    "invalid XML at byte {} ({})",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Builds a minimal .docx container around the given `<w:body>` content.
    pub(crate) fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(DOCUMENT_PART, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", text)
    }

    fn plain(bytes: &[u8]) -> ManuscriptInput {
        ManuscriptInput {
            bytes: bytes.to_vec(),
            source_type: SourceType::PlainText,
        }
    }

    fn document(bytes: Vec<u8>) -> ManuscriptInput {
        ManuscriptInput {
            bytes,
            source_type: SourceType::StructuredDocument,
        }
    }

    #[test]
    fn utf8_text_is_returned_verbatim() {
        let text = "巨人が逆転勝ち\n\n  9回に2点  ";
        assert_eq!(extract(&plain(text.as_bytes())).unwrap(), text);
    }

    #[test]
    fn paragraph_separated_text_passes_through() {
        assert_eq!(extract(&plain(b"A\n\nB\n\nC")).unwrap(), "A\n\nB\n\nC");
    }

    #[test]
    fn shift_jis_is_tried_after_utf8() {
        let source = "阪神が連勝、先発は７回無失点";
        let (encoded, _, had_errors) = SHIFT_JIS.encode(source);
        assert!(!had_errors);
        assert!(std::str::from_utf8(&encoded).is_err());

        assert_eq!(extract(&plain(&encoded)).unwrap(), source);
    }

    #[test]
    fn undecodable_bytes_are_dropped() {
        assert_eq!(decode_text(&[b'A', 0xFF, b'B', 0xFD]), "AB");
    }

    #[test]
    fn document_paragraphs_are_trimmed_and_joined() {
        let body = [
            para("  First paragraph. "),
            "<w:p/>".to_string(),
            para("   "),
            para("Second &amp; last"),
            "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr></w:p>".to_string(),
            para("三段落目"),
        ]
        .concat();

        let text = extract(&document(docx_with_body(&body))).unwrap();
        assert_eq!(text, "First paragraph.\n\nSecond & last\n\n三段落目");
    }

    #[test]
    fn runs_are_concatenated_with_tabs_and_breaks() {
        let body = concat!(
            "<w:p><w:pPr><w:tabs><w:tab w:val=\"left\" w:pos=\"720\"/></w:tabs></w:pPr>",
            "<w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r>",
            "<w:r><w:tab/><w:t>after tab</w:t><w:br/><w:t>next line</w:t></w:r></w:p>"
        );
        let text = extract(&document(docx_with_body(body))).unwrap();
        assert_eq!(text, "Bold\tafter tab\nnext line");
    }

    #[test]
    fn table_and_text_box_paragraphs_are_skipped() {
        let body = [
            para("Body"),
            format!("<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>", para("Cell")),
            concat!(
                "<w:p><w:r><w:t>Outer</w:t></w:r><w:r><w:pict><w:txbxContent>",
                "<w:p><w:r><w:t>Boxed</w:t></w:r></w:p>",
                "</w:txbxContent></w:pict></w:r></w:p>"
            )
            .to_string(),
        ]
        .concat();

        let text = extract(&document(docx_with_body(&body))).unwrap();
        assert_eq!(text, "Body\n\nOuter");
    }

    #[test]
    fn oversized_document_part_is_rejected() {
        let container = docx_with_body(&para(&"巨人".repeat(2_000)));

        let err = read_document_part(&container, 1_024).unwrap_err();
        assert!(
            matches!(&err, ExtractError::MalformedDocument(msg) if msg.contains("larger than 1024 bytes")),
            "{err}"
        );
        assert!(read_document_part(&container, MAX_DOCUMENT_XML_BYTES).is_ok());
    }

    #[test]
    fn highly_compressible_document_is_rejected_before_inflating() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(
                DOCUMENT_PART,
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated),
            )
            .unwrap();
        let chunk = vec![b' '; 1024 * 1024];
        for _ in 0..(MAX_DOCUMENT_XML_BYTES / chunk.len() as u64 + 1) {
            writer.write_all(&chunk).unwrap();
        }
        let container = writer.finish().unwrap().into_inner();
        assert!((container.len() as u64) < MAX_DOCUMENT_XML_BYTES / 100);

        let err = extract(&document(container)).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedDocument(_)));
    }

    #[test]
    fn non_container_bytes_are_malformed() {
        let err = extract(&document(b"plainly not a zip".to_vec())).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedDocument(_)));
    }

    #[test]
    fn container_without_document_part_is_malformed() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/styles.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<w:styles/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract(&document(bytes)).unwrap_err();
        assert!(err.to_string().contains(DOCUMENT_PART));
    }

    #[test]
    fn broken_xml_is_malformed() {
        let bytes = docx_with_body("<w:p><w:r><w:t>open</w:r></w:t></w:p>");
        assert!(matches!(
            extract(&document(bytes)),
            Err(ExtractError::MalformedDocument(_))
        ));
    }
}
