//! DOCX text extraction. The document body is XML inside a ZIP container.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::AcquireError;

/// Pull the paragraph text out of `word/document.xml`.
pub fn extract_text(bytes: &[u8]) -> Result<String, AcquireError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| AcquireError::Docx(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| AcquireError::Docx(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| AcquireError::Docx(e.to_string()))?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                let fragment = t.unescape().map_err(|e| AcquireError::Docx(e.to_string()))?;
                text.push_str(&fragment);
            }
            // Paragraph and table-row ends become line breaks so the line
            // scanner sees one logical statement row per line.
            Ok(Event::End(e)) if matches!(e.name().as_ref(), b"w:p" | b"w:tr") => {
                text.push('\n');
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AcquireError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}
