//! Word (.docx) text extraction.
//!
//! A .docx file is a zip archive; the body lives in `word/document.xml` as
//! WordprocessingML. Only run text (`w:t`), tabs and breaks inside runs are
//! kept. Each paragraph ends with a blank line.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::error::ExtractionError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Compound-file signature of legacy binary `.doc` files.
const OLE_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub fn docx_to_text(locator: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
    let unreadable = |message: String| ExtractionError::Unreadable {
        locator: locator.to_string(),
        message,
    };

    if bytes.starts_with(OLE_SIGNATURE) {
        return Err(ExtractionError::UnsupportedFormat {
            locator: locator.to_string(),
            format: "doc".into(),
        });
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| unreadable(format!("not a .docx archive: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| unreadable(format!("missing {DOCUMENT_PART}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| unreadable(format!("could not read {DOCUMENT_PART}: {e}")))?;

    let text = document_text(&xml)
        .map_err(|e| unreadable(format!("malformed {DOCUMENT_PART}: {e}")))?;
    debug!("Word {locator}: {} bytes of XML -> {} chars", xml.len(), text.chars().count());
    Ok(text)
}

/// Flatten WordprocessingML body XML to plain text.
fn document_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" => in_text = in_run,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            // Tab stops in paragraph properties are also `w:tab`.
            Event::Empty(e) if in_run => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"p" => out.push_str("\n\n"),
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p>
      <w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr>
      <w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space="preserve"> report</w:t></w:r>
    </w:p>
    <w:p/>
    <w:p>
      <w:r><w:t>Revenue</w:t><w:tab/><w:t>up &amp; right</w:t><w:br/><w:t>Costs flat</w:t></w:r>
    </w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn flattens_runs_and_paragraphs() {
        let text = document_text(BODY).unwrap();
        assert_eq!(
            text,
            "Quarterly report\n\n\n\nRevenue\tup & right\nCosts flat\n\n"
        );
    }

    #[test]
    fn legacy_doc_is_unsupported() {
        let mut bytes = OLE_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0; 64]);
        let err = docx_to_text("old.doc", &bytes).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat { ref format, .. } if format == "doc"));
    }

    #[test]
    fn non_zip_is_unreadable() {
        let err = docx_to_text("notes.docx", b"plain text pretending").unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { .. }));
    }
}
