//! PDF text extraction.

use tracing::{debug, warn};

use crate::error::ExtractionError;

/// Pull the text layer out of a PDF held in memory. Pages are separated by
/// blank lines; layout beyond that is not preserved.
pub fn pdf_to_text(locator: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
    if !bytes.starts_with(b"%PDF-") {
        return Err(ExtractionError::Unreadable {
            locator: locator.to_string(),
            message: "not a PDF file (missing %PDF header)".into(),
        });
    }

    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        ExtractionError::Unreadable {
            locator: locator.to_string(),
            message: format!("could not parse PDF: {e}"),
        }
    })?;

    debug!("PDF {locator}: {} bytes -> {} chars", bytes.len(), text.chars().count());
    if text.trim().is_empty() {
        warn!("PDF {locator} has no text layer (scanned document?)");
    }
    Ok(text)
}
