//! PDF text extraction for the ingestion pipeline.

use crate::core::errors::ApiError;

/// Extracts plain text per page from a PDF byte stream.
///
/// Returns one string per page; a page with no text yields an empty
/// string. Non-PDF or unparseable input fails with `UnsupportedFormat`.
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ApiError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|err| ApiError::UnsupportedFormat(format!("PDF extraction failed: {err}")))
}
