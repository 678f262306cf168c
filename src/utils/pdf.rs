// Minimal PDF checks for blobs pulled from storage.

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Returns true if the head of a blob starts with the `%PDF-` magic bytes.
/// Storage metadata is ignored; objects are often `application/octet-stream`.
pub fn is_pdf(head: &[u8]) -> bool {
    head.starts_with(b"%PDF-")
}
