const MAX_EXTRACTED_CHARS: usize = 50_000;

/// Best-effort text extraction, bounded at 50,000 characters (§4.6 step 5).
/// Images yield no text; everything else either decodes as UTF-8 (with
/// replacement) or, for PDF, runs through a page-by-page extractor whose
/// output is NUL-stripped and space-joined.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> Option<String> {
    let text = match mime_type {
        "text/plain" | "text/csv" | "text/markdown" | "application/json" => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        "application/pdf" => extract_pdf_text(bytes)?,
        _ => return None,
    };
    Some(bound_chars(&text))
}

fn extract_pdf_text(bytes: &[u8]) -> Option<String> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => Some(text.replace('\0', "").split_whitespace().collect::<Vec<_>>().join(" ")),
        Err(e) => {
            tracing::warn!(error = %e, "pdf text extraction failed");
            None
        }
    }
}

fn bound_chars(text: &str) -> String {
    text.chars().take(MAX_EXTRACTED_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_round_trips() {
        assert_eq!(extract_text(b"hello", "text/plain"), Some("hello".to_string()));
    }

    #[test]
    fn images_yield_no_text() {
        assert_eq!(extract_text(b"\x89PNG...", "image/png"), None);
    }

    #[test]
    fn extraction_is_bounded_at_fifty_thousand_chars() {
        let big = "a".repeat(60_000);
        let extracted = extract_text(big.as_bytes(), "text/plain").unwrap();
        assert_eq!(extracted.chars().count(), MAX_EXTRACTED_CHARS);
    }
}
