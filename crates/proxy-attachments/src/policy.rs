use crate::error::{AttachmentError, Result};
use crate::sniff::Sniffed;

const ALLOWED_IMAGE_MIMES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const ALLOWED_FILE_MIMES: &[&str] = &["application/pdf", "text/plain", "text/csv", "application/json", "text/markdown"];

pub fn is_image(mime_type: &str) -> bool {
    ALLOWED_IMAGE_MIMES.contains(&mime_type)
}

/// Reject MIMEs outside the allowed sets, and the allowed set's own
/// per-class size cap (§4.6 step 3).
pub fn enforce(sniffed: &Sniffed, size: usize, max_image_bytes: u64, max_file_bytes: u64) -> Result<()> {
    if is_image(sniffed.mime_type) {
        let max = max_image_bytes as usize;
        if size > max {
            return Err(AttachmentError::PayloadTooLarge { size, max });
        }
        return Ok(());
    }
    if ALLOWED_FILE_MIMES.contains(&sniffed.mime_type) {
        let max = max_file_bytes as usize;
        if size > max {
            return Err(AttachmentError::PayloadTooLarge { size, max });
        }
        return Ok(());
    }
    Err(AttachmentError::UnsupportedMediaType(sniffed.mime_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_within_cap_is_accepted() {
        let sniffed = Sniffed { mime_type: "image/png", extension: ".png" };
        assert!(enforce(&sniffed, 1_000, 10 * 1024 * 1024, 20 * 1024 * 1024).is_ok());
    }

    #[test]
    fn image_over_cap_is_rejected() {
        let sniffed = Sniffed { mime_type: "image/png", extension: ".png" };
        let err = enforce(&sniffed, 11 * 1024 * 1024, 10 * 1024 * 1024, 20 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, AttachmentError::PayloadTooLarge { .. }));
    }

    #[test]
    fn octet_stream_is_always_rejected() {
        let sniffed = Sniffed { mime_type: "application/octet-stream", extension: "" };
        let err = enforce(&sniffed, 10, 10 * 1024 * 1024, 20 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedMediaType(_)));
    }

    #[test]
    fn exactly_max_file_size_is_accepted() {
        let sniffed = Sniffed { mime_type: "application/pdf", extension: ".pdf" };
        assert!(enforce(&sniffed, 20 * 1024 * 1024, 10 * 1024 * 1024, 20 * 1024 * 1024).is_ok());
        let err = enforce(&sniffed, 20 * 1024 * 1024 + 1, 10 * 1024 * 1024, 20 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, AttachmentError::PayloadTooLarge { .. }));
    }
}
