/// Detected MIME plus the extension used for content-addressed storage
/// (§4.6 step 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub mime_type: &'static str,
    pub extension: &'static str,
}

const TEXT_PROBE_BYTES: usize = 4096;

/// Magic-byte sniff first; extension + UTF-8 probe fallback (§4.6 step 2).
/// `original_name` is only consulted once magic bytes fail to classify the
/// payload as one of the image/PDF formats.
pub fn sniff(bytes: &[u8], original_name: &str) -> Sniffed {
    if let Some(s) = sniff_magic_bytes(bytes) {
        return s;
    }

    let ext = original_name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "csv" if looks_like_utf8_text(bytes) => Sniffed { mime_type: "text/csv", extension: ".csv" },
        "md" | "markdown" if looks_like_utf8_text(bytes) => Sniffed { mime_type: "text/markdown", extension: ".md" },
        _ => sniff_by_content(bytes),
    }
}

fn sniff_magic_bytes(bytes: &[u8]) -> Option<Sniffed> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(Sniffed { mime_type: "image/jpeg", extension: ".jpg" });
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(Sniffed { mime_type: "image/png", extension: ".png" });
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(Sniffed { mime_type: "image/gif", extension: ".gif" });
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(Sniffed { mime_type: "image/webp", extension: ".webp" });
    }
    if bytes.starts_with(b"%PDF") {
        return Some(Sniffed { mime_type: "application/pdf", extension: ".pdf" });
    }
    None
}

/// Extension-less content probe (§4.6 step 2 parenthetical): a leading
/// `{`/`[` (after trimming whitespace) means JSON; otherwise a valid,
/// NUL-free UTF-8 prefix means plain text; otherwise the payload is opaque.
fn sniff_by_content(bytes: &[u8]) -> Sniffed {
    let probe = &bytes[..bytes.len().min(TEXT_PROBE_BYTES)];
    let trimmed_first = probe.iter().find(|b| !b.is_ascii_whitespace());
    if matches!(trimmed_first, Some(b'{') | Some(b'[')) && looks_like_utf8_text(bytes) {
        return Sniffed { mime_type: "application/json", extension: ".json" };
    }
    if looks_like_utf8_text(bytes) {
        return Sniffed { mime_type: "text/plain", extension: ".txt" };
    }
    Sniffed { mime_type: "application/octet-stream", extension: "" }
}

fn looks_like_utf8_text(bytes: &[u8]) -> bool {
    let probe = &bytes[..bytes.len().min(TEXT_PROBE_BYTES)];
    !probe.contains(&0) && std::str::from_utf8(probe).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_magic_bytes_win_over_filename() {
        let bytes = [0x89u8, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0];
        let s = sniff(&bytes, "avatar.jpg");
        assert_eq!(s.mime_type, "image/png");
    }

    #[test]
    fn spoofed_image_extension_falls_through_to_content_probe() {
        let bytes = b"\x00\xFF\x11\x22NOT_A_REAL_IMAGE";
        let s = sniff(bytes, "avatar.png");
        assert_eq!(s.mime_type, "application/octet-stream");
    }

    #[test]
    fn json_prefix_is_detected() {
        let s = sniff(br#"{"a":1}"#, "data.bin");
        assert_eq!(s.mime_type, "application/json");
    }

    #[test]
    fn plain_utf8_text_without_extension_hint() {
        let s = sniff(b"hello world", "notes");
        assert_eq!(s.mime_type, "text/plain");
    }

    #[test]
    fn csv_extension_is_honored_for_text_payloads() {
        let s = sniff(b"a,b,c\n1,2,3", "table.csv");
        assert_eq!(s.mime_type, "text/csv");
    }

    #[test]
    fn pdf_magic_bytes_detected() {
        let s = sniff(b"%PDF-1.4 rest of file", "doc.bin");
        assert_eq!(s.mime_type, "application/pdf");
    }
}
