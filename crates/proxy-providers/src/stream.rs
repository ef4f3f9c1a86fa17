/// One line of a `text/event-stream` body, reduced to the two kinds the
/// adapters care about (§4.5): a data frame, or nothing worth emitting
/// (blank lines and `:`-prefixed comments are keepalives, not content).
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Data(String),
    Ignored,
}

/// Classify one line of an SSE body per §4.5: blank lines and lines
/// starting with `:` are ignored; a `data:` prefix is unwrapped (the space
/// after the colon is optional, matching real upstream framing).
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Ignored;
    }
    match line.strip_prefix("data:") {
        Some(rest) => SseLine::Data(rest.trim_start().to_string()),
        None => SseLine::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        assert_eq!(parse_sse_line(""), SseLine::Ignored);
        assert_eq!(parse_sse_line(": keepalive"), SseLine::Ignored);
    }

    #[test]
    fn data_prefix_is_unwrapped() {
        assert_eq!(parse_sse_line("data: {\"a\":1}"), SseLine::Data("{\"a\":1}".to_string()));
        assert_eq!(parse_sse_line("data:[DONE]"), SseLine::Data("[DONE]".to_string()));
    }
}
