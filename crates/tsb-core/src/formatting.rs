//! Text helpers for Telegram HTML output.

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Cut `s` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Split text into chunks of at most `limit` characters, preferring line
/// breaks, then spaces.
pub fn split_text_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim_end();

    while rest.chars().count() > limit {
        let cut_byte = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..cut_byte];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut_byte);

        chunks.push(rest[..split_at].trim_end().to_string());
        rest = rest[split_at..].trim_start();
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn truncates_by_chars_not_bytes() {
        assert_eq!(truncate_chars("گروه فروش", 4), "گرو…");
        assert_eq!(truncate_chars("short", 30), "short");
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text_chunks("hello", 4000), vec!["hello"]);
        assert_eq!(split_text_chunks("", 4000), vec![""]);
    }

    #[test]
    fn splits_on_line_breaks_first() {
        let text = "aaaa bbbb\ncccc dddd\neeee";
        let chunks = split_text_chunks(text, 12);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd", "eeee"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
    }

    #[test]
    fn hard_splits_unbroken_text() {
        let text = "x".repeat(25);
        let chunks = split_text_chunks(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }
}
