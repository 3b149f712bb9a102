//! Server-sent-event framing and answer chunking.
//!
//! Frames follow the HTML SSE spec: an `event:` line, one `data:` line per
//! newline in the JSON payload, and a blank-line terminator.

use serde_json::Value;

/// Chunk size for the final answer, counted in code points so multi-byte
/// Korean text never splits mid-character.
pub const ANSWER_CHUNK_CODEPOINTS: usize = 48;

/// Encode one SSE frame.
pub fn encode_frame(event: &str, data: &Value) -> String {
    let payload = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
    let mut frame = format!("event: {}\n", event);
    for line in payload.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// Split text into ordered chunks of at most `size` code points.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_frame_shape() {
        let frame = encode_frame("delta", &json!({"text": "안녕"}));
        assert_eq!(frame, "event: delta\ndata: {\"text\":\"안녕\"}\n\n");
    }

    #[test]
    fn test_encode_frame_terminates_with_blank_line() {
        let frame = encode_frame("done", &json!({"ok": true}));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn test_chunk_text_by_code_points() {
        let text = "가".repeat(100);
        let chunks = chunk_text(&text, ANSWER_CHUNK_CODEPOINTS);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 48);
        assert_eq!(chunks[2].chars().count(), 4);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 48).is_empty());
    }
}
