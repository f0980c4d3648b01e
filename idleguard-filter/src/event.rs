/// Classification of one input line from a streaming-event feed.
///
/// Lines are either JSON events or plain text. Only text deltas produce
/// output; plain text is echoed so mixed streams survive the filter.
use serde::Deserialize;
use serde_json::Value;

const CONTENT_BLOCK_DELTA: &str = "content_block_delta";
const TEXT_DELTA: &str = "text_delta";

/// What to do with a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    /// Print the text as-is, no trailing newline.
    Text(String),
    /// Not JSON: print the line followed by a newline.
    Passthrough(String),
    /// Nothing to print.
    Skip,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: Option<String>,
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

/// Decide what to emit for a single raw input line.
pub fn classify(raw: &str) -> LineAction {
    let line = raw.trim();
    if line.is_empty() {
        return LineAction::Skip;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return LineAction::Passthrough(line.to_string()),
    };

    // Valid JSON that is not a recognizable event (arrays, strings, fields of
    // the wrong type) is dropped like any other unknown event.
    let event: Event = match serde_json::from_value(value) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unrecognized event shape");
            return LineAction::Skip;
        }
    };

    text_delta(event).map_or(LineAction::Skip, LineAction::Text)
}

fn text_delta(event: Event) -> Option<String> {
    if event.kind.as_deref() != Some(CONTENT_BLOCK_DELTA) {
        return None;
    }
    let delta = event.delta?;
    if delta.kind.as_deref() != Some(TEXT_DELTA) {
        return None;
    }
    delta.text.filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta_is_extracted() {
        let line = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        assert_eq!(classify(line), LineAction::Text("Hello".to_string()));
    }

    #[test]
    fn test_text_keeps_inner_whitespace_and_newlines() {
        let line = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":" two\nlines "}}"#;
        assert_eq!(classify(line), LineAction::Text(" two\nlines ".to_string()));
    }

    #[test]
    fn test_other_delta_types_are_skipped() {
        let line = r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{}"}}"#;
        assert_eq!(classify(line), LineAction::Skip);
    }

    #[test]
    fn test_other_event_types_are_skipped() {
        for line in [
            r#"{"type":"message_start","message":{"id":"m1"}}"#,
            r#"{"type":"message_stop"}"#,
            r#"{"delta":{"type":"text_delta","text":"no outer type"}}"#,
            r#"{}"#,
        ] {
            assert_eq!(classify(line), LineAction::Skip, "{line}");
        }
    }

    #[test]
    fn test_empty_text_is_skipped() {
        let line = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":""}}"#;
        assert_eq!(classify(line), LineAction::Skip);
    }

    #[test]
    fn test_non_object_json_is_skipped() {
        for line in ["42", "\"just a string\"", "[1,2,3]", "null", "true"] {
            assert_eq!(classify(line), LineAction::Skip, "{line}");
        }
    }

    #[test]
    fn test_wrong_field_types_are_skipped() {
        for line in [
            r#"{"type":7}"#,
            r#"{"type":"content_block_delta","delta":"text"}"#,
            r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":5}}"#,
        ] {
            assert_eq!(classify(line), LineAction::Skip, "{line}");
        }
    }

    #[test]
    fn test_plain_text_passes_through_trimmed() {
        assert_eq!(
            classify("  Compiling idleguard v0.1.0\n"),
            LineAction::Passthrough("Compiling idleguard v0.1.0".to_string())
        );
    }

    #[test]
    fn test_malformed_json_passes_through() {
        assert_eq!(
            classify(r#"{"type":"content_block_delta""#),
            LineAction::Passthrough(r#"{"type":"content_block_delta""#.to_string())
        );
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        assert_eq!(classify(""), LineAction::Skip);
        assert_eq!(classify("   \t\r\n"), LineAction::Skip);
    }
}
