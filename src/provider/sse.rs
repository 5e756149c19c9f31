// Wire codec for the backend's streaming endpoints
//
// The stream is newline-delimited server-sent events. Each event line is
// `data: <json>` where the JSON object has `type` ∈ {token, done, error};
// the literal `data: [DONE]` terminates the stream. A stream that
// terminates without a prior done event is a protocol error.

use super::{ProviderError, StreamInferenceMeta, TokenCallback};
use futures_util::StreamExt;
use serde::Deserialize;

/// One decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done(StreamInferenceMeta),
    Error(String),
    /// The literal `data: [DONE]` line
    Terminator,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Token { token: String },
    Done { meta: StreamInferenceMeta },
    Error { message: String },
}

/// Parse one line of the stream. Returns `None` for blank lines and
/// non-data SSE fields (comments, event ids), which carry no payload.
pub fn parse_line(line: &str) -> Result<Option<StreamEvent>, ProviderError> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return Ok(None);
    }

    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None => return Ok(None),
    };

    if payload == "[DONE]" {
        return Ok(Some(StreamEvent::Terminator));
    }

    let event: WireEvent = serde_json::from_str(payload)
        .map_err(|e| ProviderError::Protocol(format!("bad stream event: {}", e)))?;

    Ok(Some(match event {
        WireEvent::Token { token } => StreamEvent::Token(token),
        WireEvent::Done { meta } => StreamEvent::Done(meta),
        WireEvent::Error { message } => StreamEvent::Error(message),
    }))
}

/// Splits an incoming byte stream into complete lines.
///
/// Carries partial lines across chunk boundaries; bytes after the last
/// newline stay buffered until more data arrives.
#[derive(Default)]
pub struct SseLineBuffer {
    pending: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// Drive an HTTP event stream to completion, feeding tokens to the
/// callback and returning the terminal meta.
pub(crate) async fn drive_stream(
    response: reqwest::Response,
    on_token: TokenCallback<'_>,
) -> Result<StreamInferenceMeta, ProviderError> {
    let mut stream = response.bytes_stream();
    let mut lines = SseLineBuffer::new();
    let mut meta: Option<StreamInferenceMeta> = None;

    'receive: while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProviderError::Transport(e.to_string()))?;
        for line in lines.push(&chunk) {
            match parse_line(&line)? {
                None => {}
                Some(StreamEvent::Token(token)) => on_token(&token),
                Some(StreamEvent::Done(m)) => meta = Some(m),
                Some(StreamEvent::Error(message)) => {
                    return Err(ProviderError::Backend(message));
                }
                Some(StreamEvent::Terminator) => break 'receive,
            }
        }
    }

    meta.ok_or_else(|| {
        ProviderError::Protocol("stream terminated without a done event".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_event() {
        let event = parse_line(r#"data: {"type":"token","token":"Hi"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, StreamEvent::Token("Hi".to_string()));
    }

    #[test]
    fn test_parse_done_event_with_meta() {
        let line = r#"data: {"type":"done","meta":{"mode":"dictate","raw_text":"hi","output_text":"Hi.","used_web_search":false,"web_sources":[],"timing_ms":{"asr":120.5}}}"#;
        match parse_line(line).unwrap().unwrap() {
            StreamEvent::Done(meta) => {
                assert_eq!(meta.mode, "dictate");
                assert_eq!(meta.output_text, "Hi.");
                assert_eq!(meta.timing_ms.get("asr"), Some(&120.5));
            }
            other => panic!("expected done, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_event() {
        let event = parse_line(r#"data: {"type":"error","message":"model crashed"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, StreamEvent::Error("model crashed".to_string()));
    }

    #[test]
    fn test_parse_terminator() {
        assert_eq!(
            parse_line("data: [DONE]").unwrap().unwrap(),
            StreamEvent::Terminator
        );
    }

    #[test]
    fn test_blank_and_non_data_lines_are_skipped() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("\r").unwrap(), None);
        assert_eq!(parse_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_line("event: message").unwrap(), None);
    }

    #[test]
    fn test_malformed_json_is_a_protocol_error() {
        assert!(matches!(
            parse_line("data: {not json"),
            Err(ProviderError::Protocol(_))
        ));
    }

    #[test]
    fn test_unknown_event_type_is_a_protocol_error() {
        assert!(matches!(
            parse_line(r#"data: {"type":"progress","pct":50}"#),
            Err(ProviderError::Protocol(_))
        ));
    }

    #[test]
    fn test_line_buffer_reassembles_split_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"type\":\"token\",").is_empty());
        let lines = buffer.push(b"\"token\":\"Hi\"}\n\ndata: [DONE]\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"data: {"type":"token","token":"Hi"}"#);
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "data: [DONE]");
    }

    #[test]
    fn test_line_buffer_strips_crlf() {
        let mut buffer = SseLineBuffer::new();
        let lines = buffer.push(b"data: [DONE]\r\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
    }

    #[test]
    fn test_line_buffer_holds_trailing_partial() {
        let mut buffer = SseLineBuffer::new();
        let lines = buffer.push(b"data: [DO");
        assert!(lines.is_empty());
        let lines = buffer.push(b"NE]\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
    }
}
