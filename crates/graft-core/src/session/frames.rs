//! Session wire protocol: incoming JSON frames.
//!
//! Incoming frames carry `{ "message": "<text>" }`. Anything else (a
//! non-object frame, a missing or empty message) maps to an `error`
//! event; the session stays open either way.

use graft_types::TransformEvent;

/// Parse an incoming frame.
///
/// Returns the user message on success, or the `error` event to send
/// back on a malformed frame.
pub fn parse_incoming_frame(raw: &str) -> Result<String, TransformEvent> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|_| {
        TransformEvent::Error { message: "Invalid JSON frame".into() }
    })?;

    let obj = value.as_object().ok_or_else(|| TransformEvent::Error {
        message: "Frame must be a JSON object".into(),
    })?;

    let message = obj
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();

    if message.is_empty() {
        return Err(TransformEvent::Error { message: "Empty message".into() });
    }

    Ok(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_frame_yields_message() {
        assert_eq!(
            parse_incoming_frame(r#"{"message": "count the accounts"}"#).unwrap(),
            "count the accounts"
        );
    }

    #[test]
    fn message_is_trimmed() {
        assert_eq!(parse_incoming_frame(r#"{"message": "  hi  "}"#).unwrap(), "hi");
    }

    #[test]
    fn invalid_json_is_an_error_event() {
        let err = parse_incoming_frame("not json").unwrap_err();
        match err {
            TransformEvent::Error { message } => assert_eq!(message, "Invalid JSON frame"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn non_object_frame_rejected() {
        assert!(parse_incoming_frame("[1, 2]").is_err());
        assert!(parse_incoming_frame("\"just a string\"").is_err());
    }

    #[test]
    fn empty_or_missing_message_rejected() {
        assert!(parse_incoming_frame(r#"{"message": ""}"#).is_err());
        assert!(parse_incoming_frame(r#"{"message": "   "}"#).is_err());
        assert!(parse_incoming_frame(r#"{"other": "x"}"#).is_err());
        assert!(parse_incoming_frame(r#"{"message": 42}"#).is_err());
    }
}
