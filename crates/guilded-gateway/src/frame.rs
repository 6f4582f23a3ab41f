//! The wire envelope and its two codecs.
//!
//! Guilded has two gateway protocols:
//!
//! - The **bot** protocol ([`BotCodec`]): every frame is a JSON envelope
//!   `{op, t, d, s}` with a numeric opcode. Heartbeats ride on websocket
//!   ping/pong control frames.
//! - The **legacy** protocol ([`LegacyCodec`]): socket.io-style frames where
//!   a run of leading ASCII digits multiplexes the message type. A frame of
//!   only digits is a bare heartbeat/ack; otherwise the digits are stripped
//!   and the remainder is JSON, usually a 2-element `[tag, payload]` array.
//!   Heartbeats are the literal `"2"` and outbound dispatches are prefixed
//!   with `"42"`.
//!
//! Everything past this module is variant-agnostic: both codecs produce the
//! same [`Frame`] values.

use serde_json::Value;
use thiserror::Error;

use crate::payload::Welcome;

/// Opcodes of the bot protocol envelope.
pub mod opcode {
    /// A dispatch that can be missed and replayed; carries `t`, `d`, `s`.
    pub const MISSABLE: u64 = 0;
    /// Sent on (re)connect; carries the heartbeat interval and cursor.
    pub const WELCOME: u64 = 1;
    /// All missed messages have been replayed after a resume.
    pub const RESUMED: u64 = 2;
    /// The resume cursor the client presented was rejected.
    pub const INVALID_CURSOR: u64 = 8;
    /// Guilded had an internal error handling the connection.
    pub const INTERNAL_ERROR: u64 = 9;
}

/// A decoded gateway frame.
///
/// Immutable once decoded; the connection only retains the sequence marker
/// of [`Frame::Dispatch`], folded into its resume cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The handshake hello from either protocol, normalized.
    Welcome(Welcome),
    /// A named event with payload.
    Dispatch {
        /// Wire event-type tag (`ChatMessageCreated`, ...). Empty when the
        /// frame carried none.
        name: String,
        /// Resume sequence marker, bot protocol only.
        seq: Option<String>,
        /// Raw event payload.
        payload: Value,
    },
    /// Missed-message replay finished after a resume.
    Resumed,
    /// A heartbeat acknowledgement (legacy digit-only frame).
    HeartbeatAck,
    /// The presented resume cursor was rejected.
    InvalidCursor {
        /// Server-provided explanation.
        message: String,
    },
    /// The server reported an internal error.
    InternalError {
        /// Server-provided explanation.
        message: String,
    },
}

/// Errors produced while decoding a frame.
///
/// All of these are non-fatal: the connection logs and drops the frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame body was not valid JSON.
    #[error("malformed frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope carried an opcode this library does not know.
    #[error("unknown opcode {op}")]
    UnknownOpcode {
        /// The offending opcode.
        op: u64,
    },

    /// The envelope was valid JSON but not the expected shape.
    #[error("unexpected frame shape: {0}")]
    Shape(&'static str),
}

/// What a codec asks the socket to transmit.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// A text frame.
    Text(String),
    /// A websocket ping control frame (bot-protocol heartbeat).
    Ping,
}

/// Bidirectional translation between raw text frames and [`Frame`] values.
///
/// One implementation per protocol variant; the connection picks the codec
/// at construction and the rest of the pipeline never branches on variant.
pub trait FrameCodec: Send + Sync {
    /// Decodes one inbound text frame.
    fn decode(&self, raw: &str) -> Result<Frame, CodecError>;

    /// The keep-alive frame the heartbeat driver sends.
    fn encode_heartbeat(&self) -> OutboundFrame;

    /// Encodes an outbound dispatch.
    fn encode_dispatch(&self, name: &str, payload: &Value) -> Result<OutboundFrame, CodecError>;
}

// ===========================================================================
// Bot protocol
// ===========================================================================

/// Codec for the bot-account protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotCodec;

impl FrameCodec for BotCodec {
    fn decode(&self, raw: &str) -> Result<Frame, CodecError> {
        let envelope: Value = serde_json::from_str(raw)?;
        let op = envelope
            .get("op")
            .and_then(Value::as_u64)
            .ok_or(CodecError::Shape("missing numeric `op`"))?;

        match op {
            opcode::WELCOME => {
                let data = envelope.get("d").cloned().unwrap_or(Value::Null);
                Ok(Frame::Welcome(Welcome::from_bot_hello(data)?))
            }
            opcode::MISSABLE => {
                let name = envelope
                    .get("t")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                // Strings as sent today, but accept a numeric marker too.
                let seq = envelope.get("s").and_then(|s| match s {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
                let payload = envelope.get("d").cloned().unwrap_or(Value::Null);
                Ok(Frame::Dispatch { name, seq, payload })
            }
            opcode::RESUMED => Ok(Frame::Resumed),
            opcode::INVALID_CURSOR => Ok(Frame::InvalidCursor {
                message: envelope_message(&envelope),
            }),
            opcode::INTERNAL_ERROR => Ok(Frame::InternalError {
                message: envelope_message(&envelope),
            }),
            other => Err(CodecError::UnknownOpcode { op: other }),
        }
    }

    fn encode_heartbeat(&self) -> OutboundFrame {
        OutboundFrame::Ping
    }

    fn encode_dispatch(&self, _name: &str, payload: &Value) -> Result<OutboundFrame, CodecError> {
        Ok(OutboundFrame::Text(serde_json::to_string(payload)?))
    }
}

fn envelope_message(envelope: &Value) -> String {
    envelope
        .get("d")
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ===========================================================================
// Legacy protocol
// ===========================================================================

/// Heartbeat literal of the legacy protocol.
const LEGACY_HEARTBEAT: &str = "2";
/// Outbound dispatch prefix of the legacy protocol.
const LEGACY_DISPATCH_PREFIX: &str = "42";

/// Codec for the legacy userbot protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

/// Strips the leading run of ASCII digits that multiplexes legacy frames.
///
/// Idempotent: stripping an already-stripped string is a no-op, since the
/// remainder never starts with a digit (JSON bodies start with `{`, `[`,
/// or `"`).
pub fn strip_digit_prefix(raw: &str) -> &str {
    raw.trim_start_matches(|c: char| c.is_ascii_digit())
}

impl FrameCodec for LegacyCodec {
    fn decode(&self, raw: &str) -> Result<Frame, CodecError> {
        let body = strip_digit_prefix(raw);
        if body.is_empty() {
            // A frame of only digits is a bare heartbeat/ack.
            return Ok(Frame::HeartbeatAck);
        }

        let value: Value = serde_json::from_str(body)?;
        match value {
            Value::Array(mut items) if items.len() == 2 => {
                let payload = items.pop().unwrap_or(Value::Null);
                let tag = items.pop().unwrap_or(Value::Null);
                let name = tag.as_str().unwrap_or_default().to_string();
                Ok(Frame::Dispatch {
                    name,
                    seq: None,
                    payload,
                })
            }
            Value::Object(mut map) => {
                if map.contains_key("sid") || map.contains_key("pingInterval") {
                    return Ok(Frame::Welcome(Welcome::from_legacy_hello(Value::Object(
                        map,
                    ))?));
                }
                // Bare object: its `type` key, if present, is the tag.
                let name = match map.remove("type") {
                    Some(Value::String(tag)) => tag,
                    _ => String::new(),
                };
                Ok(Frame::Dispatch {
                    name,
                    seq: None,
                    payload: Value::Object(map),
                })
            }
            _ => Err(CodecError::Shape("expected array or object body")),
        }
    }

    fn encode_heartbeat(&self) -> OutboundFrame {
        OutboundFrame::Text(LEGACY_HEARTBEAT.to_string())
    }

    fn encode_dispatch(&self, name: &str, payload: &Value) -> Result<OutboundFrame, CodecError> {
        let body = serde_json::to_string(&serde_json::json!([name, payload]))?;
        Ok(OutboundFrame::Text(format!(
            "{LEGACY_DISPATCH_PREFIX}{body}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_digit_prefix_idempotent() {
        let raw = r#"42["ChatMessageCreated",{"channelId":"C1"}]"#;
        let once = strip_digit_prefix(raw);
        let twice = strip_digit_prefix(once);
        assert_eq!(once, r#"["ChatMessageCreated",{"channelId":"C1"}]"#);
        assert_eq!(once, twice);

        let codec = LegacyCodec;
        assert_eq!(codec.decode(raw).unwrap(), codec.decode(raw).unwrap());
    }

    #[test]
    fn test_legacy_digit_only_frame_is_ack() {
        let codec = LegacyCodec;
        assert_eq!(codec.decode("3").unwrap(), Frame::HeartbeatAck);
        assert_eq!(codec.decode("40").unwrap(), Frame::HeartbeatAck);
    }

    #[test]
    fn test_legacy_hello() {
        let codec = LegacyCodec;
        let frame = codec
            .decode(r#"0{"sid":"abc123","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#)
            .unwrap();
        match frame {
            Frame::Welcome(welcome) => {
                assert_eq!(welcome.session_id.as_deref(), Some("abc123"));
                // 25000 ms on the wire, seconds internally.
                assert_eq!(welcome.heartbeat_interval.as_secs_f64(), 25.0);
            }
            other => panic!("expected welcome, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_bare_object_pops_type() {
        let codec = LegacyCodec;
        let frame = codec
            .decode(r#"{"type":"ChatChannelTyping","channelId":"C1","userId":"U1"}"#)
            .unwrap();
        match frame {
            Frame::Dispatch { name, payload, .. } => {
                assert_eq!(name, "ChatChannelTyping");
                assert!(payload.get("type").is_none());
                assert_eq!(payload["channelId"], "C1");
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_encode() {
        let codec = LegacyCodec;
        assert_eq!(
            codec.encode_heartbeat(),
            OutboundFrame::Text("2".to_string())
        );
        let out = codec
            .encode_dispatch("ChatMessageCreated", &serde_json::json!({"content": "hi"}))
            .unwrap();
        match out {
            OutboundFrame::Text(text) => assert!(text.starts_with("42[")),
            OutboundFrame::Ping => panic!("legacy heartbeat must be a text frame"),
        }
    }

    #[test]
    fn test_bot_welcome() {
        let codec = BotCodec;
        let frame = codec
            .decode(r#"{"op":1,"d":{"heartbeatIntervalMs":22500,"lastMessageId":"abc","user":{"id":"U0","name":"bot"}}}"#)
            .unwrap();
        match frame {
            Frame::Welcome(welcome) => {
                assert_eq!(welcome.last_message_id.as_deref(), Some("abc"));
                assert_eq!(welcome.heartbeat_interval.as_millis(), 22500);
                assert_eq!(welcome.user.as_ref().unwrap().id, "U0");
            }
            other => panic!("expected welcome, got {other:?}"),
        }
    }

    #[test]
    fn test_bot_dispatch_carries_seq_and_tag() {
        let codec = BotCodec;
        let frame = codec
            .decode(r#"{"op":0,"s":"7","t":"ChatMessageCreated","d":{"serverId":"S1"}}"#)
            .unwrap();
        assert_eq!(
            frame,
            Frame::Dispatch {
                name: "ChatMessageCreated".to_string(),
                seq: Some("7".to_string()),
                payload: serde_json::json!({"serverId": "S1"}),
            }
        );
    }

    #[test]
    fn test_bot_numeric_seq_becomes_cursor_text() {
        let codec = BotCodec;
        let frame = codec
            .decode(r#"{"op":0,"s":7,"t":"ChatMessageCreated","d":{}}"#)
            .unwrap();
        match frame {
            Frame::Dispatch { seq, .. } => assert_eq!(seq.as_deref(), Some("7")),
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn test_bot_unknown_opcode_is_an_error_not_a_panic() {
        let codec = BotCodec;
        assert!(matches!(
            codec.decode(r#"{"op":5,"d":{}}"#),
            Err(CodecError::UnknownOpcode { op: 5 })
        ));
    }

    #[test]
    fn test_malformed_json_is_reported() {
        assert!(BotCodec.decode("{not json").is_err());
        assert!(LegacyCodec.decode("42[broken").is_err());
    }
}
