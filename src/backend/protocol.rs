//! Wire protocol for the remote transcription backend.
//!
//! Newline-delimited JSON over TCP, tagged with a `type` field. PCM
//! audio travels base64-encoded as little-endian 16-bit samples.

use crate::error::{Result, VoxdError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Messages sent to the transcription server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartSession {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        vocabulary: Vec<String>,
        #[serde(default)]
        free_speak: bool,
    },
    Audio {
        pcm: String,
    },
    /// No more audio follows; the server must answer with `final`.
    Flush,
    /// Drop the session without a final transcript.
    Abort,
}

/// Messages received from the transcription server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Started {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Partial {
        text: String,
    },
    Final {
        text: String,
    },
    Error {
        message: String,
    },
}

/// Encode PCM samples for an `audio` message.
pub fn encode_pcm(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Decode the PCM payload of an `audio` message.
pub fn decode_pcm(encoded: &str) -> Result<Vec<i16>> {
    let bytes = BASE64.decode(encoded).map_err(|e| VoxdError::Transport {
        message: format!("invalid base64 audio payload: {}", e),
    })?;
    if bytes.len() % 2 != 0 {
        return Err(VoxdError::Transport {
            message: format!("audio payload has odd length {}", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Serialize a message as one JSON line.
pub fn to_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message).map_err(|e| VoxdError::Transport {
        message: format!("failed to serialize message: {}", e),
    })?;
    line.push('\n');
    Ok(line)
}

/// Parse one JSON line from the server.
pub fn parse_server_line(line: &str) -> Result<ServerMessage> {
    serde_json::from_str(line.trim()).map_err(|e| VoxdError::Transport {
        message: format!("malformed server message: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_session_serializes_with_type_tag() {
        let msg = ClientMessage::StartSession {
            language: "en".to_string(),
            prompt: None,
            vocabulary: Vec::new(),
            free_speak: false,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"start_session\""));
        assert!(json.contains("\"language\":\"en\""));
        assert!(!json.contains("prompt"));
        assert!(!json.contains("vocabulary"));
    }

    #[test]
    fn flush_and_abort_are_bare_tags() {
        assert_eq!(
            serde_json::to_string(&ClientMessage::Flush).unwrap(),
            "{\"type\":\"flush\"}"
        );
        assert_eq!(
            serde_json::to_string(&ClientMessage::Abort).unwrap(),
            "{\"type\":\"abort\"}"
        );
    }

    #[test]
    fn server_messages_roundtrip() {
        let messages = vec![
            ServerMessage::Started {
                ok: true,
                message: None,
            },
            ServerMessage::Started {
                ok: false,
                message: Some("model loading".to_string()),
            },
            ServerMessage::Partial {
                text: "hel".to_string(),
            },
            ServerMessage::Final {
                text: "hello world".to_string(),
            },
            ServerMessage::Error {
                message: "inference failed".to_string(),
            },
        ];
        for msg in messages {
            let line = to_line(&msg).unwrap();
            assert!(line.ends_with('\n'));
            assert_eq!(parse_server_line(&line).unwrap(), msg);
        }
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(parse_server_line("not json").is_err());
        assert!(parse_server_line("{\"type\":\"unknown_kind\"}").is_err());
        assert!(parse_server_line("{}").is_err());
    }

    #[test]
    fn pcm_roundtrip_preserves_samples() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345, -12345];
        let encoded = encode_pcm(&samples);
        assert_eq!(decode_pcm(&encoded).unwrap(), samples);
    }

    #[test]
    fn pcm_empty_payload() {
        assert_eq!(decode_pcm(&encode_pcm(&[])).unwrap(), Vec::<i16>::new());
    }

    #[test]
    fn pcm_rejects_bad_base64() {
        assert!(decode_pcm("!!!not base64!!!").is_err());
    }

    #[test]
    fn pcm_rejects_odd_byte_count() {
        let encoded = BASE64.encode([0u8, 1, 2]);
        match decode_pcm(&encoded) {
            Err(VoxdError::Transport { message }) => {
                assert!(message.contains("odd length"));
            }
            other => panic!("expected Transport error, got {:?}", other),
        }
    }

    #[test]
    fn audio_message_carries_pcm() {
        let msg = ClientMessage::Audio {
            pcm: encode_pcm(&[100, -100]),
        };
        let line = to_line(&msg).unwrap();
        let parsed: ClientMessage = serde_json::from_str(line.trim()).unwrap();
        match parsed {
            ClientMessage::Audio { pcm } => {
                assert_eq!(decode_pcm(&pcm).unwrap(), vec![100, -100]);
            }
            other => panic!("expected audio message, got {:?}", other),
        }
    }
}
