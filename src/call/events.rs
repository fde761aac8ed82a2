//! Control-channel server events and the typed call event bus payloads.

use serde_json::Value;

use super::status::ConnectionStatus;
use crate::types::{Participant, SpeakingEvent, UsageReportOutcome};

/// Server events received on the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    AudioDelta,
    AudioTranscriptDelta { delta: String },
    ContentPartAdded,
    AudioTranscriptDone { transcript: String },
    AudioDone,
    ResponseDone { transcript: Option<String> },
    Error { message: String },
    Unknown { event_type: String },
}

/// Speaking cue a server event carries for the remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechCue {
    Start,
    Stop,
}

impl ServerEvent {
    /// Decode a raw channel message. Returns `None` for anything that is not
    /// a JSON object with a string `type`.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = serde_json::from_str::<Value>(raw).ok()?;
        Self::from_server_payload(&value)
    }

    /// Map a decoded payload onto a typed event.
    pub fn from_server_payload(payload: &Value) -> Option<Self> {
        let event_type = payload.get("type")?.as_str()?;
        match event_type {
            "response.audio.delta" => Some(Self::AudioDelta),
            "response.audio_transcript.delta" => Some(Self::AudioTranscriptDelta {
                delta: string_field(payload, "delta").unwrap_or_default(),
            }),
            "response.content_part.added" => Some(Self::ContentPartAdded),
            "response.audio_transcript.done" => Some(Self::AudioTranscriptDone {
                transcript: string_field(payload, "transcript").unwrap_or_default(),
            }),
            "response.audio.done" => Some(Self::AudioDone),
            "response.done" => Some(Self::ResponseDone {
                transcript: first_output_transcript(payload),
            }),
            "error" => Some(Self::Error {
                message: string_at(payload, &["error", "message"])
                    .or_else(|| string_field(payload, "message"))
                    .unwrap_or_else(|| "Realtime server error".to_string()),
            }),
            _ => Some(Self::Unknown {
                event_type: event_type.to_string(),
            }),
        }
    }

    pub fn speech_cue(&self) -> Option<SpeechCue> {
        match self {
            Self::AudioDelta | Self::AudioTranscriptDelta { .. } | Self::ContentPartAdded => {
                Some(SpeechCue::Start)
            }
            Self::ResponseDone { .. } | Self::AudioTranscriptDone { .. } | Self::AudioDone => {
                Some(SpeechCue::Stop)
            }
            Self::Error { .. } | Self::Unknown { .. } => None,
        }
    }
}

/// Typed notifications published on the controller's event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    StatusChanged(ConnectionStatus),
    Speaking(SpeakingEvent),
    UsageReported {
        participant: Participant,
        seconds: u64,
        outcome: UsageReportOutcome,
    },
    /// The balance is exhausted; the UI should offer a top-up.
    BalanceDepleted,
    TranscriptUpdated(String),
    AiResponseUpdated(String),
    ChannelError(String),
}

fn first_output_transcript(payload: &Value) -> Option<String> {
    payload
        .get("response")?
        .get("output")?
        .get(0)?
        .get("content")?
        .get(0)?
        .get("transcript")?
        .as_str()
        .map(ToString::to_string)
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str().map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn start_and_stop_cues_cover_all_signaling_types() {
        let starts = [
            r#"{"type":"response.audio.delta","delta":"AAAA"}"#,
            r#"{"type":"response.audio_transcript.delta","delta":"Hai"}"#,
            r#"{"type":"response.content_part.added"}"#,
        ];
        let stops = [
            r#"{"type":"response.done","response":{}}"#,
            r#"{"type":"response.audio_transcript.done","transcript":"Hai"}"#,
            r#"{"type":"response.audio.done"}"#,
        ];
        for raw in starts {
            assert_eq!(ServerEvent::parse(raw).unwrap().speech_cue(), Some(SpeechCue::Start));
        }
        for raw in stops {
            assert_eq!(ServerEvent::parse(raw).unwrap().speech_cue(), Some(SpeechCue::Stop));
        }
    }

    #[test]
    fn response_done_extracts_first_transcript() {
        let raw = r#"{"type":"response.done","response":{"output":[
            {"content":[{"transcript":"Halo, apa kabar?"}]}
        ]}}"#;
        assert_eq!(
            ServerEvent::parse(raw),
            Some(ServerEvent::ResponseDone {
                transcript: Some("Halo, apa kabar?".into())
            })
        );
    }

    #[test]
    fn malformed_messages_are_not_events() {
        assert_eq!(ServerEvent::parse("not json"), None);
        assert_eq!(ServerEvent::parse(r#"{"no_type":true}"#), None);
        assert_eq!(ServerEvent::parse(r#"{"type":42}"#), None);
    }

    #[test]
    fn unrelated_types_are_unknown_without_cue() {
        let event =
            ServerEvent::parse(r#"{"type":"session.created","session":{"id":"s"}}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Unknown {
                event_type: "session.created".into()
            }
        );
        assert_eq!(event.speech_cue(), None);
    }

    #[test]
    fn error_message_prefers_nested_field() {
        let event =
            ServerEvent::parse(r#"{"type":"error","error":{"message":"rate limited"}}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Error {
                message: "rate limited".into()
            }
        );
    }
}
