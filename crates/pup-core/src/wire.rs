//! Wire contract between the console and the trainer device.
//!
//! Outbound frames are JSON objects with a `cmd` discriminator. Inbound
//! frames are either structured event envelopes
//! (`{"type":"event","event":...,"timestamp":...,"payload":{...}}`) or
//! free-text diagnostics; anything that does not match the envelope shape
//! decodes to [`DeviceMessage::Unstructured`], never to an error.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    Manual,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::Manual => "manual",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "auto" => Ok(Mode::Auto),
            "manual" => Ok(Mode::Manual),
            other => Err(format!("Unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServoAction {
    Sweep,
}

impl ServoAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServoAction::Sweep => "sweep",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverrideMode {
    Enable,
    Disable,
}

impl OverrideMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OverrideMode::Enable => "enable",
            OverrideMode::Disable => "disable",
        }
    }
}

/// Operator intent, one frame per variant. `Speak` and `PlayAudio` share
/// the device's `audio` command and are distinguished by their fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetMode { mode: Mode },
    TreatNow,
    Servo { action: ServoAction },
    Speak { text: String },
    PlayAudio { b64: String, filename: String },
    OverrideTreat { mode: OverrideMode },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("speak text is empty")]
    EmptyText,
    #[error("audio payload is empty")]
    EmptyAudio,
}

impl Command {
    /// Short name used in activity-log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Command::SetMode { .. } => "set_mode",
            Command::TreatNow => "treat_now",
            Command::Servo { .. } => "servo",
            Command::Speak { .. } => "speak",
            Command::PlayAudio { .. } => "play_audio",
            Command::OverrideTreat { .. } => "override_treat",
        }
    }

    /// Precondition check applied before a frame is handed to the
    /// transport. Encoding itself cannot fail.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Command::Speak { text } if text.trim().is_empty() => Err(CommandError::EmptyText),
            Command::PlayAudio { b64, .. } if b64.is_empty() => Err(CommandError::EmptyAudio),
            _ => Ok(()),
        }
    }

    /// Serializes the command into its wire frame. Total over the variant
    /// set; the device ignores fields it does not know.
    pub fn encode(&self) -> String {
        let frame = match self {
            Command::SetMode { mode } => json!({"cmd": "set_mode", "mode": mode.as_str()}),
            Command::TreatNow => json!({"cmd": "treat_now"}),
            Command::Servo { action } => json!({"cmd": "servo", "action": action.as_str()}),
            Command::Speak { text } => json!({"cmd": "audio", "text": text}),
            Command::PlayAudio { b64, filename } => {
                json!({"cmd": "audio", "b64": b64, "filename": filename})
            }
            Command::OverrideTreat { mode } => {
                json!({"cmd": "override_treat", "mode": mode.as_str()})
            }
        };
        frame.to_string()
    }
}

/// Registration frame the mediator expects once per connection so it routes
/// device events to this client.
pub fn register_message(name: &str) -> String {
    json!({"type": "register", "role": "ui", "name": name}).to_string()
}

/// Structured inbound notification. Unknown event names are carried as-is;
/// payload fields are all optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl EventEnvelope {
    pub fn event_kind(&self) -> EventKind {
        EventKind::parse(&self.name)
    }

    /// String payload field, absent when missing or not a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }
}

/// Known event names plus a catch-all so new device events never error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CommandSuccess,
    TreatGiven,
    ModeChanged,
    PoseTransition,
    ServoAction,
    AudioPlayback,
    TreatOverride,
    Other,
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "command_success" => EventKind::CommandSuccess,
            "treat_given" => EventKind::TreatGiven,
            "mode_changed" => EventKind::ModeChanged,
            "pose_transition" => EventKind::PoseTransition,
            "servo_action" => EventKind::ServoAction,
            "audio_playback" => EventKind::AudioPlayback,
            "treat_override" => EventKind::TreatOverride,
            _ => EventKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    Event(EventEnvelope),
    Unstructured(String),
}

/// Decodes one inbound text frame. Parse failures and wrong-shape JSON are
/// normal outcomes, not errors: the device mixes diagnostic text into the
/// same channel as its event envelopes.
pub fn decode_message(raw: &str) -> DeviceMessage {
    match serde_json::from_str::<EventEnvelope>(raw) {
        Ok(envelope) if envelope.kind == "event" && !envelope.name.is_empty() => {
            DeviceMessage::Event(envelope)
        }
        _ => DeviceMessage::Unstructured(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_envelope() -> EventEnvelope {
        let raw = r#"{
            "type": "event",
            "event": "command_success",
            "timestamp": 1700000000.5,
            "payload": {"target_pose": "sit", "command_text": "sit", "filename": null}
        }"#;
        match decode_message(raw) {
            DeviceMessage::Event(envelope) => envelope,
            DeviceMessage::Unstructured(text) => panic!("expected event, got raw: {text}"),
        }
    }

    #[test]
    fn set_mode_encodes_verbatim() {
        let frame = Command::SetMode { mode: Mode::Auto }.encode();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"cmd": "set_mode", "mode": "auto"}));
    }

    #[test]
    fn treat_now_and_servo_encode_expected_frames() {
        let treat: Value = serde_json::from_str(&Command::TreatNow.encode()).unwrap();
        assert_eq!(treat, json!({"cmd": "treat_now"}));

        let servo: Value = serde_json::from_str(
            &Command::Servo {
                action: ServoAction::Sweep,
            }
            .encode(),
        )
        .unwrap();
        assert_eq!(servo, json!({"cmd": "servo", "action": "sweep"}));
    }

    #[test]
    fn speak_and_play_audio_share_the_audio_command() {
        let speak: Value = serde_json::from_str(
            &Command::Speak {
                text: "sit".to_string(),
            }
            .encode(),
        )
        .unwrap();
        assert_eq!(speak, json!({"cmd": "audio", "text": "sit"}));

        let clip: Value = serde_json::from_str(
            &Command::PlayAudio {
                b64: "UklGRg==".to_string(),
                filename: "sit.wav".to_string(),
            }
            .encode(),
        )
        .unwrap();
        assert_eq!(
            clip,
            json!({"cmd": "audio", "b64": "UklGRg==", "filename": "sit.wav"})
        );
    }

    #[test]
    fn override_treat_encodes_mode() {
        let frame: Value = serde_json::from_str(
            &Command::OverrideTreat {
                mode: OverrideMode::Disable,
            }
            .encode(),
        )
        .unwrap();
        assert_eq!(frame, json!({"cmd": "override_treat", "mode": "disable"}));
    }

    #[test]
    fn register_message_matches_mediator_shape() {
        let value: Value = serde_json::from_str(&register_message("pup-console-1")).unwrap();
        assert_eq!(
            value,
            json!({"type": "register", "role": "ui", "name": "pup-console-1"})
        );
    }

    #[test]
    fn empty_speak_and_audio_fail_validation() {
        let speak = Command::Speak {
            text: "   ".to_string(),
        };
        assert_eq!(speak.validate(), Err(CommandError::EmptyText));

        let clip = Command::PlayAudio {
            b64: String::new(),
            filename: "clip.wav".to_string(),
        };
        assert_eq!(clip.validate(), Err(CommandError::EmptyAudio));

        assert_eq!(Command::TreatNow.validate(), Ok(()));
    }

    #[test]
    fn decode_event_envelope() {
        let envelope = success_envelope();
        assert_eq!(envelope.event_kind(), EventKind::CommandSuccess);
        assert_eq!(envelope.payload_str("target_pose"), Some("sit"));
        // null payload fields read as absent
        assert_eq!(envelope.payload_str("filename"), None);
        assert_eq!(envelope.timestamp, 1_700_000_000.5);
    }

    #[test]
    fn decode_invalid_json_yields_unstructured() {
        let raw = "{ not json";
        match decode_message(raw) {
            DeviceMessage::Unstructured(text) => assert_eq!(text, raw),
            DeviceMessage::Event(envelope) => panic!("unexpected event: {envelope:?}"),
        }
    }

    #[test]
    fn decode_wrong_shape_yields_unstructured() {
        let raw = r#"{"type":"weather","data":1}"#;
        match decode_message(raw) {
            DeviceMessage::Unstructured(text) => assert_eq!(text, raw),
            DeviceMessage::Event(envelope) => panic!("unexpected event: {envelope:?}"),
        }
    }

    #[test]
    fn decode_missing_timestamp_and_payload_defaults() {
        let raw = r#"{"type":"event","event":"servo_action"}"#;
        match decode_message(raw) {
            DeviceMessage::Event(envelope) => {
                assert_eq!(envelope.event_kind(), EventKind::ServoAction);
                assert_eq!(envelope.timestamp, 0.0);
                assert!(envelope.payload.is_empty());
            }
            DeviceMessage::Unstructured(text) => panic!("expected event, got raw: {text}"),
        }
    }

    #[test]
    fn unknown_event_names_parse_as_other() {
        let raw = r#"{"type":"event","event":"battery_low","payload":{"level":11}}"#;
        match decode_message(raw) {
            DeviceMessage::Event(envelope) => {
                assert_eq!(envelope.event_kind(), EventKind::Other);
                assert_eq!(envelope.payload_f64("level"), Some(11.0));
            }
            DeviceMessage::Unstructured(text) => panic!("expected event, got raw: {text}"),
        }
    }
}
