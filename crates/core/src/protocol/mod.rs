//! Messages exchanged between the control side and rendering clients.
//!
//! Serialized as JSON objects tagged by `type`, e.g.
//! `{"type":"JUMP","index":2,"epoch":7}`. Epochs are optional on the wire and
//! default to 0.

use serde::{Deserialize, Serialize};

use crate::{scene::Params, timeline::Timeline, Result};

/// Identifies one rendering client connection.
pub type ClientId = u32;

/// Control → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Directive {
    LoadTimeline {
        timeline: Timeline,
        #[serde(default)]
        epoch: u64,
    },
    Play {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default)]
        epoch: u64,
    },
    Pause {},
    /// The show ended: drop every scene instance.
    Stop {},
    Jump {
        index: usize,
        #[serde(default)]
        epoch: u64,
    },
    Skip { delta: i64 },
    Hold { on: bool },
    Blackout { on: bool },
    SetVolume { volume: f32 },
    SetTheme { id: String },
    SetTimecode {
        ms: u64,
        #[serde(default)]
        epoch: u64,
    },
    Cue {
        cue_type: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    UpdateParams { params: Params },
}

impl Directive {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadTimeline { .. } => "LOAD_TIMELINE",
            Self::Play { .. } => "PLAY",
            Self::Pause {} => "PAUSE",
            Self::Stop {} => "STOP",
            Self::Jump { .. } => "JUMP",
            Self::Skip { .. } => "SKIP",
            Self::Hold { .. } => "HOLD",
            Self::Blackout { .. } => "BLACKOUT",
            Self::SetVolume { .. } => "SET_VOLUME",
            Self::SetTheme { .. } => "SET_THEME",
            Self::SetTimecode { .. } => "SET_TIMECODE",
            Self::Cue { .. } => "CUE",
            Self::UpdateParams { .. } => "UPDATE_PARAMS",
        }
    }

    /// Epoch carried by directives that start asynchronous work.
    pub fn epoch(&self) -> Option<u64> {
        match self {
            Self::LoadTimeline { epoch, .. }
            | Self::Play { epoch, .. }
            | Self::Jump { epoch, .. }
            | Self::SetTimecode { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}

/// Client → control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Telemetry {
    Status {
        fps: f64,
        scene_id: Option<String>,
        item_index: Option<usize>,
        timecode_ms: u64,
        next_id: Option<String>,
        #[serde(default)]
        epoch: u64,
    },
    PreloadDone {
        scene_id: String,
        #[serde(default)]
        epoch: u64,
    },
    Error {
        code: String,
        message: String,
        #[serde(default)]
        context: serde_json::Value,
    },
}

impl Telemetry {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "STATUS",
            Self::PreloadDone { .. } => "PRELOAD_DONE",
            Self::Error { .. } => "ERROR",
        }
    }
}

/// Who a directive is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Client(ClientId),
}

/// A directive queued for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipient,
    pub directive: Directive,
}

impl Envelope {
    pub fn broadcast(directive: Directive) -> Self {
        Self {
            to: Recipient::All,
            directive,
        }
    }

    pub fn to_client(client: ClientId, directive: Directive) -> Self {
        Self {
            to: Recipient::Client(client),
            directive,
        }
    }

    pub fn is_for(&self, client: ClientId) -> bool {
        match self.to {
            Recipient::All => true,
            Recipient::Client(id) => id == client,
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_directive(raw: &str) -> Result<Directive> {
    Ok(serde_json::from_str(raw)?)
}

pub fn decode_telemetry(raw: &str) -> Result<Telemetry> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn directives_use_tagged_wire_names() {
        let raw = encode(&Directive::SetTimecode { ms: 1500, epoch: 3 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({ "type": "SET_TIMECODE", "ms": 1500, "epoch": 3 }));

        let raw = encode(&Directive::Pause {}).unwrap();
        assert_eq!(raw, r#"{"type":"PAUSE"}"#);
        assert_eq!(decode_directive(r#"{"type":"STOP"}"#).unwrap(), Directive::Stop {});
    }

    #[test]
    fn missing_epoch_defaults_to_zero() {
        let directive = decode_directive(r#"{ "type": "JUMP", "index": 2 }"#).unwrap();
        assert_eq!(directive, Directive::Jump { index: 2, epoch: 0 });
        assert_eq!(directive.epoch(), Some(0));
        assert_eq!(Directive::Hold { on: true }.epoch(), None);
    }

    #[test]
    fn status_fields_are_camel_case() {
        let status = decode_telemetry(
            r#"{ "type": "STATUS", "fps": 59.5, "sceneId": "intro", "itemIndex": 0,
                 "timecodeMs": 1200, "nextId": "clip" }"#,
        )
        .unwrap();
        assert_eq!(
            status,
            Telemetry::Status {
                fps: 59.5,
                scene_id: Some("intro".into()),
                item_index: Some(0),
                timecode_ms: 1200,
                next_id: Some("clip".into()),
                epoch: 0,
            }
        );
    }

    #[test]
    fn cue_carries_arbitrary_payload() {
        let cue = Directive::Cue {
            cue_type: "confetti".into(),
            payload: json!({ "particleCount": 150 }),
        };
        let raw = encode(&cue).unwrap();
        assert!(raw.contains(r#""cueType":"confetti""#));
        assert_eq!(decode_directive(&raw).unwrap(), cue);
    }

    #[test]
    fn envelopes_address_clients() {
        let env = Envelope::to_client(2, Directive::Pause {});
        assert!(env.is_for(2));
        assert!(!env.is_for(3));
        assert!(Envelope::broadcast(Directive::Pause {}).is_for(3));
    }
}
