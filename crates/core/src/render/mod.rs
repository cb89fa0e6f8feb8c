//! Per-client presentation state and frame composition.

use serde_json::Value;

use crate::transition::Layer;

/// Presentation state owned by one rendering client for the length of a show
/// session. Replaces any process-wide "current theme" or "current volume".
#[derive(Debug, Clone, PartialEq)]
pub struct StageContext {
    pub theme_id: String,
    pub volume: f32,
    pub blackout: bool,
    pending_cues: Vec<CueEvent>,
}

impl StageContext {
    pub fn new(theme_id: impl Into<String>) -> Self {
        Self {
            theme_id: theme_id.into(),
            volume: 1.0,
            blackout: false,
            pending_cues: Vec::new(),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_nan() {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }

    /// Queues a cue for the next composed frame.
    pub fn push_cue(&mut self, cue_type: String, payload: Value, at_ms: u64) {
        self.pending_cues.push(CueEvent {
            cue_type,
            payload,
            at_ms,
        });
    }
}

/// A side-channel effect trigger received from the control side.
#[derive(Debug, Clone, PartialEq)]
pub struct CueEvent {
    pub cue_type: String,
    pub payload: Value,
    pub at_ms: u64,
}

/// One presented frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u64,
    pub at_ms: u64,
    pub timecode_ms: u64,
    /// Scene layers bottom first. Empty while blacked out.
    pub layers: Vec<Layer>,
    pub blackout: bool,
    pub theme_id: String,
    pub volume: f32,
    pub cues: Vec<CueEvent>,
}

impl Frame {
    /// The topmost layer with any opacity.
    pub fn top_layer(&self) -> Option<&Layer> {
        self.layers.iter().rev().find(|layer| layer.alpha > 0.0)
    }
}

/// Turns rendered scene layers and the stage context into presented frames.
#[derive(Debug, Default)]
pub struct Compositor {
    frames: u64,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose(
        &mut self,
        at_ms: u64,
        timecode_ms: u64,
        layers: Vec<Layer>,
        stage: &mut StageContext,
    ) -> Frame {
        self.frames += 1;
        // Scenes keep rendering under a blackout; their output is discarded.
        let layers = if stage.blackout { Vec::new() } else { layers };
        Frame {
            seq: self.frames,
            at_ms,
            timecode_ms,
            layers,
            blackout: stage.blackout,
            theme_id: stage.theme_id.clone(),
            volume: stage.volume,
            cues: std::mem::take(&mut stage.pending_cues),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn layer(id: &str, alpha: f32) -> Layer {
        Layer {
            item_index: 0,
            item_id: id.into(),
            kind: "text".into(),
            alpha,
        }
    }

    #[test]
    fn blackout_hides_layers_but_keeps_stage() {
        let mut compositor = Compositor::new();
        let mut stage = StageContext::new("neon-chalkboard");
        stage.blackout = true;
        stage.set_volume(0.4);
        let frame = compositor.compose(16, 16, vec![layer("a", 1.0)], &mut stage);
        assert!(frame.layers.is_empty());
        assert!(frame.blackout);
        assert_eq!(frame.volume, 0.4);
        assert_eq!(frame.seq, 1);
    }

    #[test]
    fn cues_are_delivered_once() {
        let mut compositor = Compositor::new();
        let mut stage = StageContext::new("neon-chalkboard");
        stage.push_cue("confetti".into(), json!({ "particleCount": 150 }), 10);
        let first = compositor.compose(16, 16, Vec::new(), &mut stage);
        let second = compositor.compose(32, 32, Vec::new(), &mut stage);
        assert_eq!(first.cues.len(), 1);
        assert_eq!(first.cues[0].cue_type, "confetti");
        assert!(second.cues.is_empty());
    }

    #[test]
    fn top_layer_skips_transparent_ones() {
        let mut compositor = Compositor::new();
        let mut stage = StageContext::new("neon-chalkboard");
        let frame = compositor.compose(0, 0, vec![layer("a", 1.0), layer("b", 0.0)], &mut stage);
        assert_eq!(frame.top_layer().map(|l| l.item_id.as_str()), Some("a"));
        stage.set_volume(f32::NAN);
        assert_eq!(stage.volume, 1.0);
    }
}
