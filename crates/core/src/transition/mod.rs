//! Blending between the outgoing and incoming scene during an item change.
//!
//! Both scenes render every frame for the length of the blend. Once the blend
//! weight reaches 1 the outgoing scene is cleaned up and dropped, so at most one
//! [`TransitionState`] exists at a time.

mod ease;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{CommandError, SceneError},
    scene::{FrameContext, Scene},
};

pub use ease::Ease;

/// Blend length used when a non-cut spec carries no duration.
pub const DEFAULT_TRANSITION_MS: u64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Cut,
    /// Sequential: outgoing fades out over the first half, incoming fades in
    /// over the second half.
    Fade,
    /// Simultaneous crossfade.
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSpec {
    pub kind: TransitionKind,
    pub duration_ms: u64,
}

impl TransitionSpec {
    pub const CUT: Self = Self {
        kind: TransitionKind::Cut,
        duration_ms: 0,
    };

    /// Parses a `"kind"` or `"kind:ms"` spec. `explicit_ms` overrides the
    /// embedded duration.
    pub fn parse(spec: &str, explicit_ms: Option<u64>) -> Result<Self, CommandError> {
        let invalid = || CommandError::InvalidTransitionSpec(spec.to_string());
        let trimmed = spec.trim();
        let (kind, ms) = match trimmed.split_once(':') {
            Some((kind, ms)) => (kind, Some(ms.trim().parse::<u64>().map_err(|_| invalid())?)),
            None => (trimmed, None),
        };

        let kind = match kind.trim().to_ascii_lowercase().as_str() {
            "cut" => TransitionKind::Cut,
            "fade" => TransitionKind::Fade,
            "cross" | "crossfade" => TransitionKind::Cross,
            _ => return Err(invalid()),
        };

        let duration_ms = match kind {
            TransitionKind::Cut => 0,
            _ => explicit_ms.or(ms).unwrap_or(DEFAULT_TRANSITION_MS),
        };
        Ok(Self { kind, duration_ms })
    }

    pub fn is_instant(&self) -> bool {
        self.kind == TransitionKind::Cut || self.duration_ms == 0
    }
}

impl fmt::Display for TransitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransitionKind::Cut => f.write_str("cut"),
            TransitionKind::Fade => write!(f, "fade:{}", self.duration_ms),
            TransitionKind::Cross => write!(f, "cross:{}", self.duration_ms),
        }
    }
}

/// Returns `(outgoing_alpha, incoming_alpha)` for an already eased weight.
pub fn blend_alphas(kind: TransitionKind, weight: f64) -> (f32, f32) {
    let w = weight.clamp(0.0, 1.0);
    let (out, inc) = match kind {
        TransitionKind::Cut => (0.0, 1.0),
        TransitionKind::Fade => (1.0 - (2.0 * w).min(1.0), (2.0 * w - 1.0).max(0.0)),
        TransitionKind::Cross => (1.0 - w, w),
    };
    (out as f32, inc as f32)
}

/// A scene instance bound to the timeline item it displays.
pub struct ActiveScene {
    pub item_index: usize,
    pub item_id: String,
    pub scene: Box<dyn Scene>,
    /// Instant the scene first went on screen.
    pub shown_at_ms: u64,
}

impl ActiveScene {
    pub fn new(item_index: usize, item_id: impl Into<String>, scene: Box<dyn Scene>) -> Self {
        Self {
            item_index,
            item_id: item_id.into(),
            scene,
            shown_at_ms: 0,
        }
    }

    fn destroy(mut self) {
        tracing::debug!(item = %self.item_id, "destroying scene instance");
        self.scene.cleanup();
    }
}

impl fmt::Debug for ActiveScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveScene")
            .field("item_index", &self.item_index)
            .field("item_id", &self.item_id)
            .field("kind", &self.scene.kind())
            .finish()
    }
}

/// The blend currently in flight.
#[derive(Debug)]
pub struct TransitionState {
    pub spec: TransitionSpec,
    pub started_ms: u64,
    pub outgoing: ActiveScene,
    pub incoming: ActiveScene,
}

impl TransitionState {
    fn weight(&self, ease: Ease, now_ms: u64) -> f64 {
        ease.weight(now_ms.saturating_sub(self.started_ms), self.spec.duration_ms)
    }
}

/// One composited layer of a rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub item_index: usize,
    pub item_id: String,
    pub kind: String,
    pub alpha: f32,
}

/// A scene raised an error while rendering. The scene has already been
/// removed from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFault {
    pub item_index: usize,
    pub item_id: String,
    pub error: SceneError,
}

/// Which half of a blend a render fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Outgoing,
    Incoming,
}

#[derive(Default)]
enum Stage {
    #[default]
    Empty,
    Steady(ActiveScene),
    Blending(TransitionState),
}

/// Owns the on-screen scene instances and drives blends between them.
pub struct TransitionEngine {
    ease: Ease,
    stage: Stage,
}

impl TransitionEngine {
    pub fn new(ease: Ease) -> Self {
        Self {
            ease,
            stage: Stage::Empty,
        }
    }

    /// Puts `incoming` on screen. A cut (or an empty stage) swaps
    /// immediately; otherwise a blend starts at `now_ms`. Interrupting a blend
    /// keeps whichever scene is currently more visible as the outgoing one and
    /// destroys the other.
    pub fn begin(&mut self, mut incoming: ActiveScene, spec: TransitionSpec, now_ms: u64) {
        incoming.shown_at_ms = now_ms;
        let outgoing = match std::mem::take(&mut self.stage) {
            Stage::Empty => None,
            Stage::Steady(current) => Some(current),
            Stage::Blending(state) => {
                let weight = state.weight(self.ease, now_ms);
                let (out_alpha, in_alpha) = blend_alphas(state.spec.kind, weight);
                if in_alpha > out_alpha {
                    state.outgoing.destroy();
                    Some(state.incoming)
                } else {
                    state.incoming.destroy();
                    Some(state.outgoing)
                }
            }
        };

        match outgoing {
            Some(outgoing) if !spec.is_instant() => {
                tracing::debug!(from = %outgoing.item_id, to = %incoming.item_id, %spec, "starting transition");
                self.stage = Stage::Blending(TransitionState {
                    spec,
                    started_ms: now_ms,
                    outgoing,
                    incoming,
                });
            }
            Some(outgoing) => {
                outgoing.destroy();
                self.stage = Stage::Steady(incoming);
            }
            None => self.stage = Stage::Steady(incoming),
        }
    }

    /// Renders one frame and returns the composited layers, bottom first.
    ///
    /// `active_time_ms` is the item timecode of the incoming (or steady)
    /// scene; the outgoing scene runs on its own wall time.
    pub fn frame(
        &mut self,
        now_ms: u64,
        delta_ms: f64,
        active_time_ms: f64,
    ) -> Result<Vec<Layer>, RenderFault> {
        if let Stage::Blending(state) = &self.stage {
            if state.weight(self.ease, now_ms) >= 1.0 {
                if let Stage::Blending(state) = std::mem::take(&mut self.stage) {
                    tracing::debug!(item = %state.incoming.item_id, "transition complete");
                    state.outgoing.destroy();
                    self.stage = Stage::Steady(state.incoming);
                }
            }
        }

        let ease = self.ease;
        match &mut self.stage {
            Stage::Empty => Ok(Vec::new()),
            Stage::Steady(current) => {
                let ctx = FrameContext::new(active_time_ms, delta_ms, 1.0);
                match render_layer(current, &ctx) {
                    Ok(layer) => Ok(vec![layer]),
                    Err(fault) => {
                        self.remove_faulted(Side::Incoming);
                        Err(fault)
                    }
                }
            }
            Stage::Blending(state) => {
                let weight = state.weight(ease, now_ms);
                let (out_alpha, in_alpha) = blend_alphas(state.spec.kind, weight);
                let out_time = now_ms.saturating_sub(state.outgoing.shown_at_ms) as f64;
                let out_ctx = FrameContext::new(out_time, delta_ms, out_alpha);
                let in_ctx = FrameContext::new(active_time_ms, delta_ms, in_alpha);

                let rendered = render_layer(&mut state.outgoing, &out_ctx)
                    .map_err(|fault| (Side::Outgoing, fault))
                    .and_then(|out| {
                        render_layer(&mut state.incoming, &in_ctx)
                            .map(|inc| vec![out, inc])
                            .map_err(|fault| (Side::Incoming, fault))
                    });
                rendered.map_err(|(side, fault)| {
                    self.remove_faulted(side);
                    fault
                })
            }
        }
    }

    fn remove_faulted(&mut self, side: Side) {
        self.stage = match std::mem::take(&mut self.stage) {
            Stage::Steady(current) => {
                current.destroy();
                Stage::Empty
            }
            Stage::Blending(state) => match side {
                Side::Outgoing => {
                    state.outgoing.destroy();
                    Stage::Steady(state.incoming)
                }
                Side::Incoming => {
                    state.incoming.destroy();
                    Stage::Steady(state.outgoing)
                }
            },
            Stage::Empty => Stage::Empty,
        };
    }

    /// The scene that is (or is becoming) the current one.
    pub fn active(&self) -> Option<&ActiveScene> {
        match &self.stage {
            Stage::Empty => None,
            Stage::Steady(current) => Some(current),
            Stage::Blending(state) => Some(&state.incoming),
        }
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveScene> {
        match &mut self.stage {
            Stage::Empty => None,
            Stage::Steady(current) => Some(current),
            Stage::Blending(state) => Some(&mut state.incoming),
        }
    }

    pub fn transition(&self) -> Option<&TransitionState> {
        match &self.stage {
            Stage::Blending(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition().is_some()
    }

    /// Number of live scene instances (at most two).
    pub fn instance_count(&self) -> usize {
        match &self.stage {
            Stage::Empty => 0,
            Stage::Steady(_) => 1,
            Stage::Blending(_) => 2,
        }
    }

    /// Cleans up every scene instance.
    pub fn clear(&mut self) {
        match std::mem::take(&mut self.stage) {
            Stage::Empty => {}
            Stage::Steady(current) => current.destroy(),
            Stage::Blending(state) => {
                state.outgoing.destroy();
                state.incoming.destroy();
            }
        }
    }
}

impl Drop for TransitionEngine {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("ease", &self.ease)
            .field("active", &self.active())
            .field("transitioning", &self.is_transitioning())
            .finish()
    }
}

fn render_layer(active: &mut ActiveScene, ctx: &FrameContext) -> Result<Layer, RenderFault> {
    active
        .scene
        .render(ctx)
        .map(|()| Layer {
            item_index: active.item_index,
            item_id: active.item_id.clone(),
            kind: active.scene.kind().to_string(),
            alpha: ctx.alpha,
        })
        .map_err(|error| RenderFault {
            item_index: active.item_index,
            item_id: active.item_id.clone(),
            error,
        })
}
