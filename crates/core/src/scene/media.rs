use super::{
    params::{flag, number, text, ParamSchema, ParamSpec, Params},
    FrameContext, Scene, SceneResult, SceneSetup, FALLBACK_SCENE,
};
use crate::{
    assets::{AssetDescriptor, AssetKind},
    error::{LoadError, SceneError},
};

fn require_asset(setup: &SceneSetup, kind: AssetKind) -> SceneResult<AssetDescriptor> {
    let asset = setup
        .asset
        .clone()
        .ok_or_else(|| LoadError::AssetMissing(format!("{} (no assetId)", setup.item_id)))?;
    if asset.kind != kind {
        return Err(LoadError::Decode(format!(
            "asset `{}` is {:?}, expected {:?}",
            asset.id, asset.kind, kind
        ))
        .into());
    }
    Ok(asset)
}

const PHOTO_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Text { name: "assetId", default: "" },
    ParamSpec::Choice { name: "fit", options: &["cover", "contain"], default: "cover" },
    ParamSpec::Number { name: "kenBurns", min: 0.0, max: 0.5, default: 0.08, integer: false },
]);

/// A still image with an optional slow Ken Burns zoom.
#[derive(Debug)]
pub struct Photo {
    asset: AssetDescriptor,
    params: Params,
    scale: f64,
}

impl Photo {
    pub fn new(setup: &SceneSetup) -> SceneResult<Self> {
        Ok(Self {
            asset: require_asset(setup, AssetKind::Photo)?,
            params: PHOTO_SCHEMA.defaults(),
            scale: 1.0,
        })
    }

    pub fn asset(&self) -> &AssetDescriptor {
        &self.asset
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Scene for Photo {
    fn kind(&self) -> &str {
        "photo"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = PHOTO_SCHEMA.resolve(params);
        self.params = resolved;
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        PHOTO_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        let zoom = number(&self.params, "kenBurns");
        self.scale = 1.0 + zoom * (ctx.time_ms / 10_000.0).min(1.0);
        Ok(())
    }

    fn cleanup(&mut self) {}
}

const VIDEO_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Text { name: "assetId", default: "" },
    ParamSpec::Flag { name: "loop", default: false },
    ParamSpec::Number { name: "volume", min: 0.0, max: 1.0, default: 1.0, integer: false },
]);

/// Video playback position tracker; decoding lives in the rendering backend.
#[derive(Debug)]
pub struct Video {
    asset: AssetDescriptor,
    params: Params,
    position_ms: f64,
}

impl Video {
    pub fn new(setup: &SceneSetup) -> SceneResult<Self> {
        Ok(Self {
            asset: require_asset(setup, AssetKind::Video)?,
            params: VIDEO_SCHEMA.defaults(),
            position_ms: 0.0,
        })
    }

    pub fn position_ms(&self) -> f64 {
        self.position_ms
    }
}

impl Scene for Video {
    fn kind(&self) -> &str {
        "video"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = VIDEO_SCHEMA.resolve(params);
        self.params = resolved;
        self.position_ms = 0.0;
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        VIDEO_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        let length = self.asset.duration_ms.unwrap_or(0) as f64;
        self.position_ms = if length <= 0.0 {
            ctx.time_ms
        } else if flag(&self.params, "loop") {
            ctx.time_ms % length
        } else {
            ctx.time_ms.min(length)
        };
        Ok(())
    }

    fn cleanup(&mut self) {
        self.position_ms = 0.0;
    }
}

const TEXT_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Text { name: "text", default: "" },
    ParamSpec::Number { name: "fontSize", min: 12.0, max: 200.0, default: 64.0, integer: true },
    ParamSpec::Color { name: "color", default: "#F4F4F4" },
]);

/// Full-screen text card.
#[derive(Debug)]
pub struct TextCard {
    params: Params,
}

impl TextCard {
    pub fn new() -> Self {
        Self {
            params: TEXT_SCHEMA.defaults(),
        }
    }

    pub fn text(&self) -> &str {
        text(&self.params, "text")
    }
}

impl Default for TextCard {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for TextCard {
    fn kind(&self) -> &str {
        "text"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = TEXT_SCHEMA.resolve(params);
        self.params = resolved;
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        TEXT_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, _ctx: &FrameContext) -> SceneResult<()> {
        Ok(())
    }

    fn cleanup(&mut self) {}
}

const COUNTDOWN_SCHEMA: ParamSchema = ParamSchema(&[
    ParamSpec::Number { name: "fromSeconds", min: 1.0, max: 86_400.0, default: 60.0, integer: true },
    ParamSpec::Text { name: "label", default: "" },
    ParamSpec::Color { name: "color", default: "#FFE600" },
]);

/// Counts down from `fromSeconds` using the item timecode.
#[derive(Debug)]
pub struct Countdown {
    params: Params,
    remaining_ms: u64,
}

impl Countdown {
    pub fn new() -> Self {
        Self {
            params: COUNTDOWN_SCHEMA.defaults(),
            remaining_ms: 0,
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// `MM:SS` rendering of the remaining time, rounded up to whole seconds.
    pub fn display(&self) -> String {
        let seconds = self.remaining_ms.div_ceil(1000);
        format!("{:02}:{:02}", seconds / 60, seconds % 60)
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for Countdown {
    fn kind(&self) -> &str {
        "countdown"
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = COUNTDOWN_SCHEMA.resolve(params);
        self.params = resolved;
        self.remaining_ms = number(&self.params, "fromSeconds") as u64 * 1000;
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        COUNTDOWN_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
        let total = number(&self.params, "fromSeconds") * 1000.0;
        self.remaining_ms = (total - ctx.time_ms).max(0.0) as u64;
        Ok(())
    }

    fn cleanup(&mut self) {}
}

const FALLBACK_SCHEMA: ParamSchema =
    ParamSchema(&[ParamSpec::Text { name: "message", default: "Stand by" }]);

/// Neutral card shown while the show recovers from a failed item.
#[derive(Debug)]
pub struct Fallback {
    item_id: String,
    params: Params,
}

impl Fallback {
    pub fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            params: FALLBACK_SCHEMA.defaults(),
        }
    }

    /// Item the fallback is standing in for.
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn message(&self) -> &str {
        text(&self.params, "message")
    }
}

impl Scene for Fallback {
    fn kind(&self) -> &str {
        FALLBACK_SCENE
    }

    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>> {
        let (resolved, reports) = FALLBACK_SCHEMA.resolve(params);
        self.params = resolved;
        Ok(reports)
    }

    fn update_params(&mut self, partial: &Params) -> Vec<SceneError> {
        FALLBACK_SCHEMA.apply(&mut self.params, partial)
    }

    fn render(&mut self, _ctx: &FrameContext) -> SceneResult<()> {
        Ok(())
    }

    fn cleanup(&mut self) {}
}
