//! The fixed contract every visual, media, text and countdown renderer
//! implements, plus the string-keyed registry used to instantiate them.

mod math;
mod media;
pub mod params;

use std::{collections::BTreeMap, fmt};

use crate::{
    assets::{AssetDescriptor, AssetResolver},
    error::{LoadError, SceneError},
    timeline::Item,
};

pub use math::{ConwayLife, DigitsRain, Lissajous, Mandelbrot, PolarRoses};
pub use media::{Countdown, Fallback, Photo, TextCard, Video};
pub use params::{ParamSchema, ParamSpec, Params};

pub type SceneResult<T> = std::result::Result<T, SceneError>;

/// Key of the scene shown while a load or render failure is being recovered.
pub const FALLBACK_SCENE: &str = "fallback";

/// Per-frame inputs handed to [`Scene::render`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Milliseconds since the item started.
    pub time_ms: f64,
    /// Milliseconds since the previous frame.
    pub delta_ms: f64,
    /// Blend opacity assigned by the transition engine.
    pub alpha: f32,
}

impl FrameContext {
    pub fn new(time_ms: f64, delta_ms: f64, alpha: f32) -> Self {
        Self {
            time_ms,
            delta_ms,
            alpha,
        }
    }
}

/// Contract implemented by every pluggable renderer.
pub trait Scene: Send {
    /// Registry key of the implementation.
    fn kind(&self) -> &str;

    /// Applies the full parameter set. Out-of-range values are clamped and
    /// reported; an `Err` means the scene cannot run at all.
    fn init(&mut self, params: &Params) -> SceneResult<Vec<SceneError>>;

    /// Merges a partial parameter update into the running scene.
    fn update_params(&mut self, partial: &Params) -> Vec<SceneError>;

    fn render(&mut self, ctx: &FrameContext) -> SceneResult<()>;

    /// Releases render resources. Called exactly once before the instance is
    /// dropped.
    fn cleanup(&mut self);

    /// Lowers visual cost to protect the frame rate. Returns `false` when the
    /// scene has nothing left to reduce.
    fn reduce_complexity(&mut self) -> bool {
        false
    }
}

/// Everything a factory may need besides the parameters.
#[derive(Debug, Clone, Default)]
pub struct SceneSetup {
    pub item_id: String,
    pub asset: Option<AssetDescriptor>,
}

pub type SceneFactory = fn(&SceneSetup) -> SceneResult<Box<dyn Scene>>;

/// String-keyed factory table.
#[derive(Clone, Default)]
pub struct SceneRegistry {
    factories: BTreeMap<String, SceneFactory>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in scene type.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("lissajous", |_| Ok(Box::new(Lissajous::new())));
        registry.register("polar_roses", |_| Ok(Box::new(PolarRoses::new())));
        registry.register("digits_rain", |_| Ok(Box::new(DigitsRain::new())));
        registry.register("conway_life", |_| Ok(Box::new(ConwayLife::new())));
        registry.register("mandelbrot", |_| Ok(Box::new(Mandelbrot::new())));
        registry.register("photo", |setup| Ok(Box::new(Photo::new(setup)?)));
        registry.register("video", |setup| Ok(Box::new(Video::new(setup)?)));
        registry.register("text", |_| Ok(Box::new(TextCard::new())));
        registry.register("countdown", |_| Ok(Box::new(Countdown::new())));
        registry.register(FALLBACK_SCENE, |setup| {
            Ok(Box::new(Fallback::new(&setup.item_id)))
        });
        registry
    }

    pub fn register(&mut self, kind: &str, factory: SceneFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, kind: &str, setup: &SceneSetup) -> SceneResult<Box<dyn Scene>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| LoadError::UnknownSceneType(kind.to_string()))?;
        factory(setup)
    }

    /// Resolves the item's asset, creates the scene and initialises it.
    /// Parameter corrections are logged, not returned as failures.
    pub fn instantiate(
        &self,
        item: &Item,
        assets: &dyn AssetResolver,
    ) -> SceneResult<Box<dyn Scene>> {
        let asset = item.asset_id().map(|id| assets.resolve(id)).transpose()?;
        let setup = SceneSetup {
            item_id: item.id.clone(),
            asset,
        };
        let mut scene = self.create(&item.scene_type, &setup)?;
        let reports = scene.init(&item.params)?;
        for report in reports {
            tracing::warn!(item = %item.id, scene = %item.scene_type, "{report}");
        }
        Ok(scene)
    }

    /// Creates the fallback scene for `item_id`. Never fails for registries
    /// built with [`SceneRegistry::with_builtin`].
    pub fn fallback(&self, item_id: &str, message: &str) -> SceneResult<Box<dyn Scene>> {
        let setup = SceneSetup {
            item_id: item_id.to_string(),
            asset: None,
        };
        let mut scene = self.create(FALLBACK_SCENE, &setup)?;
        let mut params = Params::new();
        params.insert("message".into(), message.into());
        scene.init(&params)?;
        Ok(scene)
    }
}

impl fmt::Debug for SceneRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
