/// Result alias that carries the crate-wide [`PrimeTimeError`] type.
pub type Result<T> = std::result::Result<T, PrimeTimeError>;

/// Errors returned synchronously to the operator command that caused them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("index {index} is out of range for a timeline of {len} items")]
    OutOfRange { index: i64, len: usize },
    #[error("invalid transition spec `{0}`")]
    InvalidTransitionSpec(String),
    #[error("no timeline is loaded")]
    NoTimeline,
    #[error("invalid timeline: {0}")]
    InvalidTimeline(String),
}

/// Failures while preparing an item for display. These are auto-recovered by
/// showing the fallback scene for a bounded window and then advancing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("item `{item_id}` did not become ready within {timeout_ms} ms")]
    Timeout { item_id: String, timeout_ms: u64 },
    #[error("asset `{0}` is missing")]
    AssetMissing(String),
    #[error("failed to decode: {0}")]
    Decode(String),
    #[error("no scene is registered for type `{0}`")]
    UnknownSceneType(String),
}

/// Errors raised by a scene implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    /// A parameter was out of range or of the wrong type. The scene keeps
    /// running with the clamped (or default) value.
    #[error("parameter `{name}` {reason}")]
    InvalidParam { name: String, reason: String },
    #[error("render failed: {0}")]
    Render(String),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PrimeTimeError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::InvalidTransitionSpec(_) => "INVALID_TRANSITION_SPEC",
            Self::NoTimeline => "NO_TIMELINE",
            Self::InvalidTimeline(_) => "INVALID_TIMELINE",
        }
    }
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "LOAD_TIMEOUT",
            Self::AssetMissing(_) => "ASSET_MISSING",
            Self::Decode(_) => "DECODE_FAILED",
            Self::UnknownSceneType(_) => "UNKNOWN_SCENE",
        }
    }
}

impl SceneError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParam { .. } => "INVALID_PARAM",
            Self::Render(_) => "SCENE_RENDER",
            Self::Load(err) => err.code(),
        }
    }

    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Returns `true` when an `ERROR` telemetry code describes a failure to get an
/// item on screen, as opposed to a fault while it was already running.
pub fn is_load_code(code: &str) -> bool {
    matches!(
        code,
        "LOAD_TIMEOUT" | "ASSET_MISSING" | "DECODE_FAILED" | "UNKNOWN_SCENE"
    )
}
