//! Core library for the PrimeTime show controller.
//!
//! One authoritative [`PlaybackController`] owns the show state and talks to
//! any number of [`RenderClient`]s through tagged JSON messages. Clients turn
//! directives into frames: preparing scenes ahead of time, blending between
//! them, and reporting readiness, status and failures back. Every API that
//! depends on time takes the current instant in milliseconds, so a
//! [`ShowSession`] can drive a whole show deterministically.

pub mod assets;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod perf;
pub mod playback;
pub mod preload;
pub mod protocol;
pub mod recovery;
pub mod render;
pub mod scene;
pub mod session;
pub mod store;
pub mod throttle;
pub mod timeline;
pub mod transition;

pub use assets::{AssetDescriptor, AssetResolver, AssetStore};
pub use client::RenderClient;
pub use clock::{ClientClock, ControlClock, MonotonicClock};
pub use config::{AppConfig, EndBehavior};
pub use error::{CommandError, LoadError, PrimeTimeError, Result, SceneError};
pub use playback::{Command, PlaybackController, PlaybackState, ShowState};
pub use protocol::{ClientId, Directive, Envelope, Telemetry};
pub use render::{Frame, StageContext};
pub use scene::{Scene, SceneRegistry};
pub use session::ShowSession;
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use timeline::{Item, ItemDuration, Timeline};
pub use transition::{TransitionEngine, TransitionSpec};
