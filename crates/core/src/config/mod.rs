use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    transition::{Ease, TransitionSpec},
    Result,
};

/// Top-level configuration structure for a show session.
///
/// Every field has a default so partial JSON files are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
    pub clock: ClockConfig,
    pub transition: TransitionConfig,
    pub preload: PreloadConfig,
    pub performance: PerformanceConfig,
    pub params: ParamsConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file, filling missing fields with defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would only fail later, in the middle of a show.
    pub fn validate(&self) -> Result<()> {
        TransitionSpec::parse(&self.playback.default_transition, None)?;
        Ok(())
    }
}

/// What happens when the show runs past its last item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBehavior {
    /// Stop at the end and return to `IDLE`.
    #[default]
    Stop,
    /// Wrap around to the first item.
    Wrap,
}

impl EndBehavior {
    /// Resolves `current + delta` against a timeline of `len` items.
    /// Returns `None` when the show should stop.
    pub fn resolve(self, current: usize, delta: i64, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let len = len as i64;
        let current = current as i64;
        match self {
            Self::Wrap => Some((current + delta.rem_euclid(len)).rem_euclid(len) as usize),
            Self::Stop => match current.saturating_add(delta) {
                target if target >= len => None,
                target => Some(target.max(0) as usize),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub load_timeout_ms: u64,
    /// How long the fallback scene stays up after a load or render failure.
    pub error_hold_ms: u64,
    pub end_behavior: EndBehavior,
    pub default_transition: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 5_000,
            error_hold_ms: 2_000,
            end_behavior: EndBehavior::Stop,
            default_transition: "cut".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub broadcast_interval_ms: u64,
    pub report_interval_ms: u64,
    pub drift_tolerance_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: 500,
            report_interval_ms: 1_000,
            drift_tolerance_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub ease: Ease,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self { ease: Ease::OutQuad }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Fraction of the current item after which upcoming items are prepared.
    pub threshold: f64,
    pub lookahead: usize,
    pub tasks_per_frame: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            lookahead: 2,
            tasks_per_frame: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub window_size: usize,
    pub check_interval_ms: u64,
    pub fps_floor: f64,
    pub min_slow_samples: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            check_interval_ms: 3_000,
            fps_floor: 55.0,
            min_slow_samples: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsConfig {
    pub min_emit_interval_ms: u64,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            min_emit_interval_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "playback": { "end_behavior": "wrap" } }"#).unwrap();
        assert_eq!(config.playback.end_behavior, EndBehavior::Wrap);
        assert_eq!(config.playback.load_timeout_ms, 5_000);
        assert_eq!(config.clock.broadcast_interval_ms, 500);
        assert_eq!(config.performance.window_size, 60);
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.json");
        std::fs::write(&path, r#"{ "preload": { "lookahead": 4 } }"#).unwrap();

        let config = AppConfig::from_json_file(&path).unwrap();
        assert_eq!(config.preload.lookahead, 4);
        assert!((config.preload.threshold - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn end_behavior_never_leaves_range() {
        assert_eq!(EndBehavior::Stop.resolve(2, 1, 3), None);
        assert_eq!(EndBehavior::Wrap.resolve(2, 1, 3), Some(0));
        assert_eq!(EndBehavior::Stop.resolve(0, -4, 3), Some(0));
        assert_eq!(EndBehavior::Wrap.resolve(0, -1, 3), Some(2));
        assert_eq!(EndBehavior::Wrap.resolve(0, 1, 0), None);
    }

    #[test]
    fn extreme_deltas_stay_in_range() {
        assert_eq!(EndBehavior::Stop.resolve(1, i64::MAX, 3), None);
        assert_eq!(EndBehavior::Stop.resolve(1, i64::MIN, 3), Some(0));
        // i64::MAX is 1 mod 3; i64::MIN is 1 mod 3 as well.
        assert_eq!(EndBehavior::Wrap.resolve(1, i64::MAX, 3), Some(2));
        assert_eq!(EndBehavior::Wrap.resolve(1, i64::MIN, 3), Some(2));
    }

    #[test]
    fn rejects_unparseable_default_transition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.json");
        std::fs::write(&path, r#"{ "playback": { "default_transition": "swirl" } }"#).unwrap();
        assert!(AppConfig::from_json_file(&path).is_err());

        let mut config = AppConfig::default();
        config.playback.default_transition = "fade:300".into();
        assert!(config.validate().is_ok());
    }
}
