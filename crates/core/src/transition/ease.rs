use serde::{Deserialize, Serialize};

/// Shaping curve for blend progress. Configured under `transition.ease`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
}

impl Ease {
    /// Blend weight `elapsed_ms` into a blend lasting `duration_ms`. A zero
    /// length blend is complete immediately.
    pub fn weight(self, elapsed_ms: u64, duration_ms: u64) -> f64 {
        if duration_ms == 0 {
            return 1.0;
        }
        self.apply(elapsed_ms as f64 / duration_ms as f64)
    }

    /// Shapes normalized progress `t`, clamped to `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t.powi(2),
            Self::OutQuad => 1.0 - (1.0 - t).powi(2),
            Self::InOutQuad if t < 0.5 => 2.0 * t.powi(2),
            Self::InOutQuad => 1.0 - (2.0 - 2.0 * t).powi(2) / 2.0,
            Self::InCubic => t.powi(3),
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic if t < 0.5 => 4.0 * t.powi(3),
            Self::InOutCubic => 1.0 - (2.0 - 2.0 * t).powi(3) / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn zero_length_blend_is_already_complete() {
        assert_eq!(Ease::InCubic.weight(0, 0), 1.0);
        assert_eq!(Ease::Linear.weight(500, 0), 1.0);
    }

    #[test]
    fn weight_tracks_elapsed_share_of_the_blend() {
        assert!(close(Ease::Linear.weight(200, 800), 0.25));
        assert!(close(Ease::OutQuad.weight(400, 800), 0.75));
        assert!(close(Ease::InQuad.weight(400, 800), 0.25));
        assert!(close(Ease::InOutCubic.weight(400, 800), 0.5));
        assert_eq!(Ease::OutCubic.weight(5_000, 800), 1.0);
    }

    #[test]
    fn in_and_out_curves_mirror_each_other() {
        let pairs = [(Ease::InQuad, Ease::OutQuad), (Ease::InCubic, Ease::OutCubic)];
        for (ease_in, ease_out) in pairs {
            for step in 0..=20 {
                let t = step as f64 / 20.0;
                assert!(close(ease_in.apply(t), 1.0 - ease_out.apply(1.0 - t)), "{ease_in:?} at {t}");
            }
        }
    }

    #[test]
    fn out_curves_lead_linear_progress() {
        for elapsed in (100..800).step_by(100) {
            let linear = Ease::Linear.weight(elapsed, 800);
            assert!(Ease::OutQuad.weight(elapsed, 800) > linear);
            assert!(Ease::OutCubic.weight(elapsed, 800) > Ease::OutQuad.weight(elapsed, 800));
        }
    }

    #[test]
    fn config_names_are_snake_case() {
        let ease: Ease = serde_json::from_str("\"in_out_cubic\"").unwrap();
        assert_eq!(ease, Ease::InOutCubic);
        assert_eq!(serde_json::to_string(&Ease::OutQuad).unwrap(), "\"out_quad\"");
        assert!(serde_json::from_str::<Ease>("\"bounce\"").is_err());
    }
}
