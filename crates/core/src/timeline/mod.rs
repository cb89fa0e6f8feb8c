use std::{collections::HashSet, fmt, path::Path};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    assets::AssetResolver,
    error::CommandError,
    scene::Params,
    transition::TransitionSpec,
    Result,
};

/// Theme used when a timeline does not name one.
pub const DEFAULT_THEME: &str = "neon-chalkboard";

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

/// An ordered, pre-planned show. Immutable once loaded into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub id: String,
    pub name: String,
    #[serde(default = "default_theme")]
    pub theme_id: String,
    pub items: Vec<Item>,
}

/// One scheduled unit of the show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(rename = "type")]
    pub scene_type: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub duration: ItemDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_out: Option<String>,
    /// Explicit blend length; wins over the duration embedded in a
    /// `"kind:ms"` spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_ms: Option<u64>,
}

/// How long an item stays on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemDuration {
    Millis(u64),
    /// Taken from the backing asset (video length). Behaves like
    /// [`ItemDuration::Infinite`] when no asset duration is known.
    #[default]
    Auto,
    Infinite,
}

impl Serialize for ItemDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Millis(ms) => serializer.serialize_u64(*ms),
            Self::Auto => serializer.serialize_str("auto"),
            Self::Infinite => serializer.serialize_str("infinite"),
        }
    }
}

impl<'de> Deserialize<'de> for ItemDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Self::Millis(ms)),
            Raw::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
                "auto" => Ok(Self::Auto),
                "infinite" => Ok(Self::Infinite),
                other => Err(serde::de::Error::custom(format!(
                    "duration must be a non-negative integer, `auto` or `infinite`, got `{other}`"
                ))),
            },
        }
    }
}

impl fmt::Display for ItemDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millis(ms) => write!(f, "{ms}ms"),
            Self::Auto => f.write_str("auto"),
            Self::Infinite => f.write_str("infinite"),
        }
    }
}

impl Item {
    pub fn new(id: impl Into<String>, scene_type: impl Into<String>, duration: ItemDuration) -> Self {
        Self {
            id: id.into(),
            scene_type: scene_type.into(),
            params: Params::new(),
            duration,
            transition_in: None,
            transition_out: None,
            transition_ms: None,
        }
    }

    pub fn with_param(mut self, name: &str, value: serde_json::Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn with_transition_in(mut self, spec: &str) -> Self {
        self.transition_in = Some(spec.to_string());
        self
    }

    pub fn with_transition_out(mut self, spec: &str) -> Self {
        self.transition_out = Some(spec.to_string());
        self
    }

    /// Identifier of the asset backing this item, if any.
    pub fn asset_id(&self) -> Option<&str> {
        self.params.get("assetId").and_then(|value| value.as_str())
    }

    /// Resolves the on-screen length. `None` means the item never ends on its
    /// own.
    pub fn resolved_duration_ms(&self, assets: &dyn AssetResolver) -> Option<u64> {
        match self.duration {
            ItemDuration::Millis(ms) => Some(ms),
            ItemDuration::Infinite => None,
            ItemDuration::Auto => {
                let duration = self
                    .asset_id()
                    .and_then(|id| assets.resolve(id).ok())
                    .and_then(|asset| asset.duration_ms);
                if duration.is_none() {
                    tracing::warn!(item = %self.id, "auto duration has no asset length; holding until advanced");
                }
                duration
            }
        }
    }
}

impl Timeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            theme_id: default_theme(),
            items,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let timeline: Self = serde_json::from_str(raw)?;
        timeline.validate()?;
        Ok(timeline)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn index_of(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == item_id)
    }

    /// Validates `index` against the item count.
    pub fn check_index(&self, index: i64) -> std::result::Result<usize, CommandError> {
        if index >= 0 && (index as usize) < self.items.len() {
            Ok(index as usize)
        } else {
            Err(CommandError::OutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }

    /// Checks the structural invariants: at least one item, unique ids and
    /// parseable transition specs.
    pub fn validate(&self) -> std::result::Result<(), CommandError> {
        if self.items.is_empty() {
            return Err(CommandError::InvalidTimeline(format!(
                "timeline `{}` has no items",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.id.as_str()) {
                return Err(CommandError::InvalidTimeline(format!(
                    "duplicate item id `{}`",
                    item.id
                )));
            }
            for spec in [&item.transition_in, &item.transition_out].into_iter().flatten() {
                TransitionSpec::parse(spec, item.transition_ms)?;
            }
        }
        Ok(())
    }

    /// Picks the blend used when moving from `from` to `to`: the incoming
    /// item's `transitionIn`, else the outgoing item's `transitionOut`, else
    /// `default_spec`. An unparseable default falls back to a cut so an item
    /// change can always proceed.
    pub fn transition_between(
        &self,
        from: Option<usize>,
        to: usize,
        default_spec: &str,
    ) -> std::result::Result<TransitionSpec, CommandError> {
        let incoming = self.items.get(to);
        if let Some(item) = incoming {
            if let Some(spec) = &item.transition_in {
                return TransitionSpec::parse(spec, item.transition_ms);
            }
        }
        if let Some(item) = from.and_then(|index| self.items.get(index)) {
            if let Some(spec) = &item.transition_out {
                return TransitionSpec::parse(spec, item.transition_ms);
            }
        }
        Ok(TransitionSpec::parse(default_spec, None).unwrap_or_else(|err| {
            tracing::warn!(%err, "default transition is invalid; cutting instead");
            TransitionSpec::CUT
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assets::AssetStore, transition::TransitionKind};

    const SHOW: &str = r#"{
        "id": "gala",
        "name": "Gala Night",
        "items": [
            { "id": "intro", "type": "text", "params": { "text": "Welcome" }, "duration": 3000 },
            { "id": "clip", "type": "video", "params": { "assetId": "v1" }, "duration": "auto",
              "transitionIn": "fade:800" },
            { "id": "finale", "type": "countdown", "duration": "infinite",
              "transitionIn": "cross:400", "transitionMs": 1200 }
        ]
    }"#;

    #[test]
    fn parses_durations_and_defaults() {
        let timeline = Timeline::from_json_str(SHOW).unwrap();
        assert_eq!(timeline.theme_id, "neon-chalkboard");
        assert_eq!(timeline.items[0].duration, ItemDuration::Millis(3000));
        assert_eq!(timeline.items[1].duration, ItemDuration::Auto);
        assert_eq!(timeline.items[2].duration, ItemDuration::Infinite);
        assert_eq!(timeline.index_of("clip"), Some(1));
    }

    #[test]
    fn rejects_negative_durations() {
        let raw = r#"{ "id": "x", "name": "x", "items": [ { "id": "a", "type": "text", "duration": -5 } ] }"#;
        assert!(Timeline::from_json_str(raw).is_err());
    }

    #[test]
    fn rejects_duplicate_ids_and_bad_specs() {
        let dup = Timeline::new(
            "t",
            "t",
            vec![
                Item::new("a", "text", ItemDuration::Infinite),
                Item::new("a", "text", ItemDuration::Infinite),
            ],
        );
        assert!(matches!(dup.validate(), Err(CommandError::InvalidTimeline(_))));

        let bad = Timeline::new(
            "t",
            "t",
            vec![Item::new("a", "text", ItemDuration::Infinite).with_transition_in("swirl:10")],
        );
        assert!(matches!(
            bad.validate(),
            Err(CommandError::InvalidTransitionSpec(_))
        ));
    }

    #[test]
    fn explicit_transition_ms_takes_precedence() {
        let timeline = Timeline::from_json_str(SHOW).unwrap();
        let spec = timeline.transition_between(Some(1), 2, "cut").unwrap();
        assert_eq!(spec.kind, TransitionKind::Cross);
        assert_eq!(spec.duration_ms, 1200);

        let spec = timeline.transition_between(Some(0), 1, "cut").unwrap();
        assert_eq!(spec.kind, TransitionKind::Fade);
        assert_eq!(spec.duration_ms, 800);

        let spec = timeline.transition_between(None, 0, "cut").unwrap();
        assert_eq!(spec.kind, TransitionKind::Cut);
    }

    #[test]
    fn outgoing_transition_applies_when_incoming_has_none() {
        let timeline = Timeline::new(
            "t",
            "t",
            vec![
                Item::new("a", "text", ItemDuration::Millis(1000)).with_transition_out("cross:600"),
                Item::new("b", "text", ItemDuration::Millis(1000)),
                Item::new("c", "text", ItemDuration::Millis(1000)).with_transition_out("fade"),
                Item::new("d", "text", ItemDuration::Millis(1000)).with_transition_in("cut"),
            ],
        );
        let spec = timeline.transition_between(Some(0), 1, "cut").unwrap();
        assert_eq!((spec.kind, spec.duration_ms), (TransitionKind::Cross, 600));

        // The incoming item's own spec still wins.
        let spec = timeline.transition_between(Some(2), 3, "fade:300").unwrap();
        assert_eq!(spec.kind, TransitionKind::Cut);

        let mut timed = timeline.clone();
        timed.items[0].transition_ms = Some(1500);
        let spec = timed.transition_between(Some(0), 1, "cut").unwrap();
        assert_eq!((spec.kind, spec.duration_ms), (TransitionKind::Cross, 1500));
    }

    #[test]
    fn invalid_default_transition_cuts() {
        let timeline = Timeline::from_json_str(SHOW).unwrap();
        let spec = timeline.transition_between(None, 0, "swirl").unwrap();
        assert_eq!(spec, TransitionSpec::CUT);
    }

    #[test]
    fn auto_duration_uses_asset_length() {
        let timeline = Timeline::from_json_str(SHOW).unwrap();
        let mut assets = AssetStore::new();
        assert_eq!(timeline.items[1].resolved_duration_ms(&assets), None);

        assets.register(crate::assets::AssetDescriptor::video("v1", "videos/v1.mp4", 4_500));
        assert_eq!(timeline.items[1].resolved_duration_ms(&assets), Some(4_500));
        assert_eq!(timeline.items[2].resolved_duration_ms(&assets), None);
    }

    #[test]
    fn check_index_reports_out_of_range() {
        let timeline = Timeline::from_json_str(SHOW).unwrap();
        assert_eq!(timeline.check_index(2), Ok(2));
        assert_eq!(
            timeline.check_index(3),
            Err(CommandError::OutOfRange { index: 3, len: 3 })
        );
        assert!(timeline.check_index(-1).is_err());
    }
}
