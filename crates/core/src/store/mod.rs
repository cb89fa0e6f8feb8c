//! Crash-recovery persistence for the authoritative playback state.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{timeline::Timeline, Result};

/// The single persisted row per show session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub timeline_id: Option<String>,
    pub current_index: usize,
    pub timecode_ms: u64,
    pub is_playing: bool,
    /// Unix seconds of the last write.
    pub updated_at: u64,
}

impl PersistedState {
    pub fn new(timeline_id: Option<String>, current_index: usize, timecode_ms: u64, is_playing: bool) -> Self {
        Self {
            timeline_id,
            current_index,
            timecode_ms,
            is_playing,
            updated_at: unix_now(),
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Storage backend for playback state and the timelines it refers to.
pub trait StateStore {
    fn load_state(&self) -> Result<Option<PersistedState>>;
    fn save_state(&mut self, state: &PersistedState) -> Result<()>;
    fn load_timeline(&self, id: &str) -> Result<Option<Timeline>>;
    fn save_timeline(&mut self, timeline: &Timeline) -> Result<()>;
}

/// Volatile store used by tests and sessions without a state directory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Option<PersistedState>,
    timelines: HashMap<String, Timeline>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of state writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl StateStore for MemoryStore {
    fn load_state(&self) -> Result<Option<PersistedState>> {
        Ok(self.state.clone())
    }

    fn save_state(&mut self, state: &PersistedState) -> Result<()> {
        self.state = Some(state.clone());
        self.writes += 1;
        Ok(())
    }

    fn load_timeline(&self, id: &str) -> Result<Option<Timeline>> {
        Ok(self.timelines.get(id).cloned())
    }

    fn save_timeline(&mut self, timeline: &Timeline) -> Result<()> {
        self.timelines.insert(timeline.id.clone(), timeline.clone());
        Ok(())
    }
}

/// JSON files in a directory: `playback_state.json` plus
/// `timelines/<id>.json`. Writes go through a temp file and a rename so a
/// crash never leaves a torn file behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    const STATE_FILE: &'static str = "playback_state.json";

    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("timelines"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn timeline_path(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join("timelines").join(format!("{safe}.json"))
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl StateStore for JsonFileStore {
    fn load_state(&self) -> Result<Option<PersistedState>> {
        Self::read_json(&self.root.join(Self::STATE_FILE))
    }

    fn save_state(&mut self, state: &PersistedState) -> Result<()> {
        let raw = serde_json::to_vec_pretty(state)?;
        Self::write_atomic(&self.root.join(Self::STATE_FILE), &raw)
    }

    fn load_timeline(&self, id: &str) -> Result<Option<Timeline>> {
        Self::read_json(&self.timeline_path(id))
    }

    fn save_timeline(&mut self, timeline: &Timeline) -> Result<()> {
        let raw = serde_json::to_vec_pretty(timeline)?;
        Self::write_atomic(&self.timeline_path(&timeline.id), &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Item, ItemDuration};

    fn timeline() -> Timeline {
        Timeline::new(
            "gala/2026",
            "Gala",
            vec![Item::new("intro", "text", ItemDuration::Millis(3000))],
        )
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::new();
        assert!(store.load_state().unwrap().is_none());
        let state = PersistedState::new(Some("gala".into()), 2, 1500, true);
        store.save_state(&state).unwrap();
        assert_eq!(store.load_state().unwrap(), Some(state));
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = JsonFileStore::open(dir.path()).unwrap();
            store.save_timeline(&timeline()).unwrap();
            store
                .save_state(&PersistedState::new(Some("gala/2026".into()), 0, 900, false))
                .unwrap();
        }

        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(store.root(), dir.path());
        let state = store.load_state().unwrap().unwrap();
        assert_eq!(state.timecode_ms, 900);
        assert!(!state.is_playing);
        let loaded = store.load_timeline("gala/2026").unwrap().unwrap();
        assert_eq!(loaded, timeline());
        assert!(store.load_timeline("missing").unwrap().is_none());
        assert!(!dir.path().join("playback_state.json.tmp").exists());
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("playback_state.json"), "{ nope").unwrap();
        assert!(store.load_state().is_err());
    }
}
