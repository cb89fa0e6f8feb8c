//! Bringing clients and the control process back to the authoritative state.

use tracing::{info, warn};

use crate::{
    playback::PlaybackState,
    protocol::Directive,
    store::StateStore,
    timeline::Timeline,
    Result,
};

/// Playback state recovered from a store after a control restart.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    pub timeline: Timeline,
    pub current_index: usize,
    pub timecode_ms: u64,
    pub is_playing: bool,
}

/// Directives that bring a freshly connected client to `state`.
///
/// The first four are always `LOAD_TIMELINE`, `JUMP`, `SET_TIMECODE` and,
/// only while playing, `PLAY`. Presentation state (hold, volume, theme and
/// blackout) follows.
pub fn replay(state: &PlaybackState) -> Vec<Directive> {
    let Some(timeline) = &state.timeline else {
        return Vec::new();
    };

    let mut directives = vec![
        Directive::LoadTimeline {
            timeline: timeline.as_ref().clone(),
            epoch: state.epoch,
        },
        Directive::Jump {
            index: state.target_index,
            epoch: state.epoch,
        },
        Directive::SetTimecode {
            ms: state.elapsed_ms,
            epoch: state.epoch,
        },
    ];
    if state.is_playing {
        directives.push(Directive::Play {
            index: None,
            epoch: state.epoch,
        });
    }
    if state.held {
        directives.push(Directive::Hold { on: true });
    }
    directives.push(Directive::SetVolume {
        volume: state.volume,
    });
    if let Some(id) = &state.theme_id {
        directives.push(Directive::SetTheme { id: id.clone() });
    }
    if state.blackout {
        directives.push(Directive::Blackout { on: true });
    }
    directives
}

/// Reads the last persisted playback state and the timeline it refers to.
///
/// Returns `Ok(None)` when there is nothing usable to resume. A persisted
/// index that no longer fits the timeline restarts the show from the top.
pub fn restore<S: StateStore + ?Sized>(store: &S) -> Result<Option<Restored>> {
    let Some(state) = store.load_state()? else {
        return Ok(None);
    };
    let Some(timeline_id) = state.timeline_id else {
        return Ok(None);
    };
    let Some(timeline) = store.load_timeline(&timeline_id)? else {
        warn!(timeline = %timeline_id, "persisted timeline is gone; starting idle");
        return Ok(None);
    };
    if let Err(err) = timeline.validate() {
        warn!(%err, timeline = %timeline_id, "persisted timeline is invalid; starting idle");
        return Ok(None);
    }

    let (current_index, timecode_ms) = if state.current_index < timeline.len() {
        (state.current_index, state.timecode_ms)
    } else {
        warn!(
            index = state.current_index,
            items = timeline.len(),
            "persisted index out of range; restarting from the first item"
        );
        (0, 0)
    };
    info!(timeline = %timeline_id, index = current_index, timecode_ms, "found persisted show");
    Ok(Some(Restored {
        timeline,
        current_index,
        timecode_ms,
        is_playing: state.is_playing,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        playback::ShowState,
        store::{MemoryStore, PersistedState},
        timeline::{Item, ItemDuration},
    };

    fn timeline() -> Timeline {
        Timeline::new(
            "gala",
            "Gala",
            vec![
                Item::new("intro", "text", ItemDuration::Millis(5000)),
                Item::new("clock", "countdown", ItemDuration::Infinite),
            ],
        )
    }

    fn state(is_playing: bool) -> PlaybackState {
        PlaybackState {
            timeline: Some(Arc::new(timeline())),
            current_index: 1,
            target_index: 1,
            elapsed_ms: 2_250,
            is_playing,
            held: false,
            blackout: false,
            state: if is_playing {
                ShowState::Playing
            } else {
                ShowState::Paused
            },
            epoch: 4,
            volume: 0.5,
            theme_id: Some("neon-chalkboard".into()),
        }
    }

    #[test]
    fn replay_follows_load_jump_timecode_play() {
        let directives = replay(&state(true));
        assert_eq!(
            directives[..4],
            [
                Directive::LoadTimeline { timeline: timeline(), epoch: 4 },
                Directive::Jump { index: 1, epoch: 4 },
                Directive::SetTimecode { ms: 2_250, epoch: 4 },
                Directive::Play { index: None, epoch: 4 },
            ]
        );
        assert!(directives.contains(&Directive::SetVolume { volume: 0.5 }));
    }

    #[test]
    fn replay_skips_play_when_paused_and_carries_overlays() {
        let mut paused = state(false);
        paused.held = true;
        paused.blackout = true;
        let names: Vec<&str> = replay(&paused).iter().map(Directive::name).collect();
        assert_eq!(
            names,
            vec!["LOAD_TIMELINE", "JUMP", "SET_TIMECODE", "HOLD", "SET_VOLUME", "SET_THEME", "BLACKOUT"]
        );
    }

    #[test]
    fn nothing_to_replay_without_a_timeline() {
        let mut empty = state(false);
        empty.timeline = None;
        assert!(replay(&empty).is_empty());
    }

    #[test]
    fn restore_reads_state_and_timeline() {
        let mut store = MemoryStore::new();
        assert_eq!(restore(&store).unwrap(), None);

        store.save_timeline(&timeline()).unwrap();
        store
            .save_state(&PersistedState::new(Some("gala".into()), 1, 900, true))
            .unwrap();
        let restored = restore(&store).unwrap().unwrap();
        assert_eq!(restored.current_index, 1);
        assert_eq!(restored.timecode_ms, 900);
        assert!(restored.is_playing);
    }

    #[test]
    fn out_of_range_index_restarts_from_the_top() {
        let mut store = MemoryStore::new();
        store.save_timeline(&timeline()).unwrap();
        store
            .save_state(&PersistedState::new(Some("gala".into()), 9, 900, false))
            .unwrap();
        let restored = restore(&store).unwrap().unwrap();
        assert_eq!((restored.current_index, restored.timecode_ms), (0, 0));
    }

    #[test]
    fn missing_timeline_means_nothing_to_resume() {
        let mut store = MemoryStore::new();
        store
            .save_state(&PersistedState::new(Some("gone".into()), 0, 0, true))
            .unwrap();
        assert_eq!(restore(&store).unwrap(), None);
    }
}
