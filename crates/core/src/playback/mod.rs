//! The authoritative show state machine.
//!
//! Operator commands, client telemetry and internal deadlines all go through
//! `&mut PlaybackController`, so state mutation is serialized by construction.
//! Outbound directives are queued and collected by the transport with
//! [`PlaybackController::take_outbound`].
//!
//! Every command that changes playback state starts a new epoch. Deadlines
//! armed under an older epoch are dropped when they come due, and readiness
//! or error telemetry produced before the latest retarget is ignored.

mod timers;

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
    sync::Arc,
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use timers::{Timer, TimerKind, TimerQueue};

use crate::{
    assets::AssetResolver,
    clock::ControlClock,
    config::AppConfig,
    error::{is_load_code, CommandError, LoadError},
    protocol::{ClientId, Directive, Envelope, Telemetry},
    recovery::{self, Restored},
    scene::Params,
    store::{PersistedState, StateStore},
    throttle::ParamThrottle,
    timeline::Timeline,
    Result,
};

type CommandResult = std::result::Result<(), CommandError>;

const HISTORY_LEN: usize = 64;

/// Deadlines that keep running across a pause, hold or seek.
const CARRIED_TIMERS: [TimerKind; 3] = [
    TimerKind::TransitionDone,
    TimerKind::LoadTimeout,
    TimerKind::ErrorHold,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShowState {
    Idle,
    Loading,
    Playing,
    Paused,
    Transitioning,
    Blackout,
    Error,
}

impl ShowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::Transitioning => "TRANSITIONING",
            Self::Blackout => "BLACKOUT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ShowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub at_ms: u64,
    pub from: ShowState,
    pub to: ShowState,
}

/// Point-in-time view of the authoritative playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub timeline: Option<Arc<Timeline>>,
    pub current_index: usize,
    /// Item the show is heading to. Differs from `current_index` only while
    /// TRANSITIONING.
    pub target_index: usize,
    pub elapsed_ms: u64,
    pub is_playing: bool,
    pub held: bool,
    pub blackout: bool,
    pub state: ShowState,
    pub epoch: u64,
    pub volume: f32,
    pub theme_id: Option<String>,
}

/// Operator commands accepted by [`PlaybackController::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(Timeline),
    Play(Option<i64>),
    Pause,
    Jump(i64),
    Skip(i64),
    Hold(bool),
    Blackout(bool),
    SetVolume(f32),
    SetTheme(String),
    SetTimecode(u64),
    Cue { cue_type: String, payload: Value },
    UpdateParams(Params),
}

/// Last `STATUS` received from a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientStatus {
    pub fps: f64,
    pub scene_id: Option<String>,
    pub item_index: Option<usize>,
    pub timecode_ms: u64,
    pub received_ms: u64,
}

#[derive(Debug, Default)]
struct ClientLink {
    /// Items this client reported ready since the last retarget.
    ready: BTreeSet<usize>,
    status: Option<ClientStatus>,
}

pub struct PlaybackController {
    config: AppConfig,
    assets: Arc<dyn AssetResolver>,
    store: Box<dyn StateStore + Send>,
    timeline: Option<Arc<Timeline>>,
    current_index: usize,
    pending_target: Option<usize>,
    /// Underlying state; the blackout overlay is tracked separately.
    state: ShowState,
    blackout: bool,
    is_playing: bool,
    held: bool,
    clock: ControlClock,
    epoch: u64,
    /// Epoch of the last change of target item. Readiness reports older than
    /// this belong to a superseded target.
    target_epoch: u64,
    timers: TimerQueue,
    clients: BTreeMap<ClientId, ClientLink>,
    throttle: ParamThrottle,
    volume: f32,
    theme_id: Option<String>,
    outbox: Vec<Envelope>,
    history: VecDeque<StateChange>,
}

impl PlaybackController {
    pub fn new(
        config: AppConfig,
        assets: Arc<dyn AssetResolver>,
        store: Box<dyn StateStore + Send>,
    ) -> Self {
        Self {
            clock: ControlClock::new(config.clock.clone()),
            throttle: ParamThrottle::new(config.params.min_emit_interval_ms),
            config,
            assets,
            store,
            timeline: None,
            current_index: 0,
            pending_target: None,
            state: ShowState::Idle,
            blackout: false,
            is_playing: false,
            held: false,
            epoch: 0,
            target_epoch: 0,
            timers: TimerQueue::new(),
            clients: BTreeMap::new(),
            volume: 1.0,
            theme_id: None,
            outbox: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Builds a controller from whatever `store` persisted before a restart.
    /// Nothing is sent until a client connects.
    pub fn restore(
        config: AppConfig,
        assets: Arc<dyn AssetResolver>,
        store: Box<dyn StateStore + Send>,
        now_ms: u64,
    ) -> Result<Self> {
        let restored = recovery::restore(store.as_ref())?;
        let mut controller = Self::new(config, assets, store);
        if let Some(restored) = restored {
            controller.resume_from(restored, now_ms);
        }
        Ok(controller)
    }

    fn resume_from(&mut self, restored: Restored, now_ms: u64) {
        self.epoch += 1;
        self.target_epoch = self.epoch;
        self.theme_id = Some(restored.timeline.theme_id.clone());
        self.timeline = Some(Arc::new(restored.timeline));
        self.current_index = restored.current_index;
        self.is_playing = restored.is_playing;
        self.clock.reset();
        self.clock.seek(restored.timecode_ms, now_ms);
        let state = if restored.is_playing {
            ShowState::Playing
        } else {
            ShowState::Paused
        };
        self.set_state(state, now_ms);
        self.sync_clock(now_ms);
        self.arm_item_end(now_ms);
        info!(
            index = self.current_index,
            timecode_ms = restored.timecode_ms,
            state = %state,
            "restored playback state"
        );
    }

    /// Public state, with the blackout overlay applied.
    pub fn state(&self) -> ShowState {
        if self.blackout {
            ShowState::Blackout
        } else {
            self.state
        }
    }

    /// State of the machine under the blackout overlay.
    pub fn underlying_state(&self) -> ShowState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn target_index(&self) -> usize {
        self.pending_target.unwrap_or(self.current_index)
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.clock.elapsed(now_ms)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn timeline(&self) -> Option<&Arc<Timeline>> {
        self.timeline.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn history(&self) -> impl Iterator<Item = &StateChange> {
        self.history.iter()
    }

    /// Earliest pending deadline, useful for sleeping until the next tick.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_due()
    }

    pub fn connected_clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    pub fn client_status(&self, client: ClientId) -> Option<&ClientStatus> {
        self.clients.get(&client).and_then(|link| link.status.as_ref())
    }

    pub fn snapshot(&self, now_ms: u64) -> PlaybackState {
        PlaybackState {
            timeline: self.timeline.clone(),
            current_index: self.current_index,
            target_index: self.target_index(),
            elapsed_ms: self.clock.elapsed(now_ms),
            is_playing: self.is_playing,
            held: self.held,
            blackout: self.blackout,
            state: self.state(),
            epoch: self.epoch,
            volume: self.volume,
            theme_id: self.theme_id.clone(),
        }
    }

    /// Drains every directive queued since the last call.
    pub fn take_outbound(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    pub fn handle(&mut self, command: Command, now_ms: u64) -> CommandResult {
        match command {
            Command::Load(timeline) => self.load(timeline, now_ms),
            Command::Play(index) => self.play(index, now_ms),
            Command::Pause => self.pause(now_ms),
            Command::Jump(index) => self.jump(index, now_ms),
            Command::Skip(delta) => self.skip(delta, now_ms),
            Command::Hold(on) => self.hold(on, now_ms),
            Command::Blackout(on) => {
                self.blackout(on, now_ms);
                Ok(())
            }
            Command::SetVolume(volume) => {
                self.set_volume(volume);
                Ok(())
            }
            Command::SetTheme(id) => {
                self.set_theme(id);
                Ok(())
            }
            Command::SetTimecode(ms) => self.set_timecode(ms, now_ms),
            Command::Cue { cue_type, payload } => {
                self.cue(cue_type, payload);
                Ok(())
            }
            Command::UpdateParams(params) => {
                self.update_params(&params, now_ms);
                Ok(())
            }
        }
    }

    /// Loads `timeline` and resets playback to its first item, paused.
    pub fn load(&mut self, timeline: Timeline, now_ms: u64) -> CommandResult {
        timeline.validate()?;
        if let Err(err) = self.store.save_timeline(&timeline) {
            warn!(%err, timeline = %timeline.id, "failed to persist timeline");
        }

        let epoch = self.bump_epoch(&[]);
        self.target_epoch = epoch;
        info!(timeline = %timeline.id, items = timeline.len(), epoch, "loading timeline");

        self.theme_id = Some(timeline.theme_id.clone());
        let directive = Directive::LoadTimeline {
            timeline: timeline.clone(),
            epoch,
        };
        self.timeline = Some(Arc::new(timeline));
        self.current_index = 0;
        self.pending_target = None;
        self.is_playing = false;
        self.held = false;
        self.clock.reset();
        self.throttle.clear();
        self.clear_readiness();
        self.broadcast(directive);
        self.enter_loading(now_ms);
        Ok(())
    }

    /// Starts or resumes playback. With an index, playback restarts from that
    /// item through a transition.
    pub fn play(&mut self, index: Option<i64>, now_ms: u64) -> CommandResult {
        let timeline = self.require_timeline()?;
        if let Some(index) = index {
            let target = timeline.check_index(index)?;
            info!(index = target, "play from item");
            self.is_playing = true;
            self.begin_change(target, now_ms)?;
            self.broadcast(Directive::Play {
                index: None,
                epoch: self.epoch,
            });
            return Ok(());
        }

        match self.state {
            ShowState::Playing if self.is_playing => return Ok(()),
            ShowState::Idle => {
                info!("play from the top");
                self.is_playing = true;
                self.begin_change(0, now_ms)?;
            }
            _ => {
                self.is_playing = true;
                self.bump_epoch(&CARRIED_TIMERS);
                if self.state == ShowState::Paused {
                    self.set_state(ShowState::Playing, now_ms);
                }
                self.sync_clock(now_ms);
                self.arm_item_end(now_ms);
                info!(state = %self.state, elapsed_ms = self.clock.elapsed(now_ms), "play");
                if self.state == ShowState::Playing {
                    self.broadcast_timecode(now_ms);
                }
            }
        }
        self.broadcast(Directive::Play {
            index: None,
            epoch: self.epoch,
        });
        self.persist(now_ms);
        Ok(())
    }

    pub fn pause(&mut self, now_ms: u64) -> CommandResult {
        self.require_timeline()?;
        if !self.is_playing {
            return Ok(());
        }
        self.is_playing = false;
        self.bump_epoch(&CARRIED_TIMERS);
        if self.state == ShowState::Playing {
            self.set_state(ShowState::Paused, now_ms);
        }
        self.sync_clock(now_ms);
        info!(elapsed_ms = self.clock.elapsed(now_ms), "paused");
        self.broadcast(Directive::Pause {});
        self.broadcast_timecode(now_ms);
        self.persist(now_ms);
        Ok(())
    }

    /// Moves to `index` through a transition. Jumping to the current item
    /// re-enters it.
    pub fn jump(&mut self, index: i64, now_ms: u64) -> CommandResult {
        let timeline = self.require_timeline()?;
        let target = timeline.check_index(index)?;
        info!(index = target, "jump");
        self.begin_change(target, now_ms)
    }

    /// Moves `delta` items from the current target. Past either end the
    /// configured end behavior decides between stopping and wrapping.
    pub fn skip(&mut self, delta: i64, now_ms: u64) -> CommandResult {
        let timeline = self.require_timeline()?;
        let base = self.target_index();
        info!(delta, from = base, "skip");
        match self
            .config
            .playback
            .end_behavior
            .resolve(base, delta, timeline.len())
        {
            Some(target) => self.begin_change(target, now_ms),
            None => {
                self.stop(now_ms);
                Ok(())
            }
        }
    }

    /// Freezes item time without changing the public state.
    pub fn hold(&mut self, on: bool, now_ms: u64) -> CommandResult {
        self.require_timeline()?;
        if self.held == on {
            return Ok(());
        }
        self.held = on;
        self.bump_epoch(&CARRIED_TIMERS);
        self.sync_clock(now_ms);
        self.arm_item_end(now_ms);
        info!(on, elapsed_ms = self.clock.elapsed(now_ms), "hold");
        self.broadcast(Directive::Hold { on });
        self.broadcast_timecode(now_ms);
        self.persist(now_ms);
        Ok(())
    }

    /// Toggles the blackout overlay. The machine underneath keeps running.
    pub fn blackout(&mut self, on: bool, now_ms: u64) {
        if self.blackout == on {
            return;
        }
        self.blackout = on;
        info!(on, underlying = %self.state, "blackout");
        let (from, to) = if on {
            (self.state, ShowState::Blackout)
        } else {
            (ShowState::Blackout, self.state)
        };
        self.push_history(now_ms, from, to);
        self.broadcast(Directive::Blackout { on });
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            warn!("ignoring NaN volume");
            return;
        }
        self.volume = volume.clamp(0.0, 1.0);
        info!(volume = self.volume, "volume");
        self.broadcast(Directive::SetVolume {
            volume: self.volume,
        });
    }

    pub fn set_theme(&mut self, id: String) {
        info!(theme = %id, "theme");
        self.theme_id = Some(id.clone());
        self.broadcast(Directive::SetTheme { id });
    }

    /// Seeks within the current item.
    pub fn set_timecode(&mut self, ms: u64, now_ms: u64) -> CommandResult {
        self.require_timeline()?;
        self.bump_epoch(&CARRIED_TIMERS);
        self.clock.seek(ms, now_ms);
        self.arm_item_end(now_ms);
        info!(ms, "seek");
        self.broadcast_timecode(now_ms);
        self.persist(now_ms);
        Ok(())
    }

    /// Side-channel effect trigger; never touches playback state.
    pub fn cue(&mut self, cue_type: String, payload: Value) {
        info!(cue = %cue_type, "cue");
        self.broadcast(Directive::Cue { cue_type, payload });
    }

    /// Queues a partial parameter update for the active scene. Bursts are
    /// merged and released at a bounded rate from [`Self::tick`].
    pub fn update_params(&mut self, partial: &Params, now_ms: u64) {
        self.throttle.push(partial);
        self.flush_params(now_ms);
    }

    /// Advances internal deadlines and periodic broadcasts to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        while let Some(timer) = self.timers.pop_due(now_ms) {
            if timer.epoch != self.epoch {
                debug!(
                    kind = ?timer.kind,
                    timer_epoch = timer.epoch,
                    epoch = self.epoch,
                    "dropping stale timer"
                );
                continue;
            }
            self.fire(timer);
        }

        self.flush_params(now_ms);

        if self.state == ShowState::Playing && self.clock.broadcast_due(now_ms) {
            debug!(elapsed_ms = self.clock.elapsed(now_ms), "timecode broadcast");
            self.broadcast_timecode(now_ms);
        }
    }

    /// Registers a (re)connecting client and queues the replay that brings
    /// it to the current playback state.
    pub fn connect(&mut self, client: ClientId, now_ms: u64) {
        self.clients.insert(client, ClientLink::default());
        let directives = recovery::replay(&self.snapshot(now_ms));
        info!(client, directives = directives.len(), "client connected");
        self.outbox.extend(
            directives
                .into_iter()
                .map(|directive| Envelope::to_client(client, directive)),
        );
    }

    pub fn disconnect(&mut self, client: ClientId, now_ms: u64) {
        if self.clients.remove(&client).is_some() {
            info!(client, "client disconnected");
            self.check_ready(now_ms);
        }
    }

    pub fn on_telemetry(&mut self, client: ClientId, telemetry: Telemetry, now_ms: u64) {
        if !self.clients.contains_key(&client) {
            debug!(client, kind = telemetry.name(), "telemetry from unknown client");
            return;
        }
        match telemetry {
            Telemetry::Status {
                fps,
                scene_id,
                item_index,
                timecode_ms,
                epoch,
                ..
            } => {
                let status = ClientStatus {
                    fps,
                    scene_id,
                    item_index,
                    timecode_ms,
                    received_ms: now_ms,
                };
                self.on_status(client, status, epoch, now_ms);
            }
            Telemetry::PreloadDone { scene_id, epoch } => {
                self.on_preload_done(client, &scene_id, epoch, now_ms)
            }
            Telemetry::Error {
                code,
                message,
                context,
            } => self.on_client_error(client, &code, &message, &context, now_ms),
        }
    }

    fn on_status(&mut self, client: ClientId, status: ClientStatus, epoch: u64, now_ms: u64) {
        if epoch < self.target_epoch {
            debug!(client, epoch, "dropping stale status");
            return;
        }
        let item_index = status.item_index;
        let reported = status.timecode_ms;
        if let Some(link) = self.clients.get_mut(&client) {
            link.status = Some(status);
        }

        if self.state != ShowState::Playing
            || self.held
            || item_index != Some(self.current_index)
        {
            return;
        }
        if let Some(drift_ms) = self.clock.drift(reported, now_ms) {
            warn!(client, drift_ms, "client clock drifted; correcting");
            self.broadcast_timecode(now_ms);
        }
    }

    fn on_preload_done(&mut self, client: ClientId, scene_id: &str, epoch: u64, now_ms: u64) {
        if epoch < self.target_epoch {
            debug!(client, scene_id, epoch, "dropping stale readiness");
            return;
        }
        let Some(index) = self.timeline.as_ref().and_then(|t| t.index_of(scene_id)) else {
            debug!(client, scene_id, "readiness for unknown item");
            return;
        };
        if let Some(link) = self.clients.get_mut(&client) {
            link.ready.insert(index);
        }
        debug!(client, scene_id, index, "client ready");
        self.check_ready(now_ms);
    }

    fn on_client_error(
        &mut self,
        client: ClientId,
        code: &str,
        message: &str,
        context: &Value,
        now_ms: u64,
    ) {
        let epoch = context
            .get("epoch")
            .and_then(Value::as_u64)
            .unwrap_or(self.epoch);
        if epoch < self.target_epoch {
            debug!(client, code, epoch, "dropping stale error report");
            return;
        }
        let item_index = context
            .get("itemIndex")
            .and_then(Value::as_u64)
            .map(|index| index as usize);
        let recoverable = is_load_code(code) || code == "SCENE_RENDER";
        if !recoverable || item_index.is_some_and(|index| index != self.target_index()) {
            warn!(client, code, message, ?item_index, "client reported a warning");
            return;
        }
        match self.state {
            ShowState::Loading
            | ShowState::Transitioning
            | ShowState::Playing
            | ShowState::Paused => self.enter_error(code, message, now_ms),
            state => debug!(client, code, %state, "error already being handled"),
        }
    }

    fn fire(&mut self, timer: Timer) {
        let at = timer.due_ms;
        match (timer.kind, self.state) {
            (TimerKind::ItemEnd, ShowState::Playing) => self.advance(at),
            (TimerKind::TransitionDone, ShowState::Transitioning) => self.finish_transition(at),
            (TimerKind::LoadTimeout, ShowState::Loading) => {
                let item_id = self
                    .timeline
                    .as_ref()
                    .and_then(|t| t.item(self.current_index))
                    .map(|item| item.id.clone())
                    .unwrap_or_default();
                let err = LoadError::Timeout {
                    item_id,
                    timeout_ms: self.config.playback.load_timeout_ms,
                };
                self.enter_error(err.code(), &err.to_string(), at);
            }
            (TimerKind::ErrorHold, ShowState::Error) => self.error_advance(at),
            (kind, state) => debug!(?kind, %state, "timer does not apply to state"),
        }
    }

    /// Starts the change of item to `target`: TRANSITIONING for the length
    /// of the chosen transition, then LOADING.
    fn begin_change(&mut self, target: usize, now_ms: u64) -> CommandResult {
        let timeline = self.require_timeline()?;
        let spec = timeline.transition_between(
            Some(self.current_index),
            target,
            &self.config.playback.default_transition,
        )?;

        let epoch = self.bump_epoch(&[]);
        self.target_epoch = epoch;
        self.pending_target = Some(target);
        self.clear_readiness();
        self.throttle.clear();
        self.clock.reset();
        info!(from = self.current_index, to = target, transition = %spec, epoch, "changing item");

        self.set_state(ShowState::Transitioning, now_ms);
        self.sync_clock(now_ms);
        self.broadcast(Directive::Jump {
            index: target,
            epoch,
        });
        if spec.is_instant() {
            self.finish_transition(now_ms);
        } else {
            self.timers
                .arm(TimerKind::TransitionDone, now_ms + spec.duration_ms, epoch);
            self.persist(now_ms);
        }
        Ok(())
    }

    fn finish_transition(&mut self, now_ms: u64) {
        if let Some(target) = self.pending_target.take() {
            self.current_index = target;
        }
        self.enter_loading(now_ms);
    }

    fn enter_loading(&mut self, now_ms: u64) {
        self.set_state(ShowState::Loading, now_ms);
        self.sync_clock(now_ms);
        self.timers.arm(
            TimerKind::LoadTimeout,
            now_ms + self.config.playback.load_timeout_ms,
            self.epoch,
        );
        self.persist(now_ms);
        self.check_ready(now_ms);
    }

    /// Leaves LOADING once every connected client has the current item ready.
    fn check_ready(&mut self, now_ms: u64) {
        if self.state != ShowState::Loading {
            return;
        }
        let index = self.current_index;
        if !self.clients.values().all(|link| link.ready.contains(&index)) {
            return;
        }
        self.timers.cancel(TimerKind::LoadTimeout);
        if self.is_playing {
            self.set_state(ShowState::Playing, now_ms);
            self.sync_clock(now_ms);
            self.arm_item_end(now_ms);
            self.broadcast_timecode(now_ms);
        } else {
            self.set_state(ShowState::Paused, now_ms);
        }
        self.persist(now_ms);
    }

    /// The current item ran out.
    fn advance(&mut self, now_ms: u64) {
        let len = self.timeline.as_ref().map_or(0, |t| t.len());
        match self
            .config
            .playback
            .end_behavior
            .resolve(self.current_index, 1, len)
        {
            Some(next) => {
                if let Err(err) = self.begin_change(next, now_ms) {
                    warn!(%err, next, "cannot advance");
                }
            }
            None => self.stop(now_ms),
        }
    }

    fn enter_error(&mut self, code: &str, message: &str, now_ms: u64) {
        if let Some(target) = self.pending_target.take() {
            self.current_index = target;
        }
        self.bump_epoch(&[]);
        warn!(code, message, index = self.current_index, "item failed; holding on fallback");
        self.set_state(ShowState::Error, now_ms);
        self.sync_clock(now_ms);
        self.timers.arm(
            TimerKind::ErrorHold,
            now_ms + self.config.playback.error_hold_ms,
            self.epoch,
        );
        self.persist(now_ms);
    }

    /// ERROR is over: load the next item directly, or stop at the end.
    fn error_advance(&mut self, now_ms: u64) {
        let len = self.timeline.as_ref().map_or(0, |t| t.len());
        let Some(next) = self
            .config
            .playback
            .end_behavior
            .resolve(self.current_index, 1, len)
        else {
            self.stop(now_ms);
            return;
        };
        let epoch = self.bump_epoch(&[]);
        self.target_epoch = epoch;
        self.current_index = next;
        self.clear_readiness();
        self.throttle.clear();
        self.clock.reset();
        info!(index = next, epoch, "skipping past failed item");
        self.broadcast(Directive::Jump { index: next, epoch });
        self.enter_loading(now_ms);
    }

    fn stop(&mut self, now_ms: u64) {
        self.bump_epoch(&[]);
        self.is_playing = false;
        self.pending_target = None;
        self.set_state(ShowState::Idle, now_ms);
        self.sync_clock(now_ms);
        info!(index = self.current_index, "show stopped");
        self.broadcast(Directive::Stop {});
        self.persist(now_ms);
    }

    /// Starts a new epoch. Pending timers of the `keep` kinds are carried
    /// over; every other pending timer goes stale.
    fn bump_epoch(&mut self, keep: &[TimerKind]) -> u64 {
        self.epoch += 1;
        for kind in keep {
            self.timers.retag(*kind, self.epoch);
        }
        self.epoch
    }

    fn require_timeline(&self) -> std::result::Result<Arc<Timeline>, CommandError> {
        self.timeline.clone().ok_or(CommandError::NoTimeline)
    }

    fn clear_readiness(&mut self) {
        for link in self.clients.values_mut() {
            link.ready.clear();
        }
    }

    fn clock_should_run(&self) -> bool {
        self.is_playing
            && !self.held
            && matches!(self.state, ShowState::Playing | ShowState::Transitioning)
    }

    fn sync_clock(&mut self, now_ms: u64) {
        if self.clock_should_run() {
            self.clock.start(now_ms);
        } else {
            self.clock.freeze(now_ms);
        }
    }

    /// (Re)arms the end-of-item deadline from the remaining item time.
    fn arm_item_end(&mut self, now_ms: u64) {
        self.timers.cancel(TimerKind::ItemEnd);
        if self.state != ShowState::Playing || !self.clock_should_run() {
            return;
        }
        let duration = self
            .timeline
            .as_ref()
            .and_then(|t| t.item(self.current_index))
            .and_then(|item| item.resolved_duration_ms(self.assets.as_ref()));
        if let Some(duration) = duration {
            let remaining = duration.saturating_sub(self.clock.elapsed(now_ms));
            self.timers
                .arm(TimerKind::ItemEnd, now_ms + remaining, self.epoch);
        }
    }

    fn broadcast(&mut self, directive: Directive) {
        self.outbox.push(Envelope::broadcast(directive));
    }

    fn broadcast_timecode(&mut self, now_ms: u64) {
        let ms = self.clock.mark_broadcast(now_ms);
        self.broadcast(Directive::SetTimecode {
            ms,
            epoch: self.epoch,
        });
    }

    fn flush_params(&mut self, now_ms: u64) {
        if let Some(params) = self.throttle.poll(now_ms) {
            debug!(keys = params.len(), "parameter update");
            self.broadcast(Directive::UpdateParams { params });
        }
    }

    fn set_state(&mut self, to: ShowState, now_ms: u64) {
        let from = self.state;
        self.state = to;
        info!(%from, %to, index = self.current_index, epoch = self.epoch, "state change");
        self.push_history(now_ms, from, to);
    }

    fn push_history(&mut self, at_ms: u64, from: ShowState, to: ShowState) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(StateChange { at_ms, from, to });
    }

    fn persist(&mut self, now_ms: u64) {
        let state = PersistedState::new(
            self.timeline.as_ref().map(|t| t.id.clone()),
            self.current_index,
            self.clock.elapsed(now_ms),
            self.is_playing,
        );
        if let Err(err) = self.store.save_state(&state) {
            warn!(%err, "failed to persist playback state");
        }
    }
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state())
            .field("current_index", &self.current_index)
            .field("pending_target", &self.pending_target)
            .field("is_playing", &self.is_playing)
            .field("held", &self.held)
            .field("epoch", &self.epoch)
            .field("clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}
