//! A rendering client: applies directives from the control side, runs the
//! cooperative per-frame loop and reports telemetry.
//!
//! Each call to [`RenderClient::frame`] is one frame slot. Within it, in
//! order: pending preparation work, activation of the target item, lookahead
//! scheduling, scene rendering and blending, performance sampling, and the
//! periodic `STATUS` report.

use std::{fmt, sync::Arc};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    assets::AssetResolver,
    clock::ClientClock,
    config::AppConfig,
    error::SceneError,
    perf::{GovernorAction, PerformanceGovernor},
    preload::PreloadCoordinator,
    protocol::{ClientId, Directive, Telemetry},
    render::{Compositor, Frame, StageContext},
    scene::{Params, Scene, SceneRegistry},
    timeline::{Timeline, DEFAULT_THEME},
    transition::{ActiveScene, RenderFault, TransitionEngine, TransitionSpec},
};

pub struct RenderClient {
    id: ClientId,
    config: AppConfig,
    registry: SceneRegistry,
    assets: Arc<dyn AssetResolver>,
    timeline: Option<Arc<Timeline>>,
    /// Item the control side asked for.
    target: Option<usize>,
    target_duration_ms: Option<u64>,
    /// Whether the target (or its fallback) has gone on screen.
    target_shown: bool,
    /// Epoch of the directive that set the target.
    target_epoch: u64,
    /// Latest epoch seen on any directive.
    epoch: u64,
    next_spec: TransitionSpec,
    playing: bool,
    held: bool,
    clock: ClientClock,
    engine: TransitionEngine,
    preload: PreloadCoordinator<Box<dyn Scene>>,
    governor: PerformanceGovernor,
    stage: StageContext,
    compositor: Compositor,
    last_frame: Option<Frame>,
    last_frame_ms: Option<u64>,
    last_status_ms: Option<u64>,
    outbox: Vec<Telemetry>,
}

impl RenderClient {
    pub fn new(
        id: ClientId,
        config: AppConfig,
        registry: SceneRegistry,
        assets: Arc<dyn AssetResolver>,
    ) -> Self {
        Self {
            id,
            engine: TransitionEngine::new(config.transition.ease),
            preload: PreloadCoordinator::new(config.preload.clone()),
            governor: PerformanceGovernor::new(config.performance.clone()),
            config,
            registry,
            assets,
            timeline: None,
            target: None,
            target_duration_ms: None,
            target_shown: false,
            target_epoch: 0,
            epoch: 0,
            next_spec: TransitionSpec::CUT,
            playing: false,
            held: false,
            clock: ClientClock::new(),
            stage: StageContext::new(DEFAULT_THEME),
            compositor: Compositor::new(),
            last_frame: None,
            last_frame_ms: None,
            last_status_ms: None,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    /// Index and id of the scene that is (or is becoming) current.
    pub fn active_item(&self) -> Option<(usize, &str)> {
        self.engine
            .active()
            .map(|active| (active.item_index, active.item_id.as_str()))
    }

    /// Scene type key of the current scene, e.g. `"fallback"`.
    pub fn active_kind(&self) -> Option<&str> {
        self.engine.active().map(|active| active.scene.kind())
    }

    pub fn is_transitioning(&self) -> bool {
        self.engine.is_transitioning()
    }

    /// Live scene instances: on screen plus prepared ahead.
    pub fn instance_count(&self) -> usize {
        self.engine.instance_count() + self.preload.prepared_indices().count()
    }

    pub fn prepared_indices(&self) -> Vec<usize> {
        self.preload.prepared_indices().collect()
    }

    pub fn timecode_ms(&self, now_ms: u64) -> u64 {
        self.clock.project(now_ms)
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    pub fn is_degraded(&self) -> bool {
        self.governor.is_degraded()
    }

    pub fn stage(&self) -> &StageContext {
        &self.stage
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Drains telemetry produced since the last call.
    pub fn take_telemetry(&mut self) -> Vec<Telemetry> {
        std::mem::take(&mut self.outbox)
    }

    /// Applies one directive. Directives carrying an epoch older than one
    /// already seen are dropped.
    pub fn receive(&mut self, directive: Directive, now_ms: u64) {
        if let Some(epoch) = directive.epoch() {
            if epoch < self.epoch {
                debug!(client = self.id, directive = directive.name(), epoch, "dropping stale directive");
                return;
            }
            self.epoch = epoch;
        }
        debug!(client = self.id, directive = directive.name(), "directive");

        match directive {
            Directive::LoadTimeline { timeline, epoch } => self.load_timeline(timeline, epoch, now_ms),
            Directive::Play { index, epoch } => {
                if let Some(index) = index {
                    self.retarget(index, epoch, now_ms);
                }
                self.playing = true;
                self.sync_running(now_ms);
            }
            Directive::Pause {} => {
                self.playing = false;
                self.sync_running(now_ms);
            }
            Directive::Stop {} => self.stop(now_ms),
            Directive::Jump { index, epoch } => self.retarget(index, epoch, now_ms),
            Directive::Skip { delta } => {
                let len = self.timeline.as_ref().map_or(0, |t| t.len());
                let base = self.target.unwrap_or(0);
                if let Some(index) = self.config.playback.end_behavior.resolve(base, delta, len) {
                    self.retarget(index, self.epoch, now_ms);
                }
            }
            Directive::Hold { on } => {
                self.held = on;
                self.sync_running(now_ms);
            }
            Directive::Blackout { on } => self.stage.blackout = on,
            Directive::SetVolume { volume } => self.stage.set_volume(volume),
            Directive::SetTheme { id } => self.stage.theme_id = id,
            Directive::SetTimecode { ms, .. } => self.clock.sync(ms, now_ms),
            Directive::Cue { cue_type, payload } => {
                info!(client = self.id, cue = %cue_type, "cue");
                self.stage.push_cue(cue_type, payload, now_ms);
            }
            Directive::UpdateParams { params } => self.apply_params(&params),
        }
    }

    /// Runs one frame slot and returns the presented frame.
    pub fn frame(&mut self, now_ms: u64) -> &Frame {
        let delta_ms = self
            .last_frame_ms
            .map_or(0.0, |last| now_ms.saturating_sub(last) as f64);
        self.last_frame_ms = Some(now_ms);

        self.run_preload(now_ms);
        self.activate_target(now_ms);
        self.schedule_lookahead(now_ms);

        let timecode = self.clock.project(now_ms);
        let layers = match self.engine.frame(now_ms, delta_ms, timecode as f64) {
            Ok(layers) => layers,
            Err(fault) => {
                self.on_render_fault(fault, now_ms);
                self.engine
                    .frame(now_ms, delta_ms, timecode as f64)
                    .unwrap_or_default()
            }
        };
        let frame = self
            .compositor
            .compose(now_ms, timecode, layers, &mut self.stage);

        self.governor.record_frame(now_ms);
        if self.governor.check(now_ms) == GovernorAction::Degrade {
            self.degrade();
        }
        self.report_status(now_ms);
        self.last_frame.insert(frame)
    }

    fn load_timeline(&mut self, timeline: Timeline, epoch: u64, now_ms: u64) {
        info!(client = self.id, timeline = %timeline.id, items = timeline.len(), "timeline received");
        self.engine.clear();
        for scene in self.preload.clear() {
            dispose(scene);
        }
        self.stage.theme_id = timeline.theme_id.clone();
        self.timeline = Some(Arc::new(timeline));
        self.playing = false;
        self.held = false;
        self.clock = ClientClock::new();
        self.retarget(0, epoch, now_ms);
    }

    fn stop(&mut self, now_ms: u64) {
        info!(client = self.id, instances = self.instance_count(), "show stopped; releasing scenes");
        self.playing = false;
        self.sync_running(now_ms);
        self.engine.clear();
        for scene in self.preload.clear() {
            dispose(scene);
        }
        self.target = None;
        self.target_duration_ms = None;
        self.target_shown = false;
    }

    /// Points the client at `index`: superseded preparation is cancelled and
    /// the target is queued first.
    fn retarget(&mut self, index: usize, epoch: u64, now_ms: u64) {
        let Some(timeline) = self.timeline.clone() else {
            warn!(client = self.id, index, "jump before any timeline was loaded");
            return;
        };
        let Some(item) = timeline.item(index) else {
            warn!(client = self.id, index, items = timeline.len(), "jump out of range");
            return;
        };

        let from = self.engine.active().map(|active| active.item_index);
        self.next_spec = timeline
            .transition_between(from, index, &self.config.playback.default_transition)
            .unwrap_or(TransitionSpec::CUT);
        for scene in self.preload.retarget(index, epoch) {
            dispose(scene);
        }
        self.target = Some(index);
        self.target_duration_ms = item.resolved_duration_ms(self.assets.as_ref());
        self.target_shown = false;
        self.target_epoch = epoch;
        self.clock.sync(0, now_ms);
    }

    fn run_preload(&mut self, now_ms: u64) {
        let Some(timeline) = self.timeline.clone() else {
            return;
        };
        for _ in 0..self.preload.tasks_per_frame() {
            let Some(task) = self.preload.next_task() else {
                break;
            };
            let Some(item) = timeline.item(task.index) else {
                continue;
            };
            match self.registry.instantiate(item, self.assets.as_ref()) {
                Ok(scene) => {
                    debug!(client = self.id, item = %item.id, "scene prepared");
                    if let Err(stale) = self.preload.complete(task, scene) {
                        dispose(stale);
                    }
                }
                Err(err) => self.on_load_failure(task.index, &item.id, &err, now_ms),
            }
        }
    }

    fn activate_target(&mut self, now_ms: u64) {
        if self.target_shown {
            return;
        }
        let Some(index) = self.target else {
            return;
        };
        let Some(scene) = self.preload.take(index) else {
            return;
        };
        let item_id = scene_item_id(self.timeline.as_deref(), index);
        info!(client = self.id, item = %item_id, transition = %self.next_spec, "item on screen");
        self.engine
            .begin(ActiveScene::new(index, item_id.clone(), scene), self.next_spec, now_ms);
        self.target_shown = true;
        self.governor.reset_window();
        self.outbox.push(Telemetry::PreloadDone {
            scene_id: item_id,
            epoch: self.target_epoch,
        });
    }

    fn schedule_lookahead(&mut self, now_ms: u64) {
        if !self.target_shown {
            return;
        }
        let (Some(index), Some(duration)) = (self.target, self.target_duration_ms) else {
            return;
        };
        let len = self.timeline.as_ref().map_or(0, |t| t.len());
        let fraction = if duration == 0 {
            1.0
        } else {
            self.clock.project(now_ms) as f64 / duration as f64
        };
        if self
            .preload
            .maybe_lookahead(index, fraction, len, self.config.playback.end_behavior)
        {
            debug!(client = self.id, index, fraction, "preparing upcoming items");
        }
    }

    fn on_load_failure(&mut self, index: usize, item_id: &str, err: &SceneError, now_ms: u64) {
        warn!(client = self.id, item = item_id, code = err.code(), %err, "failed to prepare item");
        self.report(err, index, item_id);
        if self.target == Some(index) && !self.target_shown {
            self.show_fallback(index, item_id, &err.to_string(), now_ms);
        }
    }

    fn on_render_fault(&mut self, fault: RenderFault, now_ms: u64) {
        warn!(client = self.id, item = %fault.item_id, error = %fault.error, "scene render failed");
        self.report(&fault.error, fault.item_index, &fault.item_id);
        if self.target == Some(fault.item_index) {
            self.show_fallback(fault.item_index, &fault.item_id, &fault.error.to_string(), now_ms);
        }
    }

    fn show_fallback(&mut self, index: usize, item_id: &str, message: &str, now_ms: u64) {
        match self.registry.fallback(item_id, message) {
            Ok(scene) => self.engine.begin(
                ActiveScene::new(index, item_id, scene),
                TransitionSpec::CUT,
                now_ms,
            ),
            Err(err) => {
                warn!(client = self.id, %err, "no fallback scene available; clearing stage");
                self.engine.clear();
            }
        }
        self.target_shown = true;
        self.governor.reset_window();
    }

    fn apply_params(&mut self, params: &Params) {
        let Some(active) = self.engine.active_mut() else {
            debug!(client = self.id, "parameter update with nothing on screen");
            return;
        };
        let reports = active.scene.update_params(params);
        let (index, item_id) = (active.item_index, active.item_id.clone());
        for report in reports {
            debug!(client = self.id, item = %item_id, %report, "parameter corrected");
            self.report(&report, index, &item_id);
        }
    }

    fn degrade(&mut self) {
        let Some(active) = self.engine.active_mut() else {
            return;
        };
        if active.scene.reduce_complexity() {
            info!(client = self.id, item = %active.item_id, "reduced scene complexity");
        } else {
            debug!(client = self.id, item = %active.item_id, "scene has nothing left to reduce");
        }
    }

    fn report_status(&mut self, now_ms: u64) {
        let interval = self.config.clock.report_interval_ms;
        if self
            .last_status_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < interval)
        {
            return;
        }
        self.last_status_ms = Some(now_ms);

        let next_id = match (&self.timeline, self.target) {
            (Some(timeline), Some(index)) => self
                .config
                .playback
                .end_behavior
                .resolve(index, 1, timeline.len())
                .and_then(|next| timeline.item(next))
                .map(|item| item.id.clone()),
            _ => None,
        };
        let active = self.engine.active();
        self.outbox.push(Telemetry::Status {
            fps: self.governor.fps().unwrap_or(0.0),
            scene_id: active.map(|a| a.item_id.clone()),
            item_index: active.map(|a| a.item_index),
            timecode_ms: self.clock.project(now_ms),
            next_id,
            epoch: self.epoch,
        });
    }

    fn report(&mut self, err: &SceneError, item_index: usize, item_id: &str) {
        self.outbox.push(Telemetry::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            context: json!({
                "itemIndex": item_index,
                "itemId": item_id,
                "epoch": self.target_epoch,
            }),
        });
    }

    fn sync_running(&mut self, now_ms: u64) {
        self.clock.set_running(self.playing && !self.held, now_ms);
    }
}

impl Drop for RenderClient {
    fn drop(&mut self) {
        for scene in self.preload.clear() {
            dispose(scene);
        }
    }
}

impl fmt::Debug for RenderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderClient")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("epoch", &self.epoch)
            .field("engine", &self.engine)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

fn dispose(mut scene: Box<dyn Scene>) {
    scene.cleanup();
}

fn scene_item_id(timeline: Option<&Timeline>, index: usize) -> String {
    timeline
        .and_then(|t| t.item(index))
        .map(|item| item.id.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        assets::AssetStore,
        scene::{FrameContext, SceneResult},
        timeline::{Item, ItemDuration},
    };

    struct Flaky;

    impl Scene for Flaky {
        fn kind(&self) -> &str {
            "flaky"
        }

        fn init(&mut self, _params: &Params) -> SceneResult<Vec<SceneError>> {
            Ok(Vec::new())
        }

        fn update_params(&mut self, _partial: &Params) -> Vec<SceneError> {
            Vec::new()
        }

        fn render(&mut self, ctx: &FrameContext) -> SceneResult<()> {
            if ctx.time_ms > 100.0 {
                Err(SceneError::Render("shader exploded".into()))
            } else {
                Ok(())
            }
        }

        fn cleanup(&mut self) {}
    }

    fn timeline() -> Timeline {
        Timeline::new(
            "show",
            "Show",
            vec![
                Item::new("a", "text", ItemDuration::Millis(4000)),
                Item::new("b", "lissajous", ItemDuration::Millis(4000)).with_transition_in("fade:800"),
                Item::new("c", "countdown", ItemDuration::Millis(4000)),
            ],
        )
    }

    fn client() -> RenderClient {
        let mut registry = SceneRegistry::with_builtin();
        registry.register("flaky", |_| Ok(Box::new(Flaky)));
        RenderClient::new(1, AppConfig::default(), registry, Arc::new(AssetStore::new()))
    }

    fn loaded(timeline: Timeline) -> RenderClient {
        let mut client = client();
        client.receive(Directive::LoadTimeline { timeline, epoch: 1 }, 0);
        client.frame(0);
        client.take_telemetry();
        client
    }

    fn errors(telemetry: &[Telemetry]) -> Vec<&str> {
        telemetry
            .iter()
            .filter_map(|t| match t {
                Telemetry::Error { code, .. } => Some(code.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn load_prepares_and_shows_first_item() {
        let mut client = client();
        client.receive(Directive::LoadTimeline { timeline: timeline(), epoch: 1 }, 0);
        let frame = client.frame(0).clone();
        assert_eq!(frame.top_layer().map(|l| l.item_id.as_str()), Some("a"));
        assert_eq!(client.stage().theme_id, DEFAULT_THEME);

        let telemetry = client.take_telemetry();
        assert!(telemetry.contains(&Telemetry::PreloadDone { scene_id: "a".into(), epoch: 1 }));
        assert!(telemetry.iter().any(|t| t.name() == "STATUS"));
    }

    #[test]
    fn missing_asset_shows_fallback_and_reports() {
        let show = Timeline::new(
            "show",
            "Show",
            vec![
                Item::new("hero", "photo", ItemDuration::Millis(3000)).with_param("assetId", json!("p1")),
                Item::new("b", "text", ItemDuration::Millis(3000)),
            ],
        );
        let mut client = client();
        client.receive(Directive::LoadTimeline { timeline: show, epoch: 1 }, 0);
        client.frame(0);
        assert_eq!(client.active_kind(), Some("fallback"));
        assert_eq!(client.active_item(), Some((0, "hero")));

        let telemetry = client.take_telemetry();
        let error = telemetry
            .iter()
            .find(|t| t.name() == "ERROR")
            .cloned()
            .unwrap();
        match error {
            Telemetry::Error { code, context, .. } => {
                assert_eq!(code, "ASSET_MISSING");
                assert_eq!(context["itemIndex"], 0);
                assert_eq!(context["epoch"], 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!telemetry.iter().any(|t| t.name() == "PRELOAD_DONE"));
    }

    #[test]
    fn fade_blends_then_drops_the_outgoing_scene() {
        let mut client = loaded(timeline());
        client.receive(Directive::Jump { index: 1, epoch: 2 }, 1_000);
        client.frame(1_000);
        assert!(client.is_transitioning());
        assert_eq!(client.instance_count(), 2);

        let mid = client.frame(1_400).clone();
        assert_eq!(mid.layers.len(), 2);

        let done = client.frame(1_800).clone();
        assert_eq!(done.layers.len(), 1);
        assert_eq!(done.layers[0].item_id, "b");
        assert_eq!(done.layers[0].alpha, 1.0);
        assert_eq!(client.instance_count(), 1);
        assert!(client
            .take_telemetry()
            .contains(&Telemetry::PreloadDone { scene_id: "b".into(), epoch: 2 }));
    }

    #[test]
    fn superseded_jump_never_instantiates_its_target() {
        let mut client = loaded(timeline());
        client.receive(Directive::Jump { index: 2, epoch: 2 }, 500);
        client.receive(Directive::Jump { index: 0, epoch: 3 }, 510);
        client.frame(516);

        assert_eq!(client.active_item(), Some((0, "a")));
        assert!(client.prepared_indices().is_empty());
        assert_eq!(client.instance_count(), 1);
        let telemetry = client.take_telemetry();
        assert!(telemetry.contains(&Telemetry::PreloadDone { scene_id: "a".into(), epoch: 3 }));
        assert!(!telemetry
            .iter()
            .any(|t| matches!(t, Telemetry::PreloadDone { scene_id, .. } if scene_id == "c")));
    }

    #[test]
    fn interrupted_blend_leaves_no_stray_instance() {
        let mut client = loaded(timeline());
        client.receive(Directive::Jump { index: 1, epoch: 2 }, 1_000);
        client.frame(1_000);
        client.receive(Directive::Jump { index: 0, epoch: 3 }, 1_016);
        client.frame(1_016);
        assert!(client.instance_count() <= 2);

        client.frame(3_000);
        assert_eq!(client.active_item(), Some((0, "a")));
        assert_eq!(client.instance_count(), 1);
    }

    #[test]
    fn stale_jump_is_ignored() {
        let mut client = loaded(timeline());
        client.receive(Directive::Jump { index: 2, epoch: 5 }, 100);
        client.receive(Directive::Jump { index: 1, epoch: 4 }, 110);
        assert_eq!(client.target(), Some(2));
        assert_eq!(client.epoch(), 5);
    }

    #[test]
    fn lookahead_starts_at_threshold() {
        let mut client = loaded(timeline());
        client.receive(Directive::Play { index: None, epoch: 1 }, 0);
        let mut now = 0;
        while now < 2_900 {
            now += 100;
            client.frame(now);
        }
        assert!(client.prepared_indices().is_empty());
        // One preparation task per frame slot.
        client.frame(3_000);
        client.frame(3_100);
        assert_eq!(client.prepared_indices(), vec![1]);
        client.frame(3_200);
        assert_eq!(client.prepared_indices(), vec![1, 2]);

        client.receive(Directive::Jump { index: 1, epoch: 2 }, 3_300);
        assert_eq!(client.prepared_indices(), vec![1]);
    }

    #[test]
    fn render_fault_falls_back_and_reports() {
        let show = Timeline::new(
            "show",
            "Show",
            vec![
                Item::new("glitch", "flaky", ItemDuration::Millis(3000)),
                Item::new("b", "text", ItemDuration::Millis(3000)),
            ],
        );
        let mut client = loaded(show);
        client.receive(Directive::Play { index: None, epoch: 1 }, 0);
        client.frame(50);
        assert_eq!(client.active_kind(), Some("flaky"));

        let frame = client.frame(150).clone();
        assert_eq!(client.active_kind(), Some("fallback"));
        assert_eq!(frame.top_layer().map(|l| l.kind.as_str()), Some("fallback"));
        assert_eq!(errors(&client.take_telemetry()), vec!["SCENE_RENDER"]);
    }

    #[test]
    fn status_is_reported_about_once_a_second() {
        let mut client = loaded(timeline());
        client.receive(Directive::Play { index: None, epoch: 1 }, 0);
        let mut statuses = 0;
        for now in (16..3_000).step_by(16) {
            client.frame(now);
            statuses += client
                .take_telemetry()
                .iter()
                .filter(|t| t.name() == "STATUS")
                .count();
        }
        assert_eq!(statuses, 2);
    }

    #[test]
    fn timecode_follows_control_broadcasts() {
        let mut client = loaded(timeline());
        client.receive(Directive::Play { index: None, epoch: 1 }, 0);
        client.receive(Directive::SetTimecode { ms: 1_000, epoch: 1 }, 1_000);
        assert_eq!(client.timecode_ms(1_250), 1_250);
        client.receive(Directive::Hold { on: true }, 1_250);
        assert_eq!(client.timecode_ms(4_000), 1_250);
        client.receive(Directive::Pause {}, 4_000);
        client.receive(Directive::Hold { on: false }, 4_000);
        assert!(!client.is_playing());
    }

    #[test]
    fn stop_releases_every_scene() {
        let mut client = loaded(timeline());
        client.receive(Directive::Play { index: None, epoch: 1 }, 0);
        for now in (16..=160).step_by(16) {
            client.frame(now);
        }
        assert!(client.instance_count() >= 1);

        client.receive(Directive::Stop {}, 170);
        let frame = client.frame(176).clone();
        assert_eq!(client.instance_count(), 0);
        assert_eq!(client.active_item(), None);
        assert!(frame.layers.is_empty());
        assert!(!client.is_playing());

        client.receive(Directive::Jump { index: 1, epoch: 2 }, 200);
        client.frame(216);
        assert_eq!(client.active_item().map(|(index, _)| index), Some(1));
    }

    #[test]
    fn stage_directives_shape_the_frame() {
        let mut client = loaded(timeline());
        client.receive(Directive::SetTheme { id: "midnight".into() }, 10);
        client.receive(Directive::SetVolume { volume: 0.25 }, 10);
        client.receive(Directive::Cue { cue_type: "confetti".into(), payload: json!({}) }, 10);
        client.receive(Directive::Blackout { on: true }, 10);
        let frame = client.frame(16).clone();
        assert!(frame.blackout);
        assert!(frame.layers.is_empty());
        assert_eq!(frame.theme_id, "midnight");
        assert_eq!(frame.volume, 0.25);
        assert_eq!(frame.cues.len(), 1);
        assert_eq!(client.active_item(), Some((0, "a")));
    }

    #[test]
    fn invalid_parameter_updates_are_reported() {
        let mut client = loaded(timeline());
        client.receive(Directive::Jump { index: 1, epoch: 2 }, 100);
        client.frame(100);
        client.take_telemetry();
        let params = json!({ "a": 42 }).as_object().cloned().unwrap();
        client.receive(Directive::UpdateParams { params }, 120);
        assert_eq!(errors(&client.take_telemetry()), vec!["INVALID_PARAM"]);
    }

    #[test]
    fn slow_frames_degrade_the_active_scene_once() {
        let mut client = loaded(timeline());
        client.receive(Directive::Jump { index: 1, epoch: 2 }, 0);
        client.receive(Directive::Play { index: None, epoch: 2 }, 0);
        let mut now = 0;
        while now < 10_000 {
            now += 25;
            client.frame(now);
        }
        assert!(client.is_degraded());
    }
}
