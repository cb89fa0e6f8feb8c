//! In-process show session: one control side plus its rendering clients,
//! joined by ordered loopback channels that carry the JSON wire format.
//!
//! Time is supplied by the caller, so a whole show can be stepped
//! deterministically.

use std::{collections::BTreeMap, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    assets::AssetResolver,
    client::RenderClient,
    config::AppConfig,
    error::CommandError,
    playback::{Command, PlaybackController},
    protocol::{self, ClientId},
    scene::SceneRegistry,
    store::StateStore,
    Result,
};

pub struct ShowSession {
    config: AppConfig,
    registry: SceneRegistry,
    assets: Arc<dyn AssetResolver>,
    controller: PlaybackController,
    clients: BTreeMap<ClientId, RenderClient>,
}

impl ShowSession {
    pub fn new(
        config: AppConfig,
        assets: Arc<dyn AssetResolver>,
        store: Box<dyn StateStore + Send>,
    ) -> Self {
        let controller = PlaybackController::new(config.clone(), assets.clone(), store);
        Self::with_controller(config, assets, controller)
    }

    /// Resumes whatever `store` persisted before the control side went down.
    pub fn restore(
        config: AppConfig,
        assets: Arc<dyn AssetResolver>,
        store: Box<dyn StateStore + Send>,
        now_ms: u64,
    ) -> Result<Self> {
        let controller = PlaybackController::restore(config.clone(), assets.clone(), store, now_ms)?;
        Ok(Self::with_controller(config, assets, controller))
    }

    fn with_controller(
        config: AppConfig,
        assets: Arc<dyn AssetResolver>,
        controller: PlaybackController,
    ) -> Self {
        Self {
            config,
            registry: SceneRegistry::with_builtin(),
            assets,
            controller,
            clients: BTreeMap::new(),
        }
    }

    /// Replaces the scene registry used by clients connected from now on.
    pub fn with_registry(mut self, registry: SceneRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn client(&self, id: ClientId) -> Option<&RenderClient> {
        self.clients.get(&id)
    }

    pub fn clients(&self) -> impl Iterator<Item = &RenderClient> {
        self.clients.values()
    }

    /// Connects a fresh client under `id`. An existing client with the same
    /// id is dropped first, as when a display page reloads.
    pub fn connect(&mut self, id: ClientId, now_ms: u64) {
        if self.clients.remove(&id).is_some() {
            self.controller.disconnect(id, now_ms);
        }
        let client = RenderClient::new(
            id,
            self.config.clone(),
            self.registry.clone(),
            self.assets.clone(),
        );
        self.clients.insert(id, client);
        self.controller.connect(id, now_ms);
        self.deliver(now_ms);
    }

    pub fn disconnect(&mut self, id: ClientId, now_ms: u64) {
        if self.clients.remove(&id).is_some() {
            self.controller.disconnect(id, now_ms);
            self.deliver(now_ms);
        }
    }

    /// Runs an operator command and delivers the resulting directives.
    pub fn command(&mut self, command: Command, now_ms: u64) -> std::result::Result<(), CommandError> {
        let result = self.controller.handle(command, now_ms);
        if let Err(err) = &result {
            warn!(code = err.code(), %err, "command rejected");
        }
        self.deliver(now_ms);
        result
    }

    /// Advances the whole session to `now_ms`: control deadlines, directive
    /// delivery, one frame on every client, then telemetry back to control.
    pub fn step(&mut self, now_ms: u64) {
        self.controller.tick(now_ms);
        self.deliver(now_ms);

        let mut inbound = Vec::new();
        for (id, client) in &mut self.clients {
            client.frame(now_ms);
            inbound.extend(client.take_telemetry().into_iter().map(|t| (*id, t)));
        }
        for (id, telemetry) in inbound {
            if let Some(telemetry) = over_the_wire(&telemetry, protocol::decode_telemetry) {
                self.controller.on_telemetry(id, telemetry, now_ms);
            }
        }
        self.deliver(now_ms);
    }

    /// Steps from `from_ms` up to and including `until_ms` every `frame_ms`.
    pub fn run(&mut self, from_ms: u64, until_ms: u64, frame_ms: u64) {
        let frame_ms = frame_ms.max(1);
        let mut now = from_ms;
        while now <= until_ms {
            self.step(now);
            now += frame_ms;
        }
        info!(
            until_ms,
            state = %self.controller.state(),
            index = self.controller.current_index(),
            "session run finished"
        );
    }

    fn deliver(&mut self, now_ms: u64) {
        for envelope in self.controller.take_outbound() {
            let Some(directive) = over_the_wire(&envelope.directive, protocol::decode_directive) else {
                continue;
            };
            for (id, client) in &mut self.clients {
                if envelope.is_for(*id) {
                    client.receive(directive.clone(), now_ms);
                }
            }
        }
    }
}

/// Serializes and parses `message` the way a socket transport would.
fn over_the_wire<T, F>(message: &T, decode: F) -> Option<T>
where
    T: serde::Serialize,
    F: Fn(&str) -> Result<T>,
{
    let decoded = protocol::encode(message).and_then(|raw| {
        debug!(%raw, "wire");
        decode(&raw)
    });
    match decoded {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(%err, "dropping message that failed to round-trip");
            None
        }
    }
}
