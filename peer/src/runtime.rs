//! Peer runtime: the event loop every peer runs
//!
//! One tokio task owns a [`PeerRuntime`] and everything in it: the session
//! coordinator, the replicated mirror and, while this peer is the host, the
//! authoritative simulation. Nothing is shared across tasks, so no locks.
//!
//! The loop selects over:
//! - transport events from every link (messages and closes)
//! - directory events (peers joining and leaving)
//! - local commands (input, purchases, casts)
//! - the host tick interval, acted on only while this peer hosts
//! - the latency probe interval
//! - the bootstrap deadline
//!
//! When the host's link closes, the coordinator names the successor. If that
//! is us, a fresh simulation is built from the mirror and starts ticking on
//! the next interval; held keys and intents parked while the host was
//! unreachable are resent to whoever hosts now.

use crate::error::SessionError;
use crate::input::InputSampler;
use crate::latency::LatencyProbe;
use crate::mirror::ReplicatedMirror;
use crate::session::{Route, SessionCoordinator, SessionEvent};
use crate::transport::{DirectoryEvent, TransportEvent};
use host::intents::{validate_cast, IntentView};
use host::navigation::PathPlanner;
use host::{AuthoritativeSimulation, CastOutcome, HostSettings, Phase};
use log::{debug, error, info, warn};
use shared::{
    Character, ClientId, Combatant, ControlState, GarrisonDirection, HostEvent, Intent, Message, SpellId, UnitClass,
    Vector2,
};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// Intents held for a host role we might be about to take over.
const MAX_EARLY_INTENTS: usize = 256;

/// Everything a peer needs to know before it joins.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub local: ClientId,
    pub initial_host: ClientId,
    pub settings: HostSettings,
    pub character: Character,
    /// Peers, us included, that must be connected before we declare ready.
    pub expected_peers: usize,
    pub probe_every: Duration,
    pub bootstrap_timeout: Duration,
}

impl RuntimeConfig {
    pub fn new(local: ClientId, initial_host: ClientId, settings: HostSettings) -> Self {
        Self {
            expected_peers: settings.config.n_player_game,
            bootstrap_timeout: Duration::from_millis(settings.config.bootstrap_timeout_ms),
            probe_every: Duration::from_secs(1),
            character: Character::ai_default(),
            local,
            initial_host,
            settings,
        }
    }
}

/// Requests from the local player
#[derive(Debug)]
pub enum Command {
    Controls(ControlState),
    BuyUnits {
        n: u32,
    },
    BuySpell {
        spell: SpellId,
    },
    CastSpell {
        position: Vector2,
        spell: SpellId,
        reply: Option<oneshot::Sender<CastOutcome>>,
    },
    Garrison {
        n: u32,
        direction: GarrisonDirection,
    },
    Pause,
    Resume,
    Shutdown,
}

/// What the runtime reports to whoever is watching it
#[derive(Debug, Clone)]
pub enum Notice {
    Host(HostEvent),
    Session(SessionEvent),
}

pub struct RuntimeHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

pub struct PeerRuntime {
    config: RuntimeConfig,
    session: SessionCoordinator,
    mirror: ReplicatedMirror,
    simulation: Option<AuthoritativeSimulation>,
    planner: PathPlanner,
    probe: LatencyProbe,
    input: InputSampler,
    controls: ControlState,
    ready_sent: bool,
    /// Intents that reached us before we knew we were the host
    early_intents: Vec<(ClientId, Intent)>,

    // Communication channels
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    directory_rx: mpsc::UnboundedReceiver<DirectoryEvent>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    notices_tx: mpsc::UnboundedSender<Notice>,
}

impl PeerRuntime {
    pub fn new(
        config: RuntimeConfig,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        directory_rx: mpsc::UnboundedReceiver<DirectoryEvent>,
    ) -> (Self, RuntimeHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let game = &config.settings.config;
        let simulation = (config.local == config.initial_host).then(|| {
            let mut sim = AuthoritativeSimulation::new(config.settings.clone());
            sim.add_peer(config.local.clone());
            sim
        });
        let runtime = Self {
            session: SessionCoordinator::new(config.local.clone(), config.initial_host.clone()),
            mirror: ReplicatedMirror::new(game.clone()),
            planner: PathPlanner::from_level(&config.settings.level, game.nav_scale),
            probe: LatencyProbe::new(Duration::from_millis(u64::from(game.latency_timeout_ms))),
            input: InputSampler::new(),
            controls: ControlState::default(),
            ready_sent: false,
            early_intents: Vec::new(),
            simulation,
            transport_rx,
            directory_rx,
            commands_rx,
            notices_tx,
            config,
        };
        let handle = RuntimeHandle {
            commands: commands_tx,
            notices: notices_rx,
        };
        (runtime, handle)
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    pub fn mirror(&self) -> &ReplicatedMirror {
        &self.mirror
    }

    /// Runs until shutdown, the command handle is dropped, or nobody is left to host.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let tick_rate = self.config.settings.tick_rate.max(1);
        let mut tick_interval = interval(Duration::from_secs_f64(1.0 / f64::from(tick_rate)));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probe_interval = interval(self.config.probe_every);
        probe_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let bootstrap = tokio::time::sleep(self.config.bootstrap_timeout);
        tokio::pin!(bootstrap);
        let mut bootstrap_pending = true;

        info!(
            "Peer {} running at {}Hz, initial host {}",
            self.config.local, tick_rate, self.config.initial_host
        );
        self.maybe_ready();

        loop {
            let ended = tokio::select! {
                Some(event) = self.transport_rx.recv() => self.handle_transport(event),
                Some(event) = self.directory_rx.recv() => self.handle_directory(event),
                command = self.commands_rx.recv() => match command {
                    Some(Command::Shutdown) | None => true,
                    Some(command) => {
                        self.handle_command(command);
                        false
                    }
                },
                _ = tick_interval.tick() => {
                    self.host_tick();
                    false
                },
                _ = probe_interval.tick() => {
                    self.probe_round();
                    false
                },
                _ = &mut bootstrap, if bootstrap_pending => {
                    bootstrap_pending = false;
                    if let Err(e) = self.bootstrap_deadline() {
                        self.session.close_all();
                        return Err(e);
                    }
                    false
                },
            };
            if ended {
                break;
            }
        }

        info!("Peer {} shutting down", self.config.local);
        self.session.close_all();
        Ok(())
    }

    fn notify(&self, notice: Notice) {
        // observers are optional; a dropped receiver is fine
        let _ = self.notices_tx.send(notice);
    }

    fn handle_transport(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Message { from, message } => {
                self.handle_message(from, message);
                false
            }
            TransportEvent::Closed { peer } => self.peer_gone(&peer),
        }
    }

    fn handle_directory(&mut self, event: DirectoryEvent) -> bool {
        match event {
            DirectoryEvent::PeerJoined { id, link } => {
                self.session.add_peer(id.clone(), link);
                if self.session.is_host() {
                    if let Some(sim) = self.simulation.as_mut() {
                        sim.add_peer(id);
                    }
                }
                self.maybe_ready();
                false
            }
            DirectoryEvent::PeerLeft { id } => self.peer_gone(&id),
        }
    }

    fn handle_message(&mut self, from: ClientId, message: Message) {
        match message {
            Message::Hello { id } => warn!("Unexpected hello from {} on the link to {}", id, from),
            Message::Intent { sender, intent } => {
                if sender != from {
                    warn!("{} sent an intent on behalf of {}", from, sender);
                    return;
                }
                match intent {
                    Intent::Ping { code } => {
                        let pong = Message::Intent {
                            sender: self.config.local.clone(),
                            intent: Intent::Pong { code },
                        };
                        if let Err(e) = self.session.send_to(&from, &pong) {
                            warn!("Failed to answer ping from {}: {}", from, e);
                        }
                    }
                    Intent::Pong { code } => {
                        if let Some(rtt) = self.probe.on_pong(&from, &code, Instant::now()) {
                            debug!("Round trip to {}: {}ms", from, rtt);
                        }
                    }
                    intent => {
                        let hosting = self.session.is_host();
                        match self.simulation.as_mut() {
                            Some(sim) if hosting => sim.submit(from, intent),
                            _ => self.hold_early(from, intent),
                        }
                    }
                }
            }
            Message::Host(event) => {
                if self.session.host() != Some(&from) {
                    debug!("Ignoring host event from {} which is not the host", from);
                    return;
                }
                self.apply_host_event(event);
            }
        }
    }

    fn apply_host_event(&mut self, event: HostEvent) {
        if let HostEvent::PeriodicUpdate(update) = &event {
            self.session.set_host_priority(&update.host_priority);
        }
        self.mirror.apply(&event);
        self.notify(Notice::Host(event));
    }

    /// Handles a departure; returns true when the session is over.
    fn peer_gone(&mut self, peer: &ClientId) -> bool {
        self.probe.forget(peer);
        let Some(event) = self.session.on_peer_closed(peer) else {
            return false;
        };
        self.notify(Notice::Session(event.clone()));
        match event {
            SessionEvent::PeerLeft { id } => {
                if let Some(sim) = self.simulation.as_mut() {
                    sim.handle_disconnect(&id);
                }
                self.flush_host_events();
                false
            }
            SessionEvent::HostMigrated { is_local, .. } => {
                if is_local {
                    self.promote(peer);
                } else if !self.early_intents.is_empty() {
                    debug!("{} held intents belong to the new host", self.early_intents.len());
                    self.early_intents.clear();
                }
                self.input.resync();
                for intent in self.input.update(self.controls) {
                    self.route(intent);
                }
                for intent in self.session.take_deferred() {
                    self.route(intent);
                }
                false
            }
            SessionEvent::SessionEnded => true,
        }
    }

    /// Becomes the host after `old_host` left.
    fn promote(&mut self, old_host: &ClientId) {
        let roster: Vec<ClientId> = std::iter::once(self.config.local.clone())
            .chain(self.session.peers().cloned())
            .collect();

        if !self.mirror.is_bootstrapped() {
            info!("Host {} left before the game started, reopening the lobby", old_host);
            let mut sim = AuthoritativeSimulation::new(self.config.settings.clone());
            for id in roster {
                sim.add_peer(id);
            }
            self.simulation = Some(sim);
            // our earlier ready went to the old host
            if self.ready_sent {
                self.route(Intent::ReadyToJoin {
                    character: self.config.character.clone(),
                });
            } else {
                self.maybe_ready();
            }
            self.replay_early_intents();
            return;
        }

        let mut sim = AuthoritativeSimulation::from_snapshot(self.config.settings.clone(), self.mirror.snapshot(), roster);
        if self.mirror.is_paused() {
            sim.pause();
        }
        sim.handle_disconnect(old_host);
        self.simulation = Some(sim);
        self.replay_early_intents();
    }

    /// Keeps an intent sent to us by a peer that already sees us as host.
    fn hold_early(&mut self, from: ClientId, intent: Intent) {
        if self.early_intents.len() >= MAX_EARLY_INTENTS {
            warn!("Too many intents before becoming host, dropping one from {}", from);
            return;
        }
        debug!("Holding intent from {} until the host is settled", from);
        self.early_intents.push((from, intent));
    }

    fn replay_early_intents(&mut self) {
        let early = std::mem::take(&mut self.early_intents);
        if let Some(sim) = self.simulation.as_mut() {
            for (sender, intent) in early {
                if self.session.is_connected(&sender) {
                    sim.submit(sender, intent);
                }
            }
        }
        self.flush_host_events();
    }

    /// Sends an intent to the host, or into our own simulation when we host.
    fn route(&mut self, intent: Intent) {
        match self.session.send_to_host(intent) {
            Ok(Route::Loopback(intent)) => {
                match self.simulation.as_mut() {
                    Some(sim) => sim.submit(self.config.local.clone(), intent),
                    None => warn!("Hosting without a simulation, dropping {:?}", intent),
                }
                self.flush_host_events();
            }
            Ok(Route::Sent) => {}
            Err(SessionError::HostUnavailable(intent)) => {
                debug!("Host unreachable, holding intent until the next host is known");
                self.session.defer(intent);
            }
            Err(e) => error!("Failed to send intent: {}", e),
        }
    }

    /// Broadcasts and mirrors whatever the local simulation produced outside a tick.
    fn flush_host_events(&mut self) {
        let events = match self.simulation.as_mut() {
            Some(sim) if self.session.is_host() => sim.take_events(),
            _ => return,
        };
        for event in events {
            self.publish(event);
        }
    }

    fn publish(&mut self, event: HostEvent) {
        self.session.broadcast(&event);
        self.apply_host_event(event);
    }

    fn host_tick(&mut self) {
        if !self.session.is_host() {
            return;
        }
        let Some(sim) = self.simulation.as_mut() else {
            return;
        };
        for event in sim.tick() {
            self.publish(event);
        }
    }

    fn maybe_ready(&mut self) {
        if self.ready_sent || self.session.peer_count() + 1 < self.config.expected_peers {
            return;
        }
        self.ready_sent = true;
        info!("All {} peers connected, ready to join", self.config.expected_peers);
        self.route(Intent::ReadyToJoin {
            character: self.config.character.clone(),
        });
    }

    fn probe_round(&mut self) {
        let now = Instant::now();
        self.probe.expire(now);
        if let Some(report) = self.probe.report() {
            self.route(report);
        }
        for (peer, ping) in self.probe.start_round(self.session.peers(), now) {
            let message = Message::Intent {
                sender: self.config.local.clone(),
                intent: ping,
            };
            if let Err(e) = self.session.send_to(&peer, &message) {
                warn!("Failed to ping {}: {}", peer, e);
            }
        }
    }

    fn bootstrap_deadline(&mut self) -> Result<(), SessionError> {
        if self.mirror.is_bootstrapped() {
            return Ok(());
        }
        if !self.session.is_host() {
            error!("No initial data after {:?}", self.config.bootstrap_timeout);
            return Err(SessionError::BootstrapTimeout(self.config.bootstrap_timeout));
        }
        warn!("Not everyone joined in time, starting with the peers that are ready");
        if !self.ready_sent {
            self.ready_sent = true;
            self.route(Intent::ReadyToJoin {
                character: self.config.character.clone(),
            });
        }
        if let Some(sim) = self.simulation.as_mut() {
            if sim.phase() == Phase::Lobby {
                sim.start_now()?;
            }
        }
        self.flush_host_events();
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        let local = self.config.local.clone();
        match command {
            Command::Controls(controls) => {
                self.controls = controls;
                for intent in self.input.update(controls) {
                    self.route(intent);
                }
            }
            Command::BuyUnits { n } => {
                let Some(castle) = self.mirror.castle_in_range(&local) else {
                    warn!("Stand in one of your castles to buy units");
                    return;
                };
                self.route(Intent::RequestBuyUnit {
                    buyer: local,
                    unit_class: UnitClass::LaserDrone,
                    n,
                    castle,
                });
            }
            Command::BuySpell { spell } => {
                let castle = self
                    .mirror
                    .registry()
                    .castles()
                    .values()
                    .find(|castle| castle.is_alive() && castle.player_within_range(&local))
                    .map(|castle| castle.id.clone());
                let Some(castle) = castle else {
                    warn!("Stand in a castle to buy spells");
                    return;
                };
                self.route(Intent::RequestBuySpell {
                    buyer: local,
                    spell,
                    castle,
                });
            }
            Command::CastSpell { position, spell, reply } => {
                let outcome = self.cast(position, spell);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Command::Garrison { n, direction } => {
                let Some(castle) = self.mirror.castle_in_range(&local) else {
                    warn!("Stand in one of your castles to move units");
                    return;
                };
                self.route(Intent::RequestGarrison {
                    instigator: local,
                    unit_class: UnitClass::LaserDrone,
                    n,
                    castle,
                    direction,
                });
            }
            Command::Pause | Command::Resume => {
                let Some(sim) = self.simulation.as_mut().filter(|_| self.session.is_host()) else {
                    warn!("Only the host can pause or resume");
                    return;
                };
                let pausing = matches!(command, Command::Pause);
                if pausing {
                    sim.pause();
                } else {
                    sim.resume();
                }
                self.flush_host_events();
                if pausing {
                    // nobody resumes mid-stride
                    self.controls = ControlState::default();
                    for intent in self.input.release_all() {
                        self.route(intent);
                    }
                }
            }
            Command::Shutdown => {}
        }
    }

    /// Attempts a cast and reports the outcome straight away.
    ///
    /// The host validates against its own state. Other peers check the
    /// mirror first so obvious failures never leave the machine; the host
    /// still has the final word.
    fn cast(&mut self, position: Vector2, spell: SpellId) -> CastOutcome {
        let local = self.config.local.clone();
        let cast_id = format!("{}-{}", local, uuid::Uuid::new_v4());

        if self.session.is_host() {
            if let Some(sim) = self.simulation.as_mut() {
                return sim.cast_spell(&local, position, spell, cast_id);
            }
        }

        let view = IntentView {
            registry: self.mirror.registry(),
            config: &self.config.settings.config,
            planner: &self.planner,
            seen_casts: self.mirror.seen_casts(),
        };
        match validate_cast(&view, &local, &local, position, spell, &cast_id) {
            Ok(_) => {
                self.route(Intent::RequestCastSpell {
                    instigator: local,
                    position,
                    spell,
                    cast_id,
                });
                CastOutcome::Accepted
            }
            Err(reason) => CastOutcome::Rejected(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{memory_link, MemoryChannel, TransportChannel};
    use shared::{GameConfig, Level};
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    fn settings() -> HostSettings {
        let mut settings = HostSettings::new(GameConfig::default(), Level::arena());
        settings.tick_rate = 100;
        settings
    }

    async fn wait_for<F: Fn(&Notice) -> bool>(notices: &mut mpsc::UnboundedReceiver<Notice>, wanted: F) -> Notice {
        timeout(Duration::from_secs(5), async {
            loop {
                match notices.recv().await {
                    Some(notice) if wanted(&notice) => return notice,
                    Some(_) => continue,
                    None => panic!("runtime stopped"),
                }
            }
        })
        .await
        .expect("notice did not arrive in time")
    }

    #[tokio::test]
    async fn test_solo_host_fills_with_ai_and_ticks() {
        let (_transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (_directory_tx, directory_rx) = mpsc::unbounded_channel();
        let mut config = RuntimeConfig::new(ClientId::from("a"), ClientId::from("a"), settings());
        config.expected_peers = 1;
        let (runtime, mut handle) = PeerRuntime::new(config, transport_rx, directory_rx);
        let task = tokio::spawn(runtime.run());

        let notice = wait_for(&mut handle.notices, |n| matches!(n, Notice::Host(HostEvent::InitialData(_)))).await;
        match notice {
            Notice::Host(HostEvent::InitialData(data)) => assert_eq!(data.players.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        wait_for(&mut handle.notices, |n| matches!(n, Notice::Host(HostEvent::PeriodicUpdate(_)))).await;

        assert_ok!(handle.commands.send(Command::Shutdown));
        assert_ok!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_peer_without_initial_data_times_out() {
        let (_transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (_directory_tx, directory_rx) = mpsc::unbounded_channel();
        let mut config = RuntimeConfig::new(ClientId::from("b"), ClientId::from("a"), settings());
        config.bootstrap_timeout = Duration::from_millis(50);
        let (runtime, _handle) = PeerRuntime::new(config, transport_rx, directory_rx);

        let result = timeout(Duration::from_secs(5), runtime.run()).await.unwrap();
        let error = assert_err!(result);
        assert!(matches!(error, SessionError::BootstrapTimeout(_)));
    }

    #[tokio::test]
    async fn test_intent_sent_ahead_of_promotion_is_kept() {
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let (c_tx, _c_rx) = mpsc::unbounded_channel();
        let (b_dir_tx, b_dir_rx) = mpsc::unbounded_channel();
        let (a_to_b, b_to_a) = memory_link(ClientId::from("a"), a_tx, ClientId::from("b"), b_tx.clone());
        let (c_to_b, b_to_c) = memory_link(ClientId::from("c"), c_tx, ClientId::from("b"), b_tx);
        for (id, link) in [("a", b_to_a), ("c", b_to_c)] {
            b_dir_tx
                .send(DirectoryEvent::PeerJoined {
                    id: ClientId::from(id),
                    link: Box::new(link),
                })
                .unwrap();
        }

        let mut config = RuntimeConfig::new(ClientId::from("b"), ClientId::from("a"), settings());
        config.expected_peers = 3;
        config.bootstrap_timeout = Duration::from_secs(60);
        let (runtime, mut handle) = PeerRuntime::new(config, b_rx, b_dir_rx);
        tokio::spawn(async move {
            let _directory = b_dir_tx;
            runtime.run().await
        });

        // b declares ready to a once both links are up
        timeout(Duration::from_secs(5), async {
            while let Some(event) = a_rx.recv().await {
                if let TransportEvent::Message {
                    message: Message::Intent {
                        intent: Intent::ReadyToJoin { .. },
                        ..
                    },
                    ..
                } = event
                {
                    return;
                }
            }
        })
        .await
        .unwrap();

        // c already treats b as host, then a goes away
        c_to_b
            .send(&Message::Intent {
                sender: ClientId::from("c"),
                intent: Intent::ReadyToJoin {
                    character: Character::ai_default(),
                },
            })
            .unwrap();
        a_to_b.close();

        let notice = wait_for(&mut handle.notices, |n| matches!(n, Notice::Host(HostEvent::InitialData(_)))).await;
        match notice {
            Notice::Host(HostEvent::InitialData(data)) => {
                assert!(data.players.iter().any(|p| p.id == ClientId::from("c")));
                assert!(data.players.iter().all(|p| p.id != ClientId::from("a")));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_ok!(handle.commands.send(Command::Shutdown));
    }

    #[tokio::test]
    async fn test_two_peers_join_and_remote_keys_move_the_player() {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let (a_dir_tx, a_dir_rx) = mpsc::unbounded_channel();
        let (b_dir_tx, b_dir_rx) = mpsc::unbounded_channel();
        let (a_to_b, b_to_a): (MemoryChannel, MemoryChannel) =
            memory_link(ClientId::from("a"), a_tx, ClientId::from("b"), b_tx);
        a_dir_tx
            .send(DirectoryEvent::PeerJoined {
                id: ClientId::from("b"),
                link: Box::new(a_to_b),
            })
            .unwrap();
        b_dir_tx
            .send(DirectoryEvent::PeerJoined {
                id: ClientId::from("a"),
                link: Box::new(b_to_a),
            })
            .unwrap();

        let host_config = RuntimeConfig::new(ClientId::from("a"), ClientId::from("a"), settings());
        let peer_config = RuntimeConfig::new(ClientId::from("b"), ClientId::from("a"), settings());
        let (host, mut host_handle) = PeerRuntime::new(host_config, a_rx, a_dir_rx);
        let (peer, mut peer_handle) = PeerRuntime::new(peer_config, b_rx, b_dir_rx);
        tokio::spawn(host.run());
        tokio::spawn(peer.run());

        wait_for(&mut peer_handle.notices, |n| matches!(n, Notice::Host(HostEvent::InitialData(_)))).await;
        peer_handle
            .commands
            .send(Command::Controls(ControlState {
                down: true,
                ..ControlState::default()
            }))
            .unwrap();

        let b = ClientId::from("b");
        wait_for(&mut host_handle.notices, |n| match n {
            Notice::Host(HostEvent::PeriodicUpdate(update)) => update
                .player_deltas
                .iter()
                .any(|delta| delta.id == b && delta.vel.is_some_and(|v| v.y > 0.0)),
            _ => false,
        })
        .await;

        assert_ok!(host_handle.commands.send(Command::Shutdown));
        assert_ok!(peer_handle.commands.send(Command::Shutdown));
    }
}
