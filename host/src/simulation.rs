//! The authoritative tick
//!
//! [`AuthoritativeSimulation`] is everything the host peer owns: the entity
//! registry, the subsystems that act on it, the intent queue, the lobby and
//! the delta baseline. It performs no I/O. The peer runtime feeds it intents
//! and departures, calls [`AuthoritativeSimulation::tick`] on a fixed
//! interval and broadcasts whatever host events come back.
//!
//! One tick, in this order:
//! 1. drain and apply queued intents
//! 2. advance the day clock, paying income on rollover
//! 3. combat engagement and firing, then neutral roaming and yields
//! 4. AI decisions for AI players, control input for humans
//! 5. flocking
//! 6. integrate units and players
//! 7. build the periodic update
//!
//! Deaths from any step are resolved straight away and the win condition is
//! checked once per step that killed a player, so two players dying in the
//! same pass produce a tie rather than a winner.

use crate::ai::{AiBrain, AiSenses, AI_UNIT_CLASS};
use crate::combat::{CombatEngine, Death};
use crate::economy::{distribute_income, DayClock};
use crate::error::SetupError;
use crate::flocking::FlockingMotion;
use crate::intent_queue::IntentQueue;
use crate::intents::{self, Action, CastOutcome, IntentView};
use crate::latency::LatencyBook;
use crate::navigation::PathPlanner;
use crate::neutral;
use crate::registry::EntityRegistry;
use crate::snapshot::DeltaTracker;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    Castle, CastleId, Character, ClientId, Combatant, ControlState, Controller, EntityKind, GameConfig, HostEvent,
    InitialData, Intent, Level, Neutral, Player, SpellId, Team, Unit, Vector2,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collecting ReadyToJoin characters.
    Lobby,
    Running,
    Paused,
    /// A winner was declared; ticks do nothing.
    Finished,
}

/// Host settings that are not part of the shared game constants.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub config: GameConfig,
    pub level: Level,
    pub tick_rate: u32,
    /// Fill seats nobody joined with AI players when starting.
    pub ai_fill: bool,
    pub seed: u64,
}

impl HostSettings {
    pub fn new(config: GameConfig, level: Level) -> Self {
        Self {
            config,
            level,
            tick_rate: 60,
            ai_fill: true,
            seed: 0x5eed,
        }
    }

    fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

/// Replicated state a peer hands over when it becomes the host.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub teams: Vec<Team>,
    pub players: Vec<Player>,
    pub castles: Vec<Castle>,
    pub neutrals: Vec<Neutral>,
    pub units: Vec<Unit>,
    /// Seconds into the current day.
    pub day_elapsed: f32,
    pub tick: u64,
}

pub struct AuthoritativeSimulation {
    settings: HostSettings,
    phase: Phase,
    tick: u64,
    registry: EntityRegistry,
    planner: PathPlanner,
    combat: CombatEngine,
    flocking: FlockingMotion,
    clock: DayClock,
    queue: IntentQueue,
    controls: HashMap<ClientId, ControlState>,
    brains: BTreeMap<ClientId, AiBrain>,
    latency: LatencyBook,
    seen_casts: HashSet<String>,
    /// Ready characters in the order they arrived.
    lobby: Vec<(ClientId, Character)>,
    /// Peers currently connected, the host included.
    roster: BTreeSet<ClientId>,
    deltas: DeltaTracker,
    rng: StdRng,
    outbox: Vec<HostEvent>,
}

impl AuthoritativeSimulation {
    pub fn new(settings: HostSettings) -> Self {
        let config = &settings.config;
        Self {
            planner: PathPlanner::from_level(&settings.level, config.nav_scale),
            combat: CombatEngine::new(config),
            flocking: FlockingMotion::new(config),
            clock: DayClock::new(config.day_length),
            rng: StdRng::seed_from_u64(settings.seed),
            phase: Phase::Lobby,
            tick: 0,
            registry: EntityRegistry::default(),
            queue: IntentQueue::new(),
            controls: HashMap::new(),
            brains: BTreeMap::new(),
            latency: LatencyBook::new(),
            seen_casts: HashSet::new(),
            lobby: Vec::new(),
            roster: BTreeSet::new(),
            deltas: DeltaTracker::new(),
            outbox: Vec::new(),
            settings,
        }
    }

    /// Takes over a running session from replicated state.
    ///
    /// Engagements and firing ramps are rebuilt from scratch and the delta
    /// baseline is empty, so the first update this host sends is complete.
    pub fn from_snapshot(
        settings: HostSettings,
        snapshot: WorldSnapshot,
        roster: impl IntoIterator<Item = ClientId>,
    ) -> Self {
        let mut sim = Self::new(settings);
        sim.registry = EntityRegistry::from_parts(
            snapshot.teams,
            snapshot.players,
            snapshot.castles,
            snapshot.neutrals,
            snapshot.units,
        );
        sim.clock = DayClock::resume(sim.settings.config.day_length, snapshot.day_elapsed);
        sim.tick = snapshot.tick;
        sim.roster = roster.into_iter().collect();
        let ai_players: Vec<ClientId> = sim
            .registry
            .players
            .values()
            .filter(|p| p.controller == Controller::Ai)
            .map(|p| p.id.clone())
            .collect();
        for id in ai_players {
            sim.add_brain(id);
        }
        sim.phase = Phase::Running;
        info!(
            "Took over as host at tick {} with {} players and {} units",
            sim.tick,
            sim.registry.players.len(),
            sim.registry.units.len()
        );
        sim
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &GameConfig {
        &self.settings.config
    }

    pub fn day_phase(&self) -> f32 {
        self.clock.phase()
    }

    pub fn roster(&self) -> impl Iterator<Item = &ClientId> + '_ {
        self.roster.iter()
    }

    /// Host events produced outside of a tick, e.g. by a departure.
    pub fn take_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn add_peer(&mut self, id: ClientId) {
        if self.roster.insert(id.clone()) {
            info!("Peer {} joined the session", id);
        }
    }

    /// Current host priority: connected peers by median reported latency.
    pub fn host_priority(&self) -> Vec<ClientId> {
        self.latency
            .host_priority(&self.roster, self.settings.config.latency_timeout_ms)
    }

    /// Accepts an intent from `sender`.
    ///
    /// ReadyToJoin is handled on arrival because there is no world to tick
    /// before the session starts. Everything else waits for the next tick.
    pub fn submit(&mut self, sender: ClientId, intent: Intent) {
        match intent {
            Intent::ReadyToJoin { character } => self.ready(sender, character),
            Intent::Ping { .. } | Intent::Pong { .. } => {
                warn!("Peer-to-peer probe from {} reached the host queue", sender);
            }
            intent => {
                if self.phase == Phase::Lobby {
                    debug!("Dropping intent from {} before the session started", sender);
                    return;
                }
                self.queue.push(sender, intent);
            }
        }
    }

    /// Validates a cast from the local player now and queues it for the next tick.
    pub fn cast_spell(
        &mut self,
        sender: &ClientId,
        position: Vector2,
        spell: SpellId,
        cast_id: String,
    ) -> CastOutcome {
        let view = IntentView {
            registry: &self.registry,
            config: &self.settings.config,
            planner: &self.planner,
            seen_casts: &self.seen_casts,
        };
        match intents::validate_cast(&view, sender, sender, position, spell, &cast_id) {
            Ok(_) => {
                self.queue.push(
                    sender.clone(),
                    Intent::RequestCastSpell {
                        instigator: sender.clone(),
                        position,
                        spell,
                        cast_id,
                    },
                );
                CastOutcome::Accepted
            }
            Err(reason) => CastOutcome::Rejected(reason),
        }
    }

    fn ready(&mut self, sender: ClientId, character: Character) {
        if self.phase != Phase::Lobby {
            debug!("{} is ready but the session already started", sender);
            return;
        }
        self.roster.insert(sender.clone());
        match self.lobby.iter_mut().find(|(id, _)| *id == sender) {
            Some(entry) => entry.1 = character,
            None => self.lobby.push((sender.clone(), character)),
        }
        info!("Peer {} is ready ({} ready)", sender, self.lobby.len());
        if let Err(e) = self.try_start() {
            debug!("Not starting yet: {}", e);
        }
    }

    /// Starts the session once every connected peer is ready.
    pub fn try_start(&mut self) -> Result<bool, SetupError> {
        if self.phase != Phase::Lobby {
            return Err(SetupError::AlreadyStarted);
        }
        if self.lobby.is_empty() {
            return Err(SetupError::NobodyReady);
        }
        if !self.roster.iter().all(|id| self.lobby.iter().any(|(ready, _)| ready == id)) {
            return Ok(false);
        }
        let needed = self.settings.config.n_player_game;
        if self.lobby.len() < needed && !self.settings.ai_fill {
            return Err(SetupError::NotEnoughPlayers {
                ready: self.lobby.len(),
                needed,
            });
        }
        self.start()?;
        Ok(true)
    }

    fn start(&mut self) -> Result<(), SetupError> {
        let config = self.settings.config.clone();
        let level = self.settings.level.clone();

        let mut seats: Vec<(ClientId, Character, Controller)> = self
            .lobby
            .iter()
            .map(|(id, character)| (id.clone(), character.clone(), Controller::Human))
            .collect();
        let mut filler = 1;
        while seats.len() < config.n_player_game {
            let id = ClientId::new(format!("ai-{}", filler));
            filler += 1;
            if seats.iter().any(|(seat, _, _)| *seat == id) {
                continue;
            }
            seats.push((id, Character::ai_default(), Controller::Ai));
        }
        level.validate(seats.len())?;

        let team_count = config.n_team_game.clamp(1, seats.len());
        let mut registry = EntityRegistry::new((0..team_count).map(Team::new).collect());
        let offset = Vector2::new(config.player_start_offset.0, config.player_start_offset.1);

        for (index, (id, character, controller)) in seats.into_iter().enumerate() {
            let team = index % team_count;
            let castle_pos = level.castle_positions[index];
            registry.add_player(Player::from_character(
                id.clone(),
                &character,
                team,
                castle_pos + offset,
                controller,
                &config,
            ));
            registry.add_castle(Castle::new(CastleId::generate(), team, id.clone(), castle_pos, &config));
            if controller == Controller::Ai {
                self.brains.insert(
                    id.clone(),
                    AiBrain::new(id, AiSenses::for_level(&level), config.ai),
                );
            }
        }
        for spawn in &level.neutrals {
            let neutral = Neutral::from_spawn(spawn, &config);
            let owner = neutral.id.entity();
            registry.add_neutral(neutral);
            for _ in 0..spawn.units {
                registry.spawn_unit(AI_UNIT_CLASS, &owner, spawn.pos, &config, &mut self.rng);
            }
        }
        registry.update_nearby_players();
        self.registry = registry;
        self.phase = Phase::Running;
        self.lobby.clear();

        info!(
            "Session started with {} players on {} teams",
            self.registry.players.len(),
            team_count
        );
        let initial = InitialData {
            teams: self.registry.teams.clone(),
            players: self.registry.players.values().cloned().collect(),
            castles: self.registry.castles.values().cloned().collect(),
            neutrals: self.registry.neutrals.values().cloned().collect(),
            units: self.registry.units.values().cloned().collect(),
            host_priority: self.host_priority(),
        };
        self.outbox.push(HostEvent::InitialData(Box::new(initial)));
        self.outbox.push(HostEvent::Resume);
        Ok(())
    }

    fn add_brain(&mut self, id: ClientId) {
        let senses = AiSenses::for_level(&self.settings.level);
        self.brains
            .insert(id.clone(), AiBrain::new(id, senses, self.settings.config.ai));
    }

    /// Handles a peer leaving: its player dies and the win condition is re-evaluated.
    pub fn handle_disconnect(&mut self, id: &ClientId) {
        self.roster.remove(id);
        self.queue.forget(id);
        self.latency.forget(id);
        self.controls.remove(id);

        if self.phase == Phase::Lobby {
            self.lobby.retain(|(ready, _)| ready != id);
            if let Err(e) = self.try_start() {
                debug!("Not starting after {} left: {}", id, e);
            }
            return;
        }

        info!("Peer {} disconnected, forfeiting its player", id);
        if self.registry.players.get(id).is_some_and(|p| p.is_alive()) {
            let death = Death {
                id: id.entity(),
                kind: EntityKind::Player,
            };
            self.resolve_deaths(vec![death]);
        }
    }

    pub fn pause(&mut self) {
        if self.phase == Phase::Running {
            self.phase = Phase::Paused;
            info!("Session paused at tick {}", self.tick);
            self.outbox.push(HostEvent::Pause);
        }
    }

    pub fn resume(&mut self) {
        if self.phase == Phase::Paused {
            self.phase = Phase::Running;
            info!("Session resumed at tick {}", self.tick);
            self.outbox.push(HostEvent::Resume);
        }
    }

    /// Applies deaths, emits their events and checks for a winner.
    fn resolve_deaths(&mut self, deaths: Vec<Death>) {
        let mut player_died = false;
        for death in deaths {
            if self.registry.handle_death(&death.id).is_none() {
                continue;
            }
            if death.kind == EntityKind::Player {
                player_died = true;
                self.controls.remove(&death.id.as_client());
                info!("Player {} died", death.id);
            }
            self.outbox.push(HostEvent::EntityDeath {
                id: death.id,
                kind: death.kind,
            });
        }
        if player_died {
            self.check_winner();
        }
    }

    fn check_winner(&mut self) {
        // the result is announced once
        if self.phase == Phase::Finished {
            return;
        }
        let surviving = self.registry.surviving_teams();
        if surviving.len() > 1 {
            return;
        }
        let team_name = surviving
            .first()
            .map_or_else(|| "Tie".to_string(), |team| team.name.clone());
        info!("Winner: {}", team_name);
        self.outbox.push(HostEvent::Winner { team_name });
        self.outbox.push(HostEvent::Pause);
        self.phase = Phase::Finished;
    }

    /// Runs one fixed step and returns the events to broadcast.
    pub fn tick(&mut self) -> Vec<HostEvent> {
        if self.phase != Phase::Running {
            return self.take_events();
        }
        self.tick += 1;
        let dt = self.settings.dt();

        self.apply_intents();

        if self.clock.advance(dt) > 0 {
            info!("Day {} begins", self.clock.day());
            distribute_income(&mut self.registry, &self.settings.config);
        }

        self.registry.update_nearby_players();
        let deaths = self.combat.run(&mut self.registry);
        self.resolve_deaths(deaths);
        neutral::roam(&mut self.registry);
        for yielded in neutral::check_yields(&mut self.registry) {
            self.outbox.push(HostEvent::NeutralYielded {
                id: yielded.id,
                kind: yielded.kind,
                new_owner: yielded.new_owner,
            });
        }

        self.steer_players();

        self.flocking.prepare(&mut self.registry);
        self.flocking.flock(&mut self.registry);

        self.flocking.integrate(&mut self.registry);
        self.integrate_players(dt);

        if self.tick % 60 == 0 {
            debug!(
                "Tick {}: {} players alive, {} units, {} queued intents",
                self.tick,
                self.registry.players.values().filter(|p| p.is_alive()).count(),
                self.registry.units.len(),
                self.queue.len()
            );
        }

        if self.phase == Phase::Running {
            let priority = self.host_priority();
            let update = self
                .deltas
                .build(&self.registry, self.tick, self.clock.phase(), priority);
            self.outbox.push(HostEvent::PeriodicUpdate(update));
        }
        self.take_events()
    }

    fn apply_intents(&mut self) {
        for (sender, intent) in self.queue.drain() {
            let action = {
                let view = IntentView {
                    registry: &self.registry,
                    config: &self.settings.config,
                    planner: &self.planner,
                    seen_casts: &self.seen_casts,
                };
                intents::validate(&view, &sender, &intent)
            };
            let Some(action) = action else {
                continue;
            };
            match action {
                Action::Control { player, key, pressed } => {
                    self.controls.entry(player).or_default().set(key, pressed);
                }
                Action::ReportLatency { reporter, entries } => {
                    self.latency.record(&reporter, &entries);
                }
                action => {
                    let applied = intents::apply(
                        &mut self.registry,
                        &self.settings.config,
                        &mut self.rng,
                        &mut self.seen_casts,
                        action,
                    );
                    self.outbox.extend(applied.events);
                    self.resolve_deaths(applied.deaths);
                }
            }
            if self.phase != Phase::Running {
                break;
            }
        }
    }

    /// Sets every living player's acceleration from AI or controls.
    fn steer_players(&mut self) {
        let config = &self.settings.config;
        let mut purchases = Vec::new();
        for brain in self.brains.values_mut() {
            let decision = brain.think(self.tick, &self.registry, &self.planner, config);
            if let Some(castle) = decision.buy_at {
                purchases.push((brain.player().clone(), castle));
            }
            if let Some(player) = self.registry.players.get_mut(brain.player()) {
                player.acc = decision.acc;
            }
        }
        for player in self.registry.players.values_mut() {
            if player.controller == Controller::Human && player.is_alive() {
                let controls = self.controls.get(&player.id).copied().unwrap_or_default();
                player.acc = controls.acceleration(player.max_acc);
            }
        }
        for (buyer, castle) in purchases {
            self.queue.push(
                buyer.clone(),
                Intent::RequestBuyUnit {
                    buyer,
                    unit_class: AI_UNIT_CLASS,
                    n: 1,
                    castle,
                },
            );
        }
    }

    fn integrate_players(&mut self, dt: f32) {
        let config = &self.settings.config;
        for player in self.registry.players.values_mut() {
            if !player.is_alive() {
                continue;
            }
            if player.speed_modifier_left > 0.0 {
                player.speed_modifier_left -= dt;
                if player.speed_modifier_left <= 0.0 {
                    player.speed_modifier = 0.0;
                    player.speed_modifier_left = 0.0;
                }
            }

            player.acc = player.acc.limit(player.max_acc);
            if player.acc.is_zero() {
                player.vel += player.vel.scale(-config.player_friction);
            }
            player.vel = (player.vel + player.acc).limit(player.effective_max_vel());

            if !self.planner.is_walkable(player.pos + Vector2::new(player.vel.x, 0.0)) {
                player.vel.x = 0.0;
            }
            if !self.planner.is_walkable(player.pos + Vector2::new(0.0, player.vel.y)) {
                player.vel.y = 0.0;
            }
            if player.vel.sq_magnitude() < config.sq_player_vel_cutoff {
                player.vel = Vector2::ZERO;
            }
            player.pos += player.vel;
        }
    }

    /// Snapshot of the current world, as a successor host would rebuild it.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            teams: self.registry.teams.clone(),
            players: self.registry.players.values().cloned().collect(),
            castles: self.registry.castles.values().cloned().collect(),
            neutrals: self.registry.neutrals.values().cloned().collect(),
            units: self.registry.units.values().cloned().collect(),
            day_elapsed: self.clock.elapsed(),
            tick: self.tick,
        }
    }

    /// Reports start-up failures that `submit` swallowed.
    pub fn start_now(&mut self) -> Result<(), SetupError> {
        match self.try_start() {
            Ok(true) => Ok(()),
            Ok(false) => {
                // not everyone is ready; start with whoever is
                self.roster.retain(|id| self.lobby.iter().any(|(ready, _)| ready == id));
                self.try_start().map(|_| ())
            }
            Err(e) => {
                error!("Cannot start session: {}", e);
                Err(e)
            }
        }
    }
}
