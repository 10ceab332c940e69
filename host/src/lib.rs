//! # Host Simulation Library
//!
//! This library is the authoritative half of a peer. Whichever peer currently
//! heads the host priority list runs it: intents from every peer are queued,
//! validated and applied once per tick, and the resulting host events are
//! broadcast back to the whole mesh.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The host runs the definitive version of the game. Every purchase, cast,
//! garrison move, hit and death is decided here. Other peers only mirror
//! what the host reports.
//!
//! ### Intent Processing
//! Intents arrive from any peer and are handled strictly in arrival order:
//! - Ownership checks ("is the sender the buyer/instigator?")
//! - Range, gold and mana checks against current state
//! - Duplicate cast rejection by cast id
//!
//! Anything that fails validation is dropped without touching state.
//!
//! ### Delta Broadcasting
//! Each tick produces a periodic update carrying only the fields that changed
//! since the last one. A freshly promoted host starts from an empty baseline
//! so its first update is complete.
//!
//! ## Architecture Design
//!
//! ### No I/O
//! Nothing in this crate touches a socket or a clock. The peer runtime owns
//! the tokio loop and calls [`AuthoritativeSimulation::tick`] at a fixed
//! rate, which keeps every rule testable with plain `#[test]` functions.
//!
//! ### Id-Keyed Registry
//! Entities live in one [`EntityRegistry`] keyed by id. Cross references
//! (who targets whom, who owns which unit) are ids, never pointers, and are
//! resolved through the registry on use. Ownership of units is kept in a
//! separate ledger so "how many drones does this castle hold" is a lookup.
//!
//! ## Module Organization
//!
//! ### Simulation Module (`simulation`)
//! The tick itself, the lobby and session start, departures, pausing, and
//! takeover from replicated state after host migration.
//!
//! ### Registry and Ledger Modules (`registry`, `ledger`)
//! Entity storage, kind-checked lookups, death bookkeeping and the unit
//! ownership ledger.
//!
//! ### Intent Modules (`intent_queue`, `intents`)
//! Per-sender FIFO queues and the validate/apply pair for each intent.
//!
//! ### Combat Module (`combat`)
//! Target engagement and damage ramps between units and their enemies.
//!
//! ### Motion Modules (`flocking`, `navigation`)
//! Boids-style unit motion around leaders and A* routing on the level grid.
//!
//! ### AI and Neutral Modules (`ai`, `neutral`)
//! Decision making for AI players and the roaming and yielding of neutrals.
//!
//! ### Economy, Latency and Snapshot Modules (`economy`, `latency`, `snapshot`)
//! The day clock and income, the host priority order derived from latency
//! reports, and delta construction for periodic updates.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use host::{AuthoritativeSimulation, HostSettings};
//! use shared::{Character, ClientId, GameConfig, Intent, Level};
//!
//! let mut sim = AuthoritativeSimulation::new(HostSettings::new(GameConfig::default(), Level::arena()));
//! sim.add_peer(ClientId::from("me"));
//! sim.submit(
//!     ClientId::from("me"),
//!     Intent::ReadyToJoin { character: Character::ai_default() },
//! );
//!
//! // once per fixed step; broadcast whatever comes back
//! let events = sim.tick();
//! ```

pub mod ai;
pub mod combat;
pub mod economy;
pub mod error;
pub mod flocking;
pub mod intent_queue;
pub mod intents;
pub mod latency;
pub mod ledger;
pub mod navigation;
pub mod neutral;
pub mod registry;
pub mod simulation;
pub mod snapshot;

pub use error::SetupError;
pub use intents::{CastOutcome, CastRejection};
pub use registry::EntityRegistry;
pub use simulation::{AuthoritativeSimulation, HostSettings, Phase, WorldSnapshot};
