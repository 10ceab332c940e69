//! # Peer Library
//!
//! Everything a single participant in a skirmish session runs. There is no
//! dedicated server: one peer hosts the authoritative simulation from the
//! `host` crate, every peer keeps a replicated mirror of the world, and when
//! the hosting peer leaves the next peer in the replicated priority list picks
//! up the simulation from its mirror.
//!
//! ## Architecture Overview
//!
//! ### Intents Up, Events Down
//! Peers never change the world directly. They send intents (key edges,
//! purchases, casts) to whoever hosts, and the host answers with host events:
//! a one-off `InitialData`, a `PeriodicUpdate` every tick carrying only what
//! changed, and discrete events such as purchases, deaths and the winner. The
//! host applies its own events to its own mirror exactly like everyone else.
//!
//! ### Host Migration
//! Each periodic update carries the host priority list, ordered by the median
//! latency peers report. All peers therefore agree on the successor before
//! the host goes away. The successor rebuilds a simulation from its mirror and
//! resumes ticking; the others keep their mirrors and resend held keys and any
//! intents that could not be delivered in between.
//!
//! ## Module Organization
//!
//! ### Transport Module (`transport`)
//! Reliable, ordered links between two peers:
//! - TCP links with length-prefixed frames and a hello handshake
//! - In-memory links for tests and single-process sessions
//! - Terminal `Closed` events, reported once per link
//!
//! ### Session Module (`session`)
//! Membership and routing:
//! - Host priority, initial and replicated
//! - Successor election when the host's link closes
//! - Routing host-bound intents, including loopback when we host
//!
//! ### Mirror Module (`mirror`)
//! The replicated world every peer renders from:
//! - Bootstrapping from initial data
//! - Applying sparse periodic deltas and discrete events
//! - Snapshots for a peer that is promoted to host
//!
//! ### Latency Module (`latency`)
//! Ping/pong probing of every peer and the report sent to the host.
//!
//! ### Input Module (`input`)
//! Edge detection that turns sampled controls into key intents.
//!
//! ### Runtime Module (`runtime`)
//! The per-peer event loop tying the modules above together.
//!
//! ### Console Module (`console`)
//! Text commands for driving a peer from a terminal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use peer::runtime::{PeerRuntime, RuntimeConfig};
//! use host::HostSettings;
//! use shared::{ClientId, GameConfig, Level};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), peer::error::SessionError> {
//! let settings = HostSettings::new(GameConfig::default(), Level::arena());
//! let config = RuntimeConfig::new(ClientId::from("alice"), ClientId::from("alice"), settings);
//! let (_transport_tx, transport_rx) = mpsc::unbounded_channel();
//! let (_directory_tx, directory_rx) = mpsc::unbounded_channel();
//!
//! let (runtime, handle) = PeerRuntime::new(config, transport_rx, directory_rx);
//! // links are announced through the directory channel,
//! // local input goes through `handle.commands`
//! runtime.run().await
//! # }
//! ```

pub mod console;
pub mod error;
pub mod input;
pub mod latency;
pub mod mirror;
pub mod runtime;
pub mod session;
pub mod transport;

pub use error::{ConsoleError, SessionError, TransportError};
pub use mirror::ReplicatedMirror;
pub use runtime::{Command, Notice, PeerRuntime, RuntimeConfig, RuntimeHandle};
pub use session::{Route, SessionCoordinator, SessionEvent};
