use shared::ConfigError;
use thiserror::Error;

/// Reasons a session cannot be started or taken over.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Level(#[from] ConfigError),
    #[error("no players are ready")]
    NobodyReady,
    #[error("{ready} of {needed} seats filled and AI fill is disabled")]
    NotEnoughPlayers { ready: usize, needed: usize },
    #[error("the session has already started")]
    AlreadyStarted,
}
