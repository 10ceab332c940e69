use shared::{ClientId, Intent, ProtocolError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("link is closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("expected a hello frame, got something else")]
    Handshake,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The host link is gone. The intent is handed back so it can be resent
    /// once the next host has been elected.
    #[error("host is unreachable; resend after migration")]
    HostUnavailable(Intent),
    #[error("unknown peer {0}")]
    UnknownPeer(ClientId),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("no initial data within {0:?}")]
    BootstrapTimeout(Duration),
    #[error(transparent)]
    Setup(#[from] host::SetupError),
}

/// A console line that could not be turned into a command.
#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command '{0}', try 'help'")]
    UnknownCommand(String),
    #[error("'{command}' expects {expected}")]
    BadArguments {
        command: &'static str,
        expected: &'static str,
    },
    #[error("unknown spell '{0}'")]
    UnknownSpell(String),
}
