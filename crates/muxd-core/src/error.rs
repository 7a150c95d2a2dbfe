//! Error types for muxd-core.

use thiserror::Error;

/// Errors surfaced by the engine, resolver and dispatch layers.
///
/// Resolution errors distinguish "no such target" from "no current context
/// available" so the reporting collaborator can show the right message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("session not found: {0}")]
    NoSuchSession(String),

    #[error("window not found: {0}")]
    NoSuchWindow(String),

    #[error("pane not found: {0}")]
    NoSuchPane(String),

    #[error("client not found: {0}")]
    NoSuchClient(String),

    #[error("no current session")]
    NoCurrentSession,

    #[error("no current client")]
    NoCurrentClient,

    #[error("index not valid: {0}")]
    BadIndex(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("ambiguous command: {0}, could be: {1}")]
    AmbiguousCommand(String, String),

    #[error("usage: {0}")]
    Usage(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
