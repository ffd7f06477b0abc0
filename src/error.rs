//! Error types
//!
//! Configuration errors abort setup. Collaborator errors never escape the
//! runtime: they are turned into failure events.

use thiserror::Error;

/// Errors surfaced to whoever builds or drives a bot form
#[derive(Debug, Error)]
pub enum BotFormError {
    #[error("[{name}] steps must have at least 1 entry")]
    EmptyCatalog { name: String },
    #[error("[{name}] step key `{key}` is declared more than once")]
    DuplicateStepKey { name: String, key: String },
    #[error("bot form runtime has shut down")]
    RuntimeClosed,
}

/// Failure reported by an async validator, options fetcher or fulfillment runner
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CollaboratorError {
    pub kind: CollaboratorErrorKind,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(kind: CollaboratorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Transport, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Server, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Rejected, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Unknown, message)
    }
}

/// Error classification, mostly for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorErrorKind {
    /// Connection refused, timeout, DNS
    Transport,
    /// The remote side answered with a failure (5xx)
    Server,
    /// The remote side refused the request (4xx)
    Rejected,
    Unknown,
}
