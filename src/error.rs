//! Crate-wide error type.
//!
//! Graph edits are validated synchronously and fail with one of these before
//! any event is sent. Errors met while a worker applies an event are logged and
//! never travel back to the sender.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no node named '{0}'")]
    NotFound(String),

    #[error("a node named '{0}' already exists")]
    AlreadyExists(String),

    #[error("connecting '{src}' -> '{dst}' would create a cycle")]
    CycleDetected { src: String, dst: String },

    #[error("'{dst}' is not a child of '{src}'")]
    NotConnected { src: String, dst: String },

    #[error("'{src}' cannot feed '{dst}'")]
    Incompatible { src: String, dst: String },

    #[error("unknown node kind '{0}'")]
    UnknownKind(String),

    #[error("{node}: '{kind}' event carries the wrong payload")]
    MalformedEvent { node: String, kind: String },

    #[error("{node}: event dropped")]
    Dropped { node: String },

    #[error("no clock attached for deferred events")]
    NoClock,

    #[error("command: {0}")]
    Command(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("device: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
