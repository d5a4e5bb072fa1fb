//! Error types shared by the protocol engine and the formula interpreter.

use std::io;

use thiserror::Error;

/// Faults raised while decoding a single frame off the wire.
///
/// These never escape [`crate::message::FrameReader::receive_frame`]; the reader logs them and
/// hands back an empty frame instead.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame announced a negative length {0}")]
    NegativeLength(i32),

    #[error("frame announced a zero length")]
    EmptyFrame,

    #[error("stream closed after {received} of {expected} frame bytes")]
    Truncated { expected: usize, received: usize },

    #[error("frame payload of {0} bytes does not fit the length prefix")]
    TooLarge(usize),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("peer did not answer with a signature frame")]
    MissingSignature,

    #[error("peer sent a signature that does not match")]
    SignatureMismatch,

    #[error("peer did not send a display name")]
    MissingName,
}

/// Faults contained at the boundary of a single communication flow.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("flow has already been disposed")]
    Disposed,

    #[error("flow has already been started")]
    AlreadyStarted,

    #[error("local input is already bound to another flow")]
    InputUnavailable,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Result of running a formula that did not produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The text is not a complete expression. Carries whatever could not be consumed.
    #[error("not a valid expression: {remaining:?}")]
    Syntax { remaining: String },

    #[error("division by zero")]
    DivideByZero,
}
