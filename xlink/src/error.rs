//! Error types for the transport engine.
//!
//! Protocol errors sent by the server are values, never fatal at this
//! layer; transport failures are terminal and unwind every waiter.

use std::any::Any;
use std::fmt;

use xlink_core::{DisplayParseError, SequenceNumber};

/// A decoded X protocol error, as produced by an error constructor from the
/// [`Registry`](crate::Registry).
///
/// The transport does not interpret error payloads; it only needs the
/// originating sequence number to route the error and the code for
/// diagnostics. Concrete error types come from the generated protocol
/// layer; [`UnknownError`](crate::UnknownError) stands in when no
/// constructor is registered for a code.
pub trait ServerError: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The error code (byte 1 of the wire frame).
    fn error_code(&self) -> u8;

    /// The sequence number of the request this error answers.
    fn sequence(&self) -> SequenceNumber;

    /// Downcasting support for callers that know the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Errors surfaced by request submission and cookie observation.
///
/// Transport failures are terminal and never carried as values here: the
/// failing worker logs the I/O error, shuts the connection down, and every
/// waiter observes [`Error::Closed`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection shut down before this operation could resolve,
    /// either through [`close`](crate::Conn::close) or a terminal
    /// transport failure.
    #[error("connection closed before the request was resolved")]
    Closed,

    /// The resource id space advertised at setup is used up.
    #[error("resource id space exhausted")]
    IdExhausted,

    /// The server rejected the request.
    #[error("{0}")]
    X(Box<dyn ServerError>),

    /// A cookie operation that its delivery mode does not permit.
    #[error("cookie misuse: {0}")]
    CookieMisuse(&'static str),
}

/// Result alias for request-path operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced while establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The display specifier could not be parsed.
    #[error(transparent)]
    Display(#[from] DisplayParseError),

    /// I/O failure while dialing or during the handshake.
    #[error("i/o failure during connection setup: {0}")]
    Io(#[from] std::io::Error),

    /// The authority file names a protocol this client cannot speak.
    #[error("unsupported auth protocol {0}")]
    UnsupportedAuthProtocol(String),

    /// The server speaks a protocol version other than 11.0.
    #[error("x protocol version mismatch: server speaks {major}.{minor}")]
    VersionMismatch {
        /// Major version reported by the server.
        major: u16,
        /// Minor version reported by the server.
        minor: u16,
    },

    /// The server refused the connection.
    #[error("x protocol connection refused: {0}")]
    Refused(String),

    /// The server demands additional authentication this client cannot
    /// perform.
    #[error("server demands further authentication: {0}")]
    AuthenticateRequired(String),

    /// The setup block did not decode.
    #[error("malformed setup block: {0}")]
    MalformedSetup(String),
}
