use thiserror::Error as ThisError;

/// Failures surfaced by the client. Every in-flight command resolves with
/// exactly one of these or with a reply; nothing is retried or swallowed.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
    /// TCP connect failed: refused, unreachable, DNS.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// Peer closed the socket or a local I/O error ended the connection.
    /// Delivered to every command still awaiting replies, in send order.
    #[error("connection has been closed")]
    ConnectionClosed,

    /// The byte stream could not be decoded as RESP. Fatal: the connection
    /// is torn down and pending commands fail with `ConnectionClosed`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An error reply (`-`) from the server, message verbatim. Affects only
    /// the command that provoked it.
    #[error("{0}")]
    Server(String),

    /// The reply shape is incompatible with the requested return kind.
    #[error("cannot project reply: {0}")]
    Projection(String),

    /// The command was malformed on the client side and never hit the wire.
    #[error("{0}")]
    Usage(String),
}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Error {
        Error::ConnectionClosed
    }
}

pub type Result<T> = std::result::Result<T, Error>;
