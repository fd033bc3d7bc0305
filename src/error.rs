use std::error;
use std::fmt;

/// The possible errors returned by this library.
#[derive(Debug)]
pub enum Error {
    /// Error while reading from or writing to the transport.
    Comm(Box<dyn error::Error + Send + Sync>),

    /// A collection backed by the global allocator failed to grow.
    ///
    /// Rust's `Vec`/`Box` abort on allocation failure rather than
    /// returning `null`, so this variant is reachable only from
    /// fallible paths the embedder opts into (currently none); it is
    /// kept so out-of-memory maps onto a concrete variant instead of
    /// being silently dropped.
    OutOfMemory,

    /// The peer sent a packet body that violates RSP grammar: bad hex,
    /// a missing separator, or a malformed `qXfer` request.
    Protocol(&'static str),

    /// A `qRcmd` name did not match any entry in the target's custom
    /// command table.
    CommandNotFound,

    /// A `qRcmd` payload decoded to more bytes than the monitor output
    /// scratch buffer can hold.
    BufferOverflow,

    /// The transport reported end of stream.
    Disconnected,

    /// No data was available and the transport has no `poll` to wait
    /// on. Not fatal: the caller should re-enter `run` later.
    TryAgain,

    /// The receive state machine observed a state transition it
    /// cannot handle. Indicates a bug in the framer, not bad input.
    Internal(&'static str),
}

impl Error {
    pub(crate) fn comm<E>(e: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error::Comm(e.into())
    }

    /// Maps this error onto the one-byte status GDB's `E NN` reply
    /// expects, for the subset of variants that should be surfaced to
    /// the peer rather than abort the receive loop.
    pub fn to_gdb_errno(&self) -> Option<u8> {
        match self {
            Error::OutOfMemory => Some(0x01),
            Error::Protocol(_) => Some(0x02),
            Error::CommandNotFound => Some(0x03),
            Error::BufferOverflow => Some(0x04),
            Error::Comm(_) | Error::Disconnected | Error::TryAgain | Error::Internal(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Comm(e) => write!(f, "transport error: {}", e),
            Error::OutOfMemory => write!(f, "allocator could not satisfy growth request"),
            Error::Protocol(what) => write!(f, "protocol violation: {}", what),
            Error::CommandNotFound => write!(f, "unknown monitor command"),
            Error::BufferOverflow => write!(f, "monitor output exceeded scratch capacity"),
            Error::Disconnected => write!(f, "peer disconnected"),
            Error::TryAgain => write!(f, "no data available and transport has no poll()"),
            Error::Internal(what) => write!(f, "internal error: {}", what),
        }
    }
}

impl error::Error for Error {}
