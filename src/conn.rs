//! The transport adapter: a byte-oriented channel with an optional
//! non-blocking `peek`/`poll` surface for the receive loop's
//! suspension points.

use std::error;
use std::io::{self, Read, Write};

/// A byte-oriented, bidirectional communication channel between the
/// stub and a connected GDB instance.
///
/// The stub does not assume reliable framing from the transport; it
/// implements the RSP `$…#cc` framing itself atop whatever byte stream
/// this trait provides. An implementation only has to move bytes; it
/// does not need to understand RSP.
pub trait Connection {
    /// Error type returned when reading or writing fails.
    type Error: Into<Box<dyn error::Error + Send + Sync>>;

    /// Reads a single byte, blocking until one is available or the
    /// connection is closed.
    fn read(&mut self) -> Result<u8, Self::Error>;

    /// Sends a single byte.
    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Writes every byte of `data`, retrying partial writes as needed.
    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        for &b in data {
            self.write(b)?;
        }
        Ok(())
    }

    /// Returns the number of bytes currently available to `read`
    /// without blocking, or `0` if none are buffered.
    ///
    /// Transports that cannot answer this cheaply may always return
    /// `0`; the receive loop then falls back to a blocking `read`
    /// rather than treating that `0` as "definitely no data" (see
    /// `supports_peek`).
    fn peek(&mut self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    /// Whether `peek`'s answer is meaningful for this transport. A
    /// transport that leaves `peek` at its default (always `0`) must
    /// also leave this at its default (`false`), so the receive loop
    /// knows a `0` means "can't tell" rather than "nothing buffered"
    /// and falls back to a blocking `read` instead of returning
    /// `Error::TryAgain`.
    fn supports_peek(&self) -> bool {
        false
    }

    /// Blocks until more data is available or the connection state
    /// changes. Transports that have no way to wait (and instead rely
    /// on the caller re-entering `run`) should leave this unimplemented,
    /// since the default returns immediately.
    fn poll(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Whether this transport supports `poll`. The receive loop uses
    /// this to decide between blocking on `poll` and returning
    /// `Error::TryAgain` when `supports_peek` is true and `peek`
    /// reports nothing available.
    fn supports_poll(&self) -> bool {
        false
    }
}

/// Any type that is both `Read` and `Write` (e.g. `TcpStream`) is
/// usable as a `Connection` without further ceremony.
impl<T: Read + Write> Connection for T {
    type Error = io::Error;

    fn read(&mut self) -> io::Result<u8> {
        let mut buf = [0u8];
        Read::read_exact(self, &mut buf)?;
        Ok(buf[0])
    }

    fn write(&mut self, byte: u8) -> io::Result<()> {
        Write::write_all(self, &[byte])
    }
}
