//! The `qRcmd` monitor output helper: a fixed-capacity scratch buffer
//! that a target's custom command callback formats into via `write!`,
//! which is then hex-encoded and sent back as the `qRcmd` reply.

use std::fmt;

use crate::error::Error;

/// Scratch buffer capacity in bytes.
const CAPACITY: usize = 512;

/// A bounded `core::fmt::Write` sink. Output beyond `CAPACITY` bytes is
/// silently truncated, since GDB's `monitor` command has no way to
/// signal "output was too long" anyway.
pub struct MonitorOutputContext {
    buf: [u8; CAPACITY],
    len: usize,
}

impl MonitorOutputContext {
    pub fn new() -> Self {
        MonitorOutputContext {
            buf: [0; CAPACITY],
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hex-encodes the captured output, for use as the `qRcmd` reply
    /// body. Returns `Error::BufferOverflow` only in the degenerate
    /// case of a caller holding a context whose `len` somehow exceeds
    /// `CAPACITY`; under normal use `write!` truncation keeps this
    /// invariant intact.
    pub fn hex_encode(&self) -> Result<Vec<u8>, Error> {
        if self.len > self.buf.len() {
            return Err(Error::BufferOverflow);
        }
        Ok(crate::hex::encode(self.as_bytes()))
    }
}

impl Default for MonitorOutputContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for MonitorOutputContext {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len() - self.len;
        let take = remaining.min(bytes.len());
        self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
        // Silent truncation; always report success so `write!` call
        // sites don't need to handle overflow explicitly.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn captures_formatted_output() {
        let mut ctx = MonitorOutputContext::new();
        write!(ctx, "count={} name={}", 5, "core0").unwrap();
        assert_eq!(ctx.as_bytes(), b"count=5 name=core0");
    }

    #[test]
    fn truncates_silently_past_capacity() {
        let mut ctx = MonitorOutputContext::new();
        for _ in 0..CAPACITY + 100 {
            write!(ctx, "x").unwrap();
        }
        assert_eq!(ctx.as_bytes().len(), CAPACITY);
    }

    #[test]
    fn hex_round_trips_through_encode() {
        let mut ctx = MonitorOutputContext::new();
        write!(ctx, "ok").unwrap();
        assert_eq!(ctx.hex_encode().unwrap(), b"6F6B".to_vec());
    }

    #[test]
    fn empty_output_is_empty() {
        let ctx = MonitorOutputContext::new();
        assert!(ctx.is_empty());
    }
}
