//! The reply builder: frames, checksums, and hex-encodes outgoing
//! packet bodies through a single scratch-buffer writer that doesn't
//! need a `Drop`-enforced `finish()` dance, because it builds into a
//! `Vec` rather than writing straight to the wire.

use crate::conn::Connection;
use crate::error::Error;
use crate::hex;

/// Accumulates one reply body, then frames and sends it.
///
/// Owns the growable scratch buffer for one reply; callers append to
/// it with `raw`/`hex_bytes`/`str`, then call `send` to emit
/// `$<body>#<cc>` through the `Connection` in as few writes as the
/// transport will accept.
pub struct ReplyBuilder {
    body: Vec<u8>,
}

impl ReplyBuilder {
    pub fn new() -> Self {
        ReplyBuilder { body: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.body.clear();
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.body.extend_from_slice(bytes);
        self
    }

    pub fn str(&mut self, s: &str) -> &mut Self {
        self.raw(s.as_bytes())
    }

    /// Appends `data`, hex-encoded.
    pub fn hex_bytes(&mut self, data: &[u8]) -> &mut Self {
        hex::encode_into(data, &mut self.body);
        self
    }

    /// `OK`: success with no data to return.
    pub fn ok(&mut self) -> &mut Self {
        self.str("OK")
    }

    /// `E<hh>`: the low byte of `errno`, RSP's error reply format.
    pub fn error(&mut self, errno: u8) -> &mut Self {
        self.body.push(b'E');
        let mut digits = [0u8; 2];
        hex::encode_byte(errno, &mut digits);
        self.body.push(digits[0]);
        self.body.push(digits[1]);
        self
    }

    /// `S05`: the stop-reply this stub always reports (SIGTRAP).
    pub fn stop_reply(&mut self) -> &mut Self {
        self.str("S05")
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Frames the accumulated body as `$<body>#<cc>` and sends it
    /// through `conn` in one call per framing byte/body chunk, then
    /// clears the scratch buffer for the next reply.
    ///
    /// `$#00` (the canonical "unsupported" empty reply) is produced
    /// the same way as any other reply: an empty body checksums to 0.
    pub fn send<C: Connection>(&mut self, conn: &mut C) -> Result<(), Error> {
        conn.write(b'$').map_err(Error::comm)?;
        conn.write_all(&self.body).map_err(Error::comm)?;
        conn.write(b'#').map_err(Error::comm)?;
        let checksum = crate::proto::framer::checksum(&self.body);
        let mut digits = [0u8; 2];
        hex::encode_byte(checksum, &mut digits);
        conn.write_all(&digits).map_err(Error::comm)?;
        self.clear();
        Ok(())
    }
}

impl Default for ReplyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecConn(Vec<u8>);
    impl Connection for VecConn {
        type Error = std::convert::Infallible;
        fn read(&mut self) -> Result<u8, Self::Error> {
            unreachable!()
        }
        fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
            self.0.push(byte);
            Ok(())
        }
    }

    #[test]
    fn frames_ok_reply() {
        let mut builder = ReplyBuilder::new();
        let mut conn = VecConn(Vec::new());
        builder.ok();
        builder.send(&mut conn).unwrap();
        assert_eq!(conn.0, b"$OK#9A");
    }

    #[test]
    fn frames_empty_reply_as_dollar_hash_00() {
        let mut builder = ReplyBuilder::new();
        let mut conn = VecConn(Vec::new());
        builder.send(&mut conn).unwrap();
        assert_eq!(conn.0, b"$#00");
    }

    #[test]
    fn frames_error_reply() {
        let mut builder = ReplyBuilder::new();
        let mut conn = VecConn(Vec::new());
        builder.error(0x01);
        builder.send(&mut conn).unwrap();
        assert_eq!(&conn.0[..3], b"$E0");
    }

    #[test]
    fn hex_bytes_appends_uppercase_encoding() {
        let mut builder = ReplyBuilder::new();
        builder.hex_bytes(&[0xAA, 0xBB]);
        assert_eq!(builder.body(), b"AABB");
    }

    #[test]
    fn checksum_of_emitted_reply_matches_additive_sum() {
        let mut builder = ReplyBuilder::new();
        let mut conn = VecConn(Vec::new());
        builder.str("qXfer:features:read+");
        builder.send(&mut conn).unwrap();
        let body_end = conn.0.iter().position(|&b| b == b'#').unwrap();
        let body = &conn.0[1..body_end];
        let expected = crate::proto::framer::checksum(body);
        let digits = &conn.0[body_end + 1..body_end + 3];
        let decoded = hex::decode(digits).unwrap();
        assert_eq!(decoded[0], expected);
    }
}
