//! The packet framer: a three-state receive machine that locates
//! `$…#cc` frames in an arbitrary byte stream, validates the
//! checksum, and recognizes the `0x03` out-of-band interrupt outside
//! a frame.

/// Receive state of the packet framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    WaitForStart,
    ReceiveBody,
    ReceiveChecksum,
}

/// What happened as a result of feeding one byte to the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerEvent {
    /// No externally visible event; keep feeding bytes.
    None,
    /// A complete, checksum-valid packet is ready in `Framer::body()`.
    /// The caller should ack with `+`, dispatch it, then call
    /// `Framer::finish_packet()`.
    Packet,
    /// A complete packet was received but its checksum did not match.
    /// The caller should emit `-` and call `Framer::finish_packet()`.
    ChecksumMismatch,
    /// `0x03` was observed outside a frame: an out-of-band interrupt.
    Interrupt,
}

/// The packet-framing state machine. Owns the grow-only packet buffer;
/// capacity is retained across packets and resets, and only actually
/// reclaimed by `shrink_to_fit` (never called; the buffer only shrinks
/// at explicit reset points, and a `reset` here keeps capacity too,
/// drawing the shrink/free distinction at session teardown rather
/// than at `reset`).
pub struct Framer {
    buf: Vec<u8>,
    state: ReceiveState,
    computed_checksum: u8,
    checksum_digits: [u8; 2],
    checksum_digits_filled: u8,
}

impl Framer {
    pub fn new() -> Self {
        Framer {
            buf: Vec::new(),
            state: ReceiveState::WaitForStart,
            computed_checksum: 0,
            checksum_digits: [0; 2],
            checksum_digits_filled: 0,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// The in-flight or just-completed packet body (bytes strictly
    /// between `$` and `#`).
    pub fn body(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the framer to `WaitForStart` without freeing the
    /// packet buffer's backing storage.
    pub fn reset(&mut self) {
        self.state = ReceiveState::WaitForStart;
        self.buf.clear();
        self.computed_checksum = 0;
        self.checksum_digits_filled = 0;
    }

    /// Called by the dispatcher once it is done with `body()`, to
    /// return the framer to `WaitForStart` for the next packet. Unlike
    /// `reset`, this is the normal per-packet path, not a caller-
    /// requested reset, but the mechanics are identical.
    pub fn finish_packet(&mut self) {
        self.reset();
    }

    /// Feeds one byte from the transport into the state machine.
    pub fn feed(&mut self, byte: u8) -> FramerEvent {
        match self.state {
            ReceiveState::WaitForStart => {
                if byte == b'$' {
                    // "Shift buffer so `$` is at offset 0": since we
                    // process one byte at a time there is nothing to
                    // shift; starting the body accumulation at an
                    // empty buffer has the same effect.
                    self.buf.clear();
                    self.computed_checksum = 0;
                    self.state = ReceiveState::ReceiveBody;
                    FramerEvent::None
                } else if byte == 0x03 {
                    FramerEvent::Interrupt
                } else {
                    // "no $: discard all buffered bytes": there is
                    // nothing buffered yet in this state, so this is a
                    // no-op per byte.
                    FramerEvent::None
                }
            }
            ReceiveState::ReceiveBody => {
                if byte == b'#' {
                    self.checksum_digits_filled = 0;
                    self.state = ReceiveState::ReceiveChecksum;
                } else {
                    self.buf.push(byte);
                    self.computed_checksum = self.computed_checksum.wrapping_add(byte);
                }
                FramerEvent::None
            }
            ReceiveState::ReceiveChecksum => {
                self.checksum_digits[self.checksum_digits_filled as usize] = byte;
                self.checksum_digits_filled += 1;
                if self.checksum_digits_filled < 2 {
                    return FramerEvent::None;
                }

                match decode_hex_byte(self.checksum_digits) {
                    Some(received) if received == self.computed_checksum => FramerEvent::Packet,
                    _ => FramerEvent::ChecksumMismatch,
                }
            }
        }
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn decode_hex_byte(digits: [u8; 2]) -> Option<u8> {
    let hi = decode_hex_digit(digits[0])?;
    let lo = decode_hex_digit(digits[1])?;
    Some((hi << 4) | lo)
}

/// The 8-bit additive checksum RSP uses to frame a body, exposed so
/// the reply builder can compute it for outgoing packets the same way
/// the framer computes it for incoming ones.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(framer: &mut Framer, s: &str) -> Vec<FramerEvent> {
        s.bytes().map(|b| framer.feed(b)).collect()
    }

    #[test]
    fn frames_a_well_formed_packet() {
        let mut framer = Framer::new();
        let events = feed_str(&mut framer, "$g#67");
        assert_eq!(events.last(), Some(&FramerEvent::Packet));
        assert_eq!(framer.body(), b"g");
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut framer = Framer::new();
        let events = feed_str(&mut framer, "$g#00");
        assert_eq!(events.last(), Some(&FramerEvent::ChecksumMismatch));
    }

    #[test]
    fn accepts_lowercase_checksum_digits() {
        let mut framer = Framer::new();
        let events = feed_str(&mut framer, "$g#67");
        assert_eq!(events.last(), Some(&FramerEvent::Packet));
    }

    #[test]
    fn interrupt_byte_outside_frame_is_recognized() {
        let mut framer = Framer::new();
        assert_eq!(framer.feed(0x03), FramerEvent::Interrupt);
        assert_eq!(framer.state(), ReceiveState::WaitForStart);
    }

    #[test]
    fn garbage_before_dollar_is_discarded() {
        let mut framer = Framer::new();
        feed_str(&mut framer, "garbage-before-packet");
        let events = feed_str(&mut framer, "$g#67");
        assert_eq!(events.last(), Some(&FramerEvent::Packet));
        assert_eq!(framer.body(), b"g");
    }

    #[test]
    fn reset_returns_to_wait_for_start_mid_packet() {
        let mut framer = Framer::new();
        feed_str(&mut framer, "$partial");
        framer.reset();
        assert_eq!(framer.state(), ReceiveState::WaitForStart);
        let events = feed_str(&mut framer, "$g#67");
        assert_eq!(events.last(), Some(&FramerEvent::Packet));
    }

    #[test]
    fn finish_packet_allows_receiving_the_next_one() {
        let mut framer = Framer::new();
        feed_str(&mut framer, "$g#67");
        framer.finish_packet();
        let events = feed_str(&mut framer, "$qTStatus#49");
        assert_eq!(events.last(), Some(&FramerEvent::Packet));
        assert_eq!(framer.body(), b"qTStatus");
    }

    #[test]
    fn checksum_matches_additive_sum() {
        assert_eq!(checksum(b"qTStatus"), 0x49);
        assert_eq!(checksum(b"g"), 0x67);
    }

    #[test]
    fn buffer_capacity_never_shrinks_below_write_offset_implicitly() {
        let mut framer = Framer::new();
        feed_str(&mut framer, "$g#67");
        let cap_after_first = framer.buf.capacity();
        framer.finish_packet();
        feed_str(&mut framer, "$g#67");
        // Vec::clear() never reduces capacity.
        assert!(framer.buf.capacity() >= cap_after_first);
    }
}
