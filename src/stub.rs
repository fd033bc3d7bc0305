//! The command dispatcher: `GdbStub`, the struct that owns a session
//! context and drives the receive loop, with one handler method per
//! command plus the `q`/`v` sub-dispatchers.

use bitflags::bitflags;

use crate::conn::Connection;
use crate::error::Error;
use crate::monitor::MonitorOutputContext;
use crate::proto::framer::{Framer, FramerEvent};
use crate::proto::{Command, ContAction, ParseError, QueryCommand, ReplyBuilder, VerbCommand};
use crate::target::{RunState, Target};
use crate::{hex, target_desc};

/// Memory reads are streamed through a chunk this size, to bound how
/// much of the target's address space the stub ever has to hold in
/// working memory at once.
const MEM_READ_CHUNK: usize = 1024;

/// Generic "target adapter call failed" status, used for `E NN`
/// replies to `Target::Error` failures whose specific cause the stub
/// cannot interpret (the adapter's error type is opaque beyond
/// `Debug`). Distinct from `Error::to_gdb_errno`'s codes, which cover
/// the stub's own internal taxonomy.
const ERRNO_TARGET_FAILURE: u8 = 0x01;

bitflags! {
    /// Options negotiated with the peer via `qSupported`. Currently a
    /// single bit: whether the peer asked for `xmlRegisters=<arch>`
    /// matching this target, in which case we advertise (and serve)
    /// `qXfer:features:read`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureBitset: u32 {
        const TARGET_DESC_READ = 0b0000_0001;
    }
}

/// Why `GdbStub::run` returned normally rather than propagating an
/// `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent `k`.
    Killed,
    /// The transport reported end of stream.
    PeerDisconnected,
}

/// A GDB target connected via the remote serial protocol.
///
/// Owns the session context: the transport and target adapters, the
/// packet buffer (via `Framer`), the register index vector and scratch
/// buffer, the negotiated `FeatureBitset`, the cached
/// target-description XML, the extended-mode flag, and the monitor
/// output context.
pub struct GdbStub<C: Connection, T: Target> {
    conn: C,
    target: T,
    framer: Framer,
    reply: ReplyBuilder,
    last_target_state: Option<RunState>,
    reg_index: Vec<usize>,
    reg_scratch: Vec<u8>,
    features: FeatureBitset,
    target_xml: Option<String>,
    extended_mode: bool,
    monitor: MonitorOutputContext,
}

impl<C: Connection, T: Target> GdbStub<C, T> {
    /// Creates a new `GdbStub`. Infallible: Rust's ownership model
    /// makes "invalid handle" or "invalid adapter" unrepresentable, so
    /// there is no construction failure mode to report here.
    pub fn new(conn: C, target: T) -> Self {
        let register_count = target.register_info().len();
        let total_bytes: usize = target.register_info().iter().map(|r| r.bytes()).sum();
        GdbStub {
            conn,
            target,
            framer: Framer::new(),
            reply: ReplyBuilder::new(),
            last_target_state: None,
            reg_index: (0..register_count).collect(),
            reg_scratch: vec![0; total_bytes],
            features: FeatureBitset::empty(),
            target_xml: None,
            extended_mode: false,
            monitor: MonitorOutputContext::new(),
        }
    }

    /// Returns the framer to `WaitForStart`. Buffers and negotiated
    /// features are retained.
    pub fn reset(&mut self) {
        self.framer.reset();
    }

    /// Enters the receive loop. Returns once the peer disconnects, the
    /// target is killed, or an unrecoverable error occurs.
    pub fn run(mut self) -> Result<DisconnectReason, Error> {
        loop {
            match self.run_once() {
                Ok(Some(reason)) => return Ok(reason),
                Ok(None) => {}
                Err(Error::Disconnected) => return Ok(DisconnectReason::PeerDisconnected),
                Err(e) => return Err(e),
            }
        }
    }

    /// Processes exactly one suspension-point's worth of work: checks
    /// for a spontaneous stop, reads and frames one byte, and (if that
    /// completes a packet) dispatches it. Returns `Ok(Some(reason))`
    /// when the loop should end, `Ok(None)` to keep going.
    ///
    /// Exposed so embedders that drive their own event loop can step
    /// the stub one byte at a time instead of calling `run`.
    pub fn run_once(&mut self) -> Result<Option<DisconnectReason>, Error> {
        self.check_spontaneous_stop()?;

        // `peek` only tells us anything if the transport opted into
        // `supports_peek`; a transport that left both at their
        // defaults (e.g. the blanket `Read + Write` impl a plain
        // `TcpStream` gets) always reports `0`, which means "can't
        // tell", not "no data", so we fall straight through to a
        // blocking `read_byte` for it, matching `Connection::peek`'s
        // documented fallback.
        if self.conn.supports_peek() && self.conn.peek().map_err(Error::comm)? == 0 {
            if self.conn.supports_poll() {
                self.conn.poll().map_err(Error::comm)?;
            } else {
                return Err(Error::TryAgain);
            }
        }

        let byte = self.read_byte()?;
        match self.framer.feed(byte) {
            FramerEvent::None => Ok(None),
            FramerEvent::Interrupt => {
                self.target.stop();
                self.last_target_state = Some(RunState::Stopped);
                self.reply.clear();
                self.reply.stop_reply();
                self.reply.send(&mut self.conn).map_err(Error::comm)?;
                Ok(None)
            }
            FramerEvent::ChecksumMismatch => {
                self.conn.write(b'-').map_err(Error::comm)?;
                self.framer.finish_packet();
                Ok(None)
            }
            FramerEvent::Packet => {
                // The `+` ack goes out strictly before the dispatcher
                // runs, so the peer may start timing retransmission
                // while we are still processing, which is harmless
                // since dispatch is synchronous.
                self.conn.write(b'+').map_err(Error::comm)?;
                let mut body = self.framer.body().to_vec();
                self.framer.finish_packet();
                self.dispatch(&mut body)
            }
        }
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        match self.conn.read() {
            Ok(b) => Ok(b),
            Err(e) => {
                let boxed = e.into();
                if let Some(io_err) = boxed.downcast_ref::<std::io::Error>() {
                    if io_err.kind() == std::io::ErrorKind::UnexpectedEof {
                        return Err(Error::Disconnected);
                    }
                }
                Err(Error::Comm(boxed))
            }
        }
    }

    fn check_spontaneous_stop(&mut self) -> Result<(), Error> {
        let current = self.target.run_state();
        let was_running = self.last_target_state == Some(RunState::Running);
        self.last_target_state = Some(current);
        if was_running && current == RunState::Stopped {
            self.reply.clear();
            self.reply.stop_reply();
            self.reply.send(&mut self.conn).map_err(Error::comm)?;
        }
        Ok(())
    }

    fn send_ok(&mut self) -> Result<(), Error> {
        self.reply.clear();
        self.reply.ok();
        self.reply.send(&mut self.conn).map_err(Error::comm)
    }

    fn send_empty(&mut self) -> Result<(), Error> {
        self.reply.clear();
        self.reply.send(&mut self.conn).map_err(Error::comm)
    }

    fn send_stop_reply(&mut self) -> Result<(), Error> {
        self.reply.clear();
        self.reply.stop_reply();
        self.reply.send(&mut self.conn).map_err(Error::comm)
    }

    fn send_target_failure(&mut self) -> Result<(), Error> {
        self.reply.clear();
        self.reply.error(ERRNO_TARGET_FAILURE);
        self.reply.send(&mut self.conn).map_err(Error::comm)
    }

    fn dispatch(&mut self, body: &mut [u8]) -> Result<Option<DisconnectReason>, Error> {
        match Command::parse(body) {
            Ok(cmd) => self.handle(cmd),
            Err(ParseError::Unsupported) => {
                self.send_empty()?;
                Ok(None)
            }
            Err(ParseError::Malformed(what)) => {
                debug!("malformed packet body: {}", what);
                self.reply.clear();
                self.reply.error(Error::Protocol(what).to_gdb_errno().unwrap_or(0x02));
                self.reply.send(&mut self.conn).map_err(Error::comm)?;
                Ok(None)
            }
        }
    }

    fn handle(&mut self, cmd: Command) -> Result<Option<DisconnectReason>, Error> {
        trace!("{:?}", cmd);
        match cmd {
            Command::EnableExtendedMode => {
                if self.target.supports_restart() {
                    self.extended_mode = true;
                    self.send_ok()?;
                } else {
                    self.send_empty()?;
                }
                Ok(None)
            }
            Command::HaltReason => {
                self.send_stop_reply()?;
                Ok(None)
            }
            Command::Continue => {
                self.target.resume();
                self.last_target_state = Some(RunState::Running);
                Ok(None)
            }
            Command::Step => {
                self.target.single_step();
                self.last_target_state = Some(RunState::Stopped);
                self.send_stop_reply()?;
                Ok(None)
            }
            Command::ReadRegisters => self.handle_read_registers(),
            Command::WriteRegisters { data } => self.handle_write_registers(data),
            Command::ReadMemory { addr, len } => self.handle_read_memory(addr, len),
            Command::WriteMemory { addr, data } => self.handle_write_memory(addr, data),
            Command::ReadRegister { index } => self.handle_read_register(index),
            Command::WriteRegister { index, data } => self.handle_write_register(index, data),
            Command::SetTracepoint { kind, addr, wire_kind } => {
                self.handle_set_tracepoint(kind, addr, wire_kind)
            }
            Command::ClearTracepoint { kind, addr, wire_kind } => {
                self.handle_clear_tracepoint(kind, addr, wire_kind)
            }
            Command::Query(q) => self.handle_query(q),
            Command::Verb(v) => self.handle_verb(v),
            Command::Restart => {
                if self.extended_mode && self.target.supports_restart() {
                    self.target.restart();
                    self.last_target_state = Some(RunState::Running);
                }
                Ok(None)
            }
            Command::Kill => {
                self.target.kill();
                Ok(Some(DisconnectReason::Killed))
            }
        }
    }

    fn handle_read_registers(&mut self) -> Result<Option<DisconnectReason>, Error> {
        let total_bytes: usize = self.target.register_info().iter().map(|r| r.bytes()).sum();
        if self.reg_scratch.len() < total_bytes {
            self.reg_scratch.resize(total_bytes, 0);
        }
        let result = self
            .target
            .read_registers(&self.reg_index, &mut self.reg_scratch[..total_bytes]);
        match result {
            Ok(()) => {
                self.reply.clear();
                self.reply.hex_bytes(&self.reg_scratch[..total_bytes]);
                self.reply.send(&mut self.conn).map_err(Error::comm)?;
            }
            Err(e) => {
                warn!("read_registers failed: {:?}", e);
                self.send_target_failure()?;
            }
        }
        Ok(None)
    }

    fn handle_write_registers(&mut self, data: &[u8]) -> Result<Option<DisconnectReason>, Error> {
        match self.target.write_registers(&self.reg_index, data) {
            Ok(()) => self.send_ok()?,
            Err(e) => {
                warn!("write_registers failed: {:?}", e);
                self.send_target_failure()?;
            }
        }
        Ok(None)
    }

    fn handle_read_memory(&mut self, addr: u64, len: u64) -> Result<Option<DisconnectReason>, Error> {
        trace!("reading {} bytes starting at {:#010x}", len, addr);
        let mut remaining = len;
        let mut cursor = addr;
        let mut chunk = [0u8; MEM_READ_CHUNK];
        self.reply.clear();
        loop {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(MEM_READ_CHUNK as u64) as usize;
            match self.target.read_memory(cursor, &mut chunk[..take]) {
                Ok(()) => {
                    // `cursor`/`remaining` track raw target-address
                    // space; `ReplyBuilder::hex_bytes` always appends
                    // the hex-doubled length to the body `Vec`, so the
                    // output cursor and the raw-byte cursor can never
                    // be conflated (see DESIGN.md).
                    self.reply.hex_bytes(&chunk[..take]);
                    cursor += take as u64;
                    remaining -= take as u64;
                }
                Err(e) => {
                    warn!("read_memory failed at {:#010x}: {:?}", cursor, e);
                    self.reply.clear();
                    self.reply.error(ERRNO_TARGET_FAILURE);
                    break;
                }
            }
        }
        self.reply.send(&mut self.conn).map_err(Error::comm)?;
        Ok(None)
    }

    fn handle_write_memory(&mut self, addr: u64, data: &[u8]) -> Result<Option<DisconnectReason>, Error> {
        match self.target.write_memory(addr, data) {
            Ok(()) => self.send_ok()?,
            Err(e) => {
                warn!("write_memory failed at {:#010x}: {:?}", addr, e);
                self.send_target_failure()?;
            }
        }
        Ok(None)
    }

    fn handle_read_register(&mut self, index: usize) -> Result<Option<DisconnectReason>, Error> {
        let Some(info) = self.target.register_info().get(index) else {
            self.reply.clear();
            self.reply.error(Error::Protocol("register index out of range").to_gdb_errno().unwrap());
            self.reply.send(&mut self.conn).map_err(Error::comm)?;
            return Ok(None);
        };
        let width = info.bytes();
        if self.reg_scratch.len() < width {
            self.reg_scratch.resize(width, 0);
        }
        match self.target.read_registers(&[index], &mut self.reg_scratch[..width]) {
            Ok(()) => {
                self.reply.clear();
                self.reply.hex_bytes(&self.reg_scratch[..width]);
                self.reply.send(&mut self.conn).map_err(Error::comm)?;
            }
            Err(e) => {
                warn!("read_registers(single) failed: {:?}", e);
                self.send_target_failure()?;
            }
        }
        Ok(None)
    }

    fn handle_write_register(&mut self, index: usize, data: &[u8]) -> Result<Option<DisconnectReason>, Error> {
        if self.target.register_info().get(index).is_none() {
            self.reply.clear();
            self.reply.error(Error::Protocol("register index out of range").to_gdb_errno().unwrap());
            self.reply.send(&mut self.conn).map_err(Error::comm)?;
            return Ok(None);
        }
        match self.target.write_registers(&[index], data) {
            Ok(()) => self.send_ok()?,
            Err(e) => {
                warn!("write_registers(single) failed: {:?}", e);
                self.send_target_failure()?;
            }
        }
        Ok(None)
    }

    fn handle_set_tracepoint(
        &mut self,
        kind: crate::target::TracepointKind,
        addr: u64,
        wire_kind: u64,
    ) -> Result<Option<DisconnectReason>, Error> {
        match self.target.set_tracepoint(addr, kind, wire_kind) {
            Some(Ok(())) => self.send_ok()?,
            Some(Err(e)) => {
                warn!("set_tracepoint failed: {:?}", e);
                self.send_target_failure()?;
            }
            None => self.send_empty()?,
        }
        Ok(None)
    }

    fn handle_clear_tracepoint(
        &mut self,
        kind: crate::target::TracepointKind,
        addr: u64,
        wire_kind: u64,
    ) -> Result<Option<DisconnectReason>, Error> {
        match self.target.clear_tracepoint(addr, kind, wire_kind) {
            Some(Ok(())) => self.send_ok()?,
            Some(Err(e)) => {
                warn!("clear_tracepoint failed: {:?}", e);
                self.send_target_failure()?;
            }
            None => self.send_empty()?,
        }
        Ok(None)
    }

    fn handle_query(&mut self, q: QueryCommand) -> Result<Option<DisconnectReason>, Error> {
        match q {
            QueryCommand::TStatus => {
                self.reply.clear();
                self.reply.str("T0");
                self.reply.send(&mut self.conn).map_err(Error::comm)?;
            }
            QueryCommand::Supported { features } => {
                self.negotiate_supported(features);
                self.reply.clear();
                self.reply.str("qXfer:features:read+");
                self.reply.send(&mut self.conn).map_err(Error::comm)?;
            }
            QueryCommand::XferFeaturesRead { annex, offset, length } => {
                self.handle_xfer_features_read(annex, offset, length)?;
            }
            QueryCommand::Rcmd { hex } => self.handle_rcmd(hex)?,
        }
        Ok(None)
    }

    /// Marks `qXfer:features:read` as negotiated. The stub always has
    /// a target description available, built from the target's own
    /// register table, so it advertises support unconditionally
    /// rather than gating on the peer having sent a matching
    /// `xmlRegisters=<arch>` token; `features` is accepted for its
    /// other tokens (`name+`/`name-`/`name=value`) to round-trip the
    /// grammar, but this stub has no other negotiable feature yet.
    fn negotiate_supported(&mut self, _features: &[u8]) {
        self.features.insert(FeatureBitset::TARGET_DESC_READ);
    }

    fn handle_xfer_features_read(&mut self, annex: &[u8], offset: u64, length: u64) -> Result<(), Error> {
        self.reply.clear();
        if annex != b"target.xml" {
            self.reply.error(0x00);
            return self.reply.send(&mut self.conn).map_err(Error::comm);
        }

        if self.target_xml.is_none() {
            self.target_xml = Some(target_desc::build(self.target.arch(), self.target.register_info()));
        }
        // `target_xml` is built at most once per session; every
        // subsequent read slices the same cache.
        let xml = self.target_xml.as_ref().expect("just initialized above");
        let bytes = xml.as_bytes();
        let offset = offset as usize;

        if offset >= bytes.len() {
            self.reply.str("l");
        } else {
            let end = bytes.len().min(offset + length as usize);
            let more_follows = end < bytes.len();
            self.reply.str(if more_follows { "m" } else { "l" });
            self.reply.raw(&bytes[offset..end]);
        }
        self.reply.send(&mut self.conn).map_err(Error::comm)
    }

    fn handle_rcmd(&mut self, hex_body: &[u8]) -> Result<(), Error> {
        let decoded = hex::decode(hex_body)?;
        let cmd_str = std::str::from_utf8(&decoded).map_err(|_| Error::Protocol("qRcmd payload not UTF-8"))?;
        let mut parts = cmd_str.splitn(2, ' ');
        let name = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("");

        let found = self
            .target
            .custom_commands()
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.run);

        match found {
            Some(run) => {
                self.monitor.clear();
                run(&mut self.target, args, &mut self.monitor);
                if self.monitor.is_empty() {
                    self.send_ok()
                } else {
                    let encoded = self.monitor.hex_encode()?;
                    self.reply.clear();
                    self.reply.raw(&encoded);
                    self.reply.send(&mut self.conn).map_err(Error::comm)
                }
            }
            None => {
                self.reply.clear();
                self.reply.error(Error::CommandNotFound.to_gdb_errno().unwrap());
                self.reply.send(&mut self.conn).map_err(Error::comm)
            }
        }
    }

    fn handle_verb(&mut self, v: VerbCommand) -> Result<Option<DisconnectReason>, Error> {
        match v {
            VerbCommand::ContQuery => {
                self.reply.clear();
                self.reply.str("vCont;s;c;t");
                self.reply.send(&mut self.conn).map_err(Error::comm)?;
            }
            VerbCommand::Cont { action, thread: _ } => match action {
                ContAction::Continue => {
                    self.target.resume();
                    self.last_target_state = Some(RunState::Running);
                }
                ContAction::Step => {
                    self.target.single_step();
                    self.last_target_state = Some(RunState::Stopped);
                    self.send_stop_reply()?;
                }
                ContAction::Stop => {
                    self.target.stop();
                    self.last_target_state = Some(RunState::Stopped);
                    self.send_stop_reply()?;
                }
            },
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Arch, CustomCommand, RegisterClass, RegisterInfo, TracepointKind};
    use std::collections::VecDeque;

    struct ScriptedConn {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl ScriptedConn {
        fn new(input: &[u8]) -> Self {
            ScriptedConn {
                inbound: input.iter().copied().collect(),
                outbound: Vec::new(),
            }
        }
    }

    impl Connection for ScriptedConn {
        type Error = std::io::Error;

        fn read(&mut self) -> Result<u8, Self::Error> {
            self.inbound
                .pop_front()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
        }

        fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
            self.outbound.push(byte);
            Ok(())
        }

        fn peek(&mut self) -> Result<usize, Self::Error> {
            Ok(self.inbound.len())
        }

        fn supports_peek(&self) -> bool {
            true
        }

        fn supports_poll(&self) -> bool {
            true
        }
    }

    const REGS: &[RegisterInfo] = &[
        RegisterInfo::new("r0", 32, RegisterClass::General),
        RegisterInfo::new("r1", 32, RegisterClass::General),
        RegisterInfo::new("pc", 32, RegisterClass::ProgramCounter),
    ];

    struct FakeTarget {
        regs: [u32; 3],
        state: RunState,
        stop_calls: u32,
    }

    impl FakeTarget {
        fn new() -> Self {
            FakeTarget { regs: [0x11223344, 0x55667788, 0x10], state: RunState::Stopped, stop_calls: 0 }
        }
    }

    impl Target for FakeTarget {
        type Error = ();

        fn arch(&self) -> Arch {
            Arch::Arm
        }

        fn register_info(&self) -> &'static [RegisterInfo] {
            REGS
        }

        fn run_state(&self) -> RunState {
            self.state
        }

        fn stop(&mut self) {
            self.stop_calls += 1;
            self.state = RunState::Stopped;
        }

        fn resume(&mut self) {
            self.state = RunState::Running;
        }

        fn single_step(&mut self) {
            self.state = RunState::Stopped;
        }

        fn read_memory(&mut self, _addr: u64, buf: &mut [u8]) -> Result<(), ()> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = i as u8;
            }
            Ok(())
        }

        fn write_memory(&mut self, _addr: u64, _data: &[u8]) -> Result<(), ()> {
            Ok(())
        }

        fn read_registers(&mut self, indices: &[usize], out: &mut [u8]) -> Result<(), ()> {
            let mut pos = 0;
            for &idx in indices {
                let bytes = self.regs[idx].to_le_bytes();
                out[pos..pos + 4].copy_from_slice(&bytes);
                pos += 4;
            }
            Ok(())
        }

        fn write_registers(&mut self, indices: &[usize], data: &[u8]) -> Result<(), ()> {
            let mut pos = 0;
            for &idx in indices {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&data[pos..pos + 4]);
                self.regs[idx] = u32::from_le_bytes(bytes);
                pos += 4;
            }
            Ok(())
        }

        fn custom_commands(&self) -> &'static [CustomCommand<Self>] {
            fn ping(_t: &mut FakeTarget, _args: &str, out: &mut dyn std::fmt::Write) {
                write!(out, "pong").unwrap();
            }
            &[CustomCommand { name: "ping", run: ping }]
        }
    }

    fn drive(stub: &mut GdbStub<ScriptedConn, FakeTarget>, n: usize) {
        for _ in 0..n {
            match stub.run_once() {
                Ok(_) => {}
                Err(Error::TryAgain) | Err(Error::Disconnected) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[test]
    fn read_all_registers_scenario() {
        let conn = ScriptedConn::new(b"$g#67");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert_eq!(&stub.conn.outbound, b"+$443322118877665510000000#C9");
    }

    #[test]
    fn read_memory_scenario() {
        let conn = ScriptedConn::new(b"$m1000,2#8C");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert!(stub.conn.outbound.starts_with(b"+$0001#"));
    }

    #[test]
    fn bad_checksum_is_nacked_without_dispatch() {
        let conn = ScriptedConn::new(b"$g#00");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert_eq!(stub.conn.outbound, b"-");
    }

    #[test]
    fn out_of_band_interrupt_stops_target_and_replies_s05() {
        let conn = ScriptedConn::new(b"\x03");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert_eq!(stub.target.stop_calls, 1);
        assert_eq!(stub.conn.outbound, b"$S05#B8");
    }

    #[test]
    fn vcont_query_scenario() {
        let conn = ScriptedConn::new(b"$vCont?#49");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert_eq!(stub.conn.outbound, b"+$vCont;s;c;t#05");
    }

    #[test]
    fn vcont_continue_has_no_reply_and_marks_running() {
        let conn = ScriptedConn::new(b"$vCont;c#a8");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert_eq!(stub.conn.outbound, b"+");
        assert_eq!(stub.target.state, RunState::Running);
    }

    #[test]
    fn qsupported_negotiates_target_description_read() {
        let conn = ScriptedConn::new(b"$qSupported:xmlRegisters=arm#F7");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert!(stub.conn.outbound.ends_with(b"qXfer:features:read+#A0"));
        assert!(stub.features.contains(FeatureBitset::TARGET_DESC_READ));
    }

    #[test]
    fn empty_qsupported_still_advertises_target_description_read() {
        let conn = ScriptedConn::new(b"$qSupported:#71");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        // Even an empty feature-token list gets `qXfer:features:read+`
        // back: the stub always has a target description to serve,
        // independent of what the peer asked for.
        assert_eq!(stub.conn.outbound, b"+$qXfer:features:read+#A0");
        assert!(stub.features.contains(FeatureBitset::TARGET_DESC_READ));
    }

    #[test]
    fn qrcmd_runs_custom_command_and_hex_encodes_output() {
        let body = format!("qRcmd,{}", hex::encode(b"ping").iter().map(|&b| b as char).collect::<String>());
        let packet = format!("${}#{:02X}", body, crate::proto::framer::checksum(body.as_bytes()));
        let conn = ScriptedConn::new(packet.as_bytes());
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 32);
        let expected_hex = hex::encode(b"pong");
        assert!(
            stub.conn
                .outbound
                .windows(expected_hex.len())
                .any(|w| w == expected_hex.as_slice())
        );
    }

    #[test]
    fn qxfer_features_read_serves_cached_target_xml() {
        let packet = format!(
            "$qXfer:features:read:target.xml:0,fff#{:02X}",
            crate::proto::framer::checksum(b"qXfer:features:read:target.xml:0,fff")
        );
        let conn = ScriptedConn::new(packet.as_bytes());
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert!(stub.conn.outbound.windows(2).any(|w| w == b"+$"));
        assert!(stub.target_xml.is_some());
        let xml = stub.target_xml.clone().unwrap();
        assert!(xml.contains("<architecture>arm</architecture>"));
    }

    #[test]
    fn unsupported_tracepoint_gets_empty_reply() {
        let conn = ScriptedConn::new(b"$Z0,1000,1#D4");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        drive(&mut stub, 16);
        assert_eq!(stub.conn.outbound, b"+$#00");
    }

    #[test]
    fn kill_terminates_run_once_with_killed_reason() {
        let conn = ScriptedConn::new(b"$k#6b");
        let mut stub = GdbStub::new(conn, FakeTarget::new());
        let mut reason = None;
        for _ in 0..8 {
            match stub.run_once() {
                Ok(Some(r)) => {
                    reason = Some(r);
                    break;
                }
                Ok(None) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(reason, Some(DisconnectReason::Killed));
    }

    #[test]
    fn run_surfaces_peer_disconnect_as_ok() {
        let conn = ScriptedConn::new(b"");
        let stub = GdbStub::new(conn, FakeTarget::new());
        assert_eq!(stub.run().unwrap(), DisconnectReason::PeerDisconnected);
    }
}
