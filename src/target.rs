//! The debug target adapter: a single `Target` trait covering
//! run-control, memory, registers, tracepoints, and the static
//! register-descriptor table a target exposes.

use byteorder::{ByteOrder, LittleEndian};

/// Coarse semantic class of a register, used by the target-description
/// builder to decide whether to emit a `type="..."` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    General,
    ProgramCounter,
    StackPointer,
    CodePointer,
    Status,
}

/// Describes one register in the target's register file. An ordered,
/// `&'static` sequence of these is supplied by `Target::register_info`;
/// the stub never needs to know more about a register than its name,
/// width, and class.
#[derive(Debug, Clone, Copy)]
pub struct RegisterInfo {
    pub name: &'static str,
    /// Register width in bits. Must be a multiple of 8.
    pub bits: u16,
    pub class: RegisterClass,
}

impl RegisterInfo {
    pub const fn new(name: &'static str, bits: u16, class: RegisterClass) -> Self {
        RegisterInfo { name, bits, class }
    }

    pub const fn bytes(&self) -> usize {
        (self.bits / 8) as usize
    }
}

/// The target architecture, used to select the `qSupported` feature
/// name and the target-description XML's `<architecture>` /
/// `<feature name="...">` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Arm,
    X86,
    Amd64,
}

impl Arch {
    /// The string GDB expects to see negotiated via
    /// `qSupported:xmlRegisters=<arch>` and emitted in the target
    /// description's `<architecture>` element.
    pub fn gdb_arch_name(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::X86 => "i386",
            Arch::Amd64 => "i386:x86-64",
        }
    }

    /// The `org.gnu.gdb.<arch>.core` feature name for this
    /// architecture's core register set.
    ///
    /// 64-bit x86 reuses the i386 core feature name rather than
    /// defining its own, matching upstream GDB's own XML feature set
    /// (see DESIGN.md for why AMD64 doesn't get a distinct name).
    pub fn core_feature_name(&self) -> &'static str {
        match self {
            Arch::Arm => "org.gnu.gdb.arm.core",
            Arch::X86 => "org.gnu.gdb.i386.core",
            Arch::Amd64 => "org.gnu.gdb.i386.core",
        }
    }
}

/// The target's current run-state, as observed at the top of the
/// receive loop to detect a Running→Stopped edge and emit a
/// spontaneous stop notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// The kind of tracepoint `z`/`Z` packets set or clear. Only the
/// syntactic distinction GDB sends is modeled; no tracing data
/// collection is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracepointKind {
    SoftwareBreakpoint,
    HardwareBreakpoint,
    WriteWatchpoint,
    ReadWatchpoint,
    AccessWatchpoint,
}

impl TracepointKind {
    pub fn from_type_digit(digit: u8) -> Option<Self> {
        match digit {
            b'0' => Some(TracepointKind::SoftwareBreakpoint),
            b'1' => Some(TracepointKind::HardwareBreakpoint),
            b'2' => Some(TracepointKind::WriteWatchpoint),
            b'3' => Some(TracepointKind::ReadWatchpoint),
            b'4' => Some(TracepointKind::AccessWatchpoint),
            _ => None,
        }
    }
}

/// A single custom monitor command, as looked up by `qRcmd`. `name` is
/// matched against the first whitespace-delimited token of the decoded
/// command string; the remainder is passed as `args`.
pub struct CustomCommand<T: ?Sized> {
    pub name: &'static str,
    pub run: fn(&mut T, args: &str, out: &mut dyn std::fmt::Write),
}

/// The debug target adapter: run-control, memory, registers,
/// tracepoints, and the static architecture/register descriptors.
///
/// Capabilities that not every target implements (`restart`, `kill`,
/// tracepoint set/clear) are modeled as trait methods with a
/// not-supported default rather than required methods.
pub trait Target {
    /// Error type for memory and register accesses that can fail
    /// (e.g. an unmapped address).
    type Error: std::fmt::Debug;

    /// The target's architecture, used for `qSupported` negotiation
    /// and the target-description XML.
    fn arch(&self) -> Arch;

    /// The ordered register descriptor table. Index `i` here
    /// corresponds to register index `i` in `g`/`G`/`p`/`P` packets.
    fn register_info(&self) -> &'static [RegisterInfo];

    /// Current run-state, polled at the top of the receive loop.
    fn run_state(&self) -> RunState;

    /// Halts the target. Called both for the `0x03` out-of-band
    /// interrupt and implicitly before a `?` reply.
    fn stop(&mut self);

    /// Resumes execution until the next stop (breakpoint, watchpoint,
    /// or explicit `stop`). Must not block the receive loop
    /// indefinitely.
    fn resume(&mut self);

    /// Executes exactly one instruction (or the target's natural
    /// single-step unit) and halts again.
    fn single_step(&mut self);

    /// Reads `buf.len()` bytes starting at `addr`.
    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `data` starting at `addr`.
    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the registers named by `indices` into `out`, one after
    /// another, each occupying `RegisterInfo::bytes()` of `out` in the
    /// target's native endianness. `out` is pre-sized to fit the full
    /// register file; a single call drives the whole `g` reply.
    fn read_registers(&mut self, indices: &[usize], out: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes the registers named by `indices` from `data`, laid out
    /// the same way `read_registers` reads them.
    fn write_registers(&mut self, indices: &[usize], data: &[u8]) -> Result<(), Self::Error>;

    /// Whether `restart` (RSP `R`, extended mode only) is implemented.
    /// Default: not supported.
    fn supports_restart(&self) -> bool {
        false
    }

    /// Restarts the target program. Only called when
    /// `supports_restart()` is `true` and extended mode is active.
    fn restart(&mut self) {}

    /// Kills the target / closes the session from the target's side.
    /// Does not need to be implemented; GDB sends `k` when closing the
    /// connection.
    fn kill(&mut self) {}

    /// Sets a tracepoint. `wire_kind` is GDB's own "kind" field from
    /// the `Z type,addr,kind` packet: a byte length for a watchpoint,
    /// or a breakpoint-encoding selector (e.g. Thumb vs. ARM) for a
    /// software/hardware breakpoint; its meaning is architecture- and
    /// `kind`-dependent, so the target adapter interprets it. Default:
    /// not supported (`Ok`-less "not supported" surfaces as an empty
    /// RSP reply rather than `E NN`, since `z`/`Z` on an adapter
    /// without tracepoint support is a capability gap, not an error).
    fn set_tracepoint(
        &mut self,
        _addr: u64,
        _kind: TracepointKind,
        _wire_kind: u64,
    ) -> Option<Result<(), Self::Error>> {
        None
    }

    /// Clears a tracepoint previously set at `addr`. Default: not
    /// supported.
    fn clear_tracepoint(
        &mut self,
        _addr: u64,
        _kind: TracepointKind,
        _wire_kind: u64,
    ) -> Option<Result<(), Self::Error>> {
        None
    }

    /// The target's custom `qRcmd` command table, if any. Default: no
    /// custom commands (`qRcmd` of an unknown name replies
    /// `Error::CommandNotFound`).
    fn custom_commands(&self) -> &'static [CustomCommand<Self>]
    where
        Self: Sized,
    {
        &[]
    }
}

/// Writes `value` into `out` as `width` bytes in little-endian order,
/// the convention register write payloads (`P`/`G`) use; the target
/// adapter receives raw bytes and any endianness beyond this wire
/// convention is the target's own concern.
///
/// Uses `byteorder` rather than hand-rolled shifting.
pub fn write_le(value: u64, out: &mut [u8]) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    out.copy_from_slice(&buf[..out.len()]);
}

pub fn read_le(buf: &[u8]) -> u64 {
    let mut padded = [0u8; 8];
    padded[..buf.len()].copy_from_slice(buf);
    LittleEndian::read_u64(&padded)
}

/// A helper for `Target` implementors that want to format `qRcmd`
/// output with `write!` directly against a `String`.
pub fn format_to_string(f: impl FnOnce(&mut dyn std::fmt::Write)) -> String {
    let mut s = String::new();
    f(&mut s);
    s
}
