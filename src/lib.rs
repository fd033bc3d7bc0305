//! A freestanding, transport-agnostic implementation of the GDB Remote
//! Serial Protocol (RSP) stub: the server half of the protocol a
//! debugger speaks to when controlling a remote target (a CPU core,
//! an emulator, a hypervisor, a microcontroller).
//!
//! This crate is the protocol engine only. It owns packet framing,
//! checksum verification, command dispatch, and target-description
//! negotiation; it does not own a transport or any knowledge of a
//! specific CPU. Embedders plug those in by implementing [`Connection`]
//! and [`Target`].
//!
//! Does not implement retransmission on its own NACK; callers relying
//! on an unreliable transport should add that at the `Connection`
//! layer.

#[macro_use]
extern crate log;
extern crate byteorder;

mod conn;
mod error;
mod hex;
mod monitor;
mod proto;
mod stub;
mod target;
mod target_desc;

pub use conn::Connection;
pub use error::Error;
pub use stub::{DisconnectReason, GdbStub};
pub use target::{
    format_to_string, read_le, write_le, Arch, CustomCommand, RegisterClass, RegisterInfo,
    RunState, Target, TracepointKind,
};
