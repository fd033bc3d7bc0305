//! RSP wire-level building blocks: packet framing, command parsing,
//! and reply framing, split into three focused modules.

pub mod commands;
pub mod framer;
pub mod response;

pub use commands::{Command, ContAction, ParseError, QueryCommand, ThreadId, VerbCommand};
pub use framer::{checksum, FramerEvent, ReceiveState};
pub use response::ReplyBuilder;
