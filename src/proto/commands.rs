//! The parsed `Command` enum and its `q`/`v` sub-enums, covering the
//! full RSP command surface the stub understands.

use crate::hex::parse_hex_u64;
use crate::target::TracepointKind;

/// Why parsing a packet body failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The body doesn't parse as valid RSP grammar for the command
    /// letter it started with (bad hex, missing separator, ...).
    Malformed(&'static str),
    /// The command letter (or recognized `q`/`v` sub-command) has no
    /// handler; the dispatcher should reply with an empty body.
    Unsupported,
}

/// A thread ID as accepted syntactically by `vCont` actions.
/// Multi-thread support (`H`/`T`) is out of scope; thread IDs are
/// parsed so the grammar round-trips but are not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadId {
    All,
    Any,
    Thread(u32),
}

impl ThreadId {
    fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        match buf {
            b"-1" => Ok(ThreadId::All),
            b"0" => Ok(ThreadId::Any),
            _ => {
                let s = std::str::from_utf8(buf).map_err(|_| ParseError::Malformed("thread id"))?;
                let id = u32::from_str_radix(s, 16).map_err(|_| ParseError::Malformed("thread id"))?;
                Ok(ThreadId::Thread(id))
            }
        }
    }
}

/// `vCont` resume action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContAction {
    Continue,
    Step,
    Stop,
}

/// The `v`-prefixed multi-letter verb commands. `vCont` is the only
/// registered verb; every other `vName` is unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbCommand {
    /// `vCont?`
    ContQuery,
    /// `vCont;action[:tid]`
    Cont {
        action: ContAction,
        thread: Option<ThreadId>,
    },
}

fn parse_vcont(rest: &[u8]) -> Result<VerbCommand, ParseError> {
    if rest == b"?" {
        return Ok(VerbCommand::ContQuery);
    }
    let rest = rest.strip_prefix(b";").ok_or(ParseError::Malformed("vCont"))?;
    let mut parts = rest.splitn(2, |&b| b == b':');
    let action_byte = parts.next().ok_or(ParseError::Malformed("vCont"))?;
    let action = match action_byte {
        b"c" => ContAction::Continue,
        b"s" => ContAction::Step,
        b"t" => ContAction::Stop,
        _ => return Err(ParseError::Malformed("vCont action")),
    };
    let thread = match parts.next() {
        Some(tid) => Some(ThreadId::parse(tid)?),
        None => None,
    };
    Ok(VerbCommand::Cont { action, thread })
}

fn parse_verb(body: &[u8]) -> Result<VerbCommand, ParseError> {
    debug_assert!(body.starts_with(b"v"));
    let rest = &body[1..];
    if let Some(after) = rest.strip_prefix(b"Cont") {
        return parse_vcont(after);
    }
    Err(ParseError::Unsupported)
}

/// The `q`/`Q` general query sub-commands recognized. Unrecognized
/// queries are `ParseError::Unsupported` (-> empty reply), per RSP
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCommand<'a> {
    /// `qTStatus`
    TStatus,
    /// `qSupported:<features>`. `features` is the raw, still
    /// semicolon-separated token list; the dispatcher owns feature
    /// negotiation semantics.
    Supported { features: &'a [u8] },
    /// `qXfer:features:read:<annex>:<off>,<len>`
    XferFeaturesRead {
        annex: &'a [u8],
        offset: u64,
        length: u64,
    },
    /// `qRcmd,<hex-encoded command>`
    Rcmd { hex: &'a [u8] },
}

/// Prefixes recognized by the `q` sub-dispatcher, in match order.
/// Longer names that share a prefix with a shorter one MUST precede
/// it. See the `q_prefix_table_is_longest_first` test, which stands
/// in for a construction-time assertion (a `const fn` assertion over
/// `&str` prefixes isn't expressible on stable Rust, so the invariant
/// is checked by a test rather than at compile time).
const Q_PREFIXES: &[&str] = &[
    "qXfer:features:read:",
    "qSupported:",
    "qRcmd,",
    "qTStatus",
];

fn parse_query(body: &[u8]) -> Result<QueryCommand<'_>, ParseError> {
    debug_assert!(body.starts_with(b"q"));

    for &prefix in Q_PREFIXES {
        if let Some(rest) = body.strip_prefix(prefix.as_bytes()) {
            return match prefix {
                "qTStatus" => Ok(QueryCommand::TStatus),
                "qSupported:" => Ok(QueryCommand::Supported { features: rest }),
                "qRcmd," => Ok(QueryCommand::Rcmd { hex: rest }),
                "qXfer:features:read:" => parse_xfer_features(rest),
                _ => unreachable!("Q_PREFIXES entry without a matching arm"),
            };
        }
    }
    Err(ParseError::Unsupported)
}

fn parse_xfer_features(rest: &[u8]) -> Result<QueryCommand<'_>, ParseError> {
    let mut parts = rest.splitn(2, |&b| b == b':');
    let annex = parts.next().ok_or(ParseError::Malformed("qXfer annex"))?;
    let off_len = parts.next().ok_or(ParseError::Malformed("qXfer offset,length"))?;

    let mut off_len_parts = off_len.splitn(2, |&b| b == b',');
    let off_bytes = off_len_parts.next().ok_or(ParseError::Malformed("qXfer offset"))?;
    let len_bytes = off_len_parts
        .next()
        .ok_or(ParseError::Malformed("qXfer length"))?;

    let (offset, _) = parse_hex_u64(off_bytes).map_err(|_| ParseError::Malformed("qXfer offset"))?;
    let (length, _) = parse_hex_u64(len_bytes).map_err(|_| ParseError::Malformed("qXfer length"))?;

    Ok(QueryCommand::XferFeaturesRead { annex, offset, length })
}

/// A command received from a connected GDB, parsed from one framed
/// packet body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `!`
    EnableExtendedMode,
    /// `?`
    HaltReason,
    /// `c`
    Continue,
    /// `s`
    Step,
    /// `g`
    ReadRegisters,
    /// `G<data>`
    WriteRegisters { data: &'a [u8] },
    /// `m addr,len`
    ReadMemory { addr: u64, len: u64 },
    /// `M addr,len:data` (already hex-decoded)
    WriteMemory { addr: u64, data: &'a [u8] },
    /// `p n`
    ReadRegister { index: usize },
    /// `P n=data`
    WriteRegister { index: usize, data: &'a [u8] },
    /// `Z type,addr,kind`. `wire_kind` is GDB's own "kind" field (e.g.
    /// a watchpoint's byte length, or Thumb vs. ARM encoding selector
    /// for a software breakpoint), distinct from `kind`'s
    /// software/hardware/watchpoint `TracepointKind` classification.
    SetTracepoint { kind: TracepointKind, addr: u64, wire_kind: u64 },
    /// `z type,addr,kind`
    ClearTracepoint { kind: TracepointKind, addr: u64, wire_kind: u64 },
    /// `q...`/`Q...`
    Query(QueryCommand<'a>),
    /// `v...`
    Verb(VerbCommand),
    /// `R` (extended mode only)
    Restart,
    /// `k`
    Kill,
}

fn parse_tracepoint(rest: &[u8]) -> Result<(TracepointKind, u64, u64), ParseError> {
    let mut parts = rest.splitn(3, |&b| b == b',');
    let type_digit = parts.next().ok_or(ParseError::Malformed("tracepoint type"))?;
    if type_digit.len() != 1 {
        return Err(ParseError::Malformed("tracepoint type"));
    }
    let kind = TracepointKind::from_type_digit(type_digit[0])
        .ok_or(ParseError::Malformed("tracepoint type"))?;
    let addr_bytes = parts.next().ok_or(ParseError::Malformed("tracepoint addr"))?;
    let (addr, _) = parse_hex_u64(addr_bytes).map_err(|_| ParseError::Malformed("tracepoint addr"))?;
    let kind_bytes = parts.next().ok_or(ParseError::Malformed("tracepoint kind"))?;
    let (wire_kind, _) =
        parse_hex_u64(kind_bytes).map_err(|_| ParseError::Malformed("tracepoint kind"))?;
    Ok((kind, addr, wire_kind))
}

impl<'a> Command<'a> {
    /// Parses a framed packet body (the command letter plus arguments,
    /// with the leading `$` and trailing `#cc` already stripped by the
    /// framer). Binary payloads (`M`/`P`/`G` data) are hex-decoded in
    /// place, so `body` must be mutable.
    pub fn parse(body: &'a mut [u8]) -> Result<Self, ParseError> {
        if body.is_empty() {
            return Err(ParseError::Malformed("empty packet body"));
        }

        match body[0] {
            b'!' => Ok(Command::EnableExtendedMode),
            b'?' => Ok(Command::HaltReason),
            b'c' => Ok(Command::Continue),
            b's' => Ok(Command::Step),
            b'g' => Ok(Command::ReadRegisters),
            b'G' => {
                let decoded = crate::hex::decode_in_place(&mut body[1..])?;
                // SAFETY-FREE: re-borrow through the original slice so
                // the lifetime ties back to `body`, not the temporary
                // `&mut` reborrow above.
                let len = decoded.len();
                Ok(Command::WriteRegisters { data: &body[1..1 + len] })
            }
            b'k' => Ok(Command::Kill),
            b'R' => Ok(Command::Restart),
            b'm' => {
                let mut parts = body[1..].splitn(2, |&b| b == b',');
                let addr_bytes = parts.next().ok_or(ParseError::Malformed("m addr"))?;
                let len_bytes = parts.next().ok_or(ParseError::Malformed("m len"))?;
                let (addr, _) = parse_hex_u64(addr_bytes).map_err(|_| ParseError::Malformed("m addr"))?;
                let (len, _) = parse_hex_u64(len_bytes).map_err(|_| ParseError::Malformed("m len"))?;
                Ok(Command::ReadMemory { addr, len })
            }
            b'M' => {
                let comma = body[1..]
                    .iter()
                    .position(|&b| b == b',')
                    .ok_or(ParseError::Malformed("M addr"))?;
                let (addr, _) = parse_hex_u64(&body[1..1 + comma]).map_err(|_| ParseError::Malformed("M addr"))?;

                let rest = &mut body[1 + comma + 1..];
                let colon = rest
                    .iter()
                    .position(|&b| b == b':')
                    .ok_or(ParseError::Malformed("M len"))?;
                let (len, _) = parse_hex_u64(&rest[..colon]).map_err(|_| ParseError::Malformed("M len"))?;

                let data_hex = &mut rest[colon + 1..];
                let decoded = crate::hex::decode_in_place(data_hex)?;
                if decoded.len() as u64 != len {
                    return Err(ParseError::Malformed("M length mismatch"));
                }
                let dlen = decoded.len();
                Ok(Command::WriteMemory { addr, data: &data_hex[..dlen] })
            }
            b'p' => {
                let (index, _) = parse_hex_u64(&body[1..]).map_err(|_| ParseError::Malformed("p index"))?;
                Ok(Command::ReadRegister { index: index as usize })
            }
            b'P' => {
                let eq = body[1..]
                    .iter()
                    .position(|&b| b == b'=')
                    .ok_or(ParseError::Malformed("P index"))?;
                let (index, _) = parse_hex_u64(&body[1..1 + eq]).map_err(|_| ParseError::Malformed("P index"))?;
                let data_hex = &mut body[1 + eq + 1..];
                let decoded = crate::hex::decode_in_place(data_hex)?;
                let dlen = decoded.len();
                Ok(Command::WriteRegister {
                    index: index as usize,
                    data: &data_hex[..dlen],
                })
            }
            b'Z' => {
                let (kind, addr, wire_kind) = parse_tracepoint(&body[1..])?;
                Ok(Command::SetTracepoint { kind, addr, wire_kind })
            }
            b'z' => {
                let (kind, addr, wire_kind) = parse_tracepoint(&body[1..])?;
                Ok(Command::ClearTracepoint { kind, addr, wire_kind })
            }
            b'q' => Ok(Command::Query(parse_query(body)?)),
            // `Q` packets (`QStartNoAckMode`, `QPassSignals`, ...) share
            // the dispatch letter slot with `q` but none of `Q_PREFIXES`
            // is uppercase, so there's nothing for `parse_query` to
            // match, and its `q`-only `debug_assert!` would panic if
            // handed a `Q` body. Report unsupported directly instead.
            b'Q' => Err(ParseError::Unsupported),
            b'v' => Ok(Command::Verb(parse_verb(body)?)),
            other => {
                debug!("unsupported command letter '{}'", other as char);
                Err(ParseError::Unsupported)
            }
        }
    }
}

impl From<crate::error::Error> for ParseError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::Protocol(what) => ParseError::Malformed(what),
            _ => ParseError::Malformed("hex decode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q_prefix_table_is_longest_first() {
        for (i, a) in Q_PREFIXES.iter().enumerate() {
            for b in &Q_PREFIXES[i + 1..] {
                assert!(
                    !b.starts_with(a) && !a.starts_with(b) || a.len() >= b.len(),
                    "prefix {:?} (index {}) must not precede a longer prefix {:?} sharing its start",
                    a,
                    i,
                    b
                );
            }
        }
    }

    #[test]
    fn parses_read_memory() {
        let mut body = b"m1000,2".to_vec();
        let cmd = Command::parse(&mut body).unwrap();
        assert_eq!(cmd, Command::ReadMemory { addr: 0x1000, len: 2 });
    }

    #[test]
    fn parses_write_memory_and_hex_decodes_payload() {
        let mut body = b"M1000,2:AABB".to_vec();
        let cmd = Command::parse(&mut body).unwrap();
        assert_eq!(
            cmd,
            Command::WriteMemory { addr: 0x1000, data: &[0xAA, 0xBB] }
        );
    }

    #[test]
    fn parses_read_register_by_index() {
        let mut body = b"p3".to_vec();
        assert_eq!(Command::parse(&mut body).unwrap(), Command::ReadRegister { index: 3 });
    }

    #[test]
    fn parses_write_register_by_index() {
        let mut body = b"P3=11223344".to_vec();
        let cmd = Command::parse(&mut body).unwrap();
        assert_eq!(
            cmd,
            Command::WriteRegister { index: 3, data: &[0x11, 0x22, 0x33, 0x44] }
        );
    }

    #[test]
    fn parses_qsupported() {
        let mut body = b"qSupported:xmlRegisters=arm".to_vec();
        let cmd = Command::parse(&mut body).unwrap();
        assert_eq!(
            cmd,
            Command::Query(QueryCommand::Supported { features: b"xmlRegisters=arm" })
        );
    }

    #[test]
    fn parses_qxfer_features_read() {
        let mut body = b"qXfer:features:read:target.xml:0,3fb".to_vec();
        let cmd = Command::parse(&mut body).unwrap();
        assert_eq!(
            cmd,
            Command::Query(QueryCommand::XferFeaturesRead {
                annex: b"target.xml",
                offset: 0,
                length: 0x3fb,
            })
        );
    }

    #[test]
    fn parses_qtstatus_after_longer_prefixes_fail_to_match() {
        let mut body = b"qTStatus".to_vec();
        assert_eq!(Command::parse(&mut body).unwrap(), Command::Query(QueryCommand::TStatus));
    }

    #[test]
    fn unknown_query_is_unsupported() {
        let mut body = b"qSomethingElse".to_vec();
        assert_eq!(Command::parse(&mut body), Err(ParseError::Unsupported));
    }

    #[test]
    fn parses_vcont_query() {
        let mut body = b"vCont?".to_vec();
        assert_eq!(Command::parse(&mut body).unwrap(), Command::Verb(VerbCommand::ContQuery));
    }

    #[test]
    fn parses_vcont_continue_with_thread() {
        let mut body = b"vCont;c:1".to_vec();
        let cmd = Command::parse(&mut body).unwrap();
        assert_eq!(
            cmd,
            Command::Verb(VerbCommand::Cont {
                action: ContAction::Continue,
                thread: Some(ThreadId::Thread(1)),
            })
        );
    }

    #[test]
    fn parses_set_and_clear_tracepoint() {
        let mut set = b"Z0,1000,1".to_vec();
        assert_eq!(
            Command::parse(&mut set).unwrap(),
            Command::SetTracepoint { kind: TracepointKind::SoftwareBreakpoint, addr: 0x1000, wire_kind: 1 }
        );
        let mut clear = b"z0,1000,1".to_vec();
        assert_eq!(
            Command::parse(&mut clear).unwrap(),
            Command::ClearTracepoint { kind: TracepointKind::SoftwareBreakpoint, addr: 0x1000, wire_kind: 1 }
        );
    }

    #[test]
    fn tracepoint_missing_kind_field_is_malformed() {
        let mut set = b"Z0,1000".to_vec();
        assert_eq!(Command::parse(&mut set), Err(ParseError::Malformed("tracepoint kind")));
    }

    #[test]
    fn unknown_top_level_command_is_unsupported() {
        let mut body = b"Y".to_vec();
        assert_eq!(Command::parse(&mut body), Err(ParseError::Unsupported));
    }

    #[test]
    fn empty_body_is_malformed() {
        let mut body: Vec<u8> = Vec::new();
        assert!(matches!(Command::parse(&mut body), Err(ParseError::Malformed(_))));
    }
}
