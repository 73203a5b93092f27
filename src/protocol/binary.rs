//! Binary memcached protocol (spec.md §4.G, §6): 24-byte header, fixed
//! opcode set, per-opcode extras/length validation.

use super::command::{Command, Framing, IncrDecrArgs, StoreArgs};

pub const HEADER_LEN: usize = 24;
pub const REQUEST_MAGIC: u8 = 0x80;
pub const RESPONSE_MAGIC: u8 = 0x81;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    FlushAll = 0x08,
    GetQ = 0x09,
    Noop = 0x0a,
    Version = 0x0b,
    GetK = 0x0c,
    GetKQ = 0x0d,
    Append = 0x0e,
    Prepend = 0x0f,
    Stat = 0x10,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    QuitQ = 0x17,
    FlushAllQ = 0x18,
    AppendQ = 0x19,
    PrependQ = 0x1a,
}

impl Opcode {
    fn from_u8(b: u8) -> Option<Self> {
        use Opcode::*;
        Some(match b {
            0x00 => Get,
            0x01 => Set,
            0x02 => Add,
            0x03 => Replace,
            0x04 => Delete,
            0x05 => Increment,
            0x06 => Decrement,
            0x07 => Quit,
            0x08 => FlushAll,
            0x09 => GetQ,
            0x0a => Noop,
            0x0b => Version,
            0x0c => GetK,
            0x0d => GetKQ,
            0x0e => Append,
            0x0f => Prepend,
            0x10 => Stat,
            0x11 => SetQ,
            0x12 => AddQ,
            0x13 => ReplaceQ,
            0x14 => DeleteQ,
            0x15 => IncrementQ,
            0x16 => DecrementQ,
            0x17 => QuitQ,
            0x18 => FlushAllQ,
            0x19 => AppendQ,
            0x1a => PrependQ,
            _ => return None,
        })
    }

    fn is_quiet(self) -> bool {
        use Opcode::*;
        matches!(self, GetQ | GetKQ | SetQ | AddQ | ReplaceQ | DeleteQ | IncrementQ | DecrementQ | QuitQ | FlushAllQ | AppendQ | PrependQ)
    }

    fn wants_key_echo(self) -> bool {
        matches!(self, Opcode::GetK | Opcode::GetKQ)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
pub enum Status {
    NoError = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    NonNumericValue = 0x0006,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
}

struct Header {
    opcode: u8,
    key_len: u16,
    ext_len: u8,
    body_len: u32,
    opaque: u32,
    cas: u64,
}

fn parse_header(buf: &[u8]) -> Result<Header, Status> {
    debug_assert!(buf.len() >= HEADER_LEN);
    if buf[0] != REQUEST_MAGIC {
        return Err(Status::InvalidArguments); // caller treats this as session-fatal, not a reply
    }
    let opcode = buf[1];
    let key_len = u16::from_be_bytes([buf[2], buf[3]]);
    let ext_len = buf[4];
    let body_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let opaque = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
    let cas = u64::from_be_bytes(buf[16..24].try_into().unwrap());
    Ok(Header { opcode, key_len, ext_len, body_len, opaque, cas })
}

/// Outcome of trying to parse one request out of the front of `buf`.
pub enum ParseResult {
    /// Not enough bytes yet.
    Incomplete,
    /// First byte isn't `0x80`: the connection must be marked trash
    /// immediately (spec.md §4.G: "Magic-byte mismatch... immediately
    /// marks the session trash").
    BadMagic,
    Command { command: Command, consumed: usize },
}

/// Validate `ext_len`/`key_len`/`body_len` against the per-opcode-class
/// table in spec.md §4.G.
fn validate_lengths(op: Opcode, ext_len: u8, key_len: u16, body_len: u32) -> Result<(), Status> {
    use Opcode::*;
    let class_ok = match op {
        Get | GetQ | GetK | GetKQ | Delete | DeleteQ => ext_len == 0 && key_len > 0 && key_len as u32 == body_len,
        // spec.md §4.G's table states this strictly: `key_len + 8 <
        // body_len`, i.e. a zero-length value is rejected at this
        // validation step for the binary protocol specifically.
        Set | SetQ | Add | AddQ | Replace | ReplaceQ => ext_len == 8 && key_len > 0 && (key_len as u32 + 8) < body_len,
        Append | AppendQ | Prepend | PrependQ => ext_len == 0 && key_len > 0 && (key_len as u32) < body_len,
        Increment | IncrementQ | Decrement | DecrementQ => ext_len == 20 && key_len > 0 && (key_len as u32 + 20) == body_len,
        FlushAll | FlushAllQ => (ext_len == 0 || ext_len == 4) && key_len == 0 && body_len == ext_len as u32,
        Noop | Version | Stat | Quit | QuitQ => true,
    };
    if class_ok {
        Ok(())
    } else {
        Err(Status::InvalidArguments)
    }
}

/// Attempt to parse one request from the front of `buf`. Never blocks;
/// `Incomplete` means "come back with more bytes".
pub fn parse_one(buf: &[u8]) -> ParseResult {
    if buf.is_empty() {
        return ParseResult::Incomplete;
    }
    if buf[0] != REQUEST_MAGIC {
        return ParseResult::BadMagic;
    }
    if buf.len() < HEADER_LEN {
        return ParseResult::Incomplete;
    }
    let header = match parse_header(buf) {
        Ok(h) => h,
        Err(_) => return ParseResult::BadMagic,
    };
    let total = HEADER_LEN + header.body_len as usize;
    if buf.len() < total {
        return ParseResult::Incomplete;
    }
    let framing = Framing { opaque: header.opaque };

    let Some(op) = Opcode::from_u8(header.opcode) else {
        return ParseResult::Command {
            command: Command::BinaryError { framing, status: Status::UnknownCommand },
            consumed: total,
        };
    };
    if let Err(status) = validate_lengths(op, header.ext_len, header.key_len, header.body_len) {
        return ParseResult::Command { command: Command::BinaryError { framing, status }, consumed: total };
    }

    let body = &buf[HEADER_LEN..total];
    let ext = &body[..header.ext_len as usize];
    let key = body[header.ext_len as usize..header.ext_len as usize + header.key_len as usize].to_vec();
    let value = &body[header.ext_len as usize + header.key_len as usize..];

    let noreply = op.is_quiet();
    let command = match op {
        Opcode::Get | Opcode::GetQ | Opcode::GetK | Opcode::GetKQ => Command::Get {
            keys: vec![key],
            with_cas: true,
            quiet: op.is_quiet(),
            echo_key: op.wants_key_echo(),
            framing: Some(framing),
        },
        Opcode::Set | Opcode::SetQ | Opcode::Add | Opcode::AddQ | Opcode::Replace | Opcode::ReplaceQ => {
            let flags = u32::from_be_bytes(ext[0..4].try_into().unwrap());
            let exp_time_raw = u32::from_be_bytes(ext[4..8].try_into().unwrap()) as i64;
            let args = StoreArgs { key, value: value.to_vec(), flags, exp_time_raw, cas: header.cas, noreply };
            match op {
                Opcode::Set | Opcode::SetQ => Command::Set(args, Some(framing)),
                Opcode::Add | Opcode::AddQ => Command::Add(args, Some(framing)),
                _ => Command::Replace(args, Some(framing)),
            }
        }
        Opcode::Append | Opcode::AppendQ | Opcode::Prepend | Opcode::PrependQ => {
            let args = StoreArgs { key, value: value.to_vec(), flags: 0, exp_time_raw: 0, cas: header.cas, noreply };
            if matches!(op, Opcode::Append | Opcode::AppendQ) {
                Command::Append(args, Some(framing))
            } else {
                Command::Prepend(args, Some(framing))
            }
        }
        Opcode::Increment | Opcode::IncrementQ | Opcode::Decrement | Opcode::DecrementQ => {
            let delta = u64::from_be_bytes(ext[0..8].try_into().unwrap());
            let initial = u64::from_be_bytes(ext[8..16].try_into().unwrap());
            let exp_time_raw = u32::from_be_bytes(ext[16..20].try_into().unwrap()) as i64;
            let args = IncrDecrArgs { key, delta, initial: Some(initial), exp_time_raw, noreply };
            if matches!(op, Opcode::Increment | Opcode::IncrementQ) {
                Command::Increment(args, Some(framing))
            } else {
                Command::Decrement(args, Some(framing))
            }
        }
        Opcode::Delete | Opcode::DeleteQ => Command::Delete { key, noreply, framing: Some(framing) },
        Opcode::FlushAll | Opcode::FlushAllQ => {
            let exp_time_raw = if header.ext_len == 4 { u32::from_be_bytes(ext[0..4].try_into().unwrap()) as i64 } else { 0 };
            Command::FlushAll { exp_time_raw, noreply, framing: Some(framing) }
        }
        Opcode::Quit | Opcode::QuitQ => Command::Quit { quietly: noreply, framing: Some(framing) },
        Opcode::Version => Command::Version(Some(framing)),
        Opcode::Stat => Command::Stats(Some(framing)),
        Opcode::Noop => Command::Noop(framing),
    };
    ParseResult::Command { command, consumed: total }
}

/// Build a 24-byte response header. `cas`/`extras_len`/`key_len` vary by
/// command; `value` is appended by the caller after extras+key.
pub fn build_response_header(opcode: u8, status: Status, extras_len: u8, key_len: u16, value_len: u32, opaque: u32, cas: u64) -> [u8; HEADER_LEN] {
    let mut h = [0u8; HEADER_LEN];
    h[0] = RESPONSE_MAGIC;
    h[1] = opcode;
    h[2..4].copy_from_slice(&key_len.to_be_bytes());
    h[4] = extras_len;
    h[5] = 0; // data_type
    h[6..8].copy_from_slice(&(status as u16).to_be_bytes());
    let body_len = extras_len as u32 + key_len as u32 + value_len;
    h[8..12].copy_from_slice(&body_len.to_be_bytes());
    h[12..16].copy_from_slice(&opaque.to_be_bytes());
    h[16..24].copy_from_slice(&cas.to_be_bytes());
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_request(opcode: u8, ext: &[u8], key: &[u8], value: &[u8]) -> Vec<u8> {
        let body_len = (ext.len() + key.len() + value.len()) as u32;
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = REQUEST_MAGIC;
        buf[1] = opcode;
        buf[2..4].copy_from_slice(&(key.len() as u16).to_be_bytes());
        buf[4] = ext.len() as u8;
        buf[8..12].copy_from_slice(&body_len.to_be_bytes());
        buf.extend_from_slice(ext);
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
        buf
    }

    #[test]
    fn incomplete_header_reports_incomplete() {
        let buf = [REQUEST_MAGIC, 0x00];
        assert!(matches!(parse_one(&buf), ParseResult::Incomplete));
    }

    #[test]
    fn bad_magic_byte_is_reported() {
        let buf = [0x00u8; HEADER_LEN];
        assert!(matches!(parse_one(&buf), ParseResult::BadMagic));
    }

    #[test]
    fn increment_with_initial_parses() {
        let mut ext = Vec::new();
        ext.extend_from_slice(&1u64.to_be_bytes()); // delta
        ext.extend_from_slice(&10u64.to_be_bytes()); // initial
        ext.extend_from_slice(&0u32.to_be_bytes()); // exptime
        let buf = build_request(Opcode::Increment as u8, &ext, b"n", &[]);
        match parse_one(&buf) {
            ParseResult::Command { command: Command::Increment(args, _), consumed } => {
                assert_eq!(consumed, buf.len());
                assert_eq!(args.key, b"n");
                assert_eq!(args.delta, 1);
                assert_eq!(args.initial, Some(10));
            }
            _ => panic!("expected Increment command"),
        }
    }

    #[test]
    fn set_requires_8_byte_extras() {
        let buf = build_request(Opcode::Set as u8, &[], b"k", b"v"); // ext_len 0, invalid
        match parse_one(&buf) {
            ParseResult::Command { command: Command::BinaryError { status, .. }, .. } => {
                assert_eq!(status, Status::InvalidArguments);
            }
            _ => panic!("expected BinaryError"),
        }
    }

    #[test]
    fn get_parses_key_only_body() {
        let buf = build_request(Opcode::Get as u8, &[], b"foo", &[]);
        match parse_one(&buf) {
            ParseResult::Command { command: Command::Get { keys, .. }, consumed } => {
                assert_eq!(keys, vec![b"foo".to_vec()]);
                assert_eq!(consumed, buf.len());
            }
            _ => panic!("expected Get command"),
        }
    }
}
