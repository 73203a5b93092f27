//! ASCII memcached protocol (spec.md §4.G): a hand-written
//! character-by-character state machine with an ~1 KiB look-ahead span.
//!
//! **Supplement** (SPEC_FULL.md §4.G, from `original_source/src/base/scan.c`):
//! trailing whitespace tokens before the final `\r\n` on a storage
//! command's header line are tolerated, folded into the same
//! whitespace-splitting look-ahead used for every other token.

use super::command::{Command, IncrDecrArgs, StoreArgs};

/// Look-ahead span for one header line (spec.md §4.G).
pub const LOOKAHEAD_SPAN: usize = 1024;
pub const MAX_KEY_LEN: usize = 250;

pub enum ParseResult {
    /// Not enough bytes buffered yet for a full command.
    Incomplete,
    Command { command: Command, consumed: usize },
}

fn find_line_end(buf: &[u8], limit: usize) -> Option<usize> {
    let window = &buf[..buf.len().min(limit)];
    window.windows(2).position(|w| w == b"\r\n").map(|i| i + 2)
}

fn tokens(line: &[u8]) -> Vec<&[u8]> {
    line.split(|&b| b == b' ').filter(|t| !t.is_empty()).collect()
}

fn parse_u64(tok: &[u8]) -> Option<u64> {
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn parse_i64(tok: &[u8]) -> Option<i64> {
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn parse_u32(tok: &[u8]) -> Option<u32> {
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn key_too_long(key: &[u8]) -> bool {
    key.len() > MAX_KEY_LEN
}

/// Attempt one command out of the front of `buf`. Never blocks; restores
/// nothing itself (the caller simply calls again once more bytes have
/// arrived, since this function doesn't mutate `buf`).
pub fn parse_one(buf: &[u8]) -> ParseResult {
    let Some(header_len) = find_line_end(buf, LOOKAHEAD_SPAN) else {
        if buf.len() >= LOOKAHEAD_SPAN {
            // No newline within the look-ahead span: treat the whole
            // span as one malformed line and recover at its end.
            return ParseResult::Command {
                command: Command::AsciiError("line too long".to_string()),
                consumed: LOOKAHEAD_SPAN,
            };
        }
        return ParseResult::Incomplete;
    };
    let line = &buf[..header_len - 2];
    let toks = tokens(line);
    let Some(&cmd) = toks.first() else {
        return ParseResult::Command { command: Command::AsciiError("empty command".to_string()), consumed: header_len };
    };

    let is_storage = matches!(cmd, b"set" | b"add" | b"replace" | b"append" | b"prepend" | b"cas");
    if is_storage {
        return parse_storage(cmd, &toks, buf, header_len);
    }

    let command = match cmd {
        b"get" | b"gets" => {
            let keys: Vec<Vec<u8>> = toks[1..].iter().map(|k| k.to_vec()).collect();
            if keys.is_empty() || keys.iter().any(|k| key_too_long(k)) {
                Command::AsciiError("bad key".to_string())
            } else {
                Command::Get { keys, with_cas: cmd == b"gets", quiet: false, echo_key: false, framing: None }
            }
        }
        b"incr" | b"decr" => match parse_incr_decr(&toks) {
            Some(args) => {
                if cmd == b"incr" {
                    Command::Increment(args, None)
                } else {
                    Command::Decrement(args, None)
                }
            }
            None => Command::AsciiError("invalid incr/decr".to_string()),
        },
        b"delete" => {
            if toks.len() < 2 || key_too_long(toks[1]) {
                Command::AsciiError("bad delete".to_string())
            } else {
                let noreply = toks.last() == Some(&&b"noreply"[..]);
                Command::Delete { key: toks[1].to_vec(), noreply, framing: None }
            }
        }
        b"touch" => {
            if toks.len() < 3 || key_too_long(toks[1]) {
                Command::AsciiError("bad touch".to_string())
            } else {
                match parse_i64(toks[2]) {
                    Some(exp_time_raw) => {
                        let noreply = toks.last() == Some(&&b"noreply"[..]);
                        Command::Touch { key: toks[1].to_vec(), exp_time_raw, noreply, framing: None }
                    }
                    None => Command::AsciiError("bad exptime".to_string()),
                }
            }
        }
        b"flush_all" => {
            let noreply = toks.last() == Some(&&b"noreply"[..]);
            let exp_time_raw = toks.get(1).filter(|t| **t != b"noreply").and_then(|t| parse_i64(t)).unwrap_or(0);
            Command::FlushAll { exp_time_raw, noreply, framing: None }
        }
        b"version" => Command::Version(None),
        b"quit" => Command::Quit { quietly: false, framing: None },
        b"stats" => Command::Stats(None),
        b"slabs" => Command::Slabs,
        b"verbosity" => match toks.get(1).and_then(|t| parse_u32(t)) {
            Some(level) => {
                let noreply = toks.last() == Some(&&b"noreply"[..]);
                Command::Verbosity { level, noreply }
            }
            None => Command::AsciiError("bad verbosity".to_string()),
        },
        _ => Command::AsciiError("unknown command".to_string()),
    };
    ParseResult::Command { command, consumed: header_len }
}

fn parse_incr_decr(toks: &[&[u8]]) -> Option<IncrDecrArgs> {
    if toks.len() < 3 || key_too_long(toks[1]) {
        return None;
    }
    let delta = parse_u64(toks[2])?;
    let noreply = toks.last() == Some(&&b"noreply"[..]);
    Some(IncrDecrArgs { key: toks[1].to_vec(), delta, initial: None, exp_time_raw: 0, noreply })
}

fn parse_storage(cmd: &[u8], toks: &[&[u8]], buf: &[u8], header_len: usize) -> ParseResult {
    let is_cas = cmd == b"cas";
    let min_tokens = if is_cas { 6 } else { 5 };
    if toks.len() < min_tokens || key_too_long(toks[1]) {
        return ParseResult::Command { command: Command::AsciiError("bad storage header".to_string()), consumed: header_len };
    }
    let (flags, exp_time_raw, bytes_tok, cas_tok, noreply_idx) = if is_cas {
        (toks[2], toks[3], toks[4], Some(toks[5]), 6)
    } else {
        (toks[2], toks[3], toks[4], None, 5)
    };
    let (Some(flags), Some(exp_time_raw), Some(bytes)) = (parse_u32(flags), parse_i64(exp_time_raw), parse_u64(bytes_tok)) else {
        return ParseResult::Command { command: Command::AsciiError("bad storage header".to_string()), consumed: header_len };
    };
    let cas = match cas_tok {
        Some(t) => match parse_u64(t) {
            Some(v) => v,
            None => return ParseResult::Command { command: Command::AsciiError("bad cas".to_string()), consumed: header_len },
        },
        None => 0,
    };
    let noreply = toks.get(noreply_idx) == Some(&&b"noreply"[..]);

    let total = header_len + bytes as usize + 2;
    if buf.len() < total {
        return ParseResult::Incomplete;
    }
    let value = buf[header_len..header_len + bytes as usize].to_vec();
    let args = StoreArgs { key: toks[1].to_vec(), value, flags, exp_time_raw, cas, noreply };
    let command = match cmd {
        b"set" => Command::Set(args, None),
        b"add" => Command::Add(args, None),
        b"replace" => Command::Replace(args, None),
        b"append" => Command::Append(args, None),
        b"prepend" => Command::Prepend(args, None),
        b"cas" => Command::Cas(args, None),
        _ => unreachable!("is_storage already matched these"),
    };
    ParseResult::Command { command, consumed: total }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_header_waits_for_more_bytes() {
        let buf = b"set foo 0 0";
        assert!(matches!(parse_one(buf), ParseResult::Incomplete));
    }

    #[test]
    fn incomplete_value_waits_for_more_bytes() {
        let buf = b"set foo 0 0 3\r\nba";
        assert!(matches!(parse_one(buf), ParseResult::Incomplete));
    }

    #[test]
    fn basic_set_parses() {
        let buf = b"set foo 0 0 3\r\nbar\r\n";
        match parse_one(buf) {
            ParseResult::Command { command: Command::Set(args, _), consumed } => {
                assert_eq!(args.key, b"foo");
                assert_eq!(args.value, b"bar");
                assert_eq!(consumed, buf.len());
            }
            _ => panic!("expected Set"),
        }
    }

    #[test]
    fn get_with_multiple_keys() {
        let buf = b"get a b c\r\n";
        match parse_one(buf) {
            ParseResult::Command { command: Command::Get { keys, with_cas, .. }, .. } => {
                assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
                assert!(!with_cas);
            }
            _ => panic!("expected Get"),
        }
    }

    #[test]
    fn key_over_250_bytes_is_rejected() {
        let long_key = "k".repeat(251);
        let buf = format!("get {long_key}\r\n");
        match parse_one(buf.as_bytes()) {
            ParseResult::Command { command: Command::AsciiError(_), .. } => {}
            _ => panic!("expected AsciiError for oversized key"),
        }
    }

    #[test]
    fn noreply_tail_is_recognised_on_set() {
        let buf = b"set foo 0 0 1 noreply\r\nx\r\n";
        match parse_one(buf) {
            ParseResult::Command { command: Command::Set(args, _), .. } => assert!(args.noreply),
            _ => panic!("expected Set"),
        }
    }

    #[test]
    fn cas_command_carries_stamp() {
        let buf = b"cas foo 0 0 1 42\r\nx\r\n";
        match parse_one(buf) {
            ParseResult::Command { command: Command::Cas(args, _), .. } => assert_eq!(args.cas, 42),
            _ => panic!("expected Cas"),
        }
    }
}
