//! Command execution (component H, spec.md §4.H): per-command handlers
//! over the dispatch layer. Value bodies are spliced into the outbound
//! buffer (`Buffer::splice_external`) with a release callback that drops
//! the backing `EntryHandle` once the bytes have been flushed, holding
//! the entry's reference open exactly as long as the reply might still
//! read its data.
//!
//! **Simplification** (recorded in DESIGN.md): `Partition::create`
//! always grows rather than synchronously rejecting when the volume
//! budget can't be met; admission control is the background evictor's
//! job (`server::maintain_partitions`, run once per worker loop turn),
//! not a per-insert check. The
//! `OUT_OF_MEMORY`/`SERVER_ERROR out of memory` paths below exist for
//! protocol completeness but are presently unreachable.

use std::sync::Arc;

use crate::dispatch::PartitionRoute;
use crate::mem::Buffer;
use crate::protocol::binary::{self, Status};
use crate::protocol::command::{Command, Framing, IncrDecrArgs, StoreArgs};
use crate::table::{EntryHandle, InsertOutcome, Partition, Table, UpdateOutcome};

const MAX_ALTER_RETRIES: u32 = 32;

fn route_for<'a>(table: &'a Table, routes: &'a [PartitionRoute], key: &[u8]) -> (u32, &'a Arc<Partition>, &'a PartitionRoute) {
    let (hash, partition) = table.partition_for_key(key);
    (hash, partition, &routes[partition.id as usize])
}

enum StoreResult {
    Stored,
    NotStored,
    /// `cas`/`add` conflict: an entry already exists (and, for `cas`,
    /// disagreed with the supplied stamp).
    Exists,
    NotFound,
}

enum StoreMode {
    Set,
    Add,
    Replace,
    Cas,
    Append,
    Prepend,
}

fn do_store(table: &Table, routes: &[PartitionRoute], args: &StoreArgs, mode: StoreMode) -> StoreResult {
    let (hash, partition, route) = route_for(table, routes, &args.key);
    match mode {
        StoreMode::Set => {
            let (key, value, flags, exp) = (args.key.clone(), args.value.clone(), args.flags, args.exp_time_raw);
            route.execute(partition, move |p| p.upsert(&key, &value, flags, exp, hash));
            table.stats().record_set(args.value.len() as u64);
            StoreResult::Stored
        }
        StoreMode::Add => {
            let (key, value, flags, exp) = (args.key.clone(), args.value.clone(), args.flags, args.exp_time_raw);
            match route.execute(partition, move |p| p.insert(&key, &value, flags, exp, hash)) {
                InsertOutcome::Inserted => {
                    table.stats().record_set(args.value.len() as u64);
                    StoreResult::Stored
                }
                InsertOutcome::AlreadyExists(_) => StoreResult::NotStored,
            }
        }
        StoreMode::Replace => {
            let (key, value, flags, exp) = (args.key.clone(), args.value.clone(), args.flags, args.exp_time_raw);
            match route.execute(partition, move |p| p.update(&key, &value, flags, exp, hash, 0)) {
                UpdateOutcome::Replaced => {
                    table.stats().record_set(args.value.len() as u64);
                    StoreResult::Stored
                }
                UpdateOutcome::NotFound => StoreResult::NotStored,
                UpdateOutcome::CasMismatch(_) => unreachable!("cas=0 always matches in Partition::update"),
            }
        }
        StoreMode::Cas => {
            let (key, value, flags, exp, cas) = (args.key.clone(), args.value.clone(), args.flags, args.exp_time_raw, args.cas);
            match route.execute(partition, move |p| p.update(&key, &value, flags, exp, hash, cas)) {
                UpdateOutcome::Replaced => {
                    table.stats().record_set(args.value.len() as u64);
                    StoreResult::Stored
                }
                UpdateOutcome::NotFound => StoreResult::NotFound,
                UpdateOutcome::CasMismatch(_) => StoreResult::Exists,
            }
        }
        StoreMode::Append | StoreMode::Prepend => {
            let prepend = matches!(mode, StoreMode::Prepend);
            for _ in 0..MAX_ALTER_RETRIES {
                let key = args.key.clone();
                let Some(old) = route.execute(partition, move |p| p.lookup(hash, &key)) else {
                    return StoreResult::NotStored;
                };
                let new_value = if prepend {
                    [args.value.as_slice(), old.value()].concat()
                } else {
                    [old.value(), args.value.as_slice()].concat()
                };
                let (flags, exp, cas) = (old.flags, old.exp_time as i64, old.stamp);
                drop(old);
                let key = args.key.clone();
                match route.execute(partition, move |p| p.alter(&key, &new_value, flags, exp, hash, cas)) {
                    UpdateOutcome::Replaced => {
                        table.stats().record_set(args.value.len() as u64);
                        return StoreResult::Stored;
                    }
                    UpdateOutcome::CasMismatch(_) | UpdateOutcome::NotFound => continue,
                }
            }
            StoreResult::NotStored
        }
    }
}

enum IncrResult {
    Value(u64),
    NotFound,
    NonNumeric,
}

/// value_len <= 20 ASCII digits (spec.md §4.H); overflow wraps on
/// increment, saturates to zero on decrement.
fn do_incr_decr(table: &Table, routes: &[PartitionRoute], args: &IncrDecrArgs, is_incr: bool) -> IncrResult {
    let (hash, partition, route) = route_for(table, routes, &args.key);
    for _ in 0..MAX_ALTER_RETRIES {
        let key = args.key.clone();
        match route.execute(partition, move |p| p.lookup(hash, &key)) {
            None => match args.initial {
                Some(initial) => {
                    let (key, seed, exp_time_raw) = (args.key.clone(), initial.to_string().into_bytes(), args.exp_time_raw);
                    match route.execute(partition, move |p| p.insert(&key, &seed, 0, exp_time_raw, hash)) {
                        InsertOutcome::Inserted => return IncrResult::Value(initial),
                        InsertOutcome::AlreadyExists(_) => continue,
                    }
                }
                None => return IncrResult::NotFound,
            },
            Some(old) => {
                let Ok(text) = std::str::from_utf8(old.value()) else {
                    return IncrResult::NonNumeric;
                };
                if old.value().len() > 20 {
                    return IncrResult::NonNumeric;
                }
                let Ok(current) = text.trim().parse::<u64>() else {
                    return IncrResult::NonNumeric;
                };
                let updated = if is_incr { current.wrapping_add(args.delta) } else { current.saturating_sub(args.delta) };
                let (flags, exp, cas) = (old.flags, old.exp_time as i64, old.stamp);
                drop(old);
                let (key, new_value) = (args.key.clone(), updated.to_string().into_bytes());
                match route.execute(partition, move |p| p.alter(&key, &new_value, flags, exp, hash, cas)) {
                    UpdateOutcome::Replaced => return IncrResult::Value(updated),
                    UpdateOutcome::CasMismatch(_) | UpdateOutcome::NotFound => continue,
                }
            }
        }
    }
    IncrResult::NotFound
}

fn do_get(table: &Table, routes: &[PartitionRoute], key: &[u8]) -> Option<EntryHandle> {
    let (hash, partition, route) = route_for(table, routes, key);
    let key = key.to_vec();
    let handle = route.execute(partition, move |p| p.lookup(hash, &key));
    table.stats().record_get(handle.is_some());
    handle
}

fn do_delete(table: &Table, routes: &[PartitionRoute], key: &[u8]) -> bool {
    let (hash, partition, route) = route_for(table, routes, key);
    let key = key.to_vec();
    route.execute(partition, move |p| p.delete(hash, &key))
}

fn do_touch(table: &Table, routes: &[PartitionRoute], key: &[u8], exp_time_raw: i64) -> bool {
    let (hash, partition, route) = route_for(table, routes, key);
    let key_for_lookup = key.to_vec();
    let Some(old) = route.execute(partition, move |p| p.lookup(hash, &key_for_lookup)) else {
        return false;
    };
    let (value, flags, cas) = (old.value().to_vec(), old.flags, old.stamp);
    drop(old);
    let key = key.to_vec();
    matches!(
        route.execute(partition, move |p| p.alter(&key, &value, flags, exp_time_raw, hash, cas)),
        UpdateOutcome::Replaced
    )
}

fn do_flush_all(table: &Table) {
    for partition in table.partitions() {
        partition.flush_all();
    }
}

// ---------------------------------------------------------------------
// ASCII formatting
// ---------------------------------------------------------------------

pub enum ControlFlow {
    Continue,
    Close,
}

pub fn execute_ascii(command: Command, table: &Table, routes: &[PartitionRoute], out: &mut Buffer) -> ControlFlow {
    match command {
        Command::Get { keys, with_cas, .. } => {
            for key in keys {
                if let Some(handle) = do_get(table, routes, &key) {
                    let header = if with_cas {
                        format!("VALUE {} {} {} {}\r\n", String::from_utf8_lossy(&key), handle.flags, handle.value().len(), handle.stamp)
                    } else {
                        format!("VALUE {} {} {}\r\n", String::from_utf8_lossy(&key), handle.flags, handle.value().len())
                    };
                    out.push_internal(header.into_bytes());
                    let value = handle.value().to_vec().into_boxed_slice();
                    out.splice_external(value, move || drop(handle));
                    out.push_internal(b"\r\n".to_vec());
                }
            }
            out.push_internal(b"END\r\n".to_vec());
        }
        Command::Set(args, _) => reply_store(do_store(table, routes, &args, StoreMode::Set), args.noreply, out),
        Command::Add(args, _) => reply_store(do_store(table, routes, &args, StoreMode::Add), args.noreply, out),
        Command::Replace(args, _) => reply_store(do_store(table, routes, &args, StoreMode::Replace), args.noreply, out),
        Command::Append(args, _) => reply_store(do_store(table, routes, &args, StoreMode::Append), args.noreply, out),
        Command::Prepend(args, _) => reply_store(do_store(table, routes, &args, StoreMode::Prepend), args.noreply, out),
        Command::Cas(args, _) => reply_store(do_store(table, routes, &args, StoreMode::Cas), args.noreply, out),
        Command::Increment(args, _) => reply_incr(do_incr_decr(table, routes, &args, true), args.noreply, out),
        Command::Decrement(args, _) => reply_incr(do_incr_decr(table, routes, &args, false), args.noreply, out),
        Command::Delete { key, noreply, .. } => {
            let found = do_delete(table, routes, &key);
            if !noreply {
                out.push_internal(if found { b"DELETED\r\n".to_vec() } else { b"NOT_FOUND\r\n".to_vec() });
            }
        }
        Command::Touch { key, exp_time_raw, noreply, .. } => {
            let found = do_touch(table, routes, &key, exp_time_raw);
            if !noreply {
                out.push_internal(if found { b"TOUCHED\r\n".to_vec() } else { b"NOT_FOUND\r\n".to_vec() });
            }
        }
        Command::FlushAll { noreply, .. } => {
            do_flush_all(table);
            if !noreply {
                out.push_internal(b"OK\r\n".to_vec());
            }
        }
        Command::Version(_) => out.push_internal(format!("VERSION {}\r\n", env!("CARGO_PKG_VERSION")).into_bytes()),
        Command::Quit { .. } => return ControlFlow::Close,
        Command::Stats(_) | Command::Slabs => out.push_internal(b"END\r\n".to_vec()),
        Command::Verbosity { noreply, .. } => {
            if !noreply {
                out.push_internal(b"OK\r\n".to_vec());
            }
        }
        Command::AsciiError(msg) => out.push_internal(format!("CLIENT_ERROR {msg}\r\n").into_bytes()),
        Command::Noop(_) | Command::BinaryError { .. } => {
            // Cannot occur on an ASCII-pinned connection.
        }
    }
    ControlFlow::Continue
}

fn reply_store(result: StoreResult, noreply: bool, out: &mut Buffer) {
    if noreply {
        return;
    }
    let line: &[u8] = match result {
        StoreResult::Stored => b"STORED\r\n",
        StoreResult::NotStored => b"NOT_STORED\r\n",
        StoreResult::Exists => b"EXISTS\r\n",
        StoreResult::NotFound => b"NOT_FOUND\r\n",
    };
    out.push_internal(line.to_vec());
}

fn reply_incr(result: IncrResult, noreply: bool, out: &mut Buffer) {
    if noreply {
        return;
    }
    match result {
        IncrResult::Value(v) => out.push_internal(format!("{v}\r\n").into_bytes()),
        IncrResult::NotFound => out.push_internal(b"NOT_FOUND\r\n".to_vec()),
        IncrResult::NonNumeric => out.push_internal(b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n".to_vec()),
    }
}

// ---------------------------------------------------------------------
// Binary formatting
// ---------------------------------------------------------------------

fn write_status_only(out: &mut Buffer, opcode: u8, status: Status, framing: &Framing) {
    let header = binary::build_response_header(opcode, status, 0, 0, 0, framing.opaque, 0);
    out.push_internal(header.to_vec());
}

fn write_value_reply(out: &mut Buffer, opcode: u8, framing: &Framing, handle: EntryHandle, echo_key: Option<&[u8]>) {
    let key_len = echo_key.map_or(0, |k| k.len()) as u16;
    let header =
        binary::build_response_header(opcode, Status::NoError, 4, key_len, handle.value().len() as u32, framing.opaque, handle.stamp);
    out.push_internal(header.to_vec());
    out.push_internal(handle.flags.to_be_bytes().to_vec());
    if let Some(k) = echo_key {
        out.push_internal(k.to_vec());
    }
    let value = handle.value().to_vec().into_boxed_slice();
    out.splice_external(value, move || drop(handle));
}

pub fn execute_binary(command: Command, table: &Table, routes: &[PartitionRoute], out: &mut Buffer) -> ControlFlow {
    match command {
        Command::Get { keys, quiet, echo_key, framing, .. } => {
            let framing = framing.expect("binary Get always carries framing");
            let key = keys.into_iter().next().expect("binary Get has exactly one key");
            match do_get(table, routes, &key) {
                Some(handle) => {
                    let echoed = if echo_key { Some(key.as_slice()) } else { None };
                    write_value_reply(out, binary::Opcode::Get as u8, &framing, handle, echoed)
                }
                // GetQ/GetKQ suppress the reply entirely on a miss (a
                // miss isn't an error for Get); Get/GetK still answer.
                None if quiet => {}
                None => write_status_only(out, binary::Opcode::Get as u8, Status::KeyNotFound, &framing),
            }
        }
        Command::Set(args, framing) => bin_store(table, routes, args, StoreMode::Set, binary::Opcode::Set as u8, framing.expect("binary command always carries framing"), out),
        Command::Add(args, framing) => bin_store(table, routes, args, StoreMode::Add, binary::Opcode::Add as u8, framing.expect("binary command always carries framing"), out),
        Command::Replace(args, framing) => {
            bin_store(table, routes, args, StoreMode::Replace, binary::Opcode::Replace as u8, framing.expect("binary command always carries framing"), out)
        }
        Command::Append(args, framing) => {
            bin_store(table, routes, args, StoreMode::Append, binary::Opcode::Append as u8, framing.expect("binary command always carries framing"), out)
        }
        Command::Prepend(args, framing) => {
            bin_store(table, routes, args, StoreMode::Prepend, binary::Opcode::Prepend as u8, framing.expect("binary command always carries framing"), out)
        }
        Command::Cas(_, _) => unreachable!("binary protocol carries CAS in the header, not a dedicated opcode"),
        Command::Increment(args, framing) => bin_incr_decr(table, routes, args, true, binary::Opcode::Increment as u8, framing.expect("binary command always carries framing"), out),
        Command::Decrement(args, framing) => {
            bin_incr_decr(table, routes, args, false, binary::Opcode::Decrement as u8, framing.expect("binary command always carries framing"), out)
        }
        Command::Delete { key, noreply, framing } => {
            let framing = framing.expect("binary command always carries framing");
            let status = if do_delete(table, routes, &key) { Status::NoError } else { Status::KeyNotFound };
            if !(noreply && status == Status::NoError) {
                write_status_only(out, binary::Opcode::Delete as u8, status, &framing);
            }
        }
        Command::Touch { .. } => unreachable!("memcached binary protocol has no dedicated touch opcode here"),
        Command::FlushAll { noreply, framing, .. } => {
            do_flush_all(table);
            if !noreply {
                write_status_only(out, binary::Opcode::FlushAll as u8, Status::NoError, &framing.expect("binary command always carries framing"));
            }
        }
        Command::Version(framing) => {
            let framing = framing.expect("binary command always carries framing");
            let body = env!("CARGO_PKG_VERSION").as_bytes();
            let header = binary::build_response_header(binary::Opcode::Version as u8, Status::NoError, 0, 0, body.len() as u32, framing.opaque, 0);
            out.push_internal(header.to_vec());
            out.push_internal(body.to_vec());
        }
        Command::Quit { quietly, framing } => {
            if !quietly {
                write_status_only(out, binary::Opcode::Quit as u8, Status::NoError, &framing.expect("binary command always carries framing"));
            }
            return ControlFlow::Close;
        }
        Command::Stats(framing) => write_status_only(out, binary::Opcode::Stat as u8, Status::NoError, &framing.expect("binary command always carries framing")),
        Command::Noop(framing) => write_status_only(out, binary::Opcode::Noop as u8, Status::NoError, &framing),
        Command::BinaryError { framing, status } => write_status_only(out, 0x00, status, &framing),
        Command::Verbosity { .. } | Command::Slabs | Command::AsciiError(_) => {
            // Cannot occur on a binary-pinned connection.
        }
    }
    ControlFlow::Continue
}

fn bin_store(table: &Table, routes: &[PartitionRoute], args: StoreArgs, mode: StoreMode, opcode: u8, framing: Framing, out: &mut Buffer) {
    let noreply = args.noreply;
    let status = match do_store(table, routes, &args, mode) {
        StoreResult::Stored => Status::NoError,
        StoreResult::NotStored => Status::ItemNotStored,
        StoreResult::Exists => Status::KeyExists,
        StoreResult::NotFound => Status::KeyNotFound,
    };
    if noreply && status == Status::NoError {
        return;
    }
    write_status_only(out, opcode, status, &framing);
}

fn bin_incr_decr(table: &Table, routes: &[PartitionRoute], args: IncrDecrArgs, is_incr: bool, opcode: u8, framing: Framing, out: &mut Buffer) {
    let noreply = args.noreply;
    match do_incr_decr(table, routes, &args, is_incr) {
        IncrResult::Value(v) => {
            if noreply {
                return;
            }
            let body = v.to_be_bytes();
            let header = binary::build_response_header(opcode, Status::NoError, 0, 0, body.len() as u32, framing.opaque, 0);
            out.push_internal(header.to_vec());
            out.push_internal(body.to_vec());
        }
        IncrResult::NotFound => write_status_only(out, opcode, Status::KeyNotFound, &framing),
        IncrResult::NonNumeric => write_status_only(out, opcode, Status::NonNumericValue, &framing),
    }
}

// ---------------------------------------------------------------------
// End-to-end scenarios (spec.md §8 "Concrete scenarios"), driving real
// wire bytes through the parser and back out through the formatter.
// ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchMode;
    use crate::protocol::{ascii, binary};
    use crate::table::TableConfig;

    fn fresh(nparts: u32) -> (Table, Vec<PartitionRoute>) {
        let table = Table::new(TableConfig { nparts, volume_budget_total: 64 << 20 });
        let routes = (0..table.nparts()).map(|_| PartitionRoute::new(DispatchMode::Direct, 16)).collect();
        (table, routes)
    }

    fn run_ascii(table: &Table, routes: &[PartitionRoute], line: &str) -> String {
        match ascii::parse_one(line.as_bytes()) {
            ascii::ParseResult::Command { command, .. } => {
                let mut out = Buffer::new();
                execute_ascii(command, table, routes, &mut out);
                String::from_utf8(out.compact_to_vec()).unwrap()
            }
            ascii::ParseResult::Incomplete => panic!("expected a complete command: {line:?}"),
        }
    }

    fn build_binary_request(opcode: u8, ext: &[u8], key: &[u8], value: &[u8]) -> Vec<u8> {
        let body_len = (ext.len() + key.len() + value.len()) as u32;
        let mut buf = vec![0u8; binary::HEADER_LEN];
        buf[0] = binary::REQUEST_MAGIC;
        buf[1] = opcode;
        buf[2..4].copy_from_slice(&(key.len() as u16).to_be_bytes());
        buf[4] = ext.len() as u8;
        buf[8..12].copy_from_slice(&body_len.to_be_bytes());
        buf.extend_from_slice(ext);
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
        buf
    }

    fn run_binary(table: &Table, routes: &[PartitionRoute], request: &[u8]) -> Vec<u8> {
        match binary::parse_one(request) {
            binary::ParseResult::Command { command, .. } => {
                let mut out = Buffer::new();
                execute_binary(command, table, routes, &mut out);
                out.compact_to_vec()
            }
            other => panic!("expected a complete command, got something else: {request:?} -> parsed {:?}", std::mem::discriminant(&other)),
        }
    }

    // Scenario 1: basic get/set (ASCII).
    #[test]
    fn ascii_basic_get_set() {
        let (table, routes) = fresh(1);
        assert_eq!(run_ascii(&table, &routes, "set foo 0 0 3\r\nbar\r\n"), "STORED\r\n");
        assert_eq!(run_ascii(&table, &routes, "get foo\r\n"), "VALUE foo 0 3\r\nbar\r\nEND\r\n");
    }

    // Scenario 2: CAS conflict (ASCII).
    #[test]
    fn ascii_cas_conflict_reports_exists_and_keeps_winning_value() {
        let (table, routes) = fresh(1);
        assert_eq!(run_ascii(&table, &routes, "set k 0 0 1\r\nA\r\n"), "STORED\r\n");

        let gets_reply = run_ascii(&table, &routes, "gets k\r\n");
        let stamp: u64 = gets_reply.split_whitespace().nth(4).unwrap().parse().unwrap();

        // A second connection races in and overwrites the value.
        assert_eq!(run_ascii(&table, &routes, "set k 0 0 1\r\nB\r\n"), "STORED\r\n");

        let cas_line = format!("cas k 0 0 1 {stamp}\r\nC\r\n");
        assert_eq!(run_ascii(&table, &routes, &cas_line), "EXISTS\r\n");
        assert_eq!(run_ascii(&table, &routes, "get k\r\n"), "VALUE k 0 1\r\nB\r\nEND\r\n");
    }

    // Scenario 3: expiry (ASCII). A negative exptime lands in the past
    // immediately, standing in for "advance time 2s" without a sleep.
    #[test]
    fn ascii_expired_entry_reads_back_as_miss() {
        let (table, routes) = fresh(1);
        assert_eq!(run_ascii(&table, &routes, "set k 0 -1 1\r\nX\r\n"), "STORED\r\n");
        assert_eq!(run_ascii(&table, &routes, "get k\r\n"), "END\r\n");
    }

    // Scenario 4: binary increment on a missing key seeds `initial`.
    #[test]
    fn binary_increment_missing_key_seeds_initial_then_increments() {
        let (table, routes) = fresh(1);
        let mut ext = Vec::new();
        ext.extend_from_slice(&1u64.to_be_bytes()); // delta
        ext.extend_from_slice(&10u64.to_be_bytes()); // initial
        ext.extend_from_slice(&0u32.to_be_bytes()); // exptime
        let req = build_binary_request(binary::Opcode::Increment as u8, &ext, b"n", &[]);

        let reply = run_binary(&table, &routes, &req);
        assert_eq!(reply[6..8], [0, 0], "status should be NO_ERROR");
        let body = &reply[binary::HEADER_LEN..];
        assert_eq!(u64::from_be_bytes(body.try_into().unwrap()), 10);

        let reply2 = run_binary(&table, &routes, &req);
        let body2 = &reply2[binary::HEADER_LEN..];
        assert_eq!(u64::from_be_bytes(body2.try_into().unwrap()), 11);
    }

    // Scenario 5: flush semantics.
    #[test]
    fn ascii_flush_all_hides_every_prior_entry() {
        let (table, routes) = fresh(4);
        assert_eq!(run_ascii(&table, &routes, "set a 0 0 1\r\nA\r\n"), "STORED\r\n");
        assert_eq!(run_ascii(&table, &routes, "set b 0 0 1\r\nB\r\n"), "STORED\r\n");
        assert_eq!(run_ascii(&table, &routes, "flush_all\r\n"), "OK\r\n");
        assert_eq!(run_ascii(&table, &routes, "get a\r\n"), "END\r\n");
        assert_eq!(run_ascii(&table, &routes, "get b\r\n"), "END\r\n");
    }

    #[test]
    fn ascii_append_prepend_are_value_noops_on_empty_delta() {
        let (table, routes) = fresh(1);
        assert_eq!(run_ascii(&table, &routes, "set k 0 0 1\r\nV\r\n"), "STORED\r\n");
        assert_eq!(run_ascii(&table, &routes, "append k 0 0 0\r\n\r\n"), "STORED\r\n");
        assert_eq!(run_ascii(&table, &routes, "get k\r\n"), "VALUE k 0 1\r\nV\r\nEND\r\n");
    }

    #[test]
    fn ascii_incr_on_missing_key_is_not_found() {
        let (table, routes) = fresh(1);
        assert_eq!(run_ascii(&table, &routes, "incr missing 1\r\n"), "NOT_FOUND\r\n");
    }

    #[test]
    fn ascii_incr_on_non_numeric_value_reports_client_error() {
        let (table, routes) = fresh(1);
        assert_eq!(run_ascii(&table, &routes, "set k 0 0 3\r\nabc\r\n"), "STORED\r\n");
        assert_eq!(
            run_ascii(&table, &routes, "incr k 1\r\n"),
            "CLIENT_ERROR cannot increment or decrement non-numeric value\r\n"
        );
    }

    #[test]
    fn binary_get_on_missing_key_reports_key_not_found() {
        let (table, routes) = fresh(1);
        let req = build_binary_request(binary::Opcode::Get as u8, &[], b"missing", &[]);
        let reply = run_binary(&table, &routes, &req);
        assert_eq!(u16::from_be_bytes([reply[6], reply[7]]), Status::KeyNotFound as u16);
    }
}
