//! Command records (spec.md §4.H): a tagged record naming an action and
//! its arguments, produced by either protocol parser and consumed by
//! `crate::exec`. Kept as plain owned enums rather than objects embedded
//! in the outbound buffer's free space — spec.md §9 explicitly allows
//! either: "the contract is only that commands are processed in arrival
//! order and released after their reply is fully buffered."

/// Which wire format a connection has pinned itself to, detected from
/// the first byte (spec.md §4.I).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Protocol {
    Ascii,
    Binary,
}

/// A storage command's common fields (spec.md §4.H: `{action, delta,
/// value, alter_value, own_alter_value}` generalised to one struct and
/// reused by set/add/replace/append/prepend/cas).
#[derive(Clone, Debug)]
pub struct StoreArgs {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub flags: u32,
    pub exp_time_raw: i64,
    pub cas: u64,
    pub noreply: bool,
}

#[derive(Clone, Debug)]
pub struct IncrDecrArgs {
    pub key: Vec<u8>,
    pub delta: u64,
    /// Binary protocol only: value to seed a missing key with.
    pub initial: Option<u64>,
    pub exp_time_raw: i64,
    pub noreply: bool,
}

/// One request, tagged with the binary protocol's `opaque`/`cas` echo
/// fields when it came in over that wire (`None` for ASCII, which has
/// no equivalent framing).
#[derive(Clone, Debug)]
pub struct Framing {
    pub opaque: u32,
}

#[derive(Clone, Debug)]
pub enum Command {
    Get { keys: Vec<Vec<u8>>, with_cas: bool, quiet: bool, echo_key: bool, framing: Option<Framing> },
    Set(StoreArgs, Option<Framing>),
    Add(StoreArgs, Option<Framing>),
    Replace(StoreArgs, Option<Framing>),
    Append(StoreArgs, Option<Framing>),
    Prepend(StoreArgs, Option<Framing>),
    Cas(StoreArgs, Option<Framing>),
    Increment(IncrDecrArgs, Option<Framing>),
    Decrement(IncrDecrArgs, Option<Framing>),
    Delete { key: Vec<u8>, noreply: bool, framing: Option<Framing> },
    Touch { key: Vec<u8>, exp_time_raw: i64, noreply: bool, framing: Option<Framing> },
    FlushAll { exp_time_raw: i64, noreply: bool, framing: Option<Framing> },
    Version(Option<Framing>),
    Quit { quietly: bool, framing: Option<Framing> },
    Stats(Option<Framing>),
    Verbosity { level: u32, noreply: bool },
    Slabs,
    Noop(Framing),
    /// A malformed ASCII line: the parser recovers and continues
    /// (spec.md §7 kind 1).
    AsciiError(String),
    /// A structurally invalid binary request (bad opcode/length combo):
    /// answered with `INVALID_ARGUMENTS`/`UNKNOWN_COMMAND` (spec.md §4.G).
    BinaryError { framing: Framing, status: super::binary::Status },
}
