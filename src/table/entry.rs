//! An immutable-once-published cache record (spec.md §3 "Entry").

/// The 32 CLOCK recency levels, plus the two non-live states.
pub const USED_MIN: u8 = 0;
pub const USED_MAX: u8 = 31;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Free,
    NotUsed,
    Used(u8),
}

impl State {
    pub(crate) fn encode(self) -> u8 {
        match self {
            State::Free => 0,
            State::NotUsed => 1,
            State::Used(level) => 2 + level.min(USED_MAX),
        }
    }

    pub(crate) fn decode(raw: u8) -> State {
        match raw {
            0 => State::Free,
            1 => State::NotUsed,
            n => State::Used((n - 2).min(USED_MAX)),
        }
    }

    pub fn is_used(self) -> bool {
        matches!(self, State::Used(_))
    }
}

/// A stored key/value record. Once constructed an `Entry` never changes:
/// `set`/`cas`/`incr`/`touch` all build a brand-new `Entry` and swap it
/// into the bucket chain rather than mutating one in place (§3: "An
/// immutable-once-published record"). Only the slot's `state` and
/// `ref_count`, which live alongside the entry in `EntrySlab`, mutate
/// after publication.
pub struct Entry {
    pub hash: u32,
    /// Per-partition CAS token, assigned at insert/update time.
    pub stamp: u64,
    /// Absolute UNIX seconds; 0 means "never expires".
    pub exp_time: u32,
    pub flags: u32,
    pub key_len: u16,
    pub value_len: u32,
    /// Key bytes followed by value bytes, in one allocation.
    pub data: Box<[u8]>,
}

impl Entry {
    pub fn new(key: &[u8], value: &[u8], flags: u32, exp_time: u32, hash: u32, stamp: u64) -> Self {
        let mut data = Vec::with_capacity(key.len() + value.len());
        data.extend_from_slice(key);
        data.extend_from_slice(value);
        Self {
            hash,
            stamp,
            exp_time,
            flags,
            key_len: key.len() as u16,
            value_len: value.len() as u32,
            data: data.into_boxed_slice(),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.data[..self.key_len as usize]
    }

    pub fn value(&self) -> &[u8] {
        &self.data[self.key_len as usize..]
    }

    pub fn entry_size(&self) -> usize {
        // Accounted volume: the data block plus a fixed per-entry overhead
        // for the slot bookkeeping that doesn't scale with value size.
        std::mem::size_of::<Entry>() + self.data.len()
    }

    pub fn is_expired(&self, now_secs: u32) -> bool {
        self.exp_time != 0 && self.exp_time <= now_secs
    }

    pub fn is_flushed(&self, flush_stamp: u64) -> bool {
        self.stamp < flush_stamp
    }
}

/// Normalise a client-supplied `exp_time` per memcached convention: values
/// at or below 30 days are relative offsets from `now`; larger values are
/// already absolute UNIX seconds. Zero stays zero ("never expires").
pub fn normalize_exp_time(raw: i64, now_secs: u32) -> u32 {
    const THIRTY_DAYS: i64 = 60 * 60 * 24 * 30;
    if raw == 0 {
        0
    } else if raw < 0 {
        // Already-expired sentinel used by some clients to force a delete.
        now_secs.saturating_sub(1).max(1)
    } else if raw <= THIRTY_DAYS {
        now_secs.saturating_add(raw as u32)
    } else {
        raw as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_encode_decode() {
        for s in [State::Free, State::NotUsed, State::Used(0), State::Used(31)] {
            assert_eq!(State::decode(s.encode()), s);
        }
    }

    #[test]
    fn relative_exptime_is_offset_from_now() {
        assert_eq!(normalize_exp_time(60, 1_000), 1_060);
    }

    #[test]
    fn absolute_exptime_passes_through() {
        let abs = 60 * 60 * 24 * 31; // > 30 days, treated as absolute
        assert_eq!(normalize_exp_time(abs as i64, 1_000), abs as u32);
    }

    #[test]
    fn zero_exptime_never_expires() {
        assert_eq!(normalize_exp_time(0, 1_000), 0);
        let e = Entry::new(b"k", b"v", 0, 0, 1, 1);
        assert!(!e.is_expired(u32::MAX));
    }
}
