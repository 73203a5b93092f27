// A portable 32-bit hash over byte strings, with an optional SSE4.2 CRC32
// fast path behind the `hash-sse42` feature (§9: "a portable default plus
// an SSE 4.2 fast path behind a feature flag is sufficient" — the hash
// itself is exchangeable, the contract is only "reasonably uniform").
//
// Grounded in the teacher crate's `shm_name.rs` FNV-1a (used there for shm
// name shortening); reused here as the portable default since it is
// already the corpus's chosen non-cryptographic hash.

/// FNV-1a, 32-bit variant.
fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in data {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

#[cfg(all(feature = "hash-sse42", any(target_arch = "x86", target_arch = "x86_64")))]
fn crc32_sse42(data: &[u8]) -> u32 {
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::_mm_crc32_u8;
    #[cfg(target_arch = "x86")]
    use std::arch::x86::_mm_crc32_u8;

    if !is_x86_feature_detected!("sse4.2") {
        return fnv1a_32(data);
    }
    let mut crc: u32 = !0;
    for &b in data {
        crc = unsafe { _mm_crc32_u8(crc, b) };
    }
    !crc
}

/// Hash a key. Uniform enough to spread evenly across partitions and
/// bucket chains; not cryptographic, not stable across builds (clients
/// never observe it directly).
#[inline]
pub fn hash_key(data: &[u8]) -> u32 {
    #[cfg(all(feature = "hash-sse42", any(target_arch = "x86", target_arch = "x86_64")))]
    {
        crc32_sse42(data)
    }
    #[cfg(not(all(feature = "hash-sse42", any(target_arch = "x86", target_arch = "x86_64"))))]
    {
        fnv1a_32(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_stable_within_a_run() {
        assert_eq!(hash_key(b"foo"), hash_key(b"foo"));
        assert_ne!(hash_key(b"foo"), hash_key(b"bar"));
    }

    #[test]
    fn empty_key_hashes_without_panic() {
        let _ = hash_key(b"");
    }
}
