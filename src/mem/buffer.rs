//! A FIFO chain of segments (spec.md §3 "Buffer").
//!
//! Generalises the teacher crate's `buffer.rs` (`IpcBuffer`, a single
//! owning `Vec<u8>`) into the segment-chain shape the protocol front end
//! needs: a segment is either *internal* (bytes copied into a pool-backed
//! block that the buffer owns outright) or *external* (borrowed from a
//! caller — typically an `Entry`'s data block — with a release callback
//! invoked exactly once, when the head cursor passes it). This is what
//! §4.H calls "splice": a `VALUE` reply's payload is spliced in without a
//! copy, and the entry's reference count drops only once the bytes have
//! actually been written to the socket.

use std::collections::VecDeque;

enum SegmentBody {
    /// Bytes owned outright by this segment.
    Internal(Vec<u8>),
    /// Bytes borrowed from elsewhere; `release` runs exactly once, when
    /// this segment is fully consumed and dropped from the buffer.
    External {
        data: Box<[u8]>,
        release: Option<Box<dyn FnOnce() + Send>>,
    },
}

struct Segment {
    body: SegmentBody,
    /// Read cursor within this segment's bytes.
    pos: usize,
}

impl Segment {
    fn bytes(&self) -> &[u8] {
        match &self.body {
            SegmentBody::Internal(v) => &v[self.pos..],
            SegmentBody::External { data, .. } => &data[self.pos..],
        }
    }

    fn total_len(&self) -> usize {
        match &self.body {
            SegmentBody::Internal(v) => v.len(),
            SegmentBody::External { data, .. } => data.len(),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.total_len()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let SegmentBody::External { release, .. } = &mut self.body {
            if let Some(cb) = release.take() {
                cb();
            }
        }
    }
}

/// A FIFO byte buffer made of internal and external segments.
///
/// Invariant: the head cursor (first unread byte, tracked per-segment by
/// `Segment::pos`) never passes the tail cursor (next free byte, i.e. the
/// end of the last segment) — segments are only ever appended at the tail
/// and consumed from the head.
#[derive(Default)]
pub struct Buffer {
    segments: VecDeque<Segment>,
    len: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self { segments: VecDeque::new(), len: 0 }
    }

    /// Total unread bytes across all segments.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an owned, internal segment.
    pub fn push_internal(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.len += data.len();
        self.segments.push_back(Segment { body: SegmentBody::Internal(data), pos: 0 });
    }

    /// Splice in a borrowed region: `data` is consumed from the buffer
    /// without a copy, and `release` runs exactly once when every byte of
    /// it has been read (or the segment is dropped unread, e.g. on
    /// connection close — §5 "a closing connection's outstanding splice
    /// callbacks MUST run").
    pub fn splice_external(&mut self, data: Box<[u8]>, release: impl FnOnce() + Send + 'static) {
        if data.is_empty() {
            release();
            return;
        }
        self.len += data.len();
        self.segments.push_back(Segment {
            body: SegmentBody::External { data, release: Some(Box::new(release)) },
            pos: 0,
        });
    }

    /// Borrow up to `max` contiguous unread bytes from the head segment
    /// (never crosses a segment boundary — callers loop if they need
    /// more). Returns `None` if empty.
    pub fn peek(&self, max: usize) -> Option<&[u8]> {
        let seg = self.segments.front()?;
        let bytes = seg.bytes();
        Some(&bytes[..bytes.len().min(max)])
    }

    /// Advance the head cursor by `n` bytes, dropping (and releasing) any
    /// segment fully consumed in the process.
    pub fn consume(&mut self, mut n: usize) {
        while n > 0 {
            let Some(seg) = self.segments.front_mut() else { break };
            let remaining = seg.total_len() - seg.pos;
            let take = remaining.min(n);
            seg.pos += take;
            n -= take;
            self.len -= take;
            if seg.is_exhausted() {
                self.segments.pop_front(); // Segment::drop runs the release callback
            }
        }
    }

    /// Copy out and consume the first `n` bytes (may span segments).
    /// Panics if fewer than `n` bytes are buffered — callers check `len()`
    /// first.
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        assert!(self.len >= n, "Buffer::take: not enough buffered data");
        let mut out = Vec::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let seg = self.segments.front_mut().expect("len tracked len() bytes available");
            let bytes = seg.bytes();
            let take = bytes.len().min(remaining);
            out.extend_from_slice(&bytes[..take]);
            remaining -= take;
            seg.pos += take;
            self.len -= take;
            if seg.is_exhausted() {
                self.segments.pop_front();
            }
        }
        out
    }

    /// Write as much of the buffer as possible into `writer`, consuming
    /// exactly what was written. Returns the number of bytes written.
    /// Used by the connection's flush step, and by the ASCII/binary
    /// parsers' "how many bytes are left to scan" look-ahead.
    pub fn write_into(&mut self, mut writer: impl FnMut(&[u8]) -> std::io::Result<usize>) -> std::io::Result<usize> {
        let mut total = 0;
        loop {
            let Some(seg) = self.segments.front() else { break };
            let bytes = seg.bytes();
            if bytes.is_empty() {
                break;
            }
            match writer(bytes) {
                Ok(0) => break,
                Ok(n) => {
                    self.consume(n);
                    total += n;
                    if n < bytes.len() {
                        break; // short write ("would block")
                    }
                }
                Err(e) => {
                    if total == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(total)
    }

    /// Collapse all remaining unread bytes into one contiguous `Vec<u8>`.
    /// Used by the ASCII parser when a command's header line or value
    /// straddles two segments and it needs a single contiguous slice.
    pub fn compact_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for seg in &self.segments {
            out.extend_from_slice(seg.bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn internal_segments_are_fifo() {
        let mut buf = Buffer::new();
        buf.push_internal(b"abc".to_vec());
        buf.push_internal(b"def".to_vec());
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.take(4), b"abcd");
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.take(2), b"ef");
        assert!(buf.is_empty());
    }

    #[test]
    fn external_segment_release_fires_once_when_consumed() {
        let released = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&released);
        let mut buf = Buffer::new();
        buf.splice_external(Box::from(&b"value"[..]), move || {
            r.store(true, Ordering::SeqCst);
        });
        assert!(!released.load(Ordering::SeqCst));
        buf.consume(5);
        assert!(released.load(Ordering::SeqCst));
        assert!(buf.is_empty());
    }

    #[test]
    fn external_segment_release_fires_on_drop_unread() {
        let released = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&released);
        {
            let mut buf = Buffer::new();
            buf.splice_external(Box::from(&b"value"[..]), move || {
                r.store(true, Ordering::SeqCst);
            });
            assert!(!released.load(Ordering::SeqCst));
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn take_spans_segment_boundary() {
        let mut buf = Buffer::new();
        buf.push_internal(b"12".to_vec());
        buf.push_internal(b"345".to_vec());
        assert_eq!(buf.take(4), b"1234");
        assert_eq!(buf.take(1), b"5");
    }
}
