//! An I/O object tracked for readiness (spec.md §3 "Event sink").

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SinkFlags {
    RegularIn,
    RegularOut,
    RegularInOut,
    OneshotIn,
    OneshotOut,
    CommonPoller,
}

impl SinkFlags {
    pub fn wants_input(self) -> bool {
        matches!(self, SinkFlags::RegularIn | SinkFlags::RegularInOut | SinkFlags::OneshotIn)
    }

    pub fn wants_output(self) -> bool {
        matches!(self, SinkFlags::RegularOut | SinkFlags::RegularInOut | SinkFlags::OneshotOut)
    }

    pub fn is_oneshot(self) -> bool {
        matches!(self, SinkFlags::OneshotIn | SinkFlags::OneshotOut)
    }

    pub fn is_common(self) -> bool {
        matches!(self, SinkFlags::CommonPoller)
    }
}

/// Readiness triple delivered by a poll backend for one sink.
#[derive(Clone, Copy, Default, Debug)]
pub struct Readiness {
    pub input: bool,
    pub output: bool,
    pub error: bool,
}

/// A tracked file descriptor. "Active" while `receive_stamp !=
/// complete_stamp` — i.e. a readiness event has been delivered but the
/// fiber it woke hasn't finished draining it yet.
pub struct Sink {
    pub fd: RawFd,
    pub flags: SinkFlags,
    receive_stamp: AtomicU32,
    complete_stamp: AtomicU32,
}

impl Sink {
    pub fn new(fd: RawFd, flags: SinkFlags) -> Self {
        Self { fd, flags, receive_stamp: AtomicU32::new(0), complete_stamp: AtomicU32::new(0) }
    }

    pub fn is_active(&self) -> bool {
        self.receive_stamp.load(Ordering::Acquire) != self.complete_stamp.load(Ordering::Acquire)
    }

    pub fn mark_received(&self) {
        self.receive_stamp.fetch_add(1, Ordering::AcqRel);
    }

    pub fn mark_complete(&self) {
        let received = self.receive_stamp.load(Ordering::Acquire);
        self.complete_stamp.store(received, Ordering::Release);
    }
}
