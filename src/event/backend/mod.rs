//! Poll backend abstraction (spec.md §4.D: "epoll on Linux, kqueue on
//! BSD/macOS, abstracted uniformly as 'backend'").

#[cfg(target_os = "linux")]
pub mod epoll;
#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
pub mod kqueue;
// `libc::poll` is the portable fallback for any other unix the epoll/kqueue
// arms above don't cover. Windows has no equivalent here; the fiber
// context module takes the same stance (see fiber::context's windows stub).
#[cfg(unix)]
pub mod poll;

use std::os::unix::io::RawFd;

use super::sink::Readiness;

/// A ready sink delivered by `Backend::poll`.
pub struct ReadyEvent {
    pub fd: RawFd,
    pub readiness: Readiness,
}

/// Uniform interface over the platform poll mechanism. One instance per
/// listener thread (private set) plus one process-wide instance for the
/// common poller (spec.md §4.D).
pub trait Backend {
    fn register(&mut self, fd: RawFd, want_input: bool, want_output: bool) -> std::io::Result<()>;
    fn unregister(&mut self, fd: RawFd) -> std::io::Result<()>;
    fn enable_input(&mut self, fd: RawFd) -> std::io::Result<()>;
    fn enable_output(&mut self, fd: RawFd) -> std::io::Result<()>;
    /// Block at most `timeout_ms` (0 = non-blocking drain, `None` =
    /// indefinite), appending ready events to `out`.
    fn poll(&mut self, timeout_ms: Option<u32>, out: &mut Vec<ReadyEvent>) -> std::io::Result<()>;
}

#[cfg(target_os = "linux")]
pub type DefaultBackend = epoll::EpollBackend;
#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
pub type DefaultBackend = kqueue::KqueueBackend;
#[cfg(all(
    unix,
    not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    ))
))]
pub type DefaultBackend = poll::PollBackendImpl;
