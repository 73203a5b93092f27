//! Portable fallback backend built on `libc::poll`, used on targets
//! without an epoll/kqueue equivalent.

use std::os::unix::io::RawFd;

use super::{Backend, ReadyEvent};
use crate::event::sink::Readiness;

pub struct PollBackendImpl {
    fds: Vec<libc::pollfd>,
}

impl PollBackendImpl {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self { fds: Vec::new() })
    }

    fn index_of(&self, fd: RawFd) -> Option<usize> {
        self.fds.iter().position(|p| p.fd == fd)
    }

    fn events_for(want_input: bool, want_output: bool) -> i16 {
        let mut bits = 0;
        if want_input {
            bits |= libc::POLLIN;
        }
        if want_output {
            bits |= libc::POLLOUT;
        }
        bits
    }
}

impl Backend for PollBackendImpl {
    fn register(&mut self, fd: RawFd, want_input: bool, want_output: bool) -> std::io::Result<()> {
        self.fds.push(libc::pollfd { fd, events: Self::events_for(want_input, want_output), revents: 0 });
        Ok(())
    }

    fn unregister(&mut self, fd: RawFd) -> std::io::Result<()> {
        if let Some(i) = self.index_of(fd) {
            self.fds.swap_remove(i);
        }
        Ok(())
    }

    fn enable_input(&mut self, fd: RawFd) -> std::io::Result<()> {
        if let Some(i) = self.index_of(fd) {
            self.fds[i].events |= libc::POLLIN;
        }
        Ok(())
    }

    fn enable_output(&mut self, fd: RawFd) -> std::io::Result<()> {
        if let Some(i) = self.index_of(fd) {
            self.fds[i].events |= libc::POLLOUT;
        }
        Ok(())
    }

    fn poll(&mut self, timeout_ms: Option<u32>, out: &mut Vec<ReadyEvent>) -> std::io::Result<()> {
        if self.fds.is_empty() {
            return Ok(());
        }
        let timeout = match timeout_ms {
            Some(ms) => ms as i32,
            None => -1,
        };
        let n = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, timeout) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }
        for entry in &mut self.fds {
            if entry.revents == 0 {
                continue;
            }
            out.push(ReadyEvent {
                fd: entry.fd,
                readiness: Readiness {
                    input: entry.revents & libc::POLLIN != 0,
                    output: entry.revents & libc::POLLOUT != 0,
                    error: entry.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
                },
            });
            entry.revents = 0;
        }
        Ok(())
    }
}
