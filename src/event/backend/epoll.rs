//! Linux `epoll` backend.

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use super::{Backend, ReadyEvent};
use crate::event::sink::Readiness;

pub struct EpollBackend {
    epfd: RawFd,
    registered: HashMap<RawFd, u32>,
    events_buf: Vec<libc::epoll_event>,
}

fn interest_bits(want_input: bool, want_output: bool) -> u32 {
    let mut bits = (libc::EPOLLERR | libc::EPOLLHUP) as u32;
    if want_input {
        bits |= libc::EPOLLIN as u32;
    }
    if want_output {
        bits |= libc::EPOLLOUT as u32;
    }
    bits
}

impl EpollBackend {
    pub fn new() -> std::io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(0) };
        if epfd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { epfd, registered: HashMap::new(), events_buf: vec![unsafe { std::mem::zeroed() }; 256] })
    }

    fn ctl(&mut self, op: i32, fd: RawFd, bits: u32) -> std::io::Result<()> {
        let mut ev = libc::epoll_event { events: bits, u64: fd as u64 };
        let rc = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev as *mut _) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Backend for EpollBackend {
    fn register(&mut self, fd: RawFd, want_input: bool, want_output: bool) -> std::io::Result<()> {
        let bits = interest_bits(want_input, want_output);
        self.ctl(libc::EPOLL_CTL_ADD, fd, bits)?;
        self.registered.insert(fd, bits);
        Ok(())
    }

    fn unregister(&mut self, fd: RawFd) -> std::io::Result<()> {
        // The registered interest set is dropped unconditionally; per
        // spec.md §4.D the sink's actual teardown is deferred to the
        // epoch reclaimer, not this call.
        let _ = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        self.registered.remove(&fd);
        Ok(())
    }

    fn enable_input(&mut self, fd: RawFd) -> std::io::Result<()> {
        let bits = self.registered.get(&fd).copied().unwrap_or(0) | libc::EPOLLIN as u32;
        self.ctl(libc::EPOLL_CTL_MOD, fd, bits)?;
        self.registered.insert(fd, bits);
        Ok(())
    }

    fn enable_output(&mut self, fd: RawFd) -> std::io::Result<()> {
        let bits = self.registered.get(&fd).copied().unwrap_or(0) | libc::EPOLLOUT as u32;
        self.ctl(libc::EPOLL_CTL_MOD, fd, bits)?;
        self.registered.insert(fd, bits);
        Ok(())
    }

    fn poll(&mut self, timeout_ms: Option<u32>, out: &mut Vec<ReadyEvent>) -> std::io::Result<()> {
        let timeout = match timeout_ms {
            Some(ms) => ms as i32,
            None => -1,
        };
        let n = unsafe { libc::epoll_wait(self.epfd, self.events_buf.as_mut_ptr(), self.events_buf.len() as i32, timeout) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(()); // EINTR: benign, loop re-enters (§7 kind 4)
            }
            return Err(err);
        }
        for i in 0..n as usize {
            let ev = &self.events_buf[i];
            out.push(ReadyEvent {
                fd: ev.u64 as RawFd,
                readiness: Readiness {
                    input: ev.events & libc::EPOLLIN as u32 != 0,
                    output: ev.events & libc::EPOLLOUT as u32 != 0,
                    error: ev.events & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0,
                },
            });
        }
        Ok(())
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        unsafe { libc::close(self.epfd) };
    }
}
