//! BSD/macOS `kqueue` backend.

use std::os::unix::io::RawFd;

use super::{Backend, ReadyEvent};
use crate::event::sink::Readiness;

pub struct KqueueBackend {
    kq: RawFd,
    events_buf: Vec<libc::kevent>,
}

impl KqueueBackend {
    pub fn new() -> std::io::Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { kq, events_buf: vec![unsafe { std::mem::zeroed() }; 256] })
    }

    fn change(&self, fd: RawFd, filter: i16, flags: u16) -> std::io::Result<()> {
        let changes = [libc::kevent {
            ident: fd as usize,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: std::ptr::null_mut(),
        }];
        let rc = unsafe { libc::kevent(self.kq, changes.as_ptr(), 1, std::ptr::null_mut(), 0, std::ptr::null()) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Backend for KqueueBackend {
    fn register(&mut self, fd: RawFd, want_input: bool, want_output: bool) -> std::io::Result<()> {
        if want_input {
            self.change(fd, libc::EVFILT_READ, libc::EV_ADD | libc::EV_CLEAR)?;
        }
        if want_output {
            self.change(fd, libc::EVFILT_WRITE, libc::EV_ADD | libc::EV_CLEAR)?;
        }
        Ok(())
    }

    fn unregister(&mut self, fd: RawFd) -> std::io::Result<()> {
        let _ = self.change(fd, libc::EVFILT_READ, libc::EV_DELETE);
        let _ = self.change(fd, libc::EVFILT_WRITE, libc::EV_DELETE);
        Ok(())
    }

    fn enable_input(&mut self, fd: RawFd) -> std::io::Result<()> {
        self.change(fd, libc::EVFILT_READ, libc::EV_ADD | libc::EV_CLEAR | libc::EV_ONESHOT)
    }

    fn enable_output(&mut self, fd: RawFd) -> std::io::Result<()> {
        self.change(fd, libc::EVFILT_WRITE, libc::EV_ADD | libc::EV_CLEAR | libc::EV_ONESHOT)
    }

    fn poll(&mut self, timeout_ms: Option<u32>, out: &mut Vec<ReadyEvent>) -> std::io::Result<()> {
        let ts = timeout_ms.map(|ms| libc::timespec { tv_sec: (ms / 1000) as i64, tv_nsec: ((ms % 1000) * 1_000_000) as i64 });
        let ts_ptr = ts.as_ref().map(|t| t as *const _).unwrap_or(std::ptr::null());
        let n = unsafe {
            libc::kevent(
                self.kq,
                std::ptr::null(),
                0,
                self.events_buf.as_mut_ptr(),
                self.events_buf.len() as i32,
                ts_ptr,
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }
        for i in 0..n as usize {
            let ev = &self.events_buf[i];
            out.push(ReadyEvent {
                fd: ev.ident as RawFd,
                readiness: Readiness {
                    input: ev.filter == libc::EVFILT_READ,
                    output: ev.filter == libc::EVFILT_WRITE,
                    error: ev.flags & libc::EV_ERROR != 0,
                },
            });
        }
        Ok(())
    }
}

impl Drop for KqueueBackend {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}
