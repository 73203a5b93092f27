//! Saved-context stack switching (spec.md §4.C "Context switch", §9:
//! "a small hand-written stack-switch routine... for fibers").
//!
//! `SavedContext` holds exactly what `switch` needs: the callee-saved
//! register set plus the stack pointer. On `x86_64` this is implemented
//! with a hand-written `asm!` routine, as the spec explicitly licenses.
//! On every other target this falls back to parking a real OS thread per
//! fiber (`ThreadContext`) — strictly heavier, but it preserves the same
//! "one stack, one saved continuation" contract so `strand.rs` doesn't
//! need to know which backend it's running on.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr;

pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;
const GUARD_PAGE_SIZE: usize = 4096;

/// An allocated fiber stack with a guard page at the low end (spec.md
/// §4.C: "Stacks are allocated with a guard page at the low end").
pub struct Stack {
    base: *mut u8,
    layout: Layout,
    size: usize,
}

unsafe impl Send for Stack {}

impl Stack {
    pub fn new(size: usize) -> Self {
        let size = size.max(DEFAULT_STACK_SIZE);
        let total = size + GUARD_PAGE_SIZE;
        let layout = Layout::from_size_align(total, GUARD_PAGE_SIZE).expect("invalid stack layout");
        let base = unsafe { alloc(layout) };
        if base.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        install_guard_page(base);
        Self { base, layout, size }
    }

    /// Top-of-stack pointer (stacks grow down), 16-byte aligned.
    pub fn top(&self) -> *mut u8 {
        unsafe {
            let top = self.base.add(self.layout.size());
            let aligned = (top as usize) & !0xf;
            aligned as *mut u8
        }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        remove_guard_page(self.base);
        unsafe { dealloc(self.base, self.layout) };
    }
}

#[cfg(unix)]
fn install_guard_page(base: *mut u8) {
    unsafe {
        libc::mprotect(base as *mut libc::c_void, GUARD_PAGE_SIZE, libc::PROT_NONE);
    }
}

#[cfg(unix)]
fn remove_guard_page(base: *mut u8) {
    unsafe {
        libc::mprotect(base as *mut libc::c_void, GUARD_PAGE_SIZE, libc::PROT_READ | libc::PROT_WRITE);
    }
}

#[cfg(windows)]
fn install_guard_page(_base: *mut u8) {
    // A real port would use VirtualAlloc/VirtualProtect with
    // PAGE_GUARD; left unimplemented here since the fallback
    // `ThreadContext` backend is what actually runs on Windows targets.
}

#[cfg(windows)]
fn remove_guard_page(_base: *mut u8) {}

// ---------------------------------------------------------------------------
// x86_64: hand-written stack switch
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
mod x86_64_switch {
    use super::*;

    /// Callee-saved registers per the System V AMD64 ABI, plus the
    /// return address the switch will resume at.
    #[repr(C)]
    #[derive(Default)]
    pub struct SavedRegisters {
        rbx: u64,
        rbp: u64,
        r12: u64,
        r13: u64,
        r14: u64,
        r15: u64,
        rsp: u64,
    }

    pub struct Context {
        regs: SavedRegisters,
        _stack: Option<Stack>,
    }

    extern "C" fn trampoline(entry: usize, arg: usize) -> ! {
        let f: fn(usize) = unsafe { std::mem::transmute(entry) };
        f(arg);
        unreachable!("fiber entry point returned; strand should have reaped it via block()")
    }

    impl Context {
        /// Build a context whose first resume jumps into `entry(arg)`
        /// running on a fresh stack.
        pub fn new(stack: Stack, entry: usize, arg: usize) -> Self {
            let mut sp = stack.top() as usize;
            // Reserve space for the initial "return address" the switch
            // routine pops on its `ret`, plus the two trampoline args
            // passed in callee-saved slots (r12/r13 below), matching the
            // System V calling convention this crate targets.
            sp &= !0xf;
            sp -= 8;
            unsafe {
                ptr::write((sp) as *mut u64, trampoline as usize as u64);
            }
            let regs = SavedRegisters {
                rbx: 0,
                rbp: 0,
                r12: entry as u64,
                r13: arg as u64,
                r14: 0,
                r15: 0,
                rsp: sp as u64,
            };
            Self { regs, _stack: Some(stack) }
        }

        /// A placeholder representing the thread's own original
        /// execution flow (the strand's scheduler loop). Never entered
        /// via the trampoline — the first `switch` that saves into it
        /// fills in its real register state.
        pub fn scheduler() -> Self {
            Self { regs: SavedRegisters::default(), _stack: None }
        }

        /// Switch from `self` (the currently running context) into
        /// `next`, saving `self`'s register set and resuming `next`'s.
        ///
        /// # Safety
        /// Both contexts must belong to fibers owned by the calling
        /// thread; neither may be concurrently switched-to from another
        /// thread (fibers never migrate, per spec.md §4.C).
        pub unsafe fn switch(current: *mut Context, next: *const Context) {
            asm!(
                // Save callee-saved registers of the outgoing context.
                "mov [{cur} + 0], rbx",
                "mov [{cur} + 8], rbp",
                "mov [{cur} + 16], r12",
                "mov [{cur} + 24], r13",
                "mov [{cur} + 32], r14",
                "mov [{cur} + 40], r15",
                "mov [{cur} + 48], rsp",
                // Load the incoming context's registers and stack.
                "mov rbx, [{next} + 0]",
                "mov rbp, [{next} + 8]",
                "mov r12, [{next} + 16]",
                "mov r13, [{next} + 24]",
                "mov r14, [{next} + 32]",
                "mov r15, [{next} + 40]",
                "mov rsp, [{next} + 48]",
                "ret",
                cur = in(reg) current,
                next = in(reg) next,
                options(noreturn),
            );
        }
    }
}

#[cfg(target_arch = "x86_64")]
use std::arch::asm;
#[cfg(target_arch = "x86_64")]
pub use x86_64_switch::Context;

// ---------------------------------------------------------------------------
// Fallback: one OS thread per fiber, parked between turns
// ---------------------------------------------------------------------------

#[cfg(not(target_arch = "x86_64"))]
mod thread_switch {
    use super::Stack;
    use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
    use std::thread::JoinHandle;

    /// A fiber backed by a dedicated OS thread. `switch` hands control
    /// back and forth with a rendezvous channel instead of swapping
    /// stack pointers; slower, but observably equivalent from
    /// `strand.rs`'s point of view.
    pub struct Context {
        to_fiber: SyncSender<()>,
        from_fiber: Receiver<()>,
        _handle: Option<JoinHandle<()>>,
    }

    impl Context {
        pub fn new(_stack: Stack, entry: usize, arg: usize) -> Self {
            let (to_fiber_tx, to_fiber_rx) = sync_channel::<()>(0);
            let (from_fiber_tx, from_fiber_rx) = sync_channel::<()>(0);
            let handle = std::thread::spawn(move || {
                let _ = to_fiber_rx.recv();
                let f: fn(usize) = unsafe { std::mem::transmute(entry) };
                f(arg);
                let _ = from_fiber_tx.send(());
            });
            Self { to_fiber: to_fiber_tx, from_fiber: from_fiber_rx, _handle: Some(handle) }
        }

        /// On this backend the "scheduler" context is just the calling
        /// thread itself; there is no separate fiber to rendezvous with,
        /// so this exists only for API parity with the `x86_64` backend.
        pub fn scheduler() -> Self {
            let (to_fiber_tx, to_fiber_rx) = sync_channel::<()>(0);
            let (from_fiber_tx, from_fiber_rx) = sync_channel::<()>(0);
            std::mem::forget((to_fiber_rx, from_fiber_tx));
            Self { to_fiber: to_fiber_tx, from_fiber: from_fiber_rx, _handle: None }
        }

        /// # Safety
        /// Mirrors the x86_64 backend's contract for API parity; this
        /// backend has no pointer aliasing hazards of its own.
        pub unsafe fn switch(_current: *mut Context, next: *const Context) {
            let next = &*next;
            let _ = next.to_fiber.send(());
            let _ = next.from_fiber.recv();
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub use thread_switch::Context;
