//! Accept loop, worker-thread topology and socket option plumbing
//! (component J, spec.md §4.J). One OS thread accepts, round-robins
//! each stream to a worker; each worker binds one `Strand` and one
//! poll `Listener`, spawns a fiber per connection, and pumps whichever
//! partitions it owns so delegate-mode dispatch makes progress.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::TcpListener;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::conn;
use crate::dispatch::PartitionRoute;
use crate::error::{Error, StartupError};
use crate::event::{Listener, ReadyEvent};
use crate::fiber::{Strand, WaitSet};
use crate::primitives::Backoff;
use crate::table::{Table, TableConfig};

/// State every worker thread and every connection fiber reaches through:
/// the table, its per-partition routing, and the batch/chunk knobs off
/// `Config`. One instance, shared by `Arc` (spec.md §4.J "Shared").
pub struct Shared {
    pub table: Table,
    pub routes: Vec<PartitionRoute>,
    pub batch_size: usize,
    pub rx_chunk: usize,
    nthreads: usize,
    shutdown: AtomicBool,
}

/// Per-worker-thread I/O registry: the thread's own poll backend plus a
/// readiness wait-set per registered fd. `WaitSet` entries are boxed so
/// a `HashMap` rehash triggered by registering an unrelated connection
/// never moves (and so invalidates) a wait-set a blocked fiber is
/// still holding a reference into.
struct WorkerIo {
    listener: Listener,
    read_waiters: HashMap<RawFd, Box<WaitSet>>,
    write_waiters: HashMap<RawFd, Box<WaitSet>>,
}

thread_local! {
    /// Bound once per worker thread, mirroring `fiber::strand::Strand`'s
    /// own `CURRENT` thread-local: only a raw pointer is stored here so
    /// that `Shared::wait_readable`/`wait_writable` can hold a plain
    /// reference across a fiber-blocking call without ever holding this
    /// cell's runtime-checked borrow guard across that call (a `RefCell`
    /// guard left un-dropped across a stack switch never actually gets
    /// dropped until the fiber resumes, and a second borrow on the same
    /// thread in between would panic).
    static WORKER: RefCell<Option<*mut WorkerIo>> = const { RefCell::new(None) };
}

fn worker_io_ptr() -> *mut WorkerIo {
    WORKER.with(|c| c.borrow().expect("no WorkerIo bound on this thread"))
}

impl Shared {
    pub fn register_reader(&self, fd: RawFd) -> std::io::Result<()> {
        let io = unsafe { &mut *worker_io_ptr() };
        io.listener.register(fd, true, true)?;
        io.read_waiters.insert(fd, Box::new(WaitSet::new()));
        io.write_waiters.insert(fd, Box::new(WaitSet::new()));
        Ok(())
    }

    pub fn unregister_reader(&self, fd: RawFd) -> std::io::Result<()> {
        let io = unsafe { &mut *worker_io_ptr() };
        io.read_waiters.remove(&fd);
        io.write_waiters.remove(&fd);
        io.listener.unregister(fd)
    }

    /// Park the calling fiber until `fd` is readable. Returns `false` if
    /// the wake was a shutdown broadcast rather than real readiness, in
    /// which case the caller should close out the connection.
    pub fn wait_readable(&self, fd: RawFd) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        let io = unsafe { &*worker_io_ptr() };
        let waitset = io.read_waiters.get(&fd).expect("fd not registered for reading");
        Strand::with_current(|s| s.wait_on(waitset));
        !self.shutdown.load(Ordering::Acquire)
    }

    pub fn wait_writable(&self, fd: RawFd) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        let io = unsafe { &*worker_io_ptr() };
        let waitset = io.write_waiters.get(&fd).expect("fd not registered for writing");
        Strand::with_current(|s| s.wait_on(waitset));
        !self.shutdown.load(Ordering::Acquire)
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn handle_shutdown_signal(_sig: i32) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Release);
}

#[cfg(unix)]
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_shutdown_signal as usize);
        libc::signal(libc::SIGTERM, handle_shutdown_signal as usize);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

fn now_ms() -> u64 {
    process_epoch().elapsed().as_millis() as u64
}

fn yield_current_fiber() {
    Strand::with_current(|s| s.yield_now());
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(cpu: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            warn!(cpu, "sched_setaffinity failed, continuing unpinned");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_cpu(_cpu: usize) {}

/// The bound listening socket plus the shared state workers will run
/// against. Split from `run` so bind failures surface before any
/// thread is spawned.
pub struct Server {
    config: Config,
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl Server {
    pub fn bind(config: Config) -> crate::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .map_err(|source| StartupError::Bind { addr: config.bind_addr, source })?;

        let nthreads = config.threads;
        let table = Table::new(TableConfig { nparts: nthreads as u32, volume_budget_total: config.volume_budget_total });
        let routes = (0..table.nparts()).map(|_| PartitionRoute::new(config.dispatch, 256)).collect();
        let shared = Arc::new(Shared {
            table,
            routes,
            batch_size: config.batch_size,
            rx_chunk: config.rx_chunk,
            nthreads,
            shutdown: AtomicBool::new(false),
        });

        info!(addr = %config.bind_addr, threads = nthreads, nparts = shared.table.nparts(), dispatch = %config.dispatch, "mainmemoryd listening");
        Ok(Self { config, listener, shared })
    }

    /// Run until a shutdown signal (`SIGINT`/`SIGTERM`) arrives, then
    /// drain every worker cleanly. Blocks the calling thread.
    pub fn run(self) -> crate::Result<()> {
        let Self { config, listener, shared } = self;
        let nthreads = config.threads;
        install_signal_handlers();

        let mut senders = Vec::with_capacity(nthreads);
        let mut handles = Vec::with_capacity(nthreads);
        for id in 0..nthreads {
            let (tx, rx) = mpsc::channel();
            senders.push(tx);
            let shared = Arc::clone(&shared);
            let affinity = config.affinity.get(id).copied();
            let handle = thread::Builder::new()
                .name(format!("mainmemory-worker-{id}"))
                .spawn(move || worker_main(id as u32, shared, rx, affinity))
                .map_err(|source| StartupError::ThreadSpawn { id: id as u32, source })?;
            handles.push(handle);
        }

        let accept_listener =
            listener.try_clone().map_err(|e| Error::Startup(StartupError::Bind { addr: config.bind_addr, source: e }))?;
        let accept_shared = Arc::clone(&shared);
        let accept_handle = thread::Builder::new()
            .name("mainmemory-accept".into())
            .spawn(move || accept_loop(accept_listener, senders, accept_shared))
            .map_err(|source| StartupError::ThreadSpawn { id: u32::MAX, source })?;

        while !SHUTDOWN_REQUESTED.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(100));
        }
        info!("shutdown requested, draining connections");
        shared.shutdown.store(true, Ordering::Release);

        let _ = accept_handle.join();
        for handle in handles {
            let _ = handle.join();
        }
        info!("mainmemoryd shut down cleanly");
        Ok(())
    }
}

/// Dedicated OS thread: blocking-free accept loop that hands each
/// stream to a worker's inbound channel, round-robin. Polls the
/// listener non-blocking so it notices shutdown within one back-off
/// tick rather than sitting in a blocking `accept()` forever.
fn accept_loop(listener: TcpListener, senders: Vec<mpsc::Sender<std::net::TcpStream>>, shared: Arc<Shared>) {
    if let Err(e) = listener.set_nonblocking(true) {
        warn!(error = %e, "failed to set listening socket non-blocking");
        return;
    }
    let mut next = 0usize;
    let mut backoff = Backoff::new();
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        match listener.accept() {
            Ok((stream, addr)) => {
                trace!(%addr, "accepted connection");
                let idx = next % senders.len();
                next = next.wrapping_add(1);
                if senders[idx].send(stream).is_err() {
                    break;
                }
                backoff.reset();
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => backoff.snooze(),
            Err(e) => {
                warn!(error = %e, "accept failed");
                backoff.snooze();
            }
        }
    }
}

/// One worker thread's entire lifetime: bind a `Strand` and a
/// `WorkerIo` to this thread, then loop spawning newly handed-off
/// connections, running fibers, pumping this worker's delegate-mode
/// partitions, and polling for readiness.
fn worker_main(id: u32, shared: Arc<Shared>, inbound: mpsc::Receiver<std::net::TcpStream>, affinity: Option<usize>) {
    if let Some(cpu) = affinity {
        pin_to_cpu(cpu);
    }
    crate::primitives::backoff::install_cooperative_yield(yield_current_fiber);

    let listener = match Listener::new(id, 256) {
        Ok(l) => l,
        Err(e) => {
            warn!(id, error = %e, "failed to initialise poll backend, worker exiting");
            return;
        }
    };
    let mut io = WorkerIo { listener, read_waiters: HashMap::new(), write_waiters: HashMap::new() };
    WORKER.with(|c| *c.borrow_mut() = Some(&mut io as *mut WorkerIo));

    let mut strand = Strand::new(now_ms());

    // Partition `i` is pumped by worker `i % nthreads`, so delegate-mode
    // dispatch (whose `DelegateInbox` only drains when its owner calls
    // `PartitionRoute::pump`) always has exactly one thread servicing it
    // regardless of which thread a request came in on. A no-op under
    // direct/combine dispatch.
    let owned_partitions: Vec<u32> =
        (0..shared.table.nparts()).filter(|&p| (p as usize) % shared.nthreads == id as usize).collect();

    loop {
        while let Ok(stream) = inbound.try_recv() {
            let arg = conn::spawn_args(stream, Arc::clone(&shared));
            strand.spawn(conn::fiber_entry as fn(usize), arg, 16);
        }

        for &pid in &owned_partitions {
            shared.routes[pid as usize].pump();
        }

        maintain_partitions(&shared, &owned_partitions);

        while strand.run_once() {}

        if shared.shutdown.load(Ordering::Acquire) {
            wake_all_waiters(&io, &strand);
            if !strand.has_runnable() {
                break;
            }
            while strand.run_once() {}
        }

        let now = now_ms();
        strand.pump_timers(now);

        let timeout_ms = if strand.has_runnable() {
            Some(0)
        } else {
            match strand.next_timer_deadline() {
                Some(deadline) => Some(deadline.saturating_sub(now).min(100) as u32),
                None => Some(100),
            }
        };

        match io.listener.turn(timeout_ms) {
            Ok(events) => dispatch_ready(&io, &strand, events),
            Err(e) => debug!(id, error = %e, "listener poll error"),
        }
    }

    WORKER.with(|c| *c.borrow_mut() = None);
}

/// Background table upkeep for the partitions this worker owns (spec.md
/// §4.E): one CLOCK eviction round whenever a partition is over its
/// volume budget, plus one incremental resize stride whenever its
/// entry/bucket ratio calls for it. `evict_round`/`resize_step` each
/// early-return cheaply when there's nothing to do, so running both
/// unconditionally every turn — the same cadence `pump` already uses
/// for delegate-mode dispatch above — keeps this off the hot path
/// without needing a separate timer.
fn maintain_partitions(shared: &Shared, owned_partitions: &[u32]) {
    for &pid in owned_partitions {
        let partition = shared.table.partition(pid);
        if partition.over_budget(0) {
            partition.evict_round();
        }
        partition.resize_step();
    }
}

fn dispatch_ready(io: &WorkerIo, strand: &Strand, events: Vec<ReadyEvent>) {
    for event in events {
        if event.readiness.input {
            if let Some(waiters) = io.read_waiters.get(&event.fd) {
                if let Some(id) = waiters.wake_one() {
                    strand.wake(id);
                }
            }
        }
        if event.readiness.output || event.readiness.error {
            if let Some(waiters) = io.write_waiters.get(&event.fd) {
                if let Some(id) = waiters.wake_one() {
                    strand.wake(id);
                }
            }
        }
    }
}

/// Broadcast the shutdown wake-up to every fiber parked on this
/// worker's read/write wait-sets (spec.md §4.I "a closing connection's
/// parked fiber is woken with a shutdown signal"). Each woken fiber
/// observes `Shared::shutdown` on resume and unwinds its connection
/// loop.
fn wake_all_waiters(io: &WorkerIo, strand: &Strand) {
    for waiters in io.read_waiters.values() {
        for id in waiters.wake_all() {
            strand.wake(id);
        }
    }
    for waiters in io.write_waiters.values() {
        for id in waiters.wake_all() {
            strand.wake(id);
        }
    }
}
