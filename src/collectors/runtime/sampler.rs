//! User-space stack sampling of other threads
//!
//! A thread's user stack can only be unwound from that thread. The sampler
//! sends the target `SIGURG` with `tgkill`; the handler records return
//! addresses into static slots and the dumping thread symbolizes them once
//! the handler is done. `SIGURG` is ignored by default, so a signal that
//! arrives after the sampler is gone does nothing.
//!
//! Only one sampler exists at a time. The handler touches nothing but
//! atomics and the unwinder.

use std::ffi::c_void;
use std::io::{self, Write};
use std::mem;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::constants::{MAX_STACK_FRAMES, STACK_SAMPLE_SIGNAL};

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const RUNNING: u8 = 2;
const DONE: u8 = 3;

const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Frames belonging to the capture machinery itself
const CAPTURE_MARKERS: [&str; 4] = [
    "sampler::capture_signal_handler",
    "sampler::capture_current",
    "__restore_rt",
    "backtrace::",
];

static SAMPLER_LOCK: Mutex<()> = Mutex::new(());
static STATE: AtomicU8 = AtomicU8::new(IDLE);
static TARGET: AtomicI64 = AtomicI64::new(0);
static FRAME_COUNT: AtomicUsize = AtomicUsize::new(0);

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_FRAME: AtomicUsize = AtomicUsize::new(0);
static FRAMES: [AtomicUsize; MAX_STACK_FRAMES] = [EMPTY_FRAME; MAX_STACK_FRAMES];

/// Kernel id of the calling thread
pub fn current_tid() -> i64 {
    // SAFETY: gettid has no preconditions and cannot fail
    unsafe { libc::syscall(libc::SYS_gettid) as i64 }
}

extern "C" fn capture_signal_handler(_signal: libc::c_int, _info: *mut libc::siginfo_t, _context: *mut c_void) {
    // SAFETY: __errno_location always returns the calling thread's errno
    let saved_errno = unsafe { *libc::__errno_location() };
    let tid = current_tid();

    if TARGET.load(Ordering::SeqCst) == tid
        && STATE.compare_exchange(ARMED, RUNNING, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    {
        // The sampler may have moved on to another thread between the checks
        if TARGET.load(Ordering::SeqCst) != tid {
            STATE.store(ARMED, Ordering::SeqCst);
        } else {
            let mut count = 0;
            // SAFETY: only one handler runs at a time, guarded by STATE
            unsafe {
                backtrace::trace_unsynchronized(|frame| {
                    FRAMES[count].store(frame.ip() as usize, Ordering::Relaxed);
                    count += 1;
                    count < MAX_STACK_FRAMES
                });
            }
            FRAME_COUNT.store(count, Ordering::SeqCst);
            STATE.store(DONE, Ordering::SeqCst);
        }
    }

    // SAFETY: see above
    unsafe { *libc::__errno_location() = saved_errno };
}

/// Installed `SIGURG` handler; the previous disposition is restored on drop
pub struct ThreadSampler {
    previous: libc::sigaction,
    _guard: MutexGuard<'static, ()>,
}

impl ThreadSampler {
    pub fn install() -> io::Result<Self> {
        let guard = SAMPLER_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Let the unwinder finish its lazy setup outside of a handler
        backtrace::trace(|_| false);

        // SAFETY: zeroed sigaction is a valid empty disposition
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = capture_signal_handler as libc::sighandler_t;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;

        let mut previous: libc::sigaction = unsafe { mem::zeroed() };

        // SAFETY: both pointers reference live sigaction values
        let rc = unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(STACK_SAMPLE_SIGNAL, &action, &mut previous)
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { previous, _guard: guard })
    }

    /// Return addresses of thread `tid`, innermost first
    pub fn sample(&self, tid: i64, timeout: Duration) -> io::Result<Vec<usize>> {
        // A handler from an earlier timed out sample may still be unwinding
        if !wait_while_running(Instant::now() + timeout) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "previous sample still running"));
        }

        FRAME_COUNT.store(0, Ordering::SeqCst);
        TARGET.store(tid, Ordering::SeqCst);
        STATE.store(ARMED, Ordering::SeqCst);

        // SAFETY: tgkill only delivers a signal to a thread of this process
        let rc = unsafe {
            libc::syscall(libc::SYS_tgkill, libc::getpid(), tid as libc::pid_t, STACK_SAMPLE_SIGNAL)
        };
        if rc != 0 {
            let err = io::Error::last_os_error();
            STATE.store(IDLE, Ordering::SeqCst);
            return Err(err);
        }

        let deadline = Instant::now() + timeout;
        while STATE.load(Ordering::SeqCst) != DONE {
            if Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            if STATE.compare_exchange(ARMED, IDLE, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "thread did not handle the sample signal"));
            }

            // The handler started; give it one more timeout to finish
            if !wait_while_running(Instant::now() + timeout) {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "stack unwinding did not finish"));
            }
        }

        let count = FRAME_COUNT.load(Ordering::SeqCst);
        let frames = FRAMES[..count].iter().map(|ip| ip.load(Ordering::Relaxed)).collect();
        STATE.store(IDLE, Ordering::SeqCst);

        debug!("Sampled {} frames from thread {}", count, tid);
        Ok(frames)
    }
}

impl Drop for ThreadSampler {
    fn drop(&mut self) {
        // SAFETY: restores the disposition saved by install
        unsafe {
            libc::sigaction(STACK_SAMPLE_SIGNAL, &self.previous, std::ptr::null_mut());
        }
    }
}

/// Wait until no handler is running. Returns false on timeout.
fn wait_while_running(deadline: Instant) -> bool {
    while STATE.load(Ordering::SeqCst) == RUNNING {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
    true
}

/// Return addresses of the calling thread
pub fn capture_current() -> Vec<usize> {
    let mut frames = Vec::new();
    backtrace::trace(|frame| {
        frames.push(frame.ip() as usize);
        frames.len() < MAX_STACK_FRAMES
    });
    frames
}

struct ResolvedFrame {
    ip: usize,
    names: Vec<String>,
    location: Option<String>,
}

fn resolve_frame(ip: usize) -> ResolvedFrame {
    let mut names = Vec::new();
    let mut location = None;

    backtrace::resolve(ip as *mut c_void, |symbol| {
        if let Some(name) = symbol.name() {
            names.push(name.to_string());
        }
        if location.is_none() {
            if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                location = Some(format!("{}:{}", file.display(), line));
            }
        }
    });

    ResolvedFrame { ip, names, location }
}

/// Symbolize `frames` and write them one per line, dropping the frames of
/// the capture itself
pub fn write_frames(sink: &mut dyn Write, frames: &[usize]) -> io::Result<()> {
    let resolved: Vec<ResolvedFrame> = frames.iter().copied().map(resolve_frame).collect();

    let is_capture = |frame: &ResolvedFrame| {
        frame
            .names
            .iter()
            .any(|name| CAPTURE_MARKERS.iter().any(|marker| name.contains(marker)))
    };
    let first = resolved
        .iter()
        .take(16)
        .rposition(is_capture)
        .map_or(0, |index| index + 1);

    for (index, frame) in resolved[first..].iter().enumerate() {
        match frame.names.first() {
            Some(name) => writeln!(sink, "        #{} 0x{:x} {}", index, frame.ip, name)?,
            None => writeln!(sink, "        #{} 0x{:x} <unknown>", index, frame.ip)?,
        }
        for inlined in frame.names.iter().skip(1) {
            writeln!(sink, "            inlined {}", inlined)?;
        }
        if let Some(location) = &frame.location {
            writeln!(sink, "            at {}", location)?;
        }
    }

    Ok(())
}
