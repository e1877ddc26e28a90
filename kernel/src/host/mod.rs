// Copyright (c) 2026 The tickperf Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Native-thread suspend/resume built from asynchronous signals and pipes.
//!
//! Two signals drive the protocol: SUSPEND parks the target inside its
//! handler until RESUME is delivered. The suspending party must not proceed
//! until the target has actually parked, so the handler writes one
//! acknowledgment byte into a per-role pipe before blocking; the suspender
//! performs a blocking read of that byte. Write ends are non-blocking so the
//! handler can never stall; read ends are blocking with retry on EINTR.
//!
//! One acknowledgment pipe exists per role (timer tick, worker thread)
//! rather than per thread: at most one suspend per role is ever in flight,
//! because suspends are issued only under the kernel lock.

use crate::error::fatal;
use crate::scheduler::Kernel;
use core::cell::{Cell, UnsafeCell};
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

const SUSPEND_SIG: libc::c_int = libc::SIGUSR1;
const RESUME_SIG: libc::c_int = libc::SIGUSR2;

thread_local! {
    // UNPARKED <-> PARKED state of the calling native thread. Set exactly
    // once per suspend request and cleared on resume, which keeps
    // acknowledgment writes and reads strictly 1:1 even when the suspend
    // signal is delivered twice.
    static PARKED: Cell<bool> = const { Cell::new(false) };

    // Whether the calling native thread carries a logical thread.
    static LOGICAL: Cell<bool> = const { Cell::new(false) };
}

struct AckPipe {
    rd: AtomicI32,
    wr: AtomicI32,
}

impl AckPipe {
    const fn new() -> Self {
        Self {
            rd: AtomicI32::new(-1),
            wr: AtomicI32::new(-1),
        }
    }

    fn create(&self) {
        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            fatal("creating handshake pipe", errno());
        }
        // The write end must never block the signal handler. A full pipe
        // buffer would indicate a protocol violation elsewhere, not a
        // condition recoverable here.
        if unsafe { libc::fcntl(fds[1], libc::F_SETFL, libc::O_NONBLOCK) } != 0 {
            fatal("marking handshake pipe non-blocking", errno());
        }
        self.rd.store(fds[0], Ordering::Release);
        self.wr.store(fds[1], Ordering::Release);
    }
}

static TIMER_ACK: AckPipe = AckPipe::new();
static WORKER_ACK: AckPipe = AckPipe::new();

// pthread_t of the timer-tick thread, stored once before dispatch starts.
static TIMER_TID: AtomicUsize = AtomicUsize::new(0);

// Signal mask used while parked: everything blocked except RESUME. Written
// once in init() before any thread can be signaled.
struct WaitMask(UnsafeCell<MaybeUninit<libc::sigset_t>>);
unsafe impl Sync for WaitMask {}
static WAIT_MASK: WaitMask = WaitMask(UnsafeCell::new(MaybeUninit::uninit()));

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

extern "C" fn handle_resume(_sig: libc::c_int) {
    // Delivery alone ends the target's sigsuspend.
}

extern "C" fn handle_suspend(_sig: libc::c_int) {
    // Duplicate suspend while already parked: acknowledge nothing, or the
    // extra byte would desynchronize the read/write pairing.
    if PARKED.get() {
        return;
    }
    let pipe = if is_timer_thread(self_id()) {
        &TIMER_ACK
    } else {
        &WORKER_ACK
    };
    let byte = 1u8;
    let fd = pipe.wr.load(Ordering::Acquire);
    unsafe {
        // Async-signal-safe; cannot block (O_NONBLOCK).
        libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
    }
    PARKED.set(true);
    unsafe {
        libc::sigsuspend((*WAIT_MASK.0.get()).as_ptr());
    }
    PARKED.set(false);
}

/// Install the signal dispositions and create the acknowledgment pipes.
/// Must run before any logical thread or the timer tick is spawned; every
/// failure here is fatal.
pub(crate) fn init() {
    TIMER_ACK.create();
    WORKER_ACK.create();
    unsafe {
        let mask = (*WAIT_MASK.0.get()).as_mut_ptr();
        libc::sigfillset(mask);
        libc::sigdelset(mask, RESUME_SIG);

        let mut sa: libc::sigaction = MaybeUninit::zeroed().assume_init();
        libc::sigfillset(&mut sa.sa_mask);
        sa.sa_flags = 0;
        sa.sa_sigaction = handle_resume as usize;
        if libc::sigaction(RESUME_SIG, &sa, core::ptr::null_mut()) != 0 {
            fatal("installing resume signal handler", errno());
        }
        sa.sa_sigaction = handle_suspend as usize;
        if libc::sigaction(SUSPEND_SIG, &sa, core::ptr::null_mut()) != 0 {
            fatal("installing suspend signal handler", errno());
        }

        // Block RESUME in the caller; all subsequently spawned threads
        // inherit the mask. sigsuspend() in the suspend handler atomically
        // unblocks it while parked, so a resume can only land there.
        let mut block: libc::sigset_t = MaybeUninit::zeroed().assume_init();
        libc::sigemptyset(&mut block);
        libc::sigaddset(&mut block, RESUME_SIG);
        if libc::pthread_sigmask(libc::SIG_BLOCK, &block, core::ptr::null_mut()) != 0 {
            fatal("blocking resume signal", errno());
        }
    }
}

/// Deliver a suspend request to `tid` and block until its handler
/// acknowledges having parked.
pub(crate) fn suspend_native(k: &Kernel, tid: libc::pthread_t) {
    k.lock.lock();
    unsafe {
        libc::pthread_kill(tid, SUSPEND_SIG);
    }
    k.lock.unlock();

    let pipe = if is_timer_thread(tid) {
        &TIMER_ACK
    } else {
        &WORKER_ACK
    };
    let fd = pipe.rd.load(Ordering::Acquire);
    let mut byte = 0u8;
    loop {
        let n = unsafe { libc::read(fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        if n == 1 {
            break;
        }
        let e = errno();
        if n < 0 && e == libc::EINTR {
            continue;
        }
        // Anything else means the substrate is broken underneath us.
        log::error!("handshake ack read failed (n={n}, errno {e})");
        break;
    }
}

/// Deliver a resume request. Does not block: the target observes it when
/// its parked sigsuspend completes.
pub(crate) fn resume_native(k: &Kernel, tid: libc::pthread_t) {
    k.lock.lock();
    unsafe {
        libc::pthread_kill(tid, RESUME_SIG);
    }
    k.lock.unlock();
}

/// Mark the calling native thread as carrying a logical thread and touch
/// its thread-local handshake state ahead of any signal delivery.
pub(crate) fn register_logical_thread() {
    PARKED.set(false);
    LOGICAL.set(true);
}

pub(crate) fn is_logical_thread() -> bool {
    LOGICAL.get()
}

pub(crate) fn register_timer_thread() {
    PARKED.set(false);
    TIMER_TID.store(self_id() as usize, Ordering::Release);
}

pub(crate) fn timer_tid() -> libc::pthread_t {
    TIMER_TID.load(Ordering::Acquire) as libc::pthread_t
}

fn is_timer_thread(tid: libc::pthread_t) -> bool {
    let timer = TIMER_TID.load(Ordering::Acquire);
    timer != 0 && unsafe { libc::pthread_equal(tid, timer as libc::pthread_t) } != 0
}

pub(crate) fn self_id() -> libc::pthread_t {
    unsafe { libc::pthread_self() }
}
