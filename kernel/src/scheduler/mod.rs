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

//! The kernel: one execution token shared by every logical thread.
//!
//! At most one logical thread runs at a time, as on a single-core machine.
//! The dispatcher loop hands the token to whichever thread the policy
//! engine selects; a thread gives the token back by parking on its run
//! baton (cooperative switch) or by being stopped in a signal handler when
//! the emulated timer interrupt preempts it.
//!
//! Every structural mutation happens under one recursive lock, which
//! doubles as the interrupt-disable flag: holding it keeps the emulated
//! interrupt out, exactly as masking interrupts does on real hardware.

pub(crate) mod engine;

use crate::config::{self, DISPATCH_POLL};
use crate::error::{fatal, KernelError};
use crate::host;
use crate::irq::Posture;
use crate::sync::{Baton, RecursiveLock};
use crate::thread::{
    lifecycle, SuspendKind, ThreadNode, CREATED, READY, RUNNING, SUSPENDED, TERMINATED,
};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use engine::Engine;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, OnceLock};

type IrqHandler = Arc<dyn Fn(&Kernel) + Send + Sync>;

static KERNEL: OnceLock<Kernel> = OnceLock::new();

pub struct Kernel {
    pub(crate) lock: RecursiveLock,

    // Interrupt nesting depth. Nonzero from construction until start()
    // hands control to the dispatcher, so interrupt-posture bookkeeping
    // during setup lands in the global flag rather than on a thread.
    system_state: AtomicU32,
    preempt_disable: AtomicU32,
    global_int_disabled: AtomicBool,

    // Remaining time slice of the running thread, in ticks. 0 = unsliced.
    slice: AtomicU32,
    clock: AtomicU64,

    // Thread holding the execution token / thread the engine wants next.
    // Slot mutation only happens under the big lock.
    current: spin::Mutex<Option<ThreadNode>>,
    selected: spin::Mutex<Option<ThreadNode>>,

    engine: spin::Mutex<Engine>,
    threads: spin::Mutex<Vec<ThreadNode>>,
    next_tid: AtomicU32,

    // Schedule requests and run acknowledgments flow through sched_baton;
    // isr_baton releases the timer after a cooperative handoff it set in
    // motion.
    pub(crate) sched_baton: Baton,
    pub(crate) isr_baton: Baton,
    pub(crate) timer_ready: Baton,
    pub(crate) start_gate: Baton,
    timer_waiting: AtomicBool,

    irq_handlers: spin::Mutex<BTreeMap<u32, IrqHandler>>,
    pending_irqs: spin::Mutex<VecDeque<u32>>,

    started: AtomicBool,
}

impl Kernel {
    fn new() -> Self {
        Self {
            lock: RecursiveLock::new(),
            system_state: AtomicU32::new(1),
            preempt_disable: AtomicU32::new(0),
            global_int_disabled: AtomicBool::new(false),
            slice: AtomicU32::new(0),
            clock: AtomicU64::new(0),
            current: spin::Mutex::new(None),
            selected: spin::Mutex::new(None),
            engine: spin::Mutex::new(Engine::new()),
            threads: spin::Mutex::new(Vec::new()),
            next_tid: AtomicU32::new(1),
            sched_baton: Baton::new(),
            isr_baton: Baton::new(),
            timer_ready: Baton::new(),
            start_gate: Baton::new(),
            timer_waiting: AtomicBool::new(false),
            irq_handlers: spin::Mutex::new(BTreeMap::new()),
            pending_irqs: spin::Mutex::new(VecDeque::new()),
            started: AtomicBool::new(false),
        }
    }

    /// The process-wide kernel. One per process: signal dispositions and
    /// the handshake pipes cannot be shared between instances.
    pub fn instance() -> &'static Kernel {
        KERNEL.get_or_init(Kernel::new)
    }

    /// Bring the kernel up: install the signal protocol, run `init` to
    /// create the initial threads, then release the timer tick and the
    /// dispatcher. Returns immediately after the handover; the caller's
    /// thread never becomes part of the scheduled set.
    pub fn start<F>(init: F) -> &'static Kernel
    where
        F: FnOnce(&'static Kernel),
    {
        let k = Kernel::instance();
        if k.started.swap(true, Ordering::AcqRel) {
            log::warn!("kernel already started, ignoring");
            return k;
        }
        host::init();
        init(k);

        if let Err(e) = std::thread::Builder::new()
            .name("tickperf-timer".into())
            .spawn(move || crate::time::run(k))
        {
            fatal("spawning timer thread", e.raw_os_error().unwrap_or(0));
        }
        // The timer must have published its native id before anything may
        // try to suspend it.
        k.timer_ready.wait();

        k.system_state.store(0, Ordering::Release);
        if let Err(e) = std::thread::Builder::new()
            .name("tickperf-dispatch".into())
            .spawn(move || k.dispatch())
        {
            fatal("spawning dispatcher thread", e.raw_os_error().unwrap_or(0));
        }
        k.start_gate.post();
        log::debug!("kernel started, {} thread(s) defined", k.threads.lock().len());
        k
    }

    // ------------------------------------------------------------------
    // Dispatcher
    // ------------------------------------------------------------------

    fn dispatch(&'static self) {
        loop {
            // Wait for a schedulable moment: a selection exists, no
            // interrupt is in progress and nobody holds the token.
            loop {
                self.lock.lock();
                if self.selected_cloned().is_some()
                    && self.system_state() == 0
                    && self.current_cloned().is_none()
                {
                    break;
                }
                self.lock.unlock();
                std::thread::sleep(DISPATCH_POLL);
            }

            // Lock still held here.
            let next = match self.selected_cloned() {
                Some(t) => t,
                None => {
                    self.lock.unlock();
                    continue;
                }
            };
            *self.current.lock() = Some(next.clone());
            next.bump_run_count();
            next.transfer_state(READY, RUNNING);
            self.slice.store(next.time_slice(), Ordering::Release);
            log::trace!("dispatch thread {} ({})", next.tid(), next.state_to_str());

            if next.suspend_kind() == SuspendKind::Interrupt {
                // Stopped mid-instruction by an interrupt: wake it where
                // it stands. No baton traffic is involved, but a timer
                // parked for a handoff must still be released.
                host::resume_native(self, next.native_id());
                if self.timer_waiting.load(Ordering::Acquire) {
                    self.isr_baton.post();
                }
                self.lock.unlock();
            } else {
                // Cooperatively parked on its run baton.
                next.baton().drain();
                next.post_baton();
                if self.timer_waiting.load(Ordering::Acquire) {
                    // The timer started this switch and is parked on the
                    // isr baton until the new thread acknowledges.
                    self.sched_baton.wait();
                    self.isr_baton.post();
                } else {
                    // Thread-initiated switch: hold the tick still while
                    // the token changes hands.
                    host::suspend_native(self, host::timer_tid());
                    self.sched_baton.wait();
                    host::resume_native(self, host::timer_tid());
                }
                self.lock.unlock();
            }

            // Block until the token comes back.
            self.sched_baton.wait();
        }
    }

    // ------------------------------------------------------------------
    // Thread operations
    // ------------------------------------------------------------------

    /// Make a created or suspended thread ready. Called from a running
    /// logical thread, a readied higher-priority thread takes over before
    /// this returns.
    pub fn resume(&self, thread: &ThreadNode) -> Result<(), KernelError> {
        let saved = self.interrupt_control(Posture::Disabled);
        let state = thread.state();
        if state != CREATED && state != SUSPENDED {
            self.interrupt_control(saved);
            return Err(KernelError::WrongState(state));
        }
        thread.set_state(READY);
        thread.set_wake_at(0);
        {
            let mut engine = self.engine.lock();
            engine.remove(thread);
            engine.enqueue(thread.clone());
        }
        self.reselect();
        log::trace!("resume thread {}", thread.tid());
        self.interrupt_control(saved);

        // Immediate preemption check, but only when this call itself
        // re-enabled interrupts: inside a disabled section or an interrupt
        // handler the switch is deferred to the restore or the bracket
        // exit.
        if saved == Posture::Enabled && host::is_logical_thread() && self.system_state() == 0 {
            self.lock.lock();
            match self.current_cloned() {
                Some(me) if !self.selected_is(&me) && self.system_state() == 0 => {
                    me.transfer_state(RUNNING, READY);
                    lifecycle::park_and_wait(self, &me);
                }
                _ => self.lock.unlock(),
            }
        }
        Ok(())
    }

    /// Park a thread until a later [`Kernel::resume`]. Suspending an
    /// already suspended thread is a no-op. Self-suspension parks the
    /// caller before returning; suspending the running thread from outside
    /// takes effect when the next tick preempts it.
    pub fn suspend(&self, thread: &ThreadNode) -> Result<(), KernelError> {
        let saved = self.interrupt_control(Posture::Disabled);
        let state = thread.state();
        if state == SUSPENDED {
            self.interrupt_control(saved);
            return Ok(());
        }
        if state != READY && state != RUNNING {
            self.interrupt_control(saved);
            return Err(KernelError::WrongState(state));
        }

        let me = host::is_logical_thread() && self.current_is(thread);
        log::trace!("suspend thread {} (self: {me})", thread.tid());
        if me {
            lifecycle::checkpoint(self, thread);
            self.engine.lock().remove(thread);
            thread.set_state(SUSPENDED);
            thread.set_suspend_kind(SuspendKind::Scheduler);
            self.reselect();
            lifecycle::park_and_wait(self, thread);
        } else {
            // The suspend kind is left alone: it records how the thread is
            // parked right now (run baton or signal handler), which is also
            // how a later resume must revive it. A suspended current thread
            // keeps the token until the next tick evicts it.
            self.engine.lock().remove(thread);
            thread.set_state(SUSPENDED);
            self.reselect();
        }
        self.interrupt_control(saved);
        Ok(())
    }

    /// Move the caller behind its equal-priority peers and yield the
    /// token. Returns once the caller is dispatched again.
    pub fn relinquish(&self) {
        let saved = self.interrupt_control(Posture::Disabled);
        let me = match self.current_cloned() {
            Some(m) if host::is_logical_thread() => m,
            _ => {
                self.interrupt_control(saved);
                return;
            }
        };
        lifecycle::checkpoint(self, &me);
        self.engine.lock().rotate(&me);
        self.slice.store(me.fresh_slice(), Ordering::Release);
        self.reselect();
        if !self.selected_is(&me) {
            me.transfer_state(RUNNING, READY);
            lifecycle::park_and_wait(self, &me);
        }
        self.interrupt_control(saved);
    }

    /// Park the caller for `ticks` timer ticks.
    pub fn sleep(&self, ticks: u32) {
        if ticks == 0 {
            self.relinquish();
            return;
        }
        let saved = self.interrupt_control(Posture::Disabled);
        let me = match self.current_cloned() {
            Some(m) if host::is_logical_thread() => m,
            _ => {
                self.interrupt_control(saved);
                return;
            }
        };
        lifecycle::checkpoint(self, &me);
        me.set_wake_at(self.now() + u64::from(ticks));
        {
            let mut engine = self.engine.lock();
            engine.remove(&me);
            engine.add_sleeper(me.clone());
        }
        me.set_state(SUSPENDED);
        me.set_suspend_kind(SuspendKind::Scheduler);
        self.reselect();
        lifecycle::park_and_wait(self, &me);
        self.interrupt_control(saved);
    }

    /// Terminate a thread and reclaim its native resources. The target is
    /// asked to unwind at its next kernel call and nudged out of any park
    /// until it does; this call returns only after the native thread has
    /// been joined.
    pub fn delete(&self, thread: &ThreadNode) -> Result<(), KernelError> {
        if host::is_logical_thread() && self.current_is(thread) {
            return Err(KernelError::WrongState(thread.state()));
        }
        log::debug!("delete thread {}", thread.tid());

        let saved = self.interrupt_control(Posture::Disabled);
        thread.request_cancel();
        self.engine.lock().remove(thread);
        self.reselect();
        self.interrupt_control(saved);

        // Nudge the target out of whichever park it occupies until its
        // native thread has unwound. Runs unlocked so ticks keep flowing
        // and the target can reach a cancellation point.
        while !thread.native_finished() {
            thread.post_baton();
            let tid = thread.native_id();
            if tid != 0 {
                host::resume_native(self, tid);
            }
            std::thread::sleep(config::DELETE_BACKOFF);
        }
        match thread.take_native() {
            Some(handle) => handle.join().map_err(|_| KernelError::JoinPanic)?,
            None => return Err(KernelError::Detached),
        }
        thread.set_state(TERMINATED);
        self.threads.lock().retain(|t| !Arc::ptr_eq(t, thread));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Interrupt posture
    // ------------------------------------------------------------------

    /// Set the emulated interrupt posture and report the prior one.
    /// Disabling takes the big lock, so the timer bracket blocks until the
    /// matching enable; the prior posture is read off the lock depth.
    pub fn interrupt_control(&self, new: Posture) -> Posture {
        self.lock.lock();
        let prior = if RecursiveLock::depth() == 1 {
            Posture::Enabled
        } else {
            Posture::Disabled
        };
        let disabling = new == Posture::Disabled;
        if self.system_state() != 0 {
            self.global_int_disabled.store(disabling, Ordering::Release);
        } else if let Some(cur) = self.current_cloned() {
            cur.set_int_disabled(disabling);
        }
        match new {
            Posture::Enabled => self.lock.unlock_all(),
            Posture::Disabled => {
                // Already disabled: drop the probe level, the posture is
                // unchanged. Otherwise keep it, it is the disable.
                if prior == Posture::Disabled {
                    self.lock.unlock();
                }
            }
        }
        prior
    }

    /// Current interrupt posture of the machine: the global flag while in
    /// interrupt or setup context, the running thread's flag otherwise.
    pub fn interrupts_disabled(&self) -> bool {
        if self.system_state() != 0 {
            self.global_int_disabled.load(Ordering::Acquire)
        } else {
            self.current_cloned().is_some_and(|c| c.int_disabled())
        }
    }

    /// Queue an emulated device interrupt. Edge-triggered: a vector
    /// already pending is not queued twice. Delivered by the timer thread
    /// inside its next interrupt bracket.
    ///
    /// Runs with interrupts disabled: the raiser must never be frozen by
    /// the tick while it holds the pending queue, which the timer drains.
    pub fn raise(&self, vector: u32) {
        let saved = self.interrupt_control(Posture::Disabled);
        {
            let mut q = self.pending_irqs.lock();
            if !q.contains(&vector) {
                q.push_back(vector);
            }
        }
        self.interrupt_control(saved);
    }

    /// Install the handler for an interrupt vector, replacing any previous
    /// one. Handlers run in interrupt context: they may resume or suspend
    /// threads but must never park.
    pub fn handle_irq<F>(&self, vector: u32, handler: F)
    where
        F: Fn(&Kernel) + Send + Sync + 'static,
    {
        // Same rule as raise(): the handler table is read by the timer.
        let saved = self.interrupt_control(Posture::Disabled);
        self.irq_handlers.lock().insert(vector, Arc::new(handler));
        self.interrupt_control(saved);
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Ticks elapsed since the kernel started.
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// One timer tick: advance the clock, wake due sleepers, account the
    /// running thread's time slice. Runs inside the timer's interrupt
    /// bracket.
    pub(crate) fn advance_tick(&self) {
        self.lock.lock();
        let now = self.clock.fetch_add(1, Ordering::AcqRel) + 1;

        let due = self.engine.lock().take_due(now);
        for t in due {
            t.set_wake_at(0);
            if t.transfer_state(SUSPENDED, READY) {
                self.engine.lock().enqueue(t);
            }
        }

        if let Some(cur) = self.current_cloned() {
            let s = self.slice.load(Ordering::Acquire);
            if s > 0 {
                self.slice.store(s - 1, Ordering::Release);
                if s == 1 && cur.fresh_slice() > 0 {
                    self.engine.lock().rotate(&cur);
                    self.slice.store(cur.fresh_slice(), Ordering::Release);
                    log::trace!("time slice expired for thread {}", cur.tid());
                }
            }
        }

        self.reselect();
        self.lock.unlock();
    }

    pub(crate) fn drain_pending_irqs(&self) -> Vec<u32> {
        self.pending_irqs.lock().drain(..).collect()
    }

    pub(crate) fn dispatch_irq(&self, vector: u32) {
        let handler = self.irq_handlers.lock().get(&vector).cloned();
        match handler {
            Some(h) => h(self),
            None => log::warn!("interrupt {vector} raised with no handler"),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Threads known to the kernel, including suspended ones.
    pub fn threads(&self) -> Vec<ThreadNode> {
        let saved = self.interrupt_control(Posture::Disabled);
        let all = self.threads.lock().clone();
        self.interrupt_control(saved);
        all
    }

    // ------------------------------------------------------------------
    // Internals shared with lifecycle, irq and host
    // ------------------------------------------------------------------

    pub(crate) fn system_state(&self) -> u32 {
        self.system_state.load(Ordering::Acquire)
    }

    pub(crate) fn enter_system(&self) {
        self.system_state.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the interrupt nesting depth, returning the new value.
    pub(crate) fn leave_system(&self) -> u32 {
        self.system_state.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn preemptable(&self) -> bool {
        self.preempt_disable.load(Ordering::Acquire) == 0
    }

    pub(crate) fn hold_preemption(&self) {
        self.preempt_disable.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_preemption(&self) {
        self.preempt_disable.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn current_cloned(&self) -> Option<ThreadNode> {
        self.current.lock().clone()
    }

    pub(crate) fn selected_cloned(&self) -> Option<ThreadNode> {
        self.selected.lock().clone()
    }

    pub(crate) fn current_is(&self, thread: &ThreadNode) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(c, thread))
    }

    pub(crate) fn selected_is(&self, thread: &ThreadNode) -> bool {
        self.selected
            .lock()
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, thread))
    }

    /// Drop the token holder; true if `thread` indeed held it.
    pub(crate) fn clear_current_if(&self, thread: &ThreadNode) -> bool {
        let mut cur = self.current.lock();
        if cur.as_ref().is_some_and(|c| Arc::ptr_eq(c, thread)) {
            *cur = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn clear_current(&self) {
        *self.current.lock() = None;
    }

    /// Refresh the engine's selection. Caller holds the big lock.
    pub(crate) fn reselect(&self) {
        *self.selected.lock() = self.engine.lock().pick();
    }

    pub(crate) fn active_slice(&self) -> u32 {
        self.slice.load(Ordering::Acquire)
    }

    pub(crate) fn set_timer_waiting(&self, waiting: bool) {
        self.timer_waiting.store(waiting, Ordering::Release);
    }

    /// Post a schedule request: exactly one pending count, whatever was
    /// there before.
    pub(crate) fn sched_request(&self) {
        self.sched_baton.drain();
        self.sched_baton.post();
    }

    /// Acknowledge having received the token.
    pub(crate) fn sched_ack(&self) {
        self.sched_baton.post();
    }

    pub(crate) fn allocate_tid(&self) -> u32 {
        self.next_tid.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn register(&self, thread: ThreadNode) {
        self.threads.lock().push(thread);
    }

    pub(crate) fn remove_from_engine(&self, thread: &ThreadNode) {
        self.engine.lock().remove(thread);
    }
}
