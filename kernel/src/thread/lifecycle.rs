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

//! Birth, parking and death of a logical thread's native carrier.
//!
//! The hot path is the cooperative switch: a thread gives the token back
//! with [`park_and_wait`] and gets it again through [`wait_for_dispatch`].
//! Deletion is cooperative: a doomed thread notices its cancellation flag
//! at one of these points and unwinds out of its entry function via a
//! panic payload the trampoline catches.

use crate::host;
use crate::scheduler::Kernel;
use crate::thread::{ThreadNode, TERMINATED};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Unwind payload for a forced thread exit. Carried through
/// `resume_unwind` and swallowed by the trampoline.
pub(crate) struct ThreadExit;

/// Leave the current logical thread immediately. Must not be called with
/// any level of the kernel lock held.
pub(crate) fn exit_thread() -> ! {
    std::panic::resume_unwind(Box::new(ThreadExit))
}

/// Bail out if this thread has been asked to die. Called with the kernel
/// lock held; releases it entirely before unwinding.
pub(crate) fn checkpoint(k: &Kernel, me: &ThreadNode) {
    if me.canceled() {
        k.lock.unlock_all();
        exit_thread();
    }
}

/// Give the token back and park until dispatched again.
///
/// Caller holds the kernel lock at any depth and has already recorded why
/// the thread stops (state, queues, selection). On return the thread is
/// running again; the lock is held at depth one only if the thread had
/// interrupts disabled when it parked.
pub(crate) fn park_and_wait(k: &Kernel, me: &ThreadNode) {
    if me.canceled() {
        k.clear_current_if(me);
        k.lock.unlock_all();
        exit_thread();
    }
    me.set_time_slice(k.active_slice());
    me.set_suspend_kind(crate::thread::SuspendKind::Scheduler);
    let was_current = k.clear_current_if(me);
    k.lock.unlock_all();
    if was_current {
        k.sched_request();
    }
    wait_for_dispatch(k, me);
}

/// Park on the run baton until the dispatcher posts it, then acknowledge.
/// Also the very first wait of a freshly spawned thread.
pub(crate) fn wait_for_dispatch(k: &Kernel, me: &ThreadNode) {
    me.baton().wait();
    // Cancellation nudges post the baton without a dispatch; the flag is
    // only ever set while this thread is demonstrably not mid-handoff, so
    // skipping the acknowledgment cannot strand the dispatcher.
    if me.canceled() {
        exit_thread();
    }
    k.sched_ack();
    k.lock.lock();
    if me.canceled() {
        k.lock.unlock_all();
        exit_thread();
    }
    if !me.int_disabled() {
        k.lock.unlock();
    }
}

/// Native entry of every logical thread.
pub(crate) fn trampoline<F>(k: &'static Kernel, me: ThreadNode, entry: F)
where
    F: FnOnce() + Send + 'static,
{
    host::register_logical_thread();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        wait_for_dispatch(k, &me);
        entry();
    }));
    if let Err(payload) = outcome {
        if !payload.is::<ThreadExit>() {
            log::error!("thread {} panicked in its entry function", me.tid());
        }
    }
    retire(k, &me);
}

/// Final bookkeeping on the dying thread's own stack: leave the scheduled
/// set and, if it held the token, hand it back.
fn retire(k: &Kernel, me: &ThreadNode) {
    k.lock.lock();
    me.set_state(TERMINATED);
    k.remove_from_engine(me);
    let was_current = k.clear_current_if(me);
    k.reselect();
    k.lock.unlock_all();
    if was_current {
        k.sched_request();
    }
    log::debug!("thread {} retired", me.tid());
}
