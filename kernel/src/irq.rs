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

//! Interrupt emulation: the enter/exit bracket around interrupt work.
//!
//! [`enter`] freezes the running thread the way a hardware interrupt
//! would, mid-instruction and without its cooperation; [`exit`] decides
//! whether it gets the processor back or a higher-priority thread readied
//! by the handler takes over. Brackets nest; only the outermost exit
//! performs the switch decision.

use crate::host;
use crate::scheduler::Kernel;
use crate::thread::{SuspendKind, READY, RUNNING};

/// Emulated interrupt posture of the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Posture {
    Enabled,
    Disabled,
}

/// Open an interrupt bracket. Blocks while interrupts are disabled (the
/// big lock is held), then stops the running thread in its tracks.
pub(crate) fn enter(k: &Kernel) {
    k.lock.lock();
    if k.system_state() == 0 {
        if let Some(cur) = k.current_cloned() {
            host::suspend_native(k, cur.native_id());
            cur.set_suspend_kind(SuspendKind::Interrupt);
        }
    }
    k.enter_system();
    k.lock.unlock();
}

/// Close an interrupt bracket. On the outermost exit either resumes the
/// interrupted thread or, if the handler changed the selection, starts a
/// switch and waits for it to complete before the tick continues.
pub(crate) fn exit(k: &Kernel) {
    k.lock.lock();
    if k.leave_system() == 0 {
        if let Some(cur) = k.current_cloned() {
            if k.preemptable() && !k.selected_is(&cur) {
                preempt(k, &cur);
            } else {
                host::resume_native(k, cur.native_id());
            }
        }
    }
    k.lock.unlock_all();
}

/// Evict the interrupted thread: it stays parked in its signal handler,
/// still ready at the head of its queue, while the dispatcher hands the
/// token to the new selection.
fn preempt(k: &Kernel, cur: &crate::thread::ThreadNode) {
    log::trace!("preempt thread {}", cur.tid());
    cur.set_time_slice(k.active_slice());
    cur.transfer_state(RUNNING, READY);
    k.clear_current();

    k.sched_baton.drain();
    k.set_timer_waiting(true);
    k.sched_baton.post();

    // A cooperatively parked selection is dispatched through its run
    // baton; hold the tick here until that handoff acknowledges. An
    // interrupt-suspended selection is revived by a bare signal and needs
    // no rendezvous.
    let cooperative = k
        .selected_cloned()
        .is_some_and(|s| s.suspend_kind() == SuspendKind::Scheduler);
    if cooperative {
        k.lock.unlock_all();
        k.isr_baton.wait();
        k.lock.lock();
        k.isr_baton.drain();
    }
    k.set_timer_waiting(false);
}
