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

//! The emulated timer interrupt.
//!
//! One native thread plays the interrupt controller: every tick period it
//! opens an interrupt bracket, advances the clock and delivers any pending
//! device interrupts in nested brackets. Preemption decisions all happen
//! at the outermost bracket exit.

use crate::config::TICK_PERIOD;
use crate::host;
use crate::irq;
use crate::scheduler::Kernel;

pub(crate) fn run(k: &'static Kernel) {
    host::register_timer_thread();
    k.timer_ready.post();
    k.start_gate.wait();
    log::debug!("timer tick running");

    loop {
        std::thread::sleep(TICK_PERIOD);
        irq::enter(k);
        k.advance_tick();
        for vector in k.drain_pending_irqs() {
            irq::enter(k);
            k.dispatch_irq(vector);
            irq::exit(k);
        }
        irq::exit(k);
    }
}
