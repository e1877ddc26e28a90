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

//! Preemption inside queue operations leaves the tables usable: a sender
//! evicted mid-send never blocks the high-priority receiver dispatched in
//! its place, and the traffic keeps flowing across many such switches.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tickperf::thread::SUSPENDED;
use tickperf_harness as bench;

const QUEUE: usize = 0;
const VECTOR: u32 = 2;
const SENDER: usize = 0;
const RECEIVER: usize = 1;

static SENT: AtomicU32 = AtomicU32::new(0);
static DRAINED: AtomicU32 = AtomicU32::new(0);
static ACTIVATIONS: AtomicU32 = AtomicU32::new(0);
static STOP: AtomicBool = AtomicBool::new(false);

fn sender() {
    loop {
        if STOP.load(Ordering::Acquire) {
            bench::thread_suspend(SENDER).unwrap();
            continue;
        }
        bench::interrupt_raise(VECTOR);
        // A full queue just means the receiver is behind.
        if bench::queue_send(QUEUE, &[1, 2, 3, 4]).is_ok() {
            SENT.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn receiver() {
    loop {
        while bench::queue_receive(QUEUE).is_ok() {
            DRAINED.fetch_add(1, Ordering::Relaxed);
        }
        ACTIVATIONS.fetch_add(1, Ordering::Relaxed);
        bench::thread_suspend(RECEIVER).unwrap();
    }
}

fn wait_for(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn preempted_sender_never_blocks_receiver() {
    let _ = env_logger::builder().is_test(true).try_init();

    bench::initialize(|k| {
        bench::queue_create(QUEUE).unwrap();
        bench::thread_create(SENDER, 9, sender).unwrap();
        bench::thread_create(RECEIVER, 3, receiver).unwrap();
        let high = bench::kernel().threads().into_iter().find(|t| t.priority() == 3);
        let high = high.expect("receiver registered");
        k.handle_irq(VECTOR, move |k| {
            let _ = k.resume(&high);
        });
        bench::thread_resume(SENDER).unwrap();
    });

    wait_for("sustained queue traffic", Duration::from_secs(10), || {
        ACTIVATIONS.load(Ordering::Relaxed) > 20 && DRAINED.load(Ordering::Relaxed) > 20
    });

    STOP.store(true, Ordering::Release);
    wait_for("both threads to park", Duration::from_secs(5), || {
        bench::thread_state(SENDER).unwrap() == SUSPENDED
            && bench::thread_state(RECEIVER).unwrap() == SUSPENDED
    });

    assert!(SENT.load(Ordering::Relaxed) > 0);
}
