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

//! Five threads at five priorities. The lowest one resumes the next
//! higher, which preempts it immediately, resumes the next higher still,
//! and so on to the top; each upper thread counts once and suspends
//! itself, unwinding back down. Every counter advances exactly once per
//! cycle of the lowest thread.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tickperf::thread::SUSPENDED;
use tickperf_harness as bench;

const CHAIN: usize = 5;
// id 0 is the most urgent; id 4 drives the chain.
const PRIORITIES: [u8; CHAIN] = [4, 5, 6, 7, 8];

static COUNTERS: [AtomicU32; CHAIN] = [const { AtomicU32::new(0) }; CHAIN];
static STOP: AtomicBool = AtomicBool::new(false);

fn top() {
    loop {
        COUNTERS[0].fetch_add(1, Ordering::Relaxed);
        bench::thread_suspend(0).unwrap();
    }
}

fn middle(slot: usize) {
    loop {
        bench::thread_resume(slot - 1).unwrap();
        COUNTERS[slot].fetch_add(1, Ordering::Relaxed);
        bench::thread_suspend(slot).unwrap();
    }
}

fn driver() {
    loop {
        if STOP.load(Ordering::Acquire) {
            bench::thread_suspend(4).unwrap();
            continue;
        }
        bench::thread_resume(3).unwrap();
        COUNTERS[4].fetch_add(1, Ordering::Relaxed);
    }
}

fn m1() {
    middle(1)
}
fn m2() {
    middle(2)
}
fn m3() {
    middle(3)
}

fn wait_for(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn priority_chain_advances_in_lockstep() {
    let _ = env_logger::builder().is_test(true).try_init();
    let entries: [fn(); CHAIN] = [top, m1, m2, m3, driver];

    bench::initialize(|_k| {
        for (id, entry) in entries.iter().enumerate() {
            bench::thread_create(id, PRIORITIES[id], *entry).unwrap();
        }
        // Only the driver starts; every other thread is first started by
        // the resume below it in the chain.
        bench::thread_resume(4).unwrap();
    });

    wait_for("the chain to cycle", Duration::from_secs(10), || {
        COUNTERS.iter().all(|c| c.load(Ordering::Relaxed) > 50)
    });

    STOP.store(true, Ordering::Release);
    wait_for("the chain to drain", Duration::from_secs(5), || {
        (0..CHAIN).all(|id| bench::thread_state(id).unwrap() == SUSPENDED)
    });

    let counts: Vec<u32> = COUNTERS.iter().map(|c| c.load(Ordering::Relaxed)).collect();
    let max = *counts.iter().max().unwrap();
    let min = *counts.iter().min().unwrap();
    assert!(
        max - min <= 1,
        "chain fell out of lockstep: counters {counts:?}"
    );
}
