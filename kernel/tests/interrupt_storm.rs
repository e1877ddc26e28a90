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

//! A thread raising device interrupts in a tight loop must never wedge
//! the kernel: raising synchronizes with the timer's drain, so the clock
//! keeps advancing and handlers keep firing under the storm.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tickperf::thread::SUSPENDED;
use tickperf::{Builder, Kernel, ThreadNode};

const VECTOR: u32 = 5;

static RAISER: OnceLock<ThreadNode> = OnceLock::new();
static HANDLED: AtomicU32 = AtomicU32::new(0);
static STOP: AtomicBool = AtomicBool::new(false);

fn raiser() {
    let k = Kernel::instance();
    loop {
        if STOP.load(Ordering::Acquire) {
            k.suspend(RAISER.get().unwrap()).unwrap();
            continue;
        }
        k.raise(VECTOR);
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
fn raise_storm_never_stalls_the_clock() {
    let _ = env_logger::builder().is_test(true).try_init();

    let k = Kernel::start(|k| {
        k.handle_irq(VECTOR, |_| {
            HANDLED.fetch_add(1, Ordering::Relaxed);
        });
        let t = Builder::new(k).name("raiser").priority(8).spawn(raiser);
        k.resume(&t).unwrap();
        RAISER.set(t).unwrap();
    });

    let start = k.now();
    wait_for("the clock to advance under the storm", Duration::from_secs(10), || {
        k.now() >= start + 20
    });
    assert!(HANDLED.load(Ordering::Relaxed) > 0, "no interrupt delivered");

    STOP.store(true, Ordering::Release);
    wait_for("the raiser to park", Duration::from_secs(5), || {
        RAISER.get().unwrap().state() == SUSPENDED
    });
}
