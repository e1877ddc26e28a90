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

//! Suspending a suspended thread is a no-op, suspending a running thread
//! freezes it at the next tick, and a single resume restarts it.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tickperf::thread::SUSPENDED;
use tickperf::{Builder, Kernel, KernelError, ThreadNode};

static COUNT: AtomicU32 = AtomicU32::new(0);
static WORKER: OnceLock<ThreadNode> = OnceLock::new();

fn wait_for(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn suspend_is_idempotent() {
    let _ = env_logger::builder().is_test(true).try_init();

    let k = Kernel::start(|k| {
        let worker = Builder::new(k).name("worker").priority(8).spawn(|| {
            let k = Kernel::instance();
            loop {
                COUNT.fetch_add(1, Ordering::Relaxed);
                k.relinquish();
            }
        });
        k.resume(&worker).unwrap();
        WORKER.set(worker).ok().unwrap();
    });
    let worker = WORKER.get().unwrap().clone();

    wait_for("worker to run", Duration::from_secs(5), || {
        COUNT.load(Ordering::Relaxed) > 100
    });

    // External suspend: takes effect when the next tick evicts the
    // running thread.
    k.suspend(&worker).unwrap();
    assert_eq!(worker.state(), SUSPENDED);
    std::thread::sleep(Duration::from_millis(20));
    let frozen = COUNT.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(frozen, COUNT.load(Ordering::Relaxed));

    // Suspending again changes nothing and reports success.
    k.suspend(&worker).unwrap();
    assert_eq!(worker.state(), SUSPENDED);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(frozen, COUNT.load(Ordering::Relaxed));

    // One resume restarts it exactly where it stopped.
    k.resume(&worker).unwrap();
    wait_for("worker to restart", Duration::from_secs(2), || {
        COUNT.load(Ordering::Relaxed) > frozen
    });

    // Resuming a thread that is not suspended is an error.
    assert!(matches!(
        k.resume(&worker),
        Err(KernelError::WrongState(_))
    ));
}
