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

//! Minimal demo: three equal-priority threads round-robin for two
//! seconds, then their counters are printed.

use core::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tickperf_harness as bench;

const WORKERS: usize = 3;
const PRIORITY: u8 = 8;

static COUNTERS: [AtomicU32; WORKERS] = [const { AtomicU32::new(0) }; WORKERS];

fn worker(slot: usize) {
    loop {
        COUNTERS[slot].fetch_add(1, Ordering::Relaxed);
        bench::thread_relinquish();
    }
}

fn main() {
    env_logger::init();

    bench::initialize(|_k| {
        for id in 0..WORKERS {
            let entry: fn() = match id {
                0 => || worker(0),
                1 => || worker(1),
                _ => || worker(2),
            };
            if let Err(e) = bench::thread_create(id, PRIORITY, entry) {
                log::error!("creating worker {id}: {e}");
                std::process::exit(1);
            }
            if let Err(e) = bench::thread_resume(id) {
                log::error!("starting worker {id}: {e}");
                std::process::exit(1);
            }
        }
    });

    std::thread::sleep(Duration::from_secs(2));

    println!("ticks elapsed: {}", bench::time_get());
    for id in 0..WORKERS {
        println!(
            "worker {id}: {} iterations, {} dispatches",
            COUNTERS[id].load(Ordering::Relaxed),
            bench::thread_runs(id).unwrap_or(0)
        );
    }
}
