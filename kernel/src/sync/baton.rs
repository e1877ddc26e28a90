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

use std::sync::{Condvar, Mutex};

/// Counting handshake primitive built on a mutex and condvar.
///
/// Used single-slot: every post is preceded by a [`Baton::drain`], so a
/// successful post hands execution rights to exactly one waiter and a stale
/// prior wakeup can never be consumed instead of the intended one.
///
/// The wait loop retries on spurious wakeups (including those caused by
/// signal delivery) and only returns after consuming a count.
#[derive(Debug, Default)]
pub struct Baton {
    count: Mutex<u32>,
    cond: Condvar,
}

impl Baton {
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }

    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Consume every pending count, returning how many were discarded.
    pub fn drain(&self) -> u32 {
        let mut count = self.count.lock().unwrap();
        core::mem::take(&mut *count)
    }
}
