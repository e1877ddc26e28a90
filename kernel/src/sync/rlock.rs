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

use core::cell::{Cell, UnsafeCell};
use core::mem::MaybeUninit;

thread_local! {
    // Nesting depth of the calling thread's hold on the kernel lock.
    // Exactly one RecursiveLock exists per process (the kernel's), so a
    // single per-thread counter suffices.
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Recursive critical-section lock with an explicit, per-thread depth
/// counter.
///
/// The depth is tracked manually rather than read out of the platform
/// mutex, because [`RecursiveLock::unlock_all`] must be able to release an
/// arbitrary nesting depth when control crosses from one logical thread's
/// stack to the native thread that runs next. Plain unlock-once semantics
/// are kept for the balanced paths.
pub struct RecursiveLock {
    // Boxed so the initialized pthread mutex never moves.
    raw: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

unsafe impl Send for RecursiveLock {}
unsafe impl Sync for RecursiveLock {}

impl RecursiveLock {
    pub fn new() -> Self {
        let raw: Box<UnsafeCell<libc::pthread_mutex_t>> =
            Box::new(UnsafeCell::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        unsafe {
            let mut attr: libc::pthread_mutexattr_t = MaybeUninit::zeroed().assume_init();
            libc::pthread_mutexattr_init(&mut attr);
            libc::pthread_mutexattr_settype(&mut attr, libc::PTHREAD_MUTEX_RECURSIVE);
            libc::pthread_mutex_init(raw.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
        }
        Self { raw }
    }

    pub fn lock(&self) {
        unsafe {
            libc::pthread_mutex_lock(self.raw.get());
        }
        DEPTH.set(DEPTH.get() + 1);
    }

    pub fn unlock(&self) {
        debug_assert!(DEPTH.get() > 0);
        DEPTH.set(DEPTH.get() - 1);
        unsafe {
            libc::pthread_mutex_unlock(self.raw.get());
        }
    }

    /// Release every nesting level held by the calling thread.
    pub fn unlock_all(&self) {
        let mut n = DEPTH.get();
        while n > 0 {
            self.unlock();
            n -= 1;
        }
    }

    /// Nesting depth held by the calling thread.
    pub fn depth() -> u32 {
        DEPTH.get()
    }
}

impl Default for RecursiveLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecursiveLock {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_destroy(self.raw.get());
        }
    }
}
