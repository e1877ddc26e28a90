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

use crate::config::{DEFAULT_TIME_SLICE, MAX_THREAD_PRIORITY};
use crate::error::fatal;
use crate::scheduler::Kernel;
use crate::thread::{lifecycle, Thread, ThreadNode, ThreadPriority};
use std::os::unix::thread::JoinHandleExt;
use std::sync::Arc;

/// Builder for a logical thread.
///
/// The thread is created parked: its native carrier exists and waits on
/// the run baton, but it is not in the scheduled set until a
/// [`Kernel::resume`].
pub struct Builder {
    kernel: &'static Kernel,
    name: Option<String>,
    priority: ThreadPriority,
    time_slice: u32,
    stack_size: Option<usize>,
}

impl Builder {
    pub fn new(kernel: &'static Kernel) -> Self {
        Self {
            kernel,
            name: None,
            priority: MAX_THREAD_PRIORITY,
            time_slice: DEFAULT_TIME_SLICE,
            stack_size: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 0 is the most urgent priority; values beyond the supported range
    /// are clamped.
    pub fn priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority.min(MAX_THREAD_PRIORITY);
        self
    }

    /// Round-robin time slice in ticks; 0 disables slicing for this
    /// thread.
    pub fn time_slice(mut self, ticks: u32) -> Self {
        self.time_slice = ticks;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Spawn the native carrier and register the logical thread. A native
    /// spawn failure is fatal: without a carrier the scheduled set would
    /// be silently short a member.
    pub fn spawn<F>(self, entry: F) -> ThreadNode
    where
        F: FnOnce() + Send + 'static,
    {
        let kernel = self.kernel;
        let tid = kernel.allocate_tid();
        let thread: ThreadNode = Arc::new(Thread::new(tid, self.priority, self.time_slice));

        let mut native = std::thread::Builder::new()
            .name(self.name.unwrap_or_else(|| format!("tickperf-t{tid}")));
        if let Some(bytes) = self.stack_size {
            native = native.stack_size(bytes);
        }
        let carried = thread.clone();
        let handle = match native.spawn(move || lifecycle::trampoline(kernel, carried, entry)) {
            Ok(h) => h,
            Err(e) => fatal("spawning logical thread", e.raw_os_error().unwrap_or(0)),
        };
        thread.set_native_id(handle.as_pthread_t());
        thread.store_native(handle);

        kernel.hold_preemption();
        kernel.register(thread.clone());
        kernel.release_preemption();
        log::debug!(
            "created thread {} (priority {}, slice {})",
            tid,
            thread.priority(),
            self.time_slice
        );
        thread
    }
}
