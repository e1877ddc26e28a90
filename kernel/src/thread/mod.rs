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

//! Logical threads: the schedulable entities of the kernel.
//!
//! A logical thread wraps one native OS thread together with the run baton
//! that gates its execution, its lifecycle state machine, and the registers
//! the scheduler reads and writes (priority, time slice, run counter).

mod builder;
pub(crate) mod lifecycle;

pub use builder::Builder;

use crate::sync::Baton;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub type ThreadPriority = u8;
pub type ThreadNode = Arc<Thread>;

/// Created but never started.
pub const CREATED: u8 = 0;
/// Eligible to run.
pub const READY: u8 = 1;
/// The one thread currently holding the execution token.
pub const RUNNING: u8 = 2;
/// Parked until an explicit resume.
pub const SUSPENDED: u8 = 3;
/// Finished or deleted; never schedulable again.
pub const TERMINATED: u8 = 4;

/// How a suspended thread was parked, which decides how it is revived.
///
/// A thread that parked itself cooperatively sleeps on its run baton and is
/// revived by a baton post; a thread stopped mid-instruction by the
/// interrupt path sleeps inside a signal handler and is revived by a resume
/// signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SuspendKind {
    Scheduler = 0,
    Interrupt = 1,
}

pub struct Thread {
    tid: u32,
    native_id: AtomicUsize,
    native: spin::Mutex<Option<JoinHandle<()>>>,
    baton: Baton,
    state: AtomicU8,
    suspend_kind: AtomicU8,
    int_disabled: AtomicBool,
    canceled: AtomicBool,
    priority: AtomicU8,
    time_slice: AtomicU32,
    fresh_slice: u32,
    run_count: AtomicU32,
    wake_at: AtomicU64,
}

impl Thread {
    pub(crate) fn new(tid: u32, priority: ThreadPriority, fresh_slice: u32) -> Self {
        Self {
            tid,
            native_id: AtomicUsize::new(0),
            native: spin::Mutex::new(None),
            baton: Baton::new(),
            state: AtomicU8::new(CREATED),
            suspend_kind: AtomicU8::new(SuspendKind::Scheduler as u8),
            int_disabled: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            priority: AtomicU8::new(priority),
            time_slice: AtomicU32::new(fresh_slice),
            fresh_slice,
            run_count: AtomicU32::new(0),
            wake_at: AtomicU64::new(0),
        }
    }

    pub fn tid(&self) -> u32 {
        self.tid
    }

    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// Move `from` -> `to` atomically; false if the thread was not in
    /// `from`.
    pub fn transfer_state(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    pub fn state_to_str(&self) -> &'static str {
        match self.state() {
            CREATED => "created",
            READY => "ready",
            RUNNING => "running",
            SUSPENDED => "suspended",
            TERMINATED => "terminated",
            _ => "invalid",
        }
    }

    pub fn priority(&self) -> ThreadPriority {
        self.priority.load(Ordering::Acquire)
    }

    /// Times this thread has been handed the execution token.
    pub fn run_count(&self) -> u32 {
        self.run_count.load(Ordering::Acquire)
    }

    pub(crate) fn bump_run_count(&self) {
        self.run_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn suspend_kind(&self) -> SuspendKind {
        match self.suspend_kind.load(Ordering::Acquire) {
            1 => SuspendKind::Interrupt,
            _ => SuspendKind::Scheduler,
        }
    }

    pub(crate) fn set_suspend_kind(&self, kind: SuspendKind) {
        self.suspend_kind.store(kind as u8, Ordering::Release);
    }

    pub(crate) fn int_disabled(&self) -> bool {
        self.int_disabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_int_disabled(&self, disabled: bool) {
        self.int_disabled.store(disabled, Ordering::Release);
    }

    pub(crate) fn canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn request_cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub(crate) fn time_slice(&self) -> u32 {
        self.time_slice.load(Ordering::Acquire)
    }

    pub(crate) fn set_time_slice(&self, ticks: u32) {
        self.time_slice.store(ticks, Ordering::Release);
    }

    pub(crate) fn fresh_slice(&self) -> u32 {
        self.fresh_slice
    }

    pub(crate) fn wake_at(&self) -> u64 {
        self.wake_at.load(Ordering::Acquire)
    }

    pub(crate) fn set_wake_at(&self, tick: u64) {
        self.wake_at.store(tick, Ordering::Release);
    }

    pub(crate) fn native_id(&self) -> libc::pthread_t {
        self.native_id.load(Ordering::Acquire) as libc::pthread_t
    }

    pub(crate) fn set_native_id(&self, id: libc::pthread_t) {
        self.native_id.store(id as usize, Ordering::Release);
    }

    pub(crate) fn store_native(&self, handle: JoinHandle<()>) {
        *self.native.lock() = Some(handle);
    }

    pub(crate) fn take_native(&self) -> Option<JoinHandle<()>> {
        self.native.lock().take()
    }

    /// True once the native thread has returned, including the forced-exit
    /// path taken during deletion.
    pub(crate) fn native_finished(&self) -> bool {
        match self.native.lock().as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }

    pub(crate) fn baton(&self) -> &Baton {
        &self.baton
    }

    pub(crate) fn post_baton(&self) {
        self.baton.post();
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("state", &self.state_to_str())
            .field("priority", &self.priority())
            .field("run_count", &self.run_count())
            .finish()
    }
}
