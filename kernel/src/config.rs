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

use core::time::Duration;

/// Emulated timer-interrupt frequency.
pub const TICKS_PER_SECOND: u64 = 1000;

/// Period of the emulated timer interrupt.
pub const TICK_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / TICKS_PER_SECOND);

/// Number of distinct thread priorities. 0 is the most urgent.
pub const MAX_PRIORITIES: usize = 32;

pub const MAX_THREAD_PRIORITY: u8 = (MAX_PRIORITIES - 1) as u8;

/// Default per-thread time slice in ticks. 0 disables slicing, so equal
/// priority threads only alternate on explicit relinquish.
pub const DEFAULT_TIME_SLICE: u32 = 0;

/// How long the dispatcher sleeps between polls while no thread is
/// selected or an interrupt is active.
pub const DISPATCH_POLL: Duration = Duration::from_micros(200);

/// Backoff between cancellation nudges while reclaiming a thread.
pub const DELETE_BACKOFF: Duration = Duration::from_millis(1);
