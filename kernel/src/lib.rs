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

//! A single-core preemptive RT kernel emulated on ordinary OS threads.
//!
//! Ordinary `std::thread`s are made to behave like the threads of a
//! priority-preemptive kernel: exactly one runs at a time, a periodic
//! emulated timer interrupt preempts it, and fixed priorities with FIFO
//! ordering decide who runs next. The machinery underneath is POSIX
//! plumbing: a recursive lock stands in for the interrupt mask, signals
//! stop threads mid-instruction, pipes acknowledge that they stopped, and
//! small counting batons pass the execution token around.
//!
//! ```no_run
//! use tickperf::{Builder, Kernel};
//!
//! let k = Kernel::start(|k| {
//!     let worker = Builder::new(k).name("worker").priority(8).spawn(|| {
//!         let k = Kernel::instance();
//!         loop {
//!             // do one unit of work
//!             k.relinquish();
//!         }
//!     });
//!     k.resume(&worker).unwrap();
//! });
//! ```

pub mod config;
pub mod error;
mod host;
pub mod irq;
pub mod scheduler;
pub mod sync;
pub mod thread;
mod time;

pub use error::KernelError;
pub use irq::Posture;
pub use scheduler::Kernel;
pub use thread::{Builder, Thread, ThreadNode, ThreadPriority};
