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

use thiserror::Error;

/// Errors surfaced to callers of kernel operations.
///
/// Failures of the scheduling substrate itself (pipes, signal dispositions,
/// native thread spawn) are not represented here: a misconfigured substrate
/// makes every subsequent measurement meaningless, so those paths call
/// [`fatal`] instead.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The operation targets a thread whose lifecycle state does not admit
    /// it, e.g. resuming a thread that is already ready.
    #[error("thread is in the wrong lifecycle state (state {0})")]
    WrongState(u8),

    /// A bounded resource is exhausted. Reported to the caller, never fatal.
    #[error("resource exhausted")]
    Exhausted,

    /// The thread's native handle was already reclaimed.
    #[error("native thread already detached")]
    Detached,

    /// Joining a reclaimed native thread failed because it panicked.
    #[error("native thread panicked before termination")]
    JoinPanic,
}

/// Abort the process after an unrecoverable initialization failure.
pub(crate) fn fatal(what: &str, errno: i32) -> ! {
    log::error!("fatal initialization failure: {what} (errno {errno})");
    eprintln!("tickperf: fatal initialization failure: {what} (errno {errno})");
    std::process::exit(1);
}
