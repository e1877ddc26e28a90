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

//! Interrupt disable/restore brackets nest and always balance: after the
//! outermost restore the lock is fully released and another thread can
//! disable interrupts in turn.

use tickperf::sync::RecursiveLock;
use tickperf::{Kernel, Posture};

#[test]
fn disable_restore_brackets_balance() {
    let k = Kernel::instance();
    assert_eq!(RecursiveLock::depth(), 0);

    let outer = k.interrupt_control(Posture::Disabled);
    assert_eq!(outer, Posture::Enabled);
    assert_eq!(RecursiveLock::depth(), 1);
    assert!(k.interrupts_disabled());

    // Nested disable reports the disabled posture and holds no extra
    // level.
    let inner = k.interrupt_control(Posture::Disabled);
    assert_eq!(inner, Posture::Disabled);
    assert_eq!(RecursiveLock::depth(), 1);

    // Restoring the inner posture keeps interrupts disabled.
    k.interrupt_control(inner);
    assert_eq!(RecursiveLock::depth(), 1);

    // Restoring the outer posture releases everything.
    k.interrupt_control(outer);
    assert_eq!(RecursiveLock::depth(), 0);
    assert!(!k.interrupts_disabled());

    // Another thread sees an enabled machine and can run its own bracket.
    std::thread::spawn(move || {
        let prior = k.interrupt_control(Posture::Disabled);
        assert_eq!(prior, Posture::Enabled);
        assert_eq!(RecursiveLock::depth(), 1);
        k.interrupt_control(Posture::Enabled);
        assert_eq!(RecursiveLock::depth(), 0);
    })
    .join()
    .unwrap();
}
