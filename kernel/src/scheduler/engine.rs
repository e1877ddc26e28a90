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

//! Scheduling policy: fixed priorities, FIFO within a priority.
//!
//! Pure bookkeeping. The engine never blocks, never signals and never
//! touches a native thread; it only answers "which thread should hold the
//! execution token". All mutation happens under the kernel lock.

use crate::config::MAX_PRIORITIES;
use crate::thread::ThreadNode;
use std::collections::VecDeque;
use std::sync::Arc;

pub(crate) struct Engine {
    queues: [VecDeque<ThreadNode>; MAX_PRIORITIES],
    // Bit p set while queues[p] is nonempty. Priority 0 is the most
    // urgent, so the lowest set bit wins.
    active: u32,
    sleepers: Vec<ThreadNode>,
}

impl Engine {
    pub(crate) fn new() -> Self {
        Self {
            queues: core::array::from_fn(|_| VecDeque::new()),
            active: 0,
            sleepers: Vec::new(),
        }
    }

    /// Append to the tail of the thread's priority queue. The running
    /// thread stays at the head of its queue, so a newly readied thread of
    /// equal priority runs after it, never instead of it.
    pub(crate) fn enqueue(&mut self, thread: ThreadNode) {
        let p = thread.priority() as usize;
        self.queues[p].push_back(thread);
        self.active |= 1 << p;
    }

    /// Drop the thread from the ready queues and the sleeper list.
    pub(crate) fn remove(&mut self, thread: &ThreadNode) {
        let p = thread.priority() as usize;
        self.queues[p].retain(|t| !Arc::ptr_eq(t, thread));
        if self.queues[p].is_empty() {
            self.active &= !(1 << p);
        }
        self.sleepers.retain(|t| !Arc::ptr_eq(t, thread));
    }

    /// Highest-priority ready thread, ties broken FIFO.
    pub(crate) fn pick(&self) -> Option<ThreadNode> {
        if self.active == 0 {
            return None;
        }
        let p = self.active.trailing_zeros() as usize;
        self.queues[p].front().cloned()
    }

    /// Move the thread from the head to the tail of its priority queue.
    /// No effect unless it is at the head with company behind it.
    pub(crate) fn rotate(&mut self, thread: &ThreadNode) {
        let p = thread.priority() as usize;
        let q = &mut self.queues[p];
        if q.len() > 1 && q.front().is_some_and(|t| Arc::ptr_eq(t, thread)) {
            let t = q.pop_front().unwrap();
            q.push_back(t);
        }
    }

    pub(crate) fn add_sleeper(&mut self, thread: ThreadNode) {
        self.sleepers.push(thread);
    }

    /// Remove and return every sleeper whose deadline has arrived.
    pub(crate) fn take_due(&mut self, now: u64) -> Vec<ThreadNode> {
        let mut due = Vec::new();
        self.sleepers.retain(|t| {
            if t.wake_at() <= now {
                due.push(t.clone());
                false
            } else {
                true
            }
        });
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;

    fn node(tid: u32, priority: u8) -> ThreadNode {
        Arc::new(Thread::new(tid, priority, 0))
    }

    #[test]
    fn picks_highest_priority_fifo() {
        let mut e = Engine::new();
        let a = node(1, 8);
        let b = node(2, 8);
        let c = node(3, 4);
        e.enqueue(a.clone());
        e.enqueue(b.clone());
        assert!(Arc::ptr_eq(&e.pick().unwrap(), &a));
        e.enqueue(c.clone());
        assert!(Arc::ptr_eq(&e.pick().unwrap(), &c));
        e.remove(&c);
        assert!(Arc::ptr_eq(&e.pick().unwrap(), &a));
    }

    #[test]
    fn rotate_moves_head_to_tail() {
        let mut e = Engine::new();
        let a = node(1, 8);
        let b = node(2, 8);
        let c = node(3, 8);
        e.enqueue(a.clone());
        e.enqueue(b.clone());
        e.enqueue(c.clone());
        e.rotate(&a);
        assert!(Arc::ptr_eq(&e.pick().unwrap(), &b));
        e.rotate(&b);
        assert!(Arc::ptr_eq(&e.pick().unwrap(), &c));
        e.rotate(&c);
        assert!(Arc::ptr_eq(&e.pick().unwrap(), &a));
    }

    #[test]
    fn rotate_ignores_non_head_thread() {
        let mut e = Engine::new();
        let a = node(1, 8);
        let b = node(2, 8);
        e.enqueue(a.clone());
        e.enqueue(b.clone());
        e.rotate(&b);
        assert!(Arc::ptr_eq(&e.pick().unwrap(), &a));
    }

    #[test]
    fn sleepers_wake_in_deadline_order() {
        let mut e = Engine::new();
        let a = node(1, 8);
        let b = node(2, 8);
        a.set_wake_at(5);
        b.set_wake_at(10);
        e.add_sleeper(a.clone());
        e.add_sleeper(b.clone());
        assert!(e.take_due(4).is_empty());
        let due = e.take_due(5);
        assert_eq!(due.len(), 1);
        assert!(Arc::ptr_eq(&due[0], &a));
        let due = e.take_due(10);
        assert_eq!(due.len(), 1);
        assert!(Arc::ptr_eq(&due[0], &b));
    }

    #[test]
    fn remove_cancels_a_sleeper() {
        let mut e = Engine::new();
        let a = node(1, 8);
        a.set_wake_at(5);
        e.add_sleeper(a.clone());
        e.remove(&a);
        assert!(e.take_due(100).is_empty());
    }

    #[test]
    fn empty_engine_picks_nothing() {
        let e = Engine::new();
        assert!(e.pick().is_none());
    }
}
