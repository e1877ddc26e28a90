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

//! Benchmark porting layer over the tickperf kernel.
//!
//! Benchmark scenarios address kernel objects by small integer ids, the
//! way embedded benchmark suites do, so a scenario reads the same against
//! any kernel underneath. Queues carry fixed 16-byte messages, pools hand
//! out fixed 128-byte blocks, and every data-path operation is
//! non-blocking: a full queue or depleted semaphore reports an error
//! instead of parking the caller.

use spin::Mutex;
use thiserror::Error;
use tickperf::{Builder, Kernel, KernelError, Posture, ThreadNode};

pub const MAX_THREADS: usize = 10;
pub const MAX_QUEUES: usize = 4;
pub const MAX_SEMAPHORES: usize = 4;
pub const MAX_POOLS: usize = 4;

/// Messages are four 32-bit words, 16 bytes.
pub type Message = [u32; 4];
pub const QUEUE_CAPACITY: usize = 200;

pub const BLOCK_SIZE: usize = 128;
pub const POOL_BLOCKS: usize = 32;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("no object with id {0}")]
    BadId(usize),
    #[error("object {0} already exists")]
    Exists(usize),
    #[error("queue full")]
    QueueFull,
    #[error("queue empty")]
    QueueEmpty,
    #[error("semaphore depleted")]
    Depleted,
    #[error("pool exhausted")]
    PoolExhausted,
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

struct Queue {
    messages: std::collections::VecDeque<Message>,
}

struct Pool {
    free: Vec<Box<[u8; BLOCK_SIZE]>>,
}

/// A pool block on loan to the caller.
pub struct Block(Box<[u8; BLOCK_SIZE]>);

impl Block {
    pub fn data(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.0
    }
}

static THREADS: Mutex<Vec<Option<ThreadNode>>> = Mutex::new(Vec::new());
static QUEUES: Mutex<Vec<Option<Queue>>> = Mutex::new(Vec::new());
static SEMAPHORES: Mutex<Vec<Option<u32>>> = Mutex::new(Vec::new());
static POOLS: Mutex<Vec<Option<Pool>>> = Mutex::new(Vec::new());

// Every table access runs with interrupts disabled: a thread frozen by
// the tick while it holds a table lock would starve whichever thread is
// dispatched next onto the same table.
fn with_tables<R>(f: impl FnOnce() -> R) -> R {
    let k = kernel();
    let saved = k.interrupt_control(Posture::Disabled);
    let out = f();
    k.interrupt_control(saved);
    out
}

fn ensure_tables() {
    with_tables(|| {
        let mut t = THREADS.lock();
        if t.is_empty() {
            t.resize_with(MAX_THREADS, || None);
        }
        drop(t);
        let mut q = QUEUES.lock();
        if q.is_empty() {
            q.resize_with(MAX_QUEUES, || None);
        }
        drop(q);
        let mut s = SEMAPHORES.lock();
        if s.is_empty() {
            s.resize_with(MAX_SEMAPHORES, || None);
        }
        drop(s);
        let mut p = POOLS.lock();
        if p.is_empty() {
            p.resize_with(MAX_POOLS, || None);
        }
    })
}

/// Bring the kernel up and run `define` to create the scenario's threads
/// and objects before the first tick.
pub fn initialize(define: impl FnOnce(&'static Kernel)) -> &'static Kernel {
    ensure_tables();
    Kernel::start(define)
}

pub fn kernel() -> &'static Kernel {
    Kernel::instance()
}

// ----------------------------------------------------------------------
// Threads
// ----------------------------------------------------------------------

pub fn thread_create(id: usize, priority: u8, entry: fn()) -> Result<(), BenchError> {
    ensure_tables();
    with_tables(|| {
        let mut table = THREADS.lock();
        let slot = table.get_mut(id).ok_or(BenchError::BadId(id))?;
        if slot.is_some() {
            return Err(BenchError::Exists(id));
        }
        let thread = Builder::new(kernel())
            .name(format!("bench-t{id}"))
            .priority(priority)
            .spawn(entry);
        *slot = Some(thread);
        Ok(())
    })
}

fn thread(id: usize) -> Result<ThreadNode, BenchError> {
    with_tables(|| {
        THREADS
            .lock()
            .get(id)
            .and_then(|s| s.clone())
            .ok_or(BenchError::BadId(id))
    })
}

pub fn thread_resume(id: usize) -> Result<(), BenchError> {
    Ok(kernel().resume(&thread(id)?)?)
}

pub fn thread_suspend(id: usize) -> Result<(), BenchError> {
    Ok(kernel().suspend(&thread(id)?)?)
}

pub fn thread_relinquish() {
    kernel().relinquish();
}

pub fn thread_sleep(ticks: u32) {
    kernel().sleep(ticks);
}

pub fn thread_delete(id: usize) -> Result<(), BenchError> {
    let t = thread(id)?;
    kernel().delete(&t)?;
    with_tables(|| THREADS.lock()[id] = None);
    Ok(())
}

/// Times the thread has been dispatched.
pub fn thread_runs(id: usize) -> Result<u32, BenchError> {
    Ok(thread(id)?.run_count())
}

pub fn thread_state(id: usize) -> Result<u8, BenchError> {
    Ok(thread(id)?.state())
}

// ----------------------------------------------------------------------
// Queues
// ----------------------------------------------------------------------

pub fn queue_create(id: usize) -> Result<(), BenchError> {
    ensure_tables();
    with_tables(|| {
        let mut table = QUEUES.lock();
        let slot = table.get_mut(id).ok_or(BenchError::BadId(id))?;
        if slot.is_some() {
            return Err(BenchError::Exists(id));
        }
        *slot = Some(Queue {
            messages: std::collections::VecDeque::with_capacity(QUEUE_CAPACITY),
        });
        Ok(())
    })
}

pub fn queue_send(id: usize, message: &Message) -> Result<(), BenchError> {
    with_tables(|| {
        let mut table = QUEUES.lock();
        let q = table
            .get_mut(id)
            .and_then(|s| s.as_mut())
            .ok_or(BenchError::BadId(id))?;
        if q.messages.len() >= QUEUE_CAPACITY {
            return Err(BenchError::QueueFull);
        }
        q.messages.push_back(*message);
        Ok(())
    })
}

pub fn queue_receive(id: usize) -> Result<Message, BenchError> {
    with_tables(|| {
        let mut table = QUEUES.lock();
        let q = table
            .get_mut(id)
            .and_then(|s| s.as_mut())
            .ok_or(BenchError::BadId(id))?;
        q.messages.pop_front().ok_or(BenchError::QueueEmpty)
    })
}

// ----------------------------------------------------------------------
// Semaphores
// ----------------------------------------------------------------------

pub fn semaphore_create(id: usize, initial: u32) -> Result<(), BenchError> {
    ensure_tables();
    with_tables(|| {
        let mut table = SEMAPHORES.lock();
        let slot = table.get_mut(id).ok_or(BenchError::BadId(id))?;
        if slot.is_some() {
            return Err(BenchError::Exists(id));
        }
        *slot = Some(initial);
        Ok(())
    })
}

/// Non-blocking take.
pub fn semaphore_get(id: usize) -> Result<(), BenchError> {
    with_tables(|| {
        let mut table = SEMAPHORES.lock();
        let count = table
            .get_mut(id)
            .and_then(|s| s.as_mut())
            .ok_or(BenchError::BadId(id))?;
        if *count == 0 {
            return Err(BenchError::Depleted);
        }
        *count -= 1;
        Ok(())
    })
}

pub fn semaphore_put(id: usize) -> Result<(), BenchError> {
    with_tables(|| {
        let mut table = SEMAPHORES.lock();
        let count = table
            .get_mut(id)
            .and_then(|s| s.as_mut())
            .ok_or(BenchError::BadId(id))?;
        *count += 1;
        Ok(())
    })
}

// ----------------------------------------------------------------------
// Memory pools
// ----------------------------------------------------------------------

pub fn pool_create(id: usize) -> Result<(), BenchError> {
    ensure_tables();
    with_tables(|| {
        let mut table = POOLS.lock();
        let slot = table.get_mut(id).ok_or(BenchError::BadId(id))?;
        if slot.is_some() {
            return Err(BenchError::Exists(id));
        }
        let free = (0..POOL_BLOCKS)
            .map(|_| Box::new([0u8; BLOCK_SIZE]))
            .collect();
        *slot = Some(Pool { free });
        Ok(())
    })
}

pub fn pool_allocate(id: usize) -> Result<Block, BenchError> {
    with_tables(|| {
        let mut table = POOLS.lock();
        let pool = table
            .get_mut(id)
            .and_then(|s| s.as_mut())
            .ok_or(BenchError::BadId(id))?;
        pool.free.pop().map(Block).ok_or(BenchError::PoolExhausted)
    })
}

pub fn pool_deallocate(id: usize, block: Block) -> Result<(), BenchError> {
    with_tables(|| {
        let mut table = POOLS.lock();
        let pool = table
            .get_mut(id)
            .and_then(|s| s.as_mut())
            .ok_or(BenchError::BadId(id))?;
        pool.free.push(block.0);
        Ok(())
    })
}

// ----------------------------------------------------------------------
// Interrupts and time
// ----------------------------------------------------------------------

pub fn interrupt_raise(vector: u32) {
    kernel().raise(vector);
}

pub fn interrupt_handler(vector: u32, handler: impl Fn(&Kernel) + Send + Sync + 'static) {
    kernel().handle_irq(vector, handler);
}

/// Ticks elapsed since the kernel started.
pub fn time_get() -> u64 {
    kernel().now()
}
