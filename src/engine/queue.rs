// ossbridge - object storage adapters for file-oriented access
// Copyright 2025 ossbridge developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded multi-consumer work queue feeding the worker pool.
//!
//! Producers block while the queue is at capacity, giving the submission
//! path its back-pressure.  Closing the queue wakes every waiter so the
//! pool can shut down without leaking blocked callers.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Semaphore;

pub struct HandlerQueue<T> {
    ops: Mutex<VecDeque<T>>,
    /// Permits for free slots; producers take one per enqueue.
    space: Semaphore,
    /// Permits for queued items; consumers take one per dequeue.
    items: Semaphore,
}

impl<T> HandlerQueue<T> {
    pub fn new(max_pending: usize) -> Self {
        HandlerQueue {
            ops: Mutex::new(VecDeque::new()),
            space: Semaphore::new(max_pending),
            items: Semaphore::new(0),
        }
    }

    /// Enqueues an item, waiting while the queue is full.
    ///
    /// Returns the item back if the queue has been closed.
    pub async fn produce(&self, item: T) -> Result<(), T> {
        match self.space.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(item),
        }
        self.ops.lock().unwrap().push_back(item);
        self.items.add_permits(1);
        Ok(())
    }

    /// Dequeues the next item, waiting until one arrives.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn consume(&self) -> Option<T> {
        match self.items.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return self.take(),
        }
        self.space.add_permits(1);
        self.ops.lock().unwrap().pop_front()
    }

    /// Dequeues the next item if one is immediately available.
    pub fn try_consume(&self) -> Option<T> {
        match self.items.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(tokio::sync::TryAcquireError::Closed) => return self.take(),
            Err(tokio::sync::TryAcquireError::NoPermits) => return None,
        }
        self.space.add_permits(1);
        self.ops.lock().unwrap().pop_front()
    }

    /// Closes the queue: producers fail, consumers drain what remains.
    pub fn close(&self) {
        self.space.close();
        self.items.close();
    }

    fn take(&self) -> Option<T> {
        self.ops.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
