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

//! The asynchronous HTTP request engine.
//!
//! A fixed pool of worker tasks drains one bounded submission queue.
//! Each worker owns a single HTTP client and multiplexes up to its cap of
//! concurrent transfers.  Streaming uploads feed the worker through a
//! bounded chunk channel: the producer blocks on send until the worker
//! has drained the previous chunk, which is the pause/resume protocol of
//! the transfer.

pub mod queue;
pub mod request;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::queue::HandlerQueue;
use crate::engine::request::{
    ActiveRequest, HttpResponse, PendingRequest, Request, RequestBody, RequestState,
    StreamingHandle,
};
use crate::oss::error::{Error, Result};
use crate::oss::logging::LogMask;

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Bound of the submission queue; producers block beyond this.
    pub max_pending: usize,
    /// Concurrent transfers per worker.
    pub max_ops_per_worker: usize,
    /// Cadence of the worker's poll and of the stall checks.
    pub poll_interval: Duration,
    /// Cadence of the per-worker activity log line.
    pub marker_period: Duration,
    /// No byte movement for this long fails the transfer.
    pub transfer_stall: Duration,
    /// `tick` fails a streaming request whose producer has been silent
    /// for this long.
    pub streaming_timeout: Duration,
    /// Gates the engine's debug-level log paths.
    pub mask: LogMask,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: 5,
            max_pending: 20,
            max_ops_per_worker: 20,
            poll_interval: Duration::from_millis(50),
            marker_period: Duration::from_secs(5),
            transfer_stall: Duration::from_secs(9),
            streaming_timeout: Duration::from_secs(10),
            mask: LogMask::default_mask(),
        }
    }
}

/// The worker pool.  One per process is the expected deployment; the
/// lifecycle is explicit: [`Engine::start`] / [`Engine::shutdown`].
pub struct Engine {
    cfg: EngineConfig,
    queue: Arc<HandlerQueue<ActiveRequest>>,
    registry: Arc<DashMap<u64, Arc<RequestState>>>,
    next_id: AtomicU64,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn start(cfg: EngineConfig) -> Result<Arc<Engine>> {
        let queue = Arc::new(HandlerQueue::new(cfg.max_pending));
        let registry = Arc::new(DashMap::new());

        let mut handles = Vec::with_capacity(cfg.workers);
        for idx in 0..cfg.workers {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| Error::TransportSetup(e.to_string()))?;
            handles.push(tokio::spawn(worker::run_worker(
                idx,
                client,
                Arc::clone(&queue),
                Arc::clone(&registry),
                cfg,
            )));
        }

        Ok(Arc::new(Engine {
            cfg,
            queue,
            registry,
            next_id: AtomicU64::new(1),
            handles: std::sync::Mutex::new(handles),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Queues a request and returns immediately with a completion handle.
    ///
    /// Blocks only for queue back-pressure.
    pub async fn submit(&self, request: Request, body: RequestBody) -> Result<PendingRequest> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(RequestState::new(id, body.is_streaming()));
        self.registry.insert(id, Arc::clone(&state));

        let (done_tx, done_rx) = oneshot::channel();
        let active = ActiveRequest {
            request,
            body,
            state: Arc::clone(&state),
            done: done_tx,
        };
        if self.queue.produce(active).await.is_err() {
            self.registry.remove(&id);
            return Err(Error::Internal("request engine is shut down".into()));
        }
        Ok(PendingRequest {
            state,
            done: done_rx,
        })
    }

    /// Queues a request and blocks until it completes.
    pub async fn execute(&self, request: Request, body: RequestBody) -> Result<HttpResponse> {
        self.submit(request, body).await?.wait().await
    }

    /// Starts a streaming upload.  The returned handle feeds body chunks;
    /// the pending request resolves once the final chunk has been sent
    /// and the server replied.
    pub async fn execute_streaming(
        &self,
        request: Request,
        content_length: Option<u64>,
    ) -> Result<(StreamingHandle, PendingRequest)> {
        let (tx, rx) = mpsc::channel(1);
        let pending = self
            .submit(request, RequestBody::Streaming { rx, content_length })
            .await?;
        let handle = StreamingHandle {
            tx,
            state: Arc::clone(&pending.state),
        };
        Ok((handle, pending))
    }

    /// Producer-stall sweep, intended to be called periodically by an
    /// outside scheduler.  Fails every streaming request whose producer
    /// has been silent longer than the configured inactivity timeout.
    pub fn tick(&self, now_millis: i64) {
        let limit = self.cfg.streaming_timeout.as_millis() as i64;
        for entry in self.registry.iter() {
            let state = entry.value();
            if !state.streaming || state.is_timed_out() {
                continue;
            }
            let last = state.last_producer.load(Ordering::Relaxed);
            if now_millis - last > limit {
                if self.cfg.mask.debug_enabled() {
                    log::debug!("request {} timed out waiting for its producer", state.id);
                }
                state.mark_timed_out();
            }
        }
    }

    /// Closes the queue and joins the workers.  In-flight transfers run
    /// to completion (or to their stall timeout) first.
    pub async fn shutdown(&self) {
        self.queue.close();
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Number of requests queued or in flight.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod engine_tests;
