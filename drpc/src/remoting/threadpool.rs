//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Worker pools.
//!
//! An [`Executor`] runs jobs on a bounded set of worker tasks with the
//! admission rules of a classic thread pool: up to `core` workers are
//! started eagerly, then jobs queue, and only when the queue refuses a job
//! does the pool grow towards `max`. A job that finds the pool at `max`
//! with a full queue is rejected with a report of the pool state.

use crate::common::{constants, Url};
use crate::remoting::RemotingError;
use crate::spi;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// A unit of work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How an [`Executor`] queues jobs no worker is free for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// No queue; a job is only accepted when a worker is idle or can be
    /// started.
    Handoff,
    /// At most this many queued jobs.
    Bounded(usize),
    /// Any number of queued jobs; the pool never grows past `core`.
    Unbounded,
}

impl QueueKind {
    /// Maps the `queues` parameter: `0` hand-off, negative unbounded.
    pub fn from_queues(queues: i64) -> Self {
        match queues {
            0 => Self::Handoff,
            n if n < 0 => Self::Unbounded,
            n => Self::Bounded(n as usize),
        }
    }
}

#[derive(Default)]
struct PoolState {
    workers: usize,
    idle: usize,
    largest: usize,
    queue: VecDeque<Job>,
}

/// A pool of worker tasks.
pub struct Executor {
    name: String,
    url: Url,
    core: usize,
    max: usize,
    keep_alive: Option<Duration>,
    queue_kind: QueueKind,
    state: Mutex<PoolState>,
    available: Notify,
    shutdown: AtomicBool,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name)
            .field("core", &self.core)
            .field("max", &self.max)
            .field("queue", &self.queue_kind)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates a pool. `keep_alive` of `None` keeps idle workers forever.
    pub fn new(
        name: impl Into<String>,
        url: Url,
        core: usize,
        max: usize,
        queue_kind: QueueKind,
        keep_alive: Option<Duration>,
    ) -> Arc<Self> {
        let max = max.max(1);
        Arc::new(Self {
            name: name.into(),
            url,
            core: core.min(max),
            max,
            keep_alive,
            queue_kind,
            state: Mutex::new(PoolState::default()),
            available: Notify::new(),
            shutdown: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        })
    }

    /// A single worker running jobs in submission order.
    pub fn ordered(name: impl Into<String>, url: Url) -> Arc<Self> {
        Self::new(name, url, 1, 1, QueueKind::Unbounded, None)
    }

    /// Submits `job`.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::ExecutionRejected`] when the pool is shut
    /// down or exhausted.
    pub fn execute<F>(self: &Arc<Self>, job: F) -> Result<(), RemotingError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Box::pin(job);
        let mut state = self.state.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return Err(RemotingError::ExecutionRejected {
                message: format!("Executor {} is shut down", self.name),
            });
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);

        if state.workers < self.core {
            self.start_worker(&mut state, Some(job));
            return Ok(());
        }

        let queued = match self.queue_kind {
            QueueKind::Handoff => state.idle > state.queue.len(),
            QueueKind::Bounded(capacity) => state.queue.len() < capacity,
            QueueKind::Unbounded => true,
        };
        if queued {
            state.queue.push_back(job);
            if state.workers == 0 {
                self.start_worker(&mut state, None);
            }
            drop(state);
            self.available.notify_one();
            return Ok(());
        }

        if state.workers < self.max {
            self.start_worker(&mut state, Some(job));
            return Ok(());
        }

        let report = self.report(&state);
        drop(state);
        self.submitted.fetch_sub(1, Ordering::Relaxed);
        warn!(pool = %self.name, "{report}");
        Err(RemotingError::ExecutionRejected { message: report })
    }

    fn start_worker(self: &Arc<Self>, state: &mut PoolState, first: Option<Job>) {
        state.workers += 1;
        state.largest = state.largest.max(state.workers);
        tokio::spawn(self.clone().run_worker(first));
    }

    async fn run_worker(self: Arc<Self>, mut next: Option<Job>) {
        loop {
            if let Some(job) = next.take() {
                if let Err(err) = tokio::spawn(job).await {
                    error!(pool = %self.name, error = %err, "job panicked");
                }
                self.completed.fetch_add(1, Ordering::Relaxed);
            }

            // Created before the shutdown check so a `notify_waiters` issued
            // after it is not lost.
            let notified = self.available.notified();
            tokio::pin!(notified);
            {
                let mut state = self.state.lock();
                if let Some(job) = state.queue.pop_front() {
                    next = Some(job);
                    continue;
                }
                notified.as_mut().enable();
                if self.shutdown.load(Ordering::Acquire) {
                    state.workers -= 1;
                    return;
                }
                state.idle += 1;
            }

            let woken = match self.keep_alive {
                Some(keep_alive) => tokio::time::timeout(keep_alive, notified).await.is_ok(),
                None => {
                    notified.await;
                    true
                }
            };

            let mut state = self.state.lock();
            state.idle -= 1;
            let expired = !woken && state.queue.is_empty() && state.workers > self.core;
            if expired || (self.shutdown.load(Ordering::Acquire) && state.queue.is_empty()) {
                state.workers -= 1;
                debug!(pool = %self.name, workers = state.workers, "worker retired");
                return;
            }
        }
    }

    fn report(&self, state: &PoolState) -> String {
        let active = state.workers - state.idle.min(state.workers);
        let shutdown = self.shutdown.load(Ordering::Acquire);
        format!(
            "Thread pool is EXHAUSTED! Thread Name: {}, Pool Size: {} (active: {}, core: {}, max: {}, largest: {}), \
             Task: {} (completed: {}), Executor status:(isShutdown:{}, isTerminated:{}), in {}://{}:{}!",
            self.name,
            state.workers,
            active,
            self.core,
            self.max,
            state.largest,
            self.submitted.load(Ordering::Relaxed),
            self.completed.load(Ordering::Relaxed),
            shutdown,
            shutdown && state.workers == 0,
            self.url.protocol(),
            self.url.host(),
            self.url.port(),
        )
    }

    /// Number of live workers.
    pub fn pool_size(&self) -> usize {
        self.state.lock().workers
    }

    /// Number of queued jobs.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of finished jobs.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Rejects new jobs; queued jobs still run.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.available.notify_waiters();
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Creates the worker pool of a server or client.
#[spi(name = "drpc.remoting.ThreadPool", default = "fixed")]
pub trait ThreadPool: Send + Sync {
    /// Creates a pool configured by `url`.
    #[adaptive("threadpool")]
    fn executor(&self, url: &Url) -> Result<Arc<Executor>, RemotingError>;
}

fn thread_name(url: &Url) -> String {
    format!(
        "{}-{}",
        url.parameter_or(constants::THREAD_NAME_KEY, constants::DEFAULT_THREAD_NAME),
        url.address()
    )
}

/// `threads` workers, always alive, with a `queues` sized queue.
#[derive(Debug, Default)]
pub struct FixedThreadPool;

impl ThreadPool for FixedThreadPool {
    fn executor(&self, url: &Url) -> Result<Arc<Executor>, RemotingError> {
        let threads = url.get(constants::THREADS_KEY, constants::DEFAULT_THREADS);
        let queues = url.get(constants::QUEUES_KEY, constants::DEFAULT_QUEUES);
        Ok(Executor::new(
            thread_name(url),
            url.clone(),
            threads,
            threads,
            QueueKind::from_queues(queues),
            None,
        ))
    }
}

/// Grows up to `threads` workers; workers idle for `alive` ms retire.
#[derive(Debug, Default)]
pub struct CachedThreadPool;

impl ThreadPool for CachedThreadPool {
    fn executor(&self, url: &Url) -> Result<Arc<Executor>, RemotingError> {
        let cores = url.get(constants::CORE_THREADS_KEY, constants::DEFAULT_CORE_THREADS);
        let threads = url.get(constants::THREADS_KEY, usize::MAX);
        let queues = url.get(constants::QUEUES_KEY, constants::DEFAULT_QUEUES);
        let alive = url.get(constants::ALIVE_KEY, constants::DEFAULT_ALIVE);
        Ok(Executor::new(
            thread_name(url),
            url.clone(),
            cores,
            threads,
            QueueKind::from_queues(queues),
            Some(Duration::from_millis(alive)),
        ))
    }
}

/// Grows up to `threads` workers and never shrinks.
#[derive(Debug, Default)]
pub struct LimitedThreadPool;

impl ThreadPool for LimitedThreadPool {
    fn executor(&self, url: &Url) -> Result<Arc<Executor>, RemotingError> {
        let cores = url.get(constants::CORE_THREADS_KEY, constants::DEFAULT_CORE_THREADS);
        let threads = url.get(constants::THREADS_KEY, constants::DEFAULT_THREADS);
        let queues = url.get(constants::QUEUES_KEY, constants::DEFAULT_QUEUES);
        Ok(Executor::new(
            thread_name(url),
            url.clone(),
            cores,
            threads,
            QueueKind::from_queues(queues),
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    fn url() -> Url {
        Url::parse("dubbo://127.0.0.1:20880/demo").unwrap()
    }

    #[test]
    fn test_queue_kind() {
        assert_eq!(QueueKind::from_queues(0), QueueKind::Handoff);
        assert_eq!(QueueKind::from_queues(-1), QueueKind::Unbounded);
        assert_eq!(QueueKind::from_queues(5), QueueKind::Bounded(5));
    }

    #[tokio::test]
    async fn test_runs_jobs() {
        let pool = Executor::new("test", url(), 2, 2, QueueKind::Unbounded, None);
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        for i in 0..10 {
            let counter = counter.clone();
            let done = if i == 9 { tx.take() } else { None };
            pool.execute(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(done) = done {
                    let _ = done.send(());
                }
            })
            .unwrap();
        }
        rx.await.unwrap();
        assert!(pool.pool_size() <= 2);
    }

    #[tokio::test]
    async fn test_rejects_when_exhausted() {
        let pool = Executor::new("busy", url(), 1, 1, QueueKind::Handoff, None);
        let (release, wait) = oneshot::channel::<()>();
        pool.execute(async move {
            let _ = wait.await;
        })
        .unwrap();
        let err = pool.execute(async {}).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Thread pool is EXHAUSTED"));
        assert!(message.contains("dubbo://127.0.0.1:20880"));
        let _ = release.send(());
    }

    #[tokio::test]
    async fn test_bounded_queue_then_grow() {
        let pool = Executor::new("grow", url(), 1, 2, QueueKind::Bounded(1), None);
        let (release_a, wait_a) = oneshot::channel::<()>();
        let (release_b, wait_b) = oneshot::channel::<()>();
        pool.execute(async move {
            let _ = wait_a.await;
        })
        .unwrap();
        // queued
        pool.execute(async {}).unwrap();
        // queue full: grows to max
        pool.execute(async move {
            let _ = wait_b.await;
        })
        .unwrap();
        assert_eq!(pool.pool_size(), 2);
        assert!(pool.execute(async {}).is_err());
        let _ = release_a.send(());
        let _ = release_b.send(());
    }

    #[tokio::test]
    async fn test_shutdown_rejects() {
        let pool = FixedThreadPool.executor(&url()).unwrap();
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(pool.execute(async {}).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_retires_idle_workers() {
        let pool = Executor::new("idle", url(), 3, 3, QueueKind::Unbounded, None);
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            pool.execute(async move {
                let _ = tx.send(());
            })
            .unwrap();
            rx.await.unwrap();
        }
        assert_eq!(pool.pool_size(), 3);
        pool.shutdown();
        let retired = async {
            while pool.pool_size() > 0 {
                tokio::task::yield_now().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), retired).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_workers_retire() {
        let url = url().with_parameter(constants::ALIVE_KEY, 100);
        let pool = CachedThreadPool.executor(&url).unwrap();
        let (tx, rx) = oneshot::channel();
        pool.execute(async move {
            let _ = tx.send(());
        })
        .unwrap();
        rx.await.unwrap();
        assert_eq!(pool.pool_size(), 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(pool.pool_size(), 0);
    }
}
