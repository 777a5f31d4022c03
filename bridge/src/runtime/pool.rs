//! Bounded pool of script runtimes
//!
//! Each runtime serves one command at a time. A semaphore bounds the number of
//! runtimes that are borrowed or being destroyed; idle runtimes wait in a queue
//! and are reused before new ones are created.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use error_stack::Report;
use strum::{AsRefStr, Display};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::process::{RuntimeFactory, ScriptRuntime};
use crate::config::PoolConfig;
use crate::error::{Error, Result};

/// Lifecycle of one pooled runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum RuntimeState {
    /// Waiting in the pool
    Idle,
    /// Held by a caller, no command in flight
    Borrowed,
    /// Running a command
    Executing,
    /// Broke during a command and must not be reused
    Failed,
    /// Terminated
    Destroyed,
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live runtimes, idle or borrowed
    pub total:     usize,
    /// Runtimes waiting in the pool
    pub idle:      usize,
    /// Runtimes held by callers
    pub in_use:    usize,
    /// Configured upper bound
    pub max_total: usize,
}

struct IdleRuntime {
    runtime:    Box<dyn ScriptRuntime>,
    idle_since: Instant,
}

struct PoolInner {
    config:  PoolConfig,
    factory: Arc<dyn RuntimeFactory>,
    permits: Arc<Semaphore>,
    idle:    Mutex<VecDeque<IdleRuntime>>,
    live:    AtomicUsize,
    closed:  AtomicBool,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleRuntime>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Terminate `runtime` off the caller's path; `permit` is held until it is gone
    fn destroy(self: &Arc<Self>, mut runtime: Box<dyn ScriptRuntime>, permit: Option<OwnedSemaphorePermit>) {
        let pid = runtime.pid();
        let grace = self.config.shutdown_grace();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(self);
                handle.spawn(async move {
                    runtime.terminate(grace).await;
                    pool.live.fetch_sub(1, Ordering::SeqCst);
                    debug!(pid, "Destroyed script runtime");
                    drop(permit);
                });
            }
            Err(_) => {
                // no executor left, kill-on-drop reaps the process
                drop(runtime);
                self.live.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }
        }
    }
}

/// Pool of script runtimes shared by every caller
#[derive(Clone)]
pub struct ScriptRuntimePool {
    inner: Arc<PoolInner>,
}

impl ScriptRuntimePool {
    /// Create an empty pool; runtimes are started on demand
    pub fn new(config: PoolConfig, factory: Arc<dyn RuntimeFactory>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_total.max(1)));
        Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                permits,
                idle: Mutex::new(VecDeque::new()),
                live: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig { &self.inner.config }

    /// Borrow a runtime, waiting up to the configured borrow timeout
    ///
    /// Fails with [`Error::PoolExhausted`] when no runtime frees up in time.
    pub async fn borrow(&self) -> Result<PooledRuntime> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(Report::new(Error::failed_to("borrow script runtime", "pool is closed")));
        }

        let wait = inner.config.borrow_timeout();
        let permit = match tokio::time::timeout(wait, Arc::clone(&inner.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(Report::new(Error::failed_to("borrow script runtime", "pool is closed")));
            }
            Err(_) => {
                warn!(max_total = inner.config.max_total, "Script runtime pool exhausted");
                return Err(Report::new(Error::PoolExhausted(format!(
                    "no script runtime became available within {}s",
                    wait.as_secs()
                ))));
            }
        };

        let reused = inner.idle().pop_front();
        let runtime = match reused {
            Some(idle) => idle.runtime,
            None => {
                let runtime = inner.factory.create().await?;
                inner.live.fetch_add(1, Ordering::SeqCst);
                debug!(pid = runtime.pid(), "Created script runtime");
                runtime
            }
        };

        Ok(PooledRuntime {
            runtime: Some(runtime),
            state:   RuntimeState::Borrowed,
            permit:  Some(permit),
            pool:    Arc::clone(inner),
        })
    }

    /// Run one command on a pooled runtime and return its response frame
    pub async fn execute(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let mut runtime = self.borrow().await?;
        let result = runtime.execute(frame).await;
        runtime.release();
        result
    }

    /// Destroy idle runtimes unused for at least the minimum evictable idle time
    ///
    /// Returns how many runtimes were evicted.
    pub fn evict_idle(&self) -> usize {
        let min_idle = self.inner.config.min_evictable_idle();
        let evicted: Vec<IdleRuntime> = {
            let mut idle = self.inner.idle();
            let (stale, fresh): (VecDeque<_>, VecDeque<_>) = idle
                .drain(..)
                .partition(|entry| entry.idle_since.elapsed() >= min_idle);
            *idle = fresh;
            stale.into_iter().collect()
        };

        let count = evicted.len();
        for entry in evicted {
            self.inner.destroy(entry.runtime, None);
        }
        if count > 0 {
            debug!(count, "Evicted idle script runtimes");
        }
        count
    }

    /// Run [`Self::evict_idle`] every eviction interval until the pool is dropped or closed
    pub fn spawn_evictor(&self) -> JoinHandle<()> {
        let pool: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.eviction_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = pool.upgrade() else { break };
                if inner.closed.load(Ordering::SeqCst) {
                    break;
                }
                Self { inner }.evict_idle();
            }
        })
    }

    /// Current occupancy
    pub fn status(&self) -> PoolStatus {
        let idle = self.inner.idle().len();
        let total = self.inner.live.load(Ordering::SeqCst);
        PoolStatus {
            total,
            idle,
            in_use: total.saturating_sub(idle),
            max_total: self.inner.config.max_total,
        }
    }

    /// Refuse new borrows and terminate every idle runtime
    ///
    /// Borrowed runtimes are destroyed when they are released.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.permits.close();
        let idle: Vec<IdleRuntime> = self.inner.idle().drain(..).collect();
        let grace = self.inner.config.shutdown_grace();
        for mut entry in idle {
            entry.runtime.terminate(grace).await;
            self.inner.live.fetch_sub(1, Ordering::SeqCst);
        }
        info!("Script runtime pool closed");
    }
}

/// A runtime exclusively held by one caller
///
/// Dropping it returns the runtime to the pool, or destroys it when it failed.
pub struct PooledRuntime {
    runtime: Option<Box<dyn ScriptRuntime>>,
    state:   RuntimeState,
    permit:  Option<OwnedSemaphorePermit>,
    pool:    Arc<PoolInner>,
}

impl PooledRuntime {
    /// Run one command with the pool's read timeout
    pub async fn execute(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let timeout = self.pool.config.read_timeout();
        let Some(runtime) = self.runtime.as_mut() else {
            return Err(Report::new(Error::failed_to("execute command", "runtime already released")));
        };

        self.state = RuntimeState::Executing;
        let result = runtime.execute(frame, timeout).await;
        self.state = if result.is_ok() && runtime.is_reusable() {
            RuntimeState::Borrowed
        } else {
            RuntimeState::Failed
        };
        result
    }

    /// Current lifecycle state
    pub const fn state(&self) -> RuntimeState { self.state }

    /// OS process id of the runtime
    pub fn pid(&self) -> Option<u32> { self.runtime.as_ref().and_then(|runtime| runtime.pid()) }

    /// Hand the runtime back to the pool
    pub fn release(mut self) { self.give_back(); }

    fn give_back(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let permit = self.permit.take();
        let pool = &self.pool;

        // a command cancelled mid-flight leaves unread output behind
        let reusable = self.state == RuntimeState::Borrowed
            && runtime.is_reusable()
            && !pool.closed.load(Ordering::SeqCst);
        if reusable {
            let mut idle = pool.idle();
            if idle.len() < pool.config.max_idle {
                idle.push_back(IdleRuntime {
                    runtime,
                    idle_since: Instant::now(),
                });
                drop(idle);
                self.state = RuntimeState::Idle;
                drop(permit);
                return;
            }
        }

        debug!(pid = runtime.pid(), state = %self.state, "Retiring script runtime");
        self.state = RuntimeState::Destroyed;
        pool.destroy(runtime, permit);
    }
}

impl Drop for PooledRuntime {
    fn drop(&mut self) { self.give_back(); }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "fixtures must build")]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct Counters {
        created:    AtomicUsize,
        terminated: AtomicUsize,
    }

    struct FakeRuntime {
        healthy:  bool,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl ScriptRuntime for FakeRuntime {
        async fn execute(&mut self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>> {
            match frame {
                b"fail" => {
                    self.healthy = false;
                    Err(Report::new(Error::RuntimeProtocol("boom".to_string())))
                }
                b"hang" => {
                    tokio::time::sleep(timeout).await;
                    self.healthy = false;
                    Err(Report::new(Error::RuntimeProtocol("timed out".to_string())))
                }
                other => Ok(other.to_vec()),
            }
        }

        fn is_reusable(&self) -> bool { self.healthy }

        async fn terminate(&mut self, _grace: Duration) {
            self.counters.terminated.fetch_add(1, Ordering::SeqCst);
        }

        fn pid(&self) -> Option<u32> { None }
    }

    struct FakeFactory {
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl RuntimeFactory for FakeFactory {
        async fn create(&self) -> Result<Box<dyn ScriptRuntime>> {
            self.counters.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeRuntime {
                healthy:  true,
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    fn pool(config: PoolConfig) -> (ScriptRuntimePool, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let factory = Arc::new(FakeFactory {
            counters: Arc::clone(&counters),
        });
        (ScriptRuntimePool::new(config, factory), counters)
    }

    fn config(max_total: usize) -> PoolConfig {
        PoolConfig {
            max_total,
            max_idle: max_total,
            borrow_timeout_secs: 1,
            read_timeout_secs: 1,
            ..PoolConfig::default()
        }
    }

    async fn settle() { tokio::time::sleep(Duration::from_millis(50)).await; }

    #[tokio::test]
    async fn test_runtimes_are_reused() {
        let (pool, counters) = pool(config(2));
        for _ in 0..3 {
            let response = pool.execute(b"hello").await.expect("echo");
            assert_eq!(response, b"hello".to_vec());
        }
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        let status = pool.status();
        assert_eq!((status.total, status.idle, status.in_use), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_failed_runtime_is_destroyed() {
        let (pool, counters) = pool(config(1));
        assert!(pool.execute(b"fail").await.is_err());
        settle().await;
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().total, 0);

        assert!(pool.execute(b"again").await.is_ok());
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_fails_after_wait_bound() {
        let (pool, _) = pool(config(1));
        let held = pool.borrow().await.expect("first borrow");
        assert_eq!(held.state(), RuntimeState::Borrowed);

        let started = Instant::now();
        let result = pool.execute(b"second").await;
        assert!(started.elapsed() >= Duration::from_millis(900));
        let error = result.expect_err("pool is exhausted");
        assert!(matches!(error.current_context(), Error::PoolExhausted(_)));
        assert!(error.current_context().is_retryable());

        held.release();
        assert!(pool.execute(b"third").await.is_ok());
    }

    #[tokio::test]
    async fn test_waiting_borrow_proceeds_on_release() {
        let (pool, counters) = pool(config(1));
        let held = pool.borrow().await.expect("first borrow");
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.execute(b"queued").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        held.release();

        let response = waiter.await.expect("join").expect("queued command");
        assert_eq!(response, b"queued".to_vec());
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_runtime_is_not_reused() {
        let (pool, counters) = pool(config(1));
        let mut runtime = pool.borrow().await.expect("borrow");
        assert!(runtime.execute(b"hang").await.is_err());
        assert_eq!(runtime.state(), RuntimeState::Failed);
        drop(runtime);
        settle().await;
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idle_watermark_and_eviction() {
        let (pool, counters) = pool(PoolConfig {
            max_idle: 1,
            min_evictable_idle_secs: 0,
            ..config(3)
        });
        let first = pool.borrow().await.expect("first");
        let second = pool.borrow().await.expect("second");
        first.release();
        second.release();
        settle().await;
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().idle, 1);

        assert_eq!(pool.evict_idle(), 1);
        settle().await;
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status().total, 0);
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_borrows() {
        let (pool, counters) = pool(config(1));
        assert!(pool.execute(b"warm").await.is_ok());
        pool.close().await;
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
        assert!(pool.borrow().await.is_err());
    }
}
