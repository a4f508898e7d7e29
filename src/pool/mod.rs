//! Worker pool (C4): a fixed number of browser workers behind a single
//! coordinator task. Per "Back-references and ownership", workers never hold
//! a pointer back to the pool — a leased worker carries only its id and a
//! handle to the coordinator's command channel, and every state transition
//! happens inside the coordinator loop.
//!
//! Grounded on the teacher's single-writer `credential_mutex: Arc<Mutex<()>>`
//! pattern (`credential_cache.rs`, captured in the ledger before deletion),
//! generalized here from a single mutex into a full actor so FIFO lease
//! ordering and asynchronous recycling (per "Recycling as asynchronous
//! task") are both expressible.

pub mod worker;

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::config::ChromeSection;
use crate::error::AppError;
use crate::render::engine::{ChromiumEngine, RenderEngine};

use worker::{should_recycle, WorkerMeta};

const DEFAULT_ADMISSION_WINDOW: Duration = Duration::from_secs(3);

/// Launches and warms up one worker. Production code always uses
/// [`chromium_factory`]; tests substitute a factory that builds
/// `render::engine::FakeEngine`s so pool behavior (FIFO leasing, recycling,
/// drain) is exercised without a real Chromium binary.
pub type WorkerFactory =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Arc<dyn RenderEngine>, AppError>> + Send>> + Send + Sync>;

pub fn chromium_factory(chrome: ChromeSection) -> WorkerFactory {
    Arc::new(move || {
        let chrome = chrome.clone();
        Box::pin(async move {
            let engine = launch_and_warm(&chrome).await?;
            Ok(Arc::new(engine) as Arc<dyn RenderEngine>)
        })
    })
}

/// A leased worker: just an id plus an `Arc` to the engine, and a handle back
/// to the coordinator for returning it. No pointer into the pool's internals.
pub struct LeasedWorker {
    pub id: u32,
    pub engine: Arc<dyn RenderEngine>,
    returned: bool,
    pool: PoolHandle,
}

impl LeasedWorker {
    /// Returns the worker to the pool, flagging it broken if the caller
    /// observed an unrecoverable engine error during the render.
    pub fn release(mut self, broken: bool) {
        self.returned = true;
        self.pool.return_worker(self.id, broken);
    }
}

impl Drop for LeasedWorker {
    fn drop(&mut self) {
        if !self.returned {
            self.pool.return_worker(self.id, true);
        }
    }
}

enum Command {
    Lease {
        request_id: u64,
        respond_to: oneshot::Sender<Result<(u32, Arc<dyn RenderEngine>), AppError>>,
    },
    CancelLease {
        request_id: u64,
    },
    Return {
        worker_id: u32,
        broken: bool,
    },
    WorkerReady {
        worker_id: u32,
        engine: Arc<dyn RenderEngine>,
    },
    WorkerDead {
        worker_id: u32,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
    Stats {
        respond_to: oneshot::Sender<PoolStats>,
    },
}

/// Snapshot of pool occupancy, used by the liveness endpoint.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub idle: usize,
    pub leased: usize,
    pub pool_size: usize,
}

/// Cheap, cloneable handle to the pool's coordinator. This is what a
/// [`LeasedWorker`] holds instead of a back-pointer into the pool.
#[derive(Clone)]
pub struct PoolHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_request_id: Arc<AtomicU64>,
}

impl PoolHandle {
    /// Leases the first idle worker, waiting up to `admission_window` if none
    /// is immediately free. FIFO among concurrent waiters.
    pub async fn lease(&self, admission_window: Duration) -> Result<LeasedWorker, AppError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Lease {
                request_id,
                respond_to: tx,
            })
            .map_err(|_| AppError::pool_shutting_down("pool coordinator is gone"))?;

        match tokio::time::timeout(admission_window, rx).await {
            Ok(Ok(Ok((id, engine)))) => Ok(LeasedWorker {
                id,
                engine,
                returned: false,
                pool: self.clone(),
            }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(AppError::pool_shutting_down("pool coordinator is gone")),
            Err(_) => {
                let _ = self.commands.send(Command::CancelLease { request_id });
                Err(AppError::pool_exhausted("no worker became available within the admission window"))
            }
        }
    }

    fn return_worker(&self, worker_id: u32, broken: bool) {
        let _ = self.commands.send(Command::Return { worker_id, broken });
    }

    pub async fn stats(&self) -> PoolStats {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stats { respond_to: tx }).is_err() {
            return PoolStats { idle: 0, leased: 0, pool_size: 0 };
        }
        rx.await.unwrap_or(PoolStats { idle: 0, leased: 0, pool_size: 0 })
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { respond_to: tx }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Owns the coordinator task. `handle()` is cloned into request handlers;
/// dropping the `Pool` does not stop the coordinator — call `shutdown` first.
pub struct Pool {
    handle: PoolHandle,
}

impl Pool {
    /// Launches `chrome.pool_size` real Chromium workers and starts the
    /// coordinator task.
    pub async fn start(chrome: ChromeSection) -> Result<Self, AppError> {
        let factory = chromium_factory(chrome.clone());
        Self::start_with_factory(chrome, factory).await
    }

    /// Same as [`Self::start`] but with an injectable worker factory, used by
    /// tests to stand up a pool backed by `FakeEngine`.
    pub async fn start_with_factory(chrome: ChromeSection, factory: WorkerFactory) -> Result<Self, AppError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PoolHandle {
            commands: tx,
            next_request_id: Arc::new(AtomicU64::new(0)),
        };

        let pool_size = chrome.pool_size as u32;
        let mut workers = HashMap::new();
        for id in 0..pool_size {
            let engine = factory().await?;
            workers.insert(id, WorkerMeta::new(engine));
        }

        let coordinator = Coordinator {
            chrome,
            factory,
            pool_size: pool_size as usize,
            workers,
            idle: (0..pool_size).collect(),
            leased: Default::default(),
            waiters: VecDeque::new(),
            draining: false,
            cmd_tx: handle.commands.clone(),
        };

        tokio::spawn(coordinator.run(rx));

        Ok(Self { handle })
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }
}

async fn launch_and_warm(chrome: &ChromeSection) -> Result<ChromiumEngine, AppError> {
    let engine = ChromiumEngine::launch(chrome).await?;
    engine
        .warm_up(&chrome.warmup_url, Duration::from_secs(10))
        .await?;
    Ok(engine)
}

struct Coordinator {
    chrome: ChromeSection,
    factory: WorkerFactory,
    pool_size: usize,
    workers: HashMap<u32, WorkerMeta>,
    idle: VecDeque<u32>,
    leased: HashSet<u32>,
    waiters: VecDeque<(u64, oneshot::Sender<Result<(u32, Arc<dyn RenderEngine>), AppError>>)>,
    draining: bool,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Lease { request_id, respond_to } => self.on_lease(request_id, respond_to),
                Command::CancelLease { request_id } => {
                    self.waiters.retain(|(id, _)| *id != request_id);
                }
                Command::Return { worker_id, broken } => self.on_return(worker_id, broken),
                Command::WorkerReady { worker_id, engine } => {
                    self.workers.insert(worker_id, WorkerMeta::new(engine));
                    self.grant_or_idle(worker_id);
                }
                Command::WorkerDead { worker_id } => {
                    tracing::error!(worker_id, "worker failed to relaunch after recycling");
                }
                Command::Stats { respond_to } => {
                    let _ = respond_to.send(PoolStats {
                        idle: self.idle.len(),
                        leased: self.leased.len(),
                        pool_size: self.pool_size,
                    });
                }
                Command::Shutdown { respond_to } => {
                    self.draining = true;
                    for (_, waiter) in self.waiters.drain(..) {
                        let _ = waiter.send(Err(AppError::pool_shutting_down("pool is shutting down")));
                    }
                    let deadline = Instant::now() + Duration::from_secs(self.chrome.shutdown_timeout);
                    while !self.leased.is_empty() && Instant::now() < deadline {
                        tokio::select! {
                            Some(next) = rx.recv() => self.handle_during_drain(next),
                            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                        }
                    }
                    for (_, meta) in self.workers.drain() {
                        let engine = meta.engine;
                        drop(engine);
                    }
                    let _ = respond_to.send(());
                    return;
                }
            }
        }
    }

    fn handle_during_drain(&mut self, command: Command) {
        if let Command::Return { worker_id, .. } = command {
            self.leased.remove(&worker_id);
            self.workers.remove(&worker_id);
        }
    }

    fn on_lease(&mut self, request_id: u64, respond_to: oneshot::Sender<Result<(u32, Arc<dyn RenderEngine>), AppError>>) {
        if self.draining {
            let _ = respond_to.send(Err(AppError::pool_shutting_down("pool is shutting down")));
            return;
        }
        if let Some(id) = self.idle.pop_front() {
            self.leased.insert(id);
            let engine = self.workers.get(&id).expect("idle worker missing from map").engine.clone();
            let _ = respond_to.send(Ok((id, engine)));
        } else {
            self.waiters.push_back((request_id, respond_to));
        }
    }

    fn on_return(&mut self, worker_id: u32, broken: bool) {
        self.leased.remove(&worker_id);
        let Some(meta) = self.workers.get_mut(&worker_id) else {
            return;
        };
        meta.use_count += 1;

        let max_uses = self.chrome.restart_after_count;
        let max_age = Duration::from_secs(self.chrome.restart_after_time);

        if should_recycle(meta, broken, max_uses, max_age) {
            self.workers.remove(&worker_id);
            self.spawn_recycle(worker_id);
        } else {
            self.grant_or_idle(worker_id);
        }
    }

    /// If a waiter is queued, hands the worker straight to it (preserving
    /// FIFO across lease/return); otherwise parks it idle.
    fn grant_or_idle(&mut self, worker_id: u32) {
        while let Some((_, waiter)) = self.waiters.pop_front() {
            let Some(meta) = self.workers.get(&worker_id) else {
                return;
            };
            self.leased.insert(worker_id);
            if waiter.send(Ok((worker_id, meta.engine.clone()))).is_ok() {
                return;
            }
            self.leased.remove(&worker_id);
        }
        self.idle.push_back(worker_id);
    }

    fn spawn_recycle(&self, old_id: u32) {
        let factory = self.factory.clone();
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            match factory().await {
                Ok(engine) => {
                    let _ = cmd_tx.send(Command::WorkerReady {
                        worker_id: old_id,
                        engine,
                    });
                }
                Err(e) => {
                    tracing::error!(worker_id = old_id, error = %e.message, "worker relaunch failed");
                    let _ = cmd_tx.send(Command::WorkerDead { worker_id: old_id });
                }
            }
        });
    }
}

pub const DEFAULT_LEASE_ADMISSION_WINDOW: Duration = DEFAULT_ADMISSION_WINDOW;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::engine::{EngineRenderOutput, FakeEngine};

    fn fake_factory() -> WorkerFactory {
        Arc::new(|| {
            Box::pin(async {
                let engine = FakeEngine::new(EngineRenderOutput {
                    status_code: 200,
                    final_url: "https://example.com/".into(),
                    redirect_url: None,
                    markup: String::new(),
                    screenshot: None,
                    broken: false,
                });
                Ok(Arc::new(engine) as Arc<dyn RenderEngine>)
            })
        })
    }

    fn test_chrome(pool_size: u8) -> ChromeSection {
        let mut chrome = ChromeSection::default();
        chrome.pool_size = pool_size;
        chrome.restart_after_count = 500;
        chrome.restart_after_time = 3600;
        chrome.shutdown_timeout = 1;
        chrome
    }

    #[tokio::test]
    async fn lease_and_release_roundtrip() {
        let pool = Pool::start_with_factory(test_chrome(1), fake_factory()).await.unwrap();
        let handle = pool.handle();
        let worker = handle.lease(Duration::from_millis(200)).await.unwrap();
        worker.release(false);
    }

    #[tokio::test]
    async fn exhausted_pool_yields_pool_exhausted() {
        let pool = Pool::start_with_factory(test_chrome(1), fake_factory()).await.unwrap();
        let handle = pool.handle();
        let first = handle.lease(Duration::from_millis(200)).await.unwrap();
        let second = handle.lease(Duration::from_millis(100)).await;
        assert!(matches!(second, Err(e) if e.code == crate::error::ErrorCode::PoolExhausted));
        first.release(false);
    }

    #[tokio::test]
    async fn returned_worker_becomes_available_to_next_waiter() {
        let pool = Pool::start_with_factory(test_chrome(1), fake_factory()).await.unwrap();
        let handle = pool.handle();
        let first = handle.lease(Duration::from_millis(200)).await.unwrap();

        let waiter_handle = handle.clone();
        let waiter = tokio::spawn(async move { waiter_handle.lease(Duration::from_secs(2)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        first.release(false);

        let second = waiter.await.unwrap().unwrap();
        second.release(false);
    }

    #[tokio::test]
    async fn stats_reflect_lease_state() {
        let pool = Pool::start_with_factory(test_chrome(2), fake_factory()).await.unwrap();
        let handle = pool.handle();
        let before = handle.stats().await;
        assert_eq!((before.idle, before.leased, before.pool_size), (2, 0, 2));

        let worker = handle.lease(Duration::from_millis(200)).await.unwrap();
        let during = handle.stats().await;
        assert_eq!((during.idle, during.leased, during.pool_size), (1, 1, 2));
        worker.release(false);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_leases() {
        let pool = Pool::start_with_factory(test_chrome(1), fake_factory()).await.unwrap();
        let handle = pool.handle();
        handle.shutdown().await;
        let result = handle.lease(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(e) if e.code == crate::error::ErrorCode::PoolShuttingDown));
    }
}
