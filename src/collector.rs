//! Host-facing context: owns the registry and the periodic scan worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::CollectorConfig;
use crate::field::{FieldId, FieldMetadata};
use crate::registry::Registry;
use crate::timeseries::Sample;
use crate::{Error, Result};

const WORKER_NAME: &str = "fieldtap-scan";

/// Collects registered fields on a background thread and hands the
/// compressed series to the host on request.
///
/// Every operation on the registry, whether the worker's scan cycle, an
/// activation scan or a drain, runs under one mutex.
pub struct Collector {
    registry: Arc<Mutex<Registry>>,
    interval: Duration,
    worker: Mutex<Option<ScanWorker>>,
    stopped: AtomicBool,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new(&config))),
            interval: config.interval(),
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Register a field from its textual definition.
    ///
    /// # Errors
    ///
    /// - `Error::Config`: malformed definition or duplicate name for the path
    /// - `Error::Alloc`: the registry could not grow
    pub fn describe(&self, spec: &str) -> Result<FieldMetadata> {
        self.lock_registry()?.describe(spec)
    }

    /// Activate the field called `name` and start the worker if this is the
    /// first active field.
    ///
    /// # Errors
    ///
    /// - `Error::Activation`: unknown name or no initial value could be read
    /// - `Error::SourceUnavailable`: the field's source can not be read
    /// - `Error::Worker`: the scan thread could not be spawned
    pub fn activate(&self, name: &str) -> Result<FieldId> {
        let id = self.lock_registry()?.activate(name)?;
        self.ensure_worker()?;
        Ok(id)
    }

    /// Take the samples stored for `id` since the previous drain.
    pub fn drain(&self, id: FieldId) -> Vec<Sample> {
        match self.registry.lock() {
            Ok(mut registry) => registry.drain(id),
            Err(_) => {
                log::error!("registry lock poisoned, nothing drained for field {id}");
                Vec::new()
            }
        }
    }

    /// Install the timestamp source. Cycles before this are skipped.
    pub fn set_clock(&self, clock: impl Clock) {
        match self.registry.lock() {
            Ok(mut registry) => registry.set_clock(Arc::new(clock)),
            Err(_) => log::error!("registry lock poisoned, clock not installed"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|worker| worker.as_ref().is_some_and(ScanWorker::is_alive))
            .unwrap_or(false)
    }

    /// Stop the worker and wait for it to exit. The worker is never
    /// restarted afterwards.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut worker) = worker {
            worker.stop();
            log::info!("scan worker stopped");
        }
    }

    fn lock_registry(&self) -> Result<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|_| Error::Worker("registry lock poisoned"))
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| Error::Worker("worker lock poisoned"))?;
        if worker.is_some() || self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        *worker = Some(ScanWorker::spawn(Arc::clone(&self.registry), self.interval)?);
        log::info!("scan worker started, interval {:?}", self.interval);
        Ok(())
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ScanWorker {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScanWorker {
    fn spawn(registry: Arc<Mutex<Registry>>, interval: Duration) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run(&registry, &thread_shutdown, interval))
            .map_err(|_| Error::Worker("failed to spawn scan thread"))?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("scan worker panicked");
            }
        }
    }
}

fn run(registry: &Mutex<Registry>, shutdown: &AtomicBool, interval: Duration) {
    while !shutdown.load(Ordering::Acquire) {
        let stats = match registry.lock() {
            Ok(mut registry) => registry.run_cycle(),
            Err(_) => {
                log::error!("registry lock poisoned, scan worker exiting");
                return;
            }
        };
        if stats.has_errors() {
            log::warn!("{}", stats.summary());
        } else {
            log::debug!("{}", stats.summary());
        }

        let deadline = Instant::now() + interval;
        loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }
}
