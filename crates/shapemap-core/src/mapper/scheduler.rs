//! Background compile pool
//!
//! A fixed number of worker threads, started on first use, drain a bounded
//! queue of compile tasks. Submission never blocks: a full queue rejects the
//! task. After shutdown, tasks still queued are abandoned.

use crate::config::SchedulerConfig;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// A unit of background work
pub type CompileTask = Box<dyn FnOnce() + Send + 'static>;

/// Why a task was not queued
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Compile queue is full ({capacity} pending tasks)")]
    QueueFull { capacity: usize },

    #[error("Compile scheduler is shut down")]
    ShutDown,

    #[error("Failed to start compile worker: {message}")]
    Spawn { message: String },
}

struct Pool {
    sender: SyncSender<CompileTask>,
    workers: Vec<JoinHandle<()>>,
}

pub struct CompileScheduler {
    config: SchedulerConfig,
    pool: Mutex<Option<Pool>>,
    stopped: Arc<AtomicBool>,
}

impl CompileScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a task without blocking
    pub fn submit(&self, task: CompileTask) -> Result<(), SubmitError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(SubmitError::ShutDown);
        }

        let mut pool = self.pool.lock();
        if pool.is_none() {
            *pool = Some(self.start()?);
        }
        let Some(pool) = pool.as_ref() else {
            return Err(SubmitError::ShutDown);
        };

        pool.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::QueueFull {
                capacity: self.config.queue_capacity,
            },
            TrySendError::Disconnected(_) => SubmitError::ShutDown,
        })
    }

    pub fn is_running(&self) -> bool {
        self.pool.lock().is_some()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.lock().as_ref().map(|p| p.workers.len()).unwrap_or(0)
    }

    /// Stop the workers; queued tasks are dropped without running
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        let Some(pool) = self.pool.lock().take() else {
            return;
        };

        let Pool { sender, workers } = pool;
        drop(sender);
        let current = thread::current().id();
        for worker in workers {
            // a worker may end up dropping the last handle to the pool
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
        tracing::debug!("Compile scheduler stopped");
    }

    fn start(&self) -> Result<Pool, SubmitError> {
        let capacity = self.config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel::<CompileTask>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(self.config.max_workers);
        for i in 0..self.config.max_workers.max(1) {
            let receiver = receiver.clone();
            let stopped = self.stopped.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.config.thread_name, i))
                .spawn(move || worker_loop(receiver, stopped))
                .map_err(|e| SubmitError::Spawn {
                    message: e.to_string(),
                })?;
            workers.push(handle);
        }

        tracing::debug!(
            workers = workers.len(),
            queue_capacity = capacity,
            "Compile scheduler started"
        );
        Ok(Pool { sender, workers })
    }
}

impl Drop for CompileScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<CompileTask>>>, stopped: Arc<AtomicBool>) {
    loop {
        let task = match receiver.lock().recv() {
            Ok(task) => task,
            Err(_) => return,
        };
        if stopped.load(Ordering::Acquire) {
            continue;
        }
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            log::warn!("Compile task panicked; the mapper stays on its current tier");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    fn config(workers: usize, capacity: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_workers: workers,
            queue_capacity: capacity,
            thread_name: "test-compiler".to_string(),
        }
    }

    #[test]
    fn test_runs_tasks_on_named_workers() {
        let scheduler = CompileScheduler::new(config(2, 8));
        assert!(!scheduler.is_running());

        let (tx, rx) = channel();
        scheduler
            .submit(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).unwrap();
            }))
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("test-compiler-"));
        assert_eq!(scheduler.worker_count(), 2);
    }

    #[test]
    fn test_full_queue_rejects() {
        let scheduler = CompileScheduler::new(config(1, 1));
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();

        // occupy the only worker
        scheduler
            .submit(Box::new(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        scheduler.submit(Box::new(|| {})).unwrap();
        let rejected = scheduler.submit(Box::new(|| {}));
        assert!(matches!(rejected, Err(SubmitError::QueueFull { capacity: 1 })));

        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_shutdown_abandons_queue() {
        let scheduler = CompileScheduler::new(config(1, 4));
        let ran = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();

        scheduler
            .submit(Box::new(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..3 {
            let ran = ran.clone();
            scheduler
                .submit(Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let _ = release_tx.send(());
        });
        scheduler.shutdown();
        releaser.join().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(matches!(
            scheduler.submit(Box::new(|| {})),
            Err(SubmitError::ShutDown)
        ));
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let scheduler = CompileScheduler::new(config(1, 4));
        scheduler.submit(Box::new(|| panic!("boom"))).unwrap();

        let (tx, rx) = channel();
        scheduler
            .submit(Box::new(move || {
                tx.send(()).unwrap();
            }))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
