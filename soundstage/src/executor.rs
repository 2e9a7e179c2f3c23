//! Worker pool that runs playback streaming loops.
//!
//! Every submitted job gets a thread of its own for as long as it runs: jobs block on
//! device writes for the whole length of a sound, so they must never queue behind each
//! other. Finished workers stay parked for `keep_alive` and are reused by later jobs.

use crate::error::{Result, SoundError};
use crate::sync::lock;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Growable pool of named worker threads
#[derive(Clone)]
pub struct PlaybackExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    name_prefix: String,
    keep_alive: Duration,
    /// `None` once the executor has been shut down
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    /// Parked workers not yet claimed by a queued job
    idle: AtomicUsize,
    live: AtomicUsize,
    spawned: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackExecutor {
    pub fn new(name_prefix: impl Into<String>, keep_alive: Duration) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            inner: Arc::new(ExecutorInner {
                name_prefix: name_prefix.into(),
                keep_alive,
                sender: Mutex::new(Some(sender)),
                receiver,
                idle: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Runs `job` on a parked worker, or on a new one if none is free.
    ///
    /// # Errors
    ///
    /// `InvalidState` after [`shutdown`](Self::shutdown), `Device` if no thread could be
    /// spawned.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = lock(&self.inner.sender);
        let Some(sender) = sender.as_ref() else {
            return Err(SoundError::InvalidState(
                "Playback executor has been shut down".to_string(),
            ));
        };

        let reserved = self
            .inner
            .idle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |idle| idle.checked_sub(1))
            .is_ok();

        if reserved {
            // The receiver lives in `inner`, so the channel cannot be disconnected here
            sender
                .send(Box::new(job))
                .map_err(|_| SoundError::InvalidState("Playback executor is closed".to_string()))
        } else {
            self.spawn_worker(Box::new(job))
        }
    }

    fn spawn_worker(&self, first_job: Job) -> Result<()> {
        let number = self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.inner.name_prefix, number);
        let inner = self.inner.clone();

        self.inner.live.fetch_add(1, Ordering::AcqRel);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(inner, first_job))
            .map_err(|e| {
                self.inner.live.fetch_sub(1, Ordering::AcqRel);
                SoundError::Device(format!("Failed to spawn worker {}: {}", name, e))
            })?;
        log::trace!("Spawned playback worker {}", name);

        let mut handles = lock(&self.inner.handles);
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Stops accepting jobs and waits for every worker to exit.
    ///
    /// Running jobs are not interrupted; callers cancel their playbacks first so the
    /// jobs return promptly. Idempotent.
    pub fn shutdown(&self) {
        if lock(&self.inner.sender).take().is_none() {
            return;
        }

        let handles = std::mem::take(&mut *lock(&self.inner.handles));
        let current = thread::current().id();
        for handle in handles {
            // A job may shut the executor down from its own worker
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::warn!("Playback worker panicked during shutdown");
            }
        }
        log::debug!("Playback executor shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.inner.sender).is_none()
    }

    /// Number of worker threads currently alive, busy or parked.
    pub fn worker_count(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    pub fn idle_workers(&self) -> usize {
        self.inner.idle.load(Ordering::Acquire)
    }
}

fn run_worker(inner: Arc<ExecutorInner>, first_job: Job) {
    let mut job = Some(first_job);
    loop {
        if let Some(job) = job.take() {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::error!(
                    "Playback job panicked on {}",
                    thread::current().name().unwrap_or("worker")
                );
            }
            inner.idle.fetch_add(1, Ordering::AcqRel);
        }

        match inner.receiver.recv_timeout(inner.keep_alive) {
            Ok(next) => job = Some(next),
            Err(RecvTimeoutError::Timeout) => {
                // Only leave if no queued job is counting on this worker
                let released = inner
                    .idle
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |idle| {
                        idle.checked_sub(1)
                    })
                    .is_ok();
                if released {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    inner.live.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_jobs_run_concurrently() {
        let executor = PlaybackExecutor::new("test-worker", Duration::from_secs(5));
        let (release_sender, release_receiver) = bounded::<()>(0);
        let (done_sender, done_receiver) = unbounded();

        for i in 0..3 {
            let release = release_receiver.clone();
            let done = done_sender.clone();
            executor
                .submit(move || {
                    let _ = release.recv();
                    let _ = done.send(i);
                })
                .unwrap();
        }
        assert_eq!(executor.worker_count(), 3);

        for _ in 0..3 {
            release_sender.send(()).unwrap();
        }
        for _ in 0..3 {
            done_receiver.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        executor.shutdown();
    }

    #[test]
    fn test_idle_workers_are_reused() {
        let executor = PlaybackExecutor::new("test-worker", Duration::from_secs(5));
        let (done_sender, done_receiver) = unbounded();

        let done = done_sender.clone();
        executor.submit(move || done.send(()).unwrap()).unwrap();
        done_receiver.recv_timeout(Duration::from_secs(2)).unwrap();

        // Wait for the worker to park again
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while executor.idle_workers() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(executor.idle_workers(), 1);

        executor.submit(move || done_sender.send(()).unwrap()).unwrap();
        done_receiver.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(executor.worker_count(), 1);
        executor.shutdown();
    }

    #[test]
    fn test_idle_workers_expire() {
        let executor = PlaybackExecutor::new("test-worker", Duration::from_millis(10));
        executor.submit(|| {}).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while executor.worker_count() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(executor.worker_count(), 0);
        assert_eq!(executor.idle_workers(), 0);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let executor = PlaybackExecutor::new("test-worker", Duration::from_secs(5));
        executor.submit(|| panic!("boom")).unwrap();

        let (done_sender, done_receiver) = unbounded();
        executor.submit(move || done_sender.send(()).unwrap()).unwrap();
        done_receiver.recv_timeout(Duration::from_secs(2)).unwrap();
        executor.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let executor = PlaybackExecutor::new("test-worker", Duration::from_secs(5));
        executor.shutdown();
        executor.shutdown();
        assert!(executor.is_shutdown());
        assert!(matches!(
            executor.submit(|| {}),
            Err(SoundError::InvalidState(_))
        ));
    }
}
