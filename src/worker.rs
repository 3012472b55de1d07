//! Callback worker.
//!
//! Hotkey and word callbacks never run on the capture thread. They are
//! queued here and, after a short delay that gives the OS time to finish
//! delivering the key that triggered them, each one is started on a thread of
//! its own. A callback may therefore block, for instance in
//! [`Keyboard::wait`](crate::Keyboard::wait), without holding up the others.

use crate::error::{Error, Result};
use crate::hook::panic_message;
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A user callback fired by a hotkey, word listener or recorder.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

struct Job {
    due: Instant,
    label: String,
    callback: Callback,
}

/// Count of scheduled callbacks that have not finished yet.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Fire-and-forget executor for user callbacks.
pub struct Worker {
    sender: Mutex<Option<Sender<Job>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Pending>,
    delay: Duration,
}

impl Worker {
    /// Spawn the scheduling thread. Callback threads carry the same name.
    pub fn spawn(thread_name: impl Into<String>, delay: Duration) -> Result<Self> {
        let thread_name = thread_name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let pending = Arc::new(Pending::default());
        let scheduler_pending = Arc::clone(&pending);
        let callback_name = thread_name.clone();

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                for job in receiver {
                    let wait = job.due.saturating_duration_since(Instant::now());
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }
                    run_detached(&callback_name, job, &scheduler_pending);
                }
                debug!("callback worker finished");
            })
            .map_err(|e| Error::ThreadError(e.to_string()))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread_handle: Mutex::new(Some(handle)),
            pending,
            delay,
        })
    }

    /// Queue `callback` to run after the configured delay. Never blocks.
    pub fn schedule(&self, label: impl Into<String>, callback: Callback) {
        let job = Job {
            due: Instant::now() + self.delay,
            label: label.into(),
            callback,
        };
        self.pending.add();
        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !sent {
            self.pending.done();
            debug!("worker stopped, dropping callback");
        }
    }

    /// Block until every scheduled callback has returned, or `timeout`
    /// passes. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Stop accepting jobs and join the scheduling thread. Queued jobs are
    /// still started; running callbacks are not waited for.
    pub fn shutdown(&self) -> Result<()> {
        self.sender.lock().take();
        if let Some(handle) = self.thread_handle.lock().take() {
            handle
                .join()
                .map_err(|_| Error::ThreadError("failed to join callback worker".into()))?;
        }
        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_detached(name: &str, job: Job, pending: &Arc<Pending>) {
    let finished = Arc::clone(pending);
    let Job { label, callback, .. } = job;
    let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback())) {
            error!("callback for {label} panicked: {}", panic_message(&*panic));
        }
        finished.done();
    });
    if let Err(e) = spawned {
        error!("could not start callback thread: {e}");
        pending.done();
    }
}
