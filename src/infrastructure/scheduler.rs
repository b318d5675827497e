use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Handle to a scheduled task. Cancelling is idempotent; a cancelled
/// task is guaranteed not to run once `cancel` has returned.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTask {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellable delayed execution. Debounce windows are expressed through
/// this seam so coalescing behavior is testable without wall-clock waits.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> ScheduledTask;
}

#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> ScheduledTask {
        let handle = ScheduledTask::new();
        let cancelled = Arc::clone(&handle.cancelled);
        tokio::spawn(async move {
            sleep(delay).await;
            if !cancelled.load(Ordering::SeqCst) {
                task();
            }
        });
        handle
    }
}

struct PendingTask {
    cancelled: Arc<AtomicBool>,
    run: Box<dyn FnOnce() + Send>,
}

/// Test scheduler: holds scheduled tasks until the test fires them.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<PendingTask>>,
}

impl ManualScheduler {
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    /// Runs every pending non-cancelled task; returns how many ran.
    pub fn fire_all(&self) -> usize {
        let drained: Vec<PendingTask> = {
            let Ok(mut pending) = self.pending.lock() else {
                return 0;
            };
            pending.drain(..).collect()
        };

        let mut ran = 0;
        for task in drained {
            if task.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            (task.run)();
            ran += 1;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, _delay: Duration, task: Box<dyn FnOnce() + Send>) -> ScheduledTask {
        let handle = ScheduledTask::new();
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(PendingTask {
                cancelled: Arc::clone(&handle.cancelled),
                run: task,
            });
        }
        handle
    }
}
