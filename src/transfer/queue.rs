//! Priority-ordered task queue.
//!
//! Three strict priority lanes, FIFO within each lane so the predictor's
//! furthest-lookahead submissions stay last. Consumers block on [`TaskQueue::pop`]
//! until work arrives; after shutdown the queue drains what it holds and then
//! yields the closed sentinel (`None`).

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::{watch, Notify};

/// Transfer urgency. `Urgent` means a reader is blocked on the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Urgent,
    Normal,
    Background,
}

impl Priority {
    fn lane(self) -> usize {
        match self {
            Priority::Urgent => 0,
            Priority::Normal => 1,
            Priority::Background => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Urgent => write!(f, "URGENT"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::Background => write!(f, "BACKGROUND"),
        }
    }
}

/// Observable side of a task's single-fire completion signal.
///
/// Clones share the same signal, so any number of callers may wait on one
/// task. A task dropped before fulfillment (queue shut down) resolves as
/// failure.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    rx: watch::Receiver<Option<bool>>,
}

impl CompletionHandle {
    /// Wait until the task succeeds or fails.
    pub async fn wait(&self) -> bool {
        let mut rx = self.rx.clone();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without fulfilling: the task was abandoned.
                return rx.borrow().unwrap_or(false);
            }
        }
    }

    /// Non-blocking readiness probe.
    pub fn try_ready(&self) -> Option<bool> {
        if let Some(outcome) = *self.rx.borrow() {
            return Some(outcome);
        }
        // A dropped sender counts as a failed (resolved) task.
        if self.rx.has_changed().is_err() {
            return Some(false);
        }
        None
    }

    /// A handle already resolved to failure, for rejected submissions.
    pub fn rejected() -> Self {
        let (tx, rx) = watch::channel(Some(false));
        drop(tx);
        Self { rx }
    }
}

/// One ranged download to perform against the remote store.
///
/// The task owns the sender half of its completion signal; fulfilling it
/// consumes the task, which is what makes the signal single-fire.
#[derive(Debug)]
pub struct TransferTask {
    pub key: String,
    pub offset: u64,
    pub len: u64,
    pub priority: Priority,
    done: watch::Sender<Option<bool>>,
}

impl TransferTask {
    pub fn new(key: String, offset: u64, len: u64, priority: Priority) -> (Self, CompletionHandle) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                key,
                offset,
                len,
                priority,
                done: tx,
            },
            CompletionHandle { rx },
        )
    }

    /// Fulfill the completion signal.
    pub fn finish(self, ok: bool) {
        let _ = self.done.send(Some(ok));
    }
}

struct QueueInner {
    lanes: [VecDeque<TransferTask>; 3],
    shutdown: bool,
}

impl QueueInner {
    fn pop_ready(&mut self) -> Option<TransferTask> {
        self.lanes.iter_mut().find_map(|lane| lane.pop_front())
    }

    fn len(&self) -> usize {
        self.lanes.iter().map(|lane| lane.len()).sum()
    }
}

/// Multi-producer/multi-consumer queue with strict priority precedence.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                lanes: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                shutdown: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a task, waking one waiting consumer. After shutdown the task
    /// is handed back so the caller can fail its handle.
    pub fn push(&self, task: TransferTask) -> Result<(), TransferTask> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.shutdown {
                return Err(task);
            }
            let lane = task.priority.lane();
            inner.lanes[lane].push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Take the highest-priority task, waiting if none is queued. Returns
    /// `None` once the queue is shut down and drained.
    pub async fn pop(&self) -> Option<TransferTask> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(task) = inner.pop_ready() {
                    return Some(task);
                }
                if inner.shutdown {
                    drop(inner);
                    // Pass the wakeup along to any other blocked consumer.
                    self.notify.notify_one();
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<TransferTask> {
        self.inner.lock().unwrap().pop_ready()
    }

    /// Stop accepting work. Queued tasks continue to be delivered until the
    /// queue is empty; blocked and future `pop` calls then observe `None`.
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.shutdown = true;
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().unwrap().shutdown
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
