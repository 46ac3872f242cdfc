//! Shared fixed-rate task pool.
//!
//! One timer thread keeps a deadline heap and hands due tasks to a pool of
//! worker threads over a crossbeam channel. A task is never dispatched
//! again until its previous run has reported back, so a periodic task
//! never overlaps itself; a run that overshoots its period delays the next
//! one instead of queueing a burst.
//!
//! Cancellation is cooperative: [`TaskHandle::cancel`] raises a flag that
//! workers check before running, and tells the timer to forget the task.
//! A run that has already started is not interrupted; callers that need to
//! wait for it (such as [`CellGraph::stop`](crate::CellGraph::stop))
//! synchronise on their own lock.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Body of a scheduled task.
pub type Job = Arc<dyn Fn() + Send + Sync>;

type TaskId = u64;

enum TimerMessage {
    Schedule {
        id: TaskId,
        period: Duration,
        job: Job,
        cancelled: Arc<AtomicBool>,
    },
    Done(TaskId),
    Cancel(TaskId),
    Shutdown,
}

struct WorkItem {
    id: TaskId,
    job: Job,
    cancelled: Arc<AtomicBool>,
}

struct TaskEntry {
    period: Duration,
    job: Job,
    cancelled: Arc<AtomicBool>,
    next_due: Instant,
    in_flight: bool,
}

// ── Handles ────────────────────────────────────────────────────────

/// Cloneable access to a [`SimulationScheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    timer: Sender<TimerMessage>,
    next_id: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Run `job` every `period`, starting one period from now.
    pub fn schedule_fixed_rate(&self, period: Duration, job: Job) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let message = TimerMessage::Schedule {
            id,
            period,
            job,
            cancelled: Arc::clone(&cancelled),
        };
        if self.timer.send(message).is_err() {
            debug!(task = id, "scheduler is shut down; task will never run");
            cancelled.store(true, Ordering::Release);
        }
        TaskHandle {
            id,
            cancelled,
            timer: self.timer.clone(),
        }
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle").finish_non_exhaustive()
    }
}

/// A scheduled periodic task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    cancelled: Arc<AtomicBool>,
    timer: Sender<TimerMessage>,
}

impl TaskHandle {
    /// Stop future runs. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.timer.send(TimerMessage::Cancel(self.id));
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TimerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerMessage::Schedule { id, period, .. } => {
                write!(f, "Schedule({id}, {period:?})")
            }
            TimerMessage::Done(id) => write!(f, "Done({id})"),
            TimerMessage::Cancel(id) => write!(f, "Cancel({id})"),
            TimerMessage::Shutdown => write!(f, "Shutdown"),
        }
    }
}

// ── SimulationScheduler ────────────────────────────────────────────

/// Timer thread plus worker pool shared by every graph of a manager.
pub struct SimulationScheduler {
    handle: SchedulerHandle,
    timer_thread: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl SimulationScheduler {
    /// Spawn the timer and `worker_count` workers (at least one).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (timer_tx, timer_rx) = crossbeam_channel::unbounded();
        let (work_tx, work_rx) = crossbeam_channel::unbounded::<WorkItem>();

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let work_rx = work_rx.clone();
            let done_tx = timer_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("cell-graph-{i}"))
                .spawn(move || worker_loop(work_rx, done_tx))
                .expect("failed to spawn scheduler worker");
            workers.push(handle);
        }

        let timer_thread = thread::Builder::new()
            .name("cell-graph-timer".into())
            .spawn(move || timer_loop(timer_rx, work_tx))
            .expect("failed to spawn scheduler timer");

        debug!(workers = worker_count, "scheduler started");
        Self {
            handle: SchedulerHandle {
                timer: timer_tx,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            timer_thread: Some(timer_thread),
            workers,
        }
    }

    /// A cloneable handle for scheduling tasks.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop the timer and join every thread. Tasks in flight finish first.
    pub fn shutdown(&mut self) {
        let Some(timer) = self.timer_thread.take() else {
            return;
        };
        let _ = self.handle.timer.send(TimerMessage::Shutdown);
        if timer.join().is_err() {
            error!("scheduler timer thread panicked");
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("scheduler worker panicked");
            }
        }
        debug!("scheduler stopped");
    }
}

impl Drop for SimulationScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SimulationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationScheduler")
            .field("workers", &self.workers.len())
            .field("running", &self.timer_thread.is_some())
            .finish()
    }
}

// ── Threads ────────────────────────────────────────────────────────

fn timer_loop(rx: Receiver<TimerMessage>, work: Sender<WorkItem>) {
    let mut tasks: IndexMap<TaskId, TaskEntry> = IndexMap::new();
    let mut heap: BinaryHeap<Reverse<(Instant, TaskId)>> = BinaryHeap::new();

    loop {
        let now = Instant::now();
        while let Some(Reverse((due, id))) = heap.peek().copied() {
            if due > now {
                break;
            }
            heap.pop();
            let Some(task) = tasks.get_mut(&id) else {
                continue;
            };
            if task.in_flight || task.cancelled.load(Ordering::Acquire) {
                continue;
            }
            task.in_flight = true;
            task.next_due = due + task.period;
            let item = WorkItem {
                id,
                job: Arc::clone(&task.job),
                cancelled: Arc::clone(&task.cancelled),
            };
            if work.send(item).is_err() {
                return;
            }
        }

        let message = match heap.peek() {
            Some(Reverse((due, _))) => rx.recv_timeout(due.saturating_duration_since(now)),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match message {
            Ok(TimerMessage::Schedule {
                id,
                period,
                job,
                cancelled,
            }) => {
                let next_due = Instant::now() + period;
                tasks.insert(
                    id,
                    TaskEntry {
                        period,
                        job,
                        cancelled,
                        next_due,
                        in_flight: false,
                    },
                );
                heap.push(Reverse((next_due, id)));
            }
            Ok(TimerMessage::Done(id)) => {
                if let Some(task) = tasks.get_mut(&id) {
                    task.in_flight = false;
                    let next = task.next_due.max(Instant::now());
                    task.next_due = next;
                    heap.push(Reverse((next, id)));
                }
            }
            Ok(TimerMessage::Cancel(id)) => {
                tasks.swap_remove(&id);
            }
            Ok(TimerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn worker_loop(rx: Receiver<WorkItem>, done: Sender<TimerMessage>) {
    while let Ok(item) = rx.recv() {
        if !item.cancelled.load(Ordering::Acquire) {
            trace!(task = item.id, "running task");
            let job = Arc::clone(&item.job);
            if catch_unwind(AssertUnwindSafe(|| job())).is_err() {
                error!(task = item.id, "scheduled task panicked");
            }
        }
        if done.send(TimerMessage::Done(item.id)).is_err() {
            return;
        }
    }
}
