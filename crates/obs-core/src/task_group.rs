//! Structured fan-out of the tasks of one cycle.
//!
//! A [`TaskGroup`] runs independent units of work on the tokio runtime under
//! one of two policies:
//!
//! - [`Policy::FailFast`] — the tasks are interdependent. The first task error
//!   fires the group's cancellation signal, aborts the remaining tasks, and
//!   [`TaskGroup::wait`] returns that error.
//! - [`Policy::BestEffort`] — the tasks are independent. A failure is logged
//!   and counted; [`TaskGroup::wait`] never returns an aggregate error.
//!
//! Results travel through rendezvous slots ([`rendezvous`]): a single-value
//! handoff between one producer task and the consumer. A task either delivers
//! exactly one value or never delivers, so a cancelled task cannot block.
//!
//! ```text
//! parent signal ──► TaskGroup ──spawn──► task ──deliver──► Slot
//!                       │                                   │
//!                       └──────── wait() ok ──► consumer takes each slot
//! ```

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::cancel::{CancelSignal, Cancellation};
use crate::error::FeedError;

/// Failure policy of a [`TaskGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    FailFast,
    BestEffort,
}

/// Outcome counters of a finished group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupReport {
    pub spawned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

type TaskOutput = (String, Result<(), FeedError>);

/// A set of concurrently running tasks with one failure policy.
///
/// Dropping a group without calling [`wait`](Self::wait) aborts its tasks.
pub struct TaskGroup {
    name: String,
    policy: Policy,
    parent: CancelSignal,
    cancel: Cancellation,
    tasks: JoinSet<TaskOutput>,
    spawned: usize,
}

impl TaskGroup {
    /// A group of interdependent tasks: the first error aborts them all.
    pub fn fail_fast(name: impl Into<String>, parent: CancelSignal) -> Self {
        Self::new(name.into(), Policy::FailFast, parent)
    }

    /// A group of independent tasks: errors are logged and counted.
    pub fn best_effort(name: impl Into<String>, parent: CancelSignal) -> Self {
        Self::new(name.into(), Policy::BestEffort, parent)
    }

    fn new(name: String, policy: Policy, parent: CancelSignal) -> Self {
        Self { name, policy, parent, cancel: Cancellation::new(), tasks: JoinSet::new(), spawned: 0 }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// The group-level signal. Fires when a fail-fast task fails or the
    /// parent signal fires.
    pub fn signal(&self) -> CancelSignal {
        self.cancel.signal()
    }

    /// Spawn one unit of work. The future is raced against the group signal,
    /// so a task blocked on I/O returns promptly once the group is cancelled.
    pub fn spawn<F>(&mut self, label: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<(), FeedError>> + Send + 'static,
    {
        let label = label.into();
        let signal = self.cancel.signal();
        self.tasks.spawn(async move {
            let res = signal.run(fut).await;
            (label, res)
        });
        self.spawned += 1;
    }

    /// Wait for every task according to the group policy.
    pub async fn wait(mut self) -> Result<GroupReport, FeedError> {
        let mut report = GroupReport { spawned: self.spawned, ..Default::default() };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.parent.cancelled() => {
                    debug!("[{}] parent cancelled, aborting {} task(s)", self.name, self.tasks.len());
                    self.shutdown(&mut report).await;
                    return match self.policy {
                        Policy::FailFast => Err(FeedError::Cancelled),
                        Policy::BestEffort => Ok(report),
                    };
                }
                next = self.tasks.join_next() => next,
            };

            let Some(joined) = next else { break };
            let (label, res) = match joined {
                Ok(output) => output,
                Err(e) => ("<unknown>".to_string(), Err(FeedError::Task(e.to_string()))),
            };

            match res {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    match self.policy {
                        Policy::FailFast => {
                            error!("[{}] task '{label}' failed, cancelling group: {e}", self.name);
                            self.shutdown(&mut report).await;
                            return Err(e);
                        }
                        Policy::BestEffort => {
                            warn!("[{}] task '{label}' failed: {e}", self.name);
                        }
                    }
                }
            }
        }

        debug!(
            "[{}] group done: {}/{} succeeded",
            self.name, report.succeeded, report.spawned
        );
        Ok(report)
    }

    /// Fire the group signal, abort what is still running and drain the set.
    async fn shutdown(&mut self, report: &mut GroupReport) {
        self.cancel.cancel();
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.succeeded += 1,
                _ => report.failed += 1,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendezvous slots
// ---------------------------------------------------------------------------

/// Create a single-value handoff between one producer task and the consumer.
pub fn rendezvous<T>() -> (SlotSender<T>, Slot<T>) {
    let (tx, rx) = oneshot::channel();
    (SlotSender(tx), Slot(rx))
}

/// Producer side of a rendezvous slot. Delivering consumes it.
pub struct SlotSender<T>(oneshot::Sender<T>);

impl<T> SlotSender<T> {
    /// Hand the value over. Never blocks; a value sent after the consumer
    /// gave up is dropped.
    pub fn deliver(self, value: T) {
        let _ = self.0.send(value);
    }
}

/// Consumer side of a rendezvous slot.
pub struct Slot<T>(oneshot::Receiver<T>);

impl<T> Slot<T> {
    /// Take the delivered value. Only meaningful after the owning group's
    /// `wait()` succeeded; an empty slot at that point is a task bug.
    pub fn take(mut self) -> Result<T, FeedError> {
        self.0.try_recv().map_err(|_| FeedError::Task("rendezvous slot is empty".into()))
    }
}
