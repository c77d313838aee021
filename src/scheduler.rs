//! Cancellable timers for the state machines.
//!
//! A [`Scheduler`] turns delays into inputs delivered through
//! [`Scheduler::next`]. Each machine owns one. [`Scheduler::cancel_all`]
//! aborts the timer tasks and bumps an epoch, so an input that was already
//! queued by a cancelled timer is discarded instead of delivered.
//! Dropping the scheduler aborts every timer task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// Timer source for one state machine.
pub struct Scheduler<I> {
    tx: mpsc::UnboundedSender<(u64, I)>,
    rx: mpsc::UnboundedReceiver<(u64, I)>,
    epoch: u64,
    tasks: Vec<JoinHandle<()>>,
}

impl<I: Send + 'static> Scheduler<I> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            epoch: 0,
            tasks: Vec::new(),
        }
    }

    /// Deliver `input` once, after `delay`.
    pub fn after(&mut self, delay: Duration, input: I) {
        let tx = self.tx.clone();
        let epoch = self.epoch;
        self.track(tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send((epoch, input));
        }));
    }

    /// Deliver a clone of `input` every `period`, first after one period.
    pub fn every(&mut self, period: Duration, input: I)
    where
        I: Clone,
    {
        let tx = self.tx.clone();
        let epoch = self.epoch;
        self.track(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send((epoch, input.clone())).is_err() {
                    break;
                }
            }
        }));
    }

    /// Cancel every pending timer, including inputs already queued.
    pub fn cancel_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
        trace!(epoch = self.epoch, "timers cancelled");
    }

    /// Number of timer tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Wait for the next live input.
    ///
    /// Never resolves while nothing is scheduled. Cancel-safe: it can be
    /// used as a `tokio::select!` branch without losing inputs.
    pub async fn next(&mut self) -> I {
        loop {
            // The scheduler holds a sender, so the channel never closes.
            let Some((epoch, input)) = self.rx.recv().await else {
                return std::future::pending().await;
            };
            if epoch == self.epoch {
                return input;
            }
            trace!(epoch, current = self.epoch, "dropping stale timer input");
        }
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }
}

impl<I: Send + 'static> Default for Scheduler<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> std::fmt::Debug for Scheduler<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("epoch", &self.epoch)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl<I> Drop for Scheduler<I> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
