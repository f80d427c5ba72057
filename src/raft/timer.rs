//! Election and heartbeat timers.
//!
//! Timers never touch Raft state directly: on expiry they enqueue an
//! internal command onto the inbound queue, stamped with the generation
//! that was current when the expiry was scheduled. Resetting a timer bumps
//! the generation, which both retires in-flight sleeper tasks and lets the
//! core discard any stale event already sitting in the queue.

use super::node::RaftCommand;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Randomized one-shot election timer.
pub struct ElectionTimer {
    tx: mpsc::UnboundedSender<RaftCommand>,
    generation: Arc<AtomicU64>,
    min: Duration,
    max: Duration,
}

impl ElectionTimer {
    pub fn new(
        tx: mpsc::UnboundedSender<RaftCommand>,
        min: Duration,
        max: Duration,
    ) -> Self {
        Self {
            tx,
            generation: Arc::new(AtomicU64::new(0)),
            min,
            max,
        }
    }

    /// Schedule the next expiry after a fresh random duration, cancelling
    /// any outstanding one.
    pub fn reset(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let timeout = self.random_timeout();
        let tx = self.tx.clone();
        let current = Arc::clone(&self.generation);

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if current.load(Ordering::SeqCst) == generation {
                let _ = tx.send(RaftCommand::ElectionTimeout { generation });
            }
        });
    }

    /// Cancel the outstanding expiry without scheduling a new one.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Is this generation stamp still the live one?
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn random_timeout(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Fixed-interval heartbeat timer, active only while leader.
pub struct HeartbeatTimer {
    tx: mpsc::UnboundedSender<RaftCommand>,
    generation: Arc<AtomicU64>,
    interval: Duration,
}

impl HeartbeatTimer {
    pub fn new(tx: mpsc::UnboundedSender<RaftCommand>, interval: Duration) -> Self {
        Self {
            tx,
            generation: Arc::new(AtomicU64::new(0)),
            interval,
        }
    }

    /// Start ticking. The first tick lands one full interval from now; the
    /// caller is expected to send its own immediate round on leadership.
    pub fn start(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let interval = self.interval;
        let tx = self.tx.clone();
        let current = Arc::clone(&self.generation);

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                if tx.send(RaftCommand::HeartbeatTick { generation }).is_err() {
                    break;
                }
            }
        });
    }

    /// Stop ticking; the running task retires on its next wakeup.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}
