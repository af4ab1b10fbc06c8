//! Expiry timers.
//!
//! Each session owns one cancellable timer, re-armed every time a new
//! relogin key is issued. The [`Scheduler`] trait abstracts how timers
//! are armed so expiry can be driven by a virtual clock in tests.
//!
//! A timer that fires is reported as an [`Expiry`]. The manager only
//! acts on it if the `TimerId` is still the session's current timer:
//! an expiry that was already on its way when the timer was cancelled
//! (or the session disposed) is ignored.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use turnstile_protocol::SessionId;

/// Identifies one armed timer. Never reused by a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw id.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

/// A timer fired for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub session_id: SessionId,
    pub timer: TimerId,
}

/// Arms and cancels expiry timers.
pub trait Scheduler: Send + 'static {
    /// Arms a timer that reports an [`Expiry`] for `session_id` once
    /// `after` has elapsed.
    fn schedule(&mut self, session_id: &SessionId, after: Duration) -> TimerId;

    /// Cancels a timer. Cancelling a timer that already fired or was
    /// already cancelled is a no-op.
    fn cancel(&mut self, timer: TimerId);
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

/// Runs each timer as a sleeping Tokio task and sends expiries into a
/// channel, which the session service drains in its command loop.
///
/// Must be used from within a Tokio runtime. Under
/// `tokio::time::pause()` the timers follow the paused clock.
#[derive(Debug)]
pub struct TokioScheduler {
    next_id: u64,
    timers: HashMap<TimerId, AbortHandle>,
    tx: mpsc::UnboundedSender<Expiry>,
}

impl TokioScheduler {
    /// Creates the scheduler and the receiving end for expiries.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Expiry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_id: 1,
            timers: HashMap::new(),
            tx,
        };
        (scheduler, rx)
    }

    /// Number of timers armed and not yet cancelled.
    pub fn armed(&self) -> usize {
        self.timers.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, session_id: &SessionId, after: Duration) -> TimerId {
        let timer = TimerId(self.next_id);
        self.next_id += 1;

        let tx = self.tx.clone();
        let expiry = Expiry {
            session_id: session_id.clone(),
            timer,
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The service may already be gone; nothing left to expire then.
            let _ = tx.send(expiry);
        });

        self.timers.insert(timer, task.abort_handle());
        timer
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(handle) = self.timers.remove(&timer) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

/// A virtual-clock scheduler. Time only moves when [`advance`] is called,
/// which returns the timers that came due, in firing order.
///
/// [`advance`]: ManualScheduler::advance
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<TimerId, (Duration, SessionId)>,
}

impl ManualScheduler {
    /// Creates a scheduler with its clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of timers armed and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Moves the clock forward and returns every timer whose deadline is
    /// now reached, earliest first. Returned timers are no longer pending.
    pub fn advance(&mut self, by: Duration) -> Vec<Expiry> {
        self.now += by;
        let now = self.now;

        let mut due: Vec<(Duration, TimerId)> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(timer, (deadline, _))| (*deadline, *timer))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, timer)| {
                self.pending
                    .remove(&timer)
                    .map(|(_, session_id)| Expiry { session_id, timer })
            })
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, session_id: &SessionId, after: Duration) -> TimerId {
        self.next_id += 1;
        let timer = TimerId(self.next_id);
        self.pending
            .insert(timer, (self.now + after, session_id.clone()));
        timer
    }

    fn cancel(&mut self, timer: TimerId) {
        self.pending.remove(&timer);
    }
}
