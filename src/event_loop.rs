//! Cooperative wait primitive
//!
//! A session has exactly one flow of control. Waiting for a response means
//! driving the characteristic's value-change stream one event at a time and
//! re-checking the caller's condition after each one, until it holds, the
//! deadline passes, or somebody interrupts the wait. Nothing here spawns
//! tasks or takes locks.

use crate::transport::{ValueChange, ValueChanges};
use futures::{FutureExt, StreamExt};
use log::{debug, warn};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Sleep};

/// Outcome of a single loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// The characteristic reported a value change
    Event(ValueChange),
    /// The deadline passed
    TimedOut,
    /// [`Interrupter::interrupt`] was called
    Interrupted,
    /// The value-change stream ended or was detached
    Closed,
}

/// Handle for interrupting a wait from outside the session, e.g. on Ctrl-C
///
/// An interrupt raised while nothing is waiting cancels the next wait.
#[derive(Debug, Clone)]
pub struct Interrupter {
    tx: Arc<watch::Sender<u64>>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.tx
            .send_modify(|generation| *generation = generation.wrapping_add(1));
        debug!("Interrupt raised");
    }
}

/// Timer bounding one wait
///
/// Armed on creation when a timeout is given; dropping it disarms it, so it
/// can never fire into a later wait.
pub struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    pub fn arm(timeout: Option<Duration>) -> Self {
        Self {
            sleep: timeout.map(|t| Box::pin(sleep(t))),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        if self.sleep.is_some() {
            debug!("Wait timer disarmed");
        }
    }
}

/// Drives value changes for one session
pub struct EventLoop {
    events: Option<ValueChanges>,
    interrupts: watch::Receiver<u64>,
    interrupter: Interrupter,
}

impl EventLoop {
    pub fn new(events: ValueChanges) -> Self {
        let (tx, interrupts) = watch::channel(0);
        Self {
            events: Some(events),
            interrupts,
            interrupter: Interrupter { tx: Arc::new(tx) },
        }
    }

    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.events.is_some()
    }

    /// Drop the value-change stream; later iterations report [`Iteration::Closed`]
    pub fn detach(&mut self) {
        if self.events.take().is_some() {
            debug!("Value-changed handler detached");
        }
    }

    /// Value changes that are already queued, collected without suspending
    pub fn drain_pending(&mut self) -> Vec<ValueChange> {
        let mut drained = Vec::new();
        if let Some(events) = self.events.as_mut() {
            while let Some(Some(change)) = events.next().now_or_never() {
                drained.push(change);
            }
        }
        drained
    }

    /// Run one iteration of the loop
    ///
    /// Interrupts take precedence, then pending value changes, then the
    /// deadline.
    pub async fn run_once(&mut self, deadline: &mut Deadline) -> Iteration {
        let Some(events) = self.events.as_mut() else {
            return Iteration::Closed;
        };
        tokio::select! {
            biased;
            _ = self.interrupts.changed() => Iteration::Interrupted,
            event = events.next() => match event {
                Some(change) => Iteration::Event(change),
                None => Iteration::Closed,
            },
            _ = deadline.expired() => Iteration::TimedOut,
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if self.events.is_some() {
            warn!("Session dropped without being closed; detaching value-changed handler");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::unbounded;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_run_once_yields_events_in_order() {
        let (tx, rx) = unbounded();
        let mut event_loop = EventLoop::new(rx.boxed_local());
        tx.unbounded_send(ValueChange::Value(vec![1])).unwrap();
        tx.unbounded_send(ValueChange::Invalidated).unwrap();

        let mut deadline = Deadline::arm(None);
        assert_eq!(
            event_loop.run_once(&mut deadline).await,
            Iteration::Event(ValueChange::Value(vec![1]))
        );
        assert_eq!(
            event_loop.run_once(&mut deadline).await,
            Iteration::Event(ValueChange::Invalidated)
        );

        drop(tx);
        assert_eq!(event_loop.run_once(&mut deadline).await, Iteration::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_after_timeout() {
        let (_tx, rx) = unbounded::<ValueChange>();
        let mut event_loop = EventLoop::new(rx.boxed_local());

        let start = Instant::now();
        let mut deadline = Deadline::arm(Some(Duration::from_secs(1)));
        assert!(deadline.is_armed());
        assert_eq!(event_loop.run_once(&mut deadline).await, Iteration::TimedOut);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1));
        assert!(waited < Duration::from_millis(1005));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_event_beats_expired_deadline() {
        let (tx, rx) = unbounded();
        let mut event_loop = EventLoop::new(rx.boxed_local());
        let mut deadline = Deadline::arm(Some(Duration::from_millis(10)));
        tokio::time::advance(Duration::from_millis(20)).await;

        tx.unbounded_send(ValueChange::Value(vec![7])).unwrap();
        assert_eq!(
            event_loop.run_once(&mut deadline).await,
            Iteration::Event(ValueChange::Value(vec![7]))
        );
        assert_eq!(event_loop.run_once(&mut deadline).await, Iteration::TimedOut);
    }

    #[tokio::test]
    async fn test_interrupt_is_consumed_once() {
        let (_tx, rx) = unbounded::<ValueChange>();
        let mut event_loop = EventLoop::new(rx.boxed_local());
        let interrupter = event_loop.interrupter();

        interrupter.interrupt();
        let mut deadline = Deadline::arm(Some(Duration::from_millis(5)));
        assert_eq!(
            event_loop.run_once(&mut deadline).await,
            Iteration::Interrupted
        );
        assert_eq!(event_loop.run_once(&mut deadline).await, Iteration::TimedOut);
    }

    #[tokio::test]
    async fn test_drain_pending_does_not_block() {
        let (tx, rx) = unbounded();
        let mut event_loop = EventLoop::new(rx.boxed_local());
        assert!(event_loop.drain_pending().is_empty());

        tx.unbounded_send(ValueChange::Value(vec![1])).unwrap();
        tx.unbounded_send(ValueChange::Value(vec![2])).unwrap();
        assert_eq!(
            event_loop.drain_pending(),
            vec![ValueChange::Value(vec![1]), ValueChange::Value(vec![2])]
        );
        assert!(event_loop.drain_pending().is_empty());
    }

    #[tokio::test]
    async fn test_detach_closes_loop() {
        let (tx, rx) = unbounded::<ValueChange>();
        let mut event_loop = EventLoop::new(rx.boxed_local());
        assert!(event_loop.is_attached());

        event_loop.detach();
        assert!(!event_loop.is_attached());
        assert!(tx.is_closed());
        assert_eq!(
            event_loop.run_once(&mut Deadline::arm(None)).await,
            Iteration::Closed
        );
    }
}
