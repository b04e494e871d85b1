use tokio::sync::mpsc;

use super::{Interval, TimerId};
use crate::events::TimerEvent;

/// Receives a timer's lifecycle callbacks.
///
/// Injected at construction. Callbacks run synchronously inside the timer
/// operation that triggered them, so implementations should only record or
/// forward.
pub trait TimerObserver: Send + Sync {
    /// Fired after every state-affecting operation.
    fn on_update(&self, _id: &TimerId) {}

    /// Fired with the interval that just ended, before the index advances.
    fn on_interval_complete(&self, _id: &TimerId, _interval: &Interval) {}

    /// Fired once when all cycles finish.
    fn on_complete(&self, _id: &TimerId) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TimerObserver for NoopObserver {}

/// Forwards callbacks as [`TimerEvent`]s over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<TimerEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self { tx }
    }

    /// Convenience constructor returning the receiving end as well.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TimerEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl TimerObserver for ChannelObserver {
    fn on_update(&self, id: &TimerId) {
        self.send(TimerEvent::Updated {
            timer_id: id.clone(),
        });
    }

    fn on_interval_complete(&self, id: &TimerId, interval: &Interval) {
        self.send(TimerEvent::IntervalCompleted {
            timer_id: id.clone(),
            interval: interval.clone(),
        });
    }

    fn on_complete(&self, id: &TimerId) {
        self.send(TimerEvent::Completed {
            timer_id: id.clone(),
        });
    }
}
