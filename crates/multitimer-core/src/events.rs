use serde::{Deserialize, Serialize};

use crate::timer::{Interval, TimerId};

/// Lifecycle events produced by timers.
///
/// Timers report through a [`crate::timer::TimerObserver`]; the channel
/// observer turns each callback into one of these so the owner can drain them
/// after the timer call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    /// Any state-affecting operation finished.
    Updated { timer_id: TimerId },
    /// An interval ran out. Carries the interval that just ended.
    IntervalCompleted {
        timer_id: TimerId,
        interval: Interval,
    },
    /// The last cycle finished and the timer stopped.
    Completed { timer_id: TimerId },
}

impl TimerEvent {
    pub fn timer_id(&self) -> &TimerId {
        match self {
            TimerEvent::Updated { timer_id }
            | TimerEvent::IntervalCompleted { timer_id, .. }
            | TimerEvent::Completed { timer_id } => timer_id,
        }
    }
}
