mod engine;
mod interval;
mod observer;
mod snapshot;
mod wake_lock;

pub use engine::{
    format_clock, Timer, TimerConfig, TimerContext, TimerId, TimerStatus, TimerView,
    DEFAULT_PROJECT_COLOR,
};
pub use interval::{Cycles, Interval, IntervalKind, IntervalSequence};
pub use observer::{ChannelObserver, NoopObserver, TimerObserver};
pub use snapshot::{RestorePolicy, TimerSnapshot};
pub use wake_lock::{NoWakeLock, WakeLock, WakeLockError};
