//! # Multitimer Core Library
//!
//! This library provides the core logic for running several independent
//! interval timers at once (work/break sequences, repeated for a number of
//! cycles), booking the time spent on each project, and persisting everything
//! between runs. The `multitimer` CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine that requires the caller
//!   to periodically invoke `tick()`. Remaining time is always recomputed from
//!   elapsed wall-clock milliseconds, so throttled or suspended polling catches
//!   up instead of drifting.
//! - **Background Clock**: An independent tokio task that counts the same
//!   intervals and reports through messages. Either source may update a timer;
//!   the timer keeps whichever is consistent.
//! - **Ledger**: Per-project totals, daily totals and session history, plus
//!   weekly goals.
//! - **Storage**: SQLite key-value persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`Timer`]: Core timer state machine
//! - [`TimerManager`]: Owns all timers and drives them
//! - [`BackgroundClock`]: Secondary countdown source
//! - [`Database`]: Timer, ledger and goal persistence
//! - [`Config`]: Application configuration management

pub mod background;
pub mod clock;
pub mod error;
pub mod events;
pub mod ledger;
pub mod manager;
pub mod notify;
pub mod storage;
pub mod timer;

pub use background::{BackgroundClock, ClockCommand, ClockHandle, ClockReport};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use events::TimerEvent;
pub use ledger::{ProjectLedger, WeeklyGoals, WeeklyReport};
pub use manager::{ManagerOptions, TimerEdit, TimerManager};
pub use notify::{Notification, NotificationKind, Notifier};
pub use storage::{Config, Database};
pub use timer::{
    Cycles, Interval, IntervalKind, IntervalSequence, RestorePolicy, Timer, TimerConfig,
    TimerContext, TimerId, TimerSnapshot, TimerStatus, TimerView,
};
