//! User-facing alerts for interval and timer completion.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::timer::{Interval, IntervalKind, Timer, TimerId};

pub const NOTIFICATION_TITLE: &str = "Timer Alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Work,
    Break,
    Complete,
}

impl NotificationKind {
    /// Pitch of the alert tone.
    pub fn tone_hz(&self) -> u32 {
        match self {
            NotificationKind::Work => 880,
            NotificationKind::Break => 440,
            NotificationKind::Complete => 660,
        }
    }

    /// Relative loudness of the alert tone.
    pub fn gain(&self) -> f32 {
        match self {
            NotificationKind::Work => 0.3,
            NotificationKind::Break => 0.2,
            NotificationKind::Complete => 0.4,
        }
    }
}

impl From<IntervalKind> for NotificationKind {
    fn from(kind: IntervalKind) -> Self {
        match kind {
            IntervalKind::Work => NotificationKind::Work,
            IntervalKind::Break => NotificationKind::Break,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub timer_id: TimerId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

impl Notification {
    /// Alert for the end of `finished`, using the timer's custom text for that
    /// kind when one is set.
    pub fn interval_complete(timer: &Timer, finished: &Interval) -> Self {
        let config = timer.config();
        let custom = match finished.kind {
            IntervalKind::Work => config.work_notification_text.trim(),
            IntervalKind::Break => config.break_notification_text.trim(),
        };
        let message = if custom.is_empty() {
            format!("{} complete!", finished.label)
        } else {
            custom.to_string()
        };
        Self {
            timer_id: timer.id().clone(),
            title: NOTIFICATION_TITLE.into(),
            message,
            kind: finished.kind.into(),
        }
    }

    pub fn timer_complete(timer: &Timer) -> Self {
        Self {
            timer_id: timer.id().clone(),
            title: NOTIFICATION_TITLE.into(),
            message: format!("{} complete!", timer.name()),
            kind: NotificationKind::Complete,
        }
    }
}

/// Delivers notifications to the user.
pub trait Notifier: Send {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: &Notification) {
        info!(
            timer_id = %n.timer_id,
            kind = ?n.kind,
            tone_hz = n.kind.tone_hz(),
            "{}: {}",
            n.title,
            n.message
        );
    }
}
