//! Persisted form of a timer.
//!
//! Field names and shapes match what earlier releases wrote, so existing
//! data keeps loading. Missing optional fields take the same defaults a fresh
//! timer would have.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::{Timer, TimerConfig, TimerContext, TimerId, TimerStatus, DEFAULT_PROJECT_COLOR};
use super::interval::{Cycles, IntervalSequence};
use crate::error::Result;

/// What to do with a timer that was running when the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// Resume from the saved remaining time; the gap while unloaded is lost.
    #[default]
    RestartClock,
    /// Count the time between `savedAt` and now as elapsed.
    ReplayElapsed,
}

impl std::str::FromStr for RestorePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "restart_clock" => Ok(RestorePolicy::RestartClock),
            "replay_elapsed" => Ok(RestorePolicy::ReplayElapsed),
            other => Err(format!(
                "expected 'restart_clock' or 'replay_elapsed', got '{other}'"
            )),
        }
    }
}

fn default_name() -> String {
    "Timer".into()
}

fn default_color() -> String {
    DEFAULT_PROJECT_COLOR.into()
}

fn default_cycles() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_cycle() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub id: TimerId,
    #[serde(default = "default_name")]
    pub name: String,
    /// Empty string means no project.
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_color")]
    pub project_color: String,
    #[serde(default)]
    pub intervals: IntervalSequence,
    #[serde(default = "default_cycles")]
    pub total_cycles: i64,
    #[serde(default = "default_true")]
    pub infinite_repeat: bool,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    #[serde(default)]
    pub work_notification_text: String,
    #[serde(default)]
    pub break_notification_text: String,
    #[serde(default)]
    pub current_interval_index: usize,
    #[serde(default = "default_cycle")]
    pub current_cycle: u32,
    /// Seconds; absent or zero means "full current interval".
    #[serde(default)]
    pub remaining_time: Option<u64>,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub session_start_time: Option<u64>,
    /// Written by older releases; read and ignored.
    #[serde(default, skip_serializing)]
    pub session_elapsed_time: u64,
    #[serde(default)]
    pub total_time_spent: u64,
    /// Epoch ms at which the snapshot was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<u64>,
}

impl TimerSnapshot {
    fn cycles(&self) -> Result<Cycles> {
        if self.infinite_repeat {
            return Ok(Cycles::Infinite);
        }
        let total = u32::try_from(self.total_cycles).unwrap_or(0);
        Ok(Cycles::finite(total)?)
    }

    fn status(&self) -> TimerStatus {
        match (self.is_running, self.is_paused) {
            (true, false) => TimerStatus::Running,
            (_, true) => TimerStatus::Paused,
            _ => TimerStatus::Stopped,
        }
    }
}

impl Timer {
    /// Capture the full persisted state.
    pub fn to_snapshot(&self) -> TimerSnapshot {
        let config = self.config();
        let status = self.status();
        TimerSnapshot {
            id: self.id().clone(),
            name: config.name.clone(),
            project: config.project.clone().unwrap_or_default(),
            project_color: config.project_color.clone(),
            intervals: config.intervals.clone(),
            total_cycles: config.cycles.as_i64(),
            infinite_repeat: config.cycles.is_infinite(),
            auto_start: config.auto_advance,
            work_notification_text: config.work_notification_text.clone(),
            break_notification_text: config.break_notification_text.clone(),
            current_interval_index: self.current_interval_index(),
            current_cycle: self.current_cycle(),
            remaining_time: Some(self.remaining_secs()),
            is_running: status == TimerStatus::Running,
            is_paused: status == TimerStatus::Paused,
            session_start_time: self.session_started_at(),
            session_elapsed_time: 0,
            total_time_spent: self.total_time_spent(),
            // `remainingTime` is exact as of the last accepted tick.
            saved_at: Some(match status {
                TimerStatus::Running => self.last_tick_ms().unwrap_or_else(|| self.now()),
                _ => self.now(),
            }),
        }
    }

    /// Rebuild a timer from a snapshot.
    ///
    /// Out-of-range positions are clamped rather than rejected. A snapshot that
    /// was running resumes according to `policy`.
    pub fn from_snapshot(
        snapshot: TimerSnapshot,
        ctx: TimerContext,
        policy: RestorePolicy,
    ) -> Result<Timer> {
        let cycles = snapshot.cycles()?;
        let status = snapshot.status();
        let project = Some(snapshot.project.trim().to_string()).filter(|p| !p.is_empty());
        let config = TimerConfig {
            name: snapshot.name.clone(),
            project,
            project_color: snapshot.project_color.clone(),
            intervals: snapshot.intervals.clone(),
            cycles,
            auto_advance: snapshot.auto_start,
            work_notification_text: snapshot.work_notification_text.clone(),
            break_notification_text: snapshot.break_notification_text.clone(),
        };
        let mut timer = Timer::new(snapshot.id.clone(), config, ctx);

        if status == TimerStatus::Stopped {
            // Stopped timers always sit at the start of the sequence.
            let remaining = timer.remaining_secs();
            timer.restore_run_state(0, 1, remaining, None, snapshot.total_time_spent);
            return Ok(timer);
        }

        let intervals = &timer.config().intervals;
        let index = if snapshot.current_interval_index < intervals.len() {
            snapshot.current_interval_index
        } else {
            0
        };
        let duration = intervals
            .get(index)
            .map(|i| i.duration_secs)
            .unwrap_or_else(|| intervals.first().duration_secs);
        let remaining = match snapshot.remaining_time {
            Some(secs) if secs > 0 => secs.min(duration),
            _ => duration,
        };
        let cycle = match cycles {
            Cycles::Finite(total) => snapshot.current_cycle.clamp(1, total.get()),
            Cycles::Infinite => snapshot.current_cycle.max(1),
        };
        timer.restore_run_state(
            index,
            cycle,
            remaining,
            snapshot.session_start_time,
            snapshot.total_time_spent,
        );

        match status {
            TimerStatus::Paused => timer.set_paused_silently(),
            TimerStatus::Running => match (policy, snapshot.saved_at) {
                (RestorePolicy::ReplayElapsed, Some(saved_at)) => {
                    debug!(timer_id = %timer.id(), saved_at, "replaying time while unloaded");
                    timer.resume_from(saved_at);
                }
                _ => {
                    timer.set_paused_silently();
                    timer.start();
                }
            },
            TimerStatus::Stopped => {}
        }
        Ok(timer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::timer::{Interval, IntervalKind};

    fn ctx(clock: &ManualClock) -> TimerContext {
        TimerContext::new(Arc::new(clock.clone()))
    }

    #[test]
    fn minimal_record_uses_defaults() {
        let clock = ManualClock::new(0);
        let snap: TimerSnapshot = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        let timer = Timer::from_snapshot(snap, ctx(&clock), RestorePolicy::default()).unwrap();
        assert_eq!(timer.name(), "Timer");
        assert_eq!(timer.config().project, None);
        assert_eq!(timer.config().project_color, DEFAULT_PROJECT_COLOR);
        assert!(timer.config().cycles.is_infinite());
        assert!(timer.config().auto_advance);
        assert_eq!(timer.remaining_secs(), 25 * 60);
        assert_eq!(timer.status(), TimerStatus::Stopped);
    }

    #[test]
    fn reads_legacy_fields() {
        let clock = ManualClock::new(0);
        let json = r#"{
            "id": "x",
            "name": "Legacy",
            "project": "Writing",
            "intervals": [{"duration": 600, "type": "work", "label": "Draft"}],
            "totalCycles": 3,
            "infiniteRepeat": false,
            "currentCycle": 2,
            "remainingTime": 120,
            "isRunning": false,
            "isPaused": true,
            "sessionStartTime": 5000,
            "sessionElapsedTime": 99,
            "totalTimeSpent": 42
        }"#;
        let snap: TimerSnapshot = serde_json::from_str(json).unwrap();
        let timer = Timer::from_snapshot(snap, ctx(&clock), RestorePolicy::default()).unwrap();
        assert_eq!(timer.status(), TimerStatus::Paused);
        assert_eq!(timer.remaining_secs(), 120);
        assert_eq!(timer.current_cycle(), 2);
        assert_eq!(timer.cycle_label(), "2/3");
        assert_eq!(timer.config().project.as_deref(), Some("Writing"));
        assert_eq!(timer.session_started_at(), Some(5000));
        assert_eq!(timer.total_time_spent(), 42);
    }

    #[test]
    fn zero_remaining_means_full_interval() {
        let clock = ManualClock::new(0);
        let mut snap: TimerSnapshot = serde_json::from_str(r#"{"id":"z","isPaused":true}"#).unwrap();
        snap.remaining_time = Some(0);
        let timer = Timer::from_snapshot(snap, ctx(&clock), RestorePolicy::default()).unwrap();
        assert_eq!(timer.remaining_secs(), 25 * 60);
    }

    #[test]
    fn out_of_range_index_is_clamped() {
        let clock = ManualClock::new(0);
        let snap: TimerSnapshot = serde_json::from_str(
            r#"{"id":"o","isPaused":true,"currentIntervalIndex":7,"remainingTime":9999}"#,
        )
        .unwrap();
        let timer = Timer::from_snapshot(snap, ctx(&clock), RestorePolicy::default()).unwrap();
        assert_eq!(timer.current_interval_index(), 0);
        assert_eq!(timer.remaining_secs(), 25 * 60);
    }

    #[test]
    fn invalid_cycles_are_rejected() {
        let clock = ManualClock::new(0);
        let snap: TimerSnapshot =
            serde_json::from_str(r#"{"id":"c","infiniteRepeat":false,"totalCycles":0}"#).unwrap();
        assert!(Timer::from_snapshot(snap, ctx(&clock), RestorePolicy::default()).is_err());
    }

    #[test]
    fn running_snapshot_restarts_clock_by_default() {
        let clock = ManualClock::new(100_000);
        let snap: TimerSnapshot = serde_json::from_str(
            r#"{"id":"r","isRunning":true,"remainingTime":300,"savedAt":40000}"#,
        )
        .unwrap();
        let timer = Timer::from_snapshot(snap, ctx(&clock), RestorePolicy::RestartClock).unwrap();
        assert_eq!(timer.status(), TimerStatus::Running);
        assert_eq!(timer.remaining_secs(), 300);
        assert_eq!(timer.last_tick_ms(), Some(100_000));
    }

    #[test]
    fn running_snapshot_can_replay_elapsed() {
        let clock = ManualClock::new(100_000);
        let snap: TimerSnapshot = serde_json::from_str(
            r#"{"id":"r","isRunning":true,"remainingTime":300,"savedAt":40000}"#,
        )
        .unwrap();
        let timer = Timer::from_snapshot(snap, ctx(&clock), RestorePolicy::ReplayElapsed).unwrap();
        assert_eq!(timer.status(), TimerStatus::Running);
        assert_eq!(timer.remaining_secs(), 240);
    }

    #[test]
    fn snapshot_reflects_state() {
        let clock = ManualClock::new(7_000);
        let config = TimerConfig {
            name: "Deep".into(),
            project: Some("Research".into()),
            intervals: IntervalSequence::new(vec![Interval::new(90, IntervalKind::Work, "Go")])
                .unwrap(),
            cycles: Cycles::finite(2).unwrap(),
            ..TimerConfig::default()
        };
        let mut timer = Timer::new(TimerId::from("d"), config, ctx(&clock));
        timer.start();
        clock.advance(2_000);
        timer.tick();

        let snap = timer.to_snapshot();
        assert_eq!(snap.remaining_time, Some(88));
        assert!(snap.is_running);
        assert!(!snap.is_paused);
        assert!(!snap.infinite_repeat);
        assert_eq!(snap.total_cycles, 2);
        assert_eq!(snap.saved_at, Some(9_000));

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["projectColor"], DEFAULT_PROJECT_COLOR);
        assert_eq!(json["intervals"][0]["type"], "work");
        assert!(json.get("sessionElapsedTime").is_none());
    }

    #[test]
    fn infinite_cycles_persist_as_minus_one() {
        let clock = ManualClock::new(0);
        let timer = Timer::new(TimerId::from("i"), TimerConfig::default(), ctx(&clock));
        let json = serde_json::to_value(timer.to_snapshot()).unwrap();
        assert_eq!(json["infiniteRepeat"], true);
        assert_eq!(json["totalCycles"], -1);

        let restored = Timer::from_snapshot(
            serde_json::from_value(json).unwrap(),
            ctx(&clock),
            RestorePolicy::RestartClock,
        )
        .unwrap();
        assert_eq!(restored.config().cycles, Cycles::Infinite);
    }

    #[test]
    fn running_snapshot_is_stamped_at_last_tick() {
        let clock = ManualClock::new(10_000);
        let mut timer = Timer::new(TimerId::from("s"), TimerConfig::default(), ctx(&clock));
        timer.start();
        clock.advance(1_700);
        timer.tick();

        let snap = timer.to_snapshot();
        assert_eq!(snap.remaining_time, Some(25 * 60 - 1));
        assert_eq!(snap.saved_at, Some(11_000));

        timer.pause();
        assert_eq!(timer.to_snapshot().saved_at, Some(11_700));
    }
}
