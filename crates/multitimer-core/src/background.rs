//! Background clock.
//!
//! A second, independent source of "remaining time" that runs in its own tokio
//! task and is reachable only through messages. Each countdown recomputes its
//! remaining seconds from the wall clock on every sample, so a late or
//! throttled sample never accumulates error.
//!
//! ## Protocol
//!
//! ```text
//! owner  -> clock : create(id, duration) | start(id) | pause(id) | stop(id)
//!                   updateDuration(id, duration) | destroy(id) | heartbeat
//! clock  -> owner : tick(id, remaining, timestamp) | intervalComplete(id)
//!                   heartbeat(timestamp)
//! ```
//!
//! `tick` is only sent when the integer remaining value changes. The handle is
//! owned explicitly by whoever manages the timers; dropping every handle ends
//! the task.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::timer::TimerId;

/// Default sampling period.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Default period of unsolicited heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Messages sent to the background clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClockCommand {
    /// Register (or replace) a stopped countdown of `duration` seconds.
    Create { id: TimerId, duration: u64 },
    Start { id: TimerId },
    Pause { id: TimerId },
    Stop { id: TimerId },
    UpdateDuration { id: TimerId, duration: u64 },
    Destroy { id: TimerId },
    Heartbeat,
}

/// Messages sent back by the background clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClockReport {
    Tick {
        id: TimerId,
        remaining: u64,
        timestamp: u64,
    },
    IntervalComplete { id: TimerId },
    Heartbeat { timestamp: u64 },
}

/// The background task is gone.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("background clock is not running")]
pub struct BackgroundUnavailable;

/// One countdown held by the background clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    duration: u64,
    remaining: u64,
    started_at: Option<u64>,
    paused_offset_ms: u64,
    pause_started_at: Option<u64>,
    running: bool,
}

/// Result of sampling a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    Unchanged,
    Changed(u64),
    Finished,
}

impl Countdown {
    pub fn new(duration: u64) -> Self {
        Self {
            duration,
            remaining: duration,
            started_at: None,
            paused_offset_ms: 0,
            pause_started_at: None,
            running: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, now: u64) {
        if self.running {
            return;
        }
        match (self.started_at, self.pause_started_at.take()) {
            (None, _) => self.started_at = Some(now),
            (Some(_), Some(paused_at)) => {
                self.paused_offset_ms += now.saturating_sub(paused_at);
            }
            (Some(_), None) => {}
        }
        self.running = true;
    }

    pub fn pause(&mut self, now: u64) {
        if !self.running {
            return;
        }
        self.running = false;
        self.pause_started_at = Some(now);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.started_at = None;
        self.paused_offset_ms = 0;
        self.pause_started_at = None;
        self.remaining = self.duration;
    }

    pub fn update_duration(&mut self, duration: u64) {
        self.duration = duration;
        if !self.running {
            self.remaining = duration;
        }
    }

    /// Recompute remaining time from the wall clock.
    pub fn sample(&mut self, now: u64) -> Sample {
        let Some(started_at) = self.started_at.filter(|_| self.running) else {
            return Sample::Unchanged;
        };
        let active_ms = now
            .saturating_sub(started_at)
            .saturating_sub(self.paused_offset_ms);
        let remaining = self.duration.saturating_sub(active_ms / 1000);
        if remaining == self.remaining {
            return Sample::Unchanged;
        }
        self.remaining = remaining;
        if remaining == 0 {
            Sample::Finished
        } else {
            Sample::Changed(remaining)
        }
    }
}

/// Message-driven state of the background clock, independent of the task
/// that drives it.
#[derive(Debug, Default)]
pub struct ClockWorker {
    countdowns: HashMap<TimerId, Countdown>,
}

impl ClockWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn countdown(&self, id: &TimerId) -> Option<&Countdown> {
        self.countdowns.get(id)
    }

    pub fn len(&self) -> usize {
        self.countdowns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countdowns.is_empty()
    }

    /// Apply one command. Commands for unknown ids are ignored.
    pub fn handle(&mut self, command: ClockCommand, now: u64) -> Option<ClockReport> {
        match command {
            ClockCommand::Create { id, duration } => {
                self.countdowns.insert(id, Countdown::new(duration));
            }
            ClockCommand::Start { id } => {
                if let Some(c) = self.countdowns.get_mut(&id) {
                    c.start(now);
                }
            }
            ClockCommand::Pause { id } => {
                if let Some(c) = self.countdowns.get_mut(&id) {
                    c.pause(now);
                }
            }
            ClockCommand::Stop { id } => {
                if let Some(c) = self.countdowns.get_mut(&id) {
                    c.stop();
                }
            }
            ClockCommand::UpdateDuration { id, duration } => {
                if let Some(c) = self.countdowns.get_mut(&id) {
                    c.update_duration(duration);
                }
            }
            ClockCommand::Destroy { id } => {
                self.countdowns.remove(&id);
            }
            ClockCommand::Heartbeat => {
                return Some(ClockReport::Heartbeat { timestamp: now });
            }
        }
        None
    }

    /// Sample every running countdown.
    pub fn sample(&mut self, now: u64) -> Vec<ClockReport> {
        let mut reports = Vec::new();
        for (id, countdown) in self.countdowns.iter_mut() {
            match countdown.sample(now) {
                Sample::Unchanged => {}
                Sample::Changed(remaining) => reports.push(ClockReport::Tick {
                    id: id.clone(),
                    remaining,
                    timestamp: now,
                }),
                Sample::Finished => {
                    reports.push(ClockReport::Tick {
                        id: id.clone(),
                        remaining: 0,
                        timestamp: now,
                    });
                    reports.push(ClockReport::IntervalComplete { id: id.clone() });
                    countdown.stop();
                }
            }
        }
        reports
    }
}

/// Sending side of the background clock.
///
/// Cheap to clone; every timer holds one.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    tx: mpsc::UnboundedSender<ClockCommand>,
}

impl ClockHandle {
    pub fn send(&self, command: ClockCommand) -> Result<(), BackgroundUnavailable> {
        self.tx.send(command).map_err(|_| BackgroundUnavailable)
    }
}

/// Everything the owner needs to talk to a running background clock.
#[derive(Debug)]
pub struct BackgroundClock {
    pub handle: ClockHandle,
    pub reports: mpsc::UnboundedReceiver<ClockReport>,
    pub task: JoinHandle<()>,
}

impl BackgroundClock {
    /// Spawn the background clock on the current tokio runtime.
    pub fn spawn(clock: SharedClock) -> Self {
        Self::spawn_with(clock, DEFAULT_SAMPLE_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL)
    }

    pub fn spawn_with(clock: SharedClock, sample_every: Duration, heartbeat_every: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_clock(
            clock,
            cmd_rx,
            report_tx,
            sample_every,
            heartbeat_every,
        ));
        info!(
            sample_ms = sample_every.as_millis() as u64,
            "background clock started"
        );
        Self {
            handle: ClockHandle { tx: cmd_tx },
            reports: report_rx,
            task,
        }
    }

    /// Stop the task without waiting for the handles to drop.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run_clock(
    clock: SharedClock,
    mut commands: mpsc::UnboundedReceiver<ClockCommand>,
    reports: mpsc::UnboundedSender<ClockReport>,
    sample_every: Duration,
    heartbeat_every: Duration,
) {
    let mut worker = ClockWorker::new();
    let mut sampler = tokio::time::interval(sample_every);
    sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeat = tokio::time::interval(heartbeat_every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outgoing: Vec<ClockReport> = tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    debug!(?command, "background clock command");
                    worker.handle(command, clock.now_ms()).into_iter().collect()
                }
                None => break,
            },
            _ = sampler.tick() => worker.sample(clock.now_ms()),
            _ = heartbeat.tick() => vec![ClockReport::Heartbeat { timestamp: clock.now_ms() }],
        };
        for report in outgoing {
            if reports.send(report).is_err() {
                debug!("background clock owner went away");
                return;
            }
        }
    }
    debug!("background clock stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn id(s: &str) -> TimerId {
        TimerId::from(s)
    }

    #[test]
    fn countdown_recomputes_from_wall_clock() {
        let mut c = Countdown::new(10);
        c.start(0);
        assert_eq!(c.sample(999), Sample::Unchanged);
        assert_eq!(c.sample(1_000), Sample::Changed(9));
        // A late sample jumps straight to the right value.
        assert_eq!(c.sample(4_500), Sample::Changed(6));
        assert_eq!(c.sample(4_900), Sample::Unchanged);
    }

    #[test]
    fn countdown_excludes_paused_time() {
        let mut c = Countdown::new(10);
        c.start(0);
        c.sample(2_000);
        c.pause(2_500);
        assert_eq!(c.sample(60_000), Sample::Unchanged);
        c.start(62_500);
        // 2.5s active before the pause, 0.5s after.
        assert_eq!(c.sample(63_000), Sample::Changed(7));
    }

    #[test]
    fn countdown_stop_resets() {
        let mut c = Countdown::new(5);
        c.start(0);
        c.sample(3_000);
        c.stop();
        assert_eq!(c.remaining(), 5);
        assert!(!c.is_running());
        c.start(10_000);
        assert_eq!(c.sample(11_000), Sample::Changed(4));
    }

    #[test]
    fn update_duration_resets_only_when_idle() {
        let mut c = Countdown::new(5);
        c.update_duration(8);
        assert_eq!(c.remaining(), 8);
        c.start(0);
        c.update_duration(20);
        assert_eq!(c.remaining(), 8);
        assert_eq!(c.sample(1_000), Sample::Changed(19));
    }

    #[test]
    fn worker_emits_completion_and_stops() {
        let mut w = ClockWorker::new();
        w.handle(ClockCommand::Create { id: id("a"), duration: 2 }, 0);
        w.handle(ClockCommand::Start { id: id("a") }, 0);
        assert_eq!(
            w.sample(1_000),
            vec![ClockReport::Tick { id: id("a"), remaining: 1, timestamp: 1_000 }]
        );
        assert_eq!(
            w.sample(2_000),
            vec![
                ClockReport::Tick { id: id("a"), remaining: 0, timestamp: 2_000 },
                ClockReport::IntervalComplete { id: id("a") },
            ]
        );
        assert!(!w.countdown(&id("a")).unwrap().is_running());
        assert!(w.sample(5_000).is_empty());
    }

    #[test]
    fn worker_ignores_unknown_ids_and_answers_heartbeat() {
        let mut w = ClockWorker::new();
        assert_eq!(w.handle(ClockCommand::Start { id: id("nope") }, 0), None);
        assert_eq!(
            w.handle(ClockCommand::Heartbeat, 42),
            Some(ClockReport::Heartbeat { timestamp: 42 })
        );
        w.handle(ClockCommand::Create { id: id("a"), duration: 3 }, 0);
        w.handle(ClockCommand::Destroy { id: id("a") }, 0);
        assert!(w.is_empty());
    }

    #[test]
    fn commands_use_wire_names() {
        let json = serde_json::to_value(ClockCommand::UpdateDuration {
            id: id("t1"),
            duration: 300,
        })
        .unwrap();
        assert_eq!(json["type"], "updateDuration");
        assert_eq!(json["id"], "t1");
        assert_eq!(json["duration"], 300);

        let json = serde_json::to_value(ClockReport::IntervalComplete { id: id("t1") }).unwrap();
        assert_eq!(json["type"], "intervalComplete");
    }

    #[tokio::test(start_paused = true)]
    async fn task_reports_ticks_through_channel() {
        let clock = ManualClock::new(0);
        let mut bg = BackgroundClock::spawn_with(
            Arc::new(clock.clone()),
            Duration::from_millis(100),
            Duration::from_secs(3600),
        );
        // First heartbeat fires immediately.
        assert!(matches!(
            bg.reports.recv().await,
            Some(ClockReport::Heartbeat { .. })
        ));

        bg.handle
            .send(ClockCommand::Create { id: id("a"), duration: 3 })
            .unwrap();
        bg.handle.send(ClockCommand::Start { id: id("a") }).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        clock.advance(1_000);
        let report = bg.reports.recv().await.unwrap();
        assert_eq!(
            report,
            ClockReport::Tick { id: id("a"), remaining: 2, timestamp: 1_000 }
        );

        bg.handle.send(ClockCommand::Heartbeat).unwrap();
        assert_eq!(
            bg.reports.recv().await,
            Some(ClockReport::Heartbeat { timestamp: 1_000 })
        );
        bg.shutdown();
    }
}
