//! Timer engine implementation.
//!
//! A `Timer` is a wall-clock-based state machine. It owns no threads: the
//! owner calls [`Timer::tick`] from a polling loop (finer than one second) and
//! feeds it reports from the background clock. Both paths recompute remaining
//! time from wall-clock deltas, so whichever arrives first simply wins.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Running <-> Paused
//! Running -> Stopped   (explicit stop or last cycle finished)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut timer = Timer::new(TimerId::generate(), TimerConfig::default(), ctx);
//! timer.start();
//! // In a loop, every ~100ms:
//! timer.tick();
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::interval::{Cycles, Interval, IntervalSequence};
use super::observer::{NoopObserver, TimerObserver};
use super::wake_lock::{NoWakeLock, WakeLock};
use crate::background::{ClockCommand, ClockHandle};
use crate::clock::SharedClock;
use crate::error::ValidationError;
use crate::ledger::{lock_ledger, SharedLedger};

/// Milliseconds per accepted tick.
const TICK_MS: u64 = 1000;

/// Colour given to timers that do not pick one.
pub const DEFAULT_PROJECT_COLOR: &str = "#4f46e5";

/// Opaque, stable timer identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(String);

impl TimerId {
    /// A fresh id that is never reused.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TimerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TimerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Stopped,
    Running,
    Paused,
}

/// User-facing configuration of a timer.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerConfig {
    pub name: String,
    pub project: Option<String>,
    pub project_color: String,
    pub intervals: IntervalSequence,
    pub cycles: Cycles,
    /// Start the next interval automatically instead of pausing.
    pub auto_advance: bool,
    pub work_notification_text: String,
    pub break_notification_text: String,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            name: "Timer".into(),
            project: None,
            project_color: DEFAULT_PROJECT_COLOR.into(),
            intervals: IntervalSequence::default(),
            cycles: Cycles::Infinite,
            auto_advance: true,
            work_notification_text: String::new(),
            break_notification_text: String::new(),
        }
    }
}

impl TimerConfig {
    /// Project name if one is set and non-blank.
    pub fn project_name(&self) -> Option<&str> {
        self.project
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Collaborators a timer talks to, injected at construction.
pub struct TimerContext {
    pub clock: SharedClock,
    pub background: Option<ClockHandle>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub ledger: Option<SharedLedger>,
    pub observer: Box<dyn TimerObserver>,
}

impl TimerContext {
    /// Foreground-only context with no observer, ledger or wake lock.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            background: None,
            wake_lock: Arc::new(NoWakeLock),
            ledger: None,
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_background(mut self, handle: ClockHandle) -> Self {
        self.background = Some(handle);
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    pub fn with_ledger(mut self, ledger: SharedLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn TimerObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// Serializable read-only view of a timer for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerView {
    pub id: TimerId,
    pub name: String,
    pub project: Option<String>,
    pub project_color: String,
    pub status: TimerStatus,
    pub interval_index: usize,
    pub interval_label: String,
    pub interval_kind: super::IntervalKind,
    pub remaining_secs: u64,
    pub remaining: String,
    pub progress_pct: f64,
    pub cycle: u32,
    pub cycle_label: String,
    pub total_time_spent: u64,
}

/// One countdown state machine.
pub struct Timer {
    id: TimerId,
    config: TimerConfig,
    current_interval_index: usize,
    current_cycle: u32,
    remaining_secs: u64,
    status: TimerStatus,
    /// Epoch ms when the current session began.
    session_started_at: Option<u64>,
    total_time_spent: u64,
    /// Reference instant for the next whole-second decrement.
    last_tick_ms: Option<u64>,
    /// Instant at which the next accepted tick is expected.
    expected_tick_ms: Option<u64>,
    use_background: bool,
    wake_lock_held: bool,
    drift_corrections: u64,
    ctx: TimerContext,
}

impl Timer {
    /// Create a stopped timer positioned at the first interval.
    pub fn new(id: TimerId, config: TimerConfig, ctx: TimerContext) -> Self {
        let remaining_secs = config.intervals.first().duration_secs;
        let use_background = ctx.background.is_some();
        Self {
            id,
            config,
            current_interval_index: 0,
            current_cycle: 1,
            remaining_secs,
            status: TimerStatus::Stopped,
            session_started_at: None,
            total_time_spent: 0,
            last_tick_ms: None,
            expected_tick_ms: None,
            use_background,
            wake_lock_held: false,
            drift_corrections: 0,
            ctx,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> &TimerId {
        &self.id
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn current_interval_index(&self) -> usize {
        self.current_interval_index
    }

    pub fn current_cycle(&self) -> u32 {
        self.current_cycle
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn session_started_at(&self) -> Option<u64> {
        self.session_started_at
    }

    pub fn total_time_spent(&self) -> u64 {
        self.total_time_spent
    }

    pub fn last_tick_ms(&self) -> Option<u64> {
        self.last_tick_ms
    }

    /// Whether background clock messages are still being sent.
    pub fn uses_background(&self) -> bool {
        self.use_background
    }

    /// Number of throttling/suspension gaps detected so far.
    pub fn drift_corrections(&self) -> u64 {
        self.drift_corrections
    }

    pub fn current_interval(&self) -> &Interval {
        self.config
            .intervals
            .get(self.current_interval_index)
            .unwrap_or_else(|| self.config.intervals.first())
    }

    /// Percent of the current interval already elapsed, in `[0, 100]`.
    pub fn progress_pct(&self) -> f64 {
        let duration = self.current_interval().duration_secs;
        if duration == 0 {
            return 0.0;
        }
        let elapsed = duration.saturating_sub(self.remaining_secs);
        (elapsed as f64 / duration as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Remaining time as `MM:SS`.
    pub fn formatted_remaining(&self) -> String {
        format_clock(self.remaining_secs)
    }

    /// `"Cycle n"` for endless timers, `"n/total"` otherwise.
    pub fn cycle_label(&self) -> String {
        match self.config.cycles {
            Cycles::Infinite => format!("Cycle {}", self.current_cycle),
            Cycles::Finite(total) => format!("{}/{}", self.current_cycle, total),
        }
    }

    /// Seconds since the current session began, 0 when there is none.
    pub fn session_time_secs(&self) -> u64 {
        self.session_started_at
            .map(|started| self.now().saturating_sub(started) / 1000)
            .unwrap_or(0)
    }

    /// True while running with no accepted tick for longer than `threshold_ms`.
    pub fn is_stale(&self, now_ms: u64, threshold_ms: u64) -> bool {
        self.is_running()
            && self
                .last_tick_ms
                .is_some_and(|last| now_ms.saturating_sub(last) > threshold_ms)
    }

    pub fn view(&self) -> TimerView {
        let interval = self.current_interval();
        TimerView {
            id: self.id.clone(),
            name: self.config.name.clone(),
            project: self.config.project_name().map(str::to_string),
            project_color: self.config.project_color.clone(),
            status: self.status,
            interval_index: self.current_interval_index,
            interval_label: interval.label.clone(),
            interval_kind: interval.kind,
            remaining_secs: self.remaining_secs,
            remaining: self.formatted_remaining(),
            progress_pct: self.progress_pct(),
            cycle: self.current_cycle,
            cycle_label: self.cycle_label(),
            total_time_spent: self.total_time_spent,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) {
        if self.status == TimerStatus::Running {
            return;
        }
        let now = self.now();
        self.status = TimerStatus::Running;
        if self.session_started_at.is_none() {
            self.session_started_at = Some(now);
        }
        // A long pause must not count as elapsed time.
        self.last_tick_ms = Some(now);
        self.expected_tick_ms = Some(now + TICK_MS);
        self.acquire_wake_lock();
        self.arm_background();
        info!(
            timer_id = %self.id,
            interval = self.current_interval_index,
            cycle = self.current_cycle,
            remaining_secs = self.remaining_secs,
            "timer started"
        );
        self.ctx.observer.on_update(&self.id);
    }

    pub fn pause(&mut self) {
        if self.status != TimerStatus::Running {
            return;
        }
        self.status = TimerStatus::Paused;
        self.send_background(ClockCommand::Pause {
            id: self.id.clone(),
        });
        self.release_wake_lock();
        self.last_tick_ms = None;
        self.expected_tick_ms = None;
        info!(timer_id = %self.id, remaining_secs = self.remaining_secs, "timer paused");
        self.ctx.observer.on_update(&self.id);
    }

    /// End the session, book its time and return to the first interval.
    ///
    /// Always fires the update callback, even when nothing was running.
    pub fn stop(&mut self) {
        let now = self.now();
        if let Some(started) = self.session_started_at.take() {
            let session_secs = now.saturating_sub(started) / 1000;
            self.total_time_spent += session_secs;
            self.book_session(session_secs, now);
        }
        self.status = TimerStatus::Stopped;
        self.current_interval_index = 0;
        self.current_cycle = 1;
        self.remaining_secs = self.config.intervals.first().duration_secs;
        self.last_tick_ms = None;
        self.expected_tick_ms = None;
        self.send_background(ClockCommand::Stop {
            id: self.id.clone(),
        });
        self.release_wake_lock();
        debug!(timer_id = %self.id, total_secs = self.total_time_spent, "timer stopped");
        self.ctx.observer.on_update(&self.id);
    }

    /// Foreground poll. Sub-second calls are no-ops.
    ///
    /// Decrements by the whole seconds elapsed since the last accepted tick and
    /// carries the fractional remainder forward. Gaps larger than a second
    /// beyond the expected tick are counted as throttling and caught up in the
    /// same step; a clock that jumped backwards re-anchors the reference.
    pub fn tick(&mut self) {
        if self.status != TimerStatus::Running {
            return;
        }
        let Some(last) = self.last_tick_ms else {
            return;
        };
        let now = self.now();
        let expected = self.expected_tick_ms.unwrap_or(last + TICK_MS);

        if now + TICK_MS < expected {
            warn!(
                timer_id = %self.id,
                drift_ms = expected as i64 - now as i64,
                "clock moved backwards, re-anchoring timer"
            );
            self.drift_corrections += 1;
            self.last_tick_ms = Some(now);
            self.expected_tick_ms = Some(now + TICK_MS);
            return;
        }

        let since_last = now.saturating_sub(last);
        if since_last < TICK_MS {
            return;
        }
        let whole_secs = since_last / TICK_MS;
        let late_ms = now.saturating_sub(expected);
        if late_ms > TICK_MS {
            self.drift_corrections += 1;
            warn!(
                timer_id = %self.id,
                drift_ms = late_ms,
                catch_up_secs = whole_secs - 1,
                "timer drift corrected"
            );
        }

        let anchor = last + whole_secs * TICK_MS;
        self.last_tick_ms = Some(anchor);
        self.expected_tick_ms = Some(anchor + TICK_MS);
        self.consume(whole_secs);
        self.ctx.observer.on_update(&self.id);
    }

    /// Background clock reported a new remaining value.
    ///
    /// Accepted only if it does not move time backwards and agrees with the
    /// wall-clock reconstruction from our own reference to within a second.
    /// Anything else is a straggler from a countdown that has since been
    /// replaced.
    pub fn apply_background_tick(&mut self, remaining: u64, timestamp: u64) {
        if self.status != TimerStatus::Running {
            return;
        }
        let last = self.last_tick_ms.unwrap_or(timestamp);
        let reconstructed = self
            .remaining_secs
            .saturating_sub(timestamp.saturating_sub(last) / 1000);
        if remaining > self.remaining_secs || remaining + 1 < reconstructed {
            debug!(
                timer_id = %self.id,
                remaining,
                local = self.remaining_secs,
                "ignoring stale background tick"
            );
            return;
        }
        self.remaining_secs = remaining;
        let anchor = timestamp.max(last);
        self.last_tick_ms = Some(anchor);
        self.expected_tick_ms = Some(anchor + TICK_MS);
        if self.remaining_secs == 0 {
            self.handle_interval_complete();
        }
        self.ctx.observer.on_update(&self.id);
    }

    /// Background clock reported the countdown hit zero.
    pub fn apply_background_interval_complete(&mut self) {
        if self.status == TimerStatus::Running && self.remaining_secs == 0 {
            self.handle_interval_complete();
            self.ctx.observer.on_update(&self.id);
        }
    }

    /// Replace the interval sequence.
    ///
    /// A stopped or paused timer picks up the duration of the interval it now
    /// points at; a running timer keeps counting, clamped to the new interval.
    pub fn update_intervals(&mut self, intervals: Vec<Interval>) -> Result<(), ValidationError> {
        self.config.intervals = IntervalSequence::new(intervals)?;
        if self.current_interval_index >= self.config.intervals.len() {
            self.current_interval_index = 0;
        }
        let duration = self.current_interval().duration_secs;
        match self.status {
            TimerStatus::Running => {
                if self.remaining_secs > duration {
                    self.remaining_secs = duration;
                    self.arm_background();
                }
            }
            TimerStatus::Paused => {
                self.remaining_secs = duration;
                self.send_background(ClockCommand::UpdateDuration {
                    id: self.id.clone(),
                    duration,
                });
            }
            TimerStatus::Stopped => self.remaining_secs = duration,
        }
        self.ctx.observer.on_update(&self.id);
        Ok(())
    }

    pub fn update_cycles(&mut self, cycles: Cycles) {
        self.config.cycles = cycles;
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.config.name = name.into();
    }

    pub fn set_project(&mut self, project: Option<String>, color: Option<String>) {
        self.config.project = project;
        if let Some(color) = color {
            self.config.project_color = color;
        }
    }

    pub fn set_auto_advance(&mut self, auto_advance: bool) {
        self.config.auto_advance = auto_advance;
    }

    pub fn set_notification_texts(&mut self, work: Option<String>, brk: Option<String>) {
        if let Some(work) = work {
            self.config.work_notification_text = work;
        }
        if let Some(brk) = brk {
            self.config.break_notification_text = brk;
        }
    }

    /// Stop sending to the background clock and rely on polling alone.
    pub fn disable_background(&mut self) {
        if self.use_background {
            warn!(timer_id = %self.id, "background clock disabled, polling only");
        }
        self.use_background = false;
    }

    /// Deregister from the background clock and drop the wake lock.
    pub fn destroy(&mut self) {
        self.send_background(ClockCommand::Destroy {
            id: self.id.clone(),
        });
        self.release_wake_lock();
    }

    // ── Internal ─────────────────────────────────────────────────────

    pub(crate) fn now(&self) -> u64 {
        self.ctx.clock.now_ms()
    }

    pub(crate) fn ctx(&self) -> &TimerContext {
        &self.ctx
    }

    /// Count `secs` whole seconds down, rolling into following intervals
    /// while the timer keeps running.
    fn consume(&mut self, mut secs: u64) {
        while secs > 0 && self.status == TimerStatus::Running {
            let step = secs.min(self.remaining_secs);
            self.remaining_secs -= step;
            secs -= step;
            if self.remaining_secs == 0 {
                self.handle_interval_complete();
            }
        }
    }

    fn handle_interval_complete(&mut self) {
        let finished = self.current_interval().clone();
        self.ctx
            .observer
            .on_interval_complete(&self.id, &finished);

        self.current_interval_index += 1;
        if self.current_interval_index >= self.config.intervals.len() {
            self.current_interval_index = 0;
            self.current_cycle += 1;
            if self.config.cycles.exceeded_by(self.current_cycle) {
                self.complete();
                return;
            }
        }
        self.remaining_secs = self.current_interval().duration_secs;

        if self.config.auto_advance && self.status == TimerStatus::Running {
            self.arm_background();
            info!(
                timer_id = %self.id,
                interval = %self.current_interval().label,
                cycle = self.current_cycle,
                "auto-starting next interval"
            );
        } else {
            self.pause();
        }
    }

    fn complete(&mut self) {
        self.stop();
        info!(timer_id = %self.id, "timer completed");
        self.ctx.observer.on_complete(&self.id);
    }

    fn book_session(&self, session_secs: u64, now: u64) {
        let (Some(project), Some(ledger)) = (self.config.project_name(), &self.ctx.ledger) else {
            return;
        };
        let at = crate::ledger::local_time(now);
        lock_ledger(ledger).record_session(
            project,
            session_secs,
            &self.config.name,
            &self.config.project_color,
            at,
        );
        debug!(timer_id = %self.id, project, session_secs, "session booked");
    }

    fn arm_background(&mut self) {
        let duration = self.remaining_secs;
        self.send_background(ClockCommand::Create {
            id: self.id.clone(),
            duration,
        });
        self.send_background(ClockCommand::Start {
            id: self.id.clone(),
        });
    }

    fn send_background(&mut self, command: ClockCommand) {
        if !self.use_background {
            return;
        }
        let Some(handle) = &self.ctx.background else {
            return;
        };
        if handle.send(command).is_err() {
            self.disable_background();
        }
    }

    fn acquire_wake_lock(&mut self) {
        if self.wake_lock_held {
            return;
        }
        match self.ctx.wake_lock.acquire(&self.id) {
            Ok(()) => self.wake_lock_held = true,
            Err(e) => debug!(timer_id = %self.id, "wake lock not acquired: {e}"),
        }
    }

    fn release_wake_lock(&mut self) {
        if self.wake_lock_held {
            self.ctx.wake_lock.release(&self.id);
            self.wake_lock_held = false;
        }
    }

    /// Restore run state from a snapshot. Used by the codec only.
    pub(crate) fn restore_run_state(
        &mut self,
        index: usize,
        cycle: u32,
        remaining_secs: u64,
        session_started_at: Option<u64>,
        total_time_spent: u64,
    ) {
        self.current_interval_index = index;
        self.current_cycle = cycle;
        self.remaining_secs = remaining_secs;
        self.session_started_at = session_started_at;
        self.total_time_spent = total_time_spent;
    }

    /// Mark as paused without side effects; `start` then resumes cleanly.
    pub(crate) fn set_paused_silently(&mut self) {
        self.status = TimerStatus::Paused;
    }

    /// Resume as if running since `since_ms`, replaying the gap through the
    /// normal tick path.
    pub(crate) fn resume_from(&mut self, since_ms: u64) {
        self.status = TimerStatus::Running;
        self.last_tick_ms = Some(since_ms);
        self.expected_tick_ms = Some(since_ms + TICK_MS);
        self.tick();
        if self.status == TimerStatus::Running {
            self.acquire_wake_lock();
            self.arm_background();
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("status", &self.status)
            .field("interval", &self.current_interval_index)
            .field("cycle", &self.current_cycle)
            .field("remaining_secs", &self.remaining_secs)
            .finish()
    }
}

/// `MM:SS`, minutes not wrapped at 60.
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
