//! Timer collection management.
//!
//! The manager owns every timer, the shared project ledger, the weekly goals
//! and the optional background clock link. It drives the foreground poll, the
//! stale-timer watchdog and the heartbeat check, turns timer events into
//! notifications, and persists after every change.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::background::{BackgroundClock, ClockCommand, ClockHandle, ClockReport};
use crate::clock::SharedClock;
use crate::error::{CoreError, Result};
use crate::events::TimerEvent;
use crate::ledger::{lock_ledger, ProjectLedger, SharedLedger, WeeklyGoals, WeeklyReport};
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::storage::{Config, Database};
use crate::timer::{
    ChannelObserver, Cycles, Interval, NoWakeLock, RestorePolicy, Timer, TimerConfig,
    TimerContext, TimerId, TimerStatus, WakeLock,
};

/// Timing and behaviour knobs, normally taken from [`Config`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub tick_interval: Duration,
    pub watchdog_interval: Duration,
    pub stale_after_ms: u64,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout_ms: u64,
    pub restore_policy: RestorePolicy,
    pub notifications_enabled: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ManagerOptions {
    fn from(config: &Config) -> Self {
        let engine = &config.engine;
        Self {
            tick_interval: Duration::from_millis(engine.tick_interval_ms.max(10)),
            watchdog_interval: Duration::from_millis(engine.watchdog_interval_ms.max(100)),
            stale_after_ms: engine.stale_after_ms,
            heartbeat_interval: Duration::from_millis(engine.heartbeat_interval_ms.max(100)),
            heartbeat_timeout_ms: engine.heartbeat_timeout_ms,
            restore_policy: engine.restore_policy,
            notifications_enabled: config.notifications.enabled,
        }
    }
}

/// Partial update applied by [`TimerManager::edit`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct TimerEdit {
    pub name: Option<String>,
    /// `Some(None)` clears the project.
    pub project: Option<Option<String>>,
    pub project_color: Option<String>,
    pub intervals: Option<Vec<Interval>>,
    pub cycles: Option<Cycles>,
    pub auto_advance: Option<bool>,
    pub work_notification_text: Option<String>,
    pub break_notification_text: Option<String>,
}

struct BackgroundLink {
    handle: ClockHandle,
    reports: mpsc::UnboundedReceiver<ClockReport>,
    task: JoinHandle<()>,
    last_heartbeat_ms: u64,
}

pub struct TimerManager {
    db: Database,
    clock: SharedClock,
    options: ManagerOptions,
    timers: Vec<Timer>,
    ledger: SharedLedger,
    goals: WeeklyGoals,
    background: Option<BackgroundLink>,
    events_tx: mpsc::UnboundedSender<TimerEvent>,
    events_rx: mpsc::UnboundedReceiver<TimerEvent>,
    notifier: Box<dyn Notifier>,
    wake_lock: Arc<dyn WakeLock>,
}

impl TimerManager {
    /// Create a manager with no timers, loading the ledger and goals.
    ///
    /// Call [`TimerManager::load`] to restore saved timers.
    pub fn new(db: Database, clock: SharedClock, options: ManagerOptions) -> Result<Self> {
        let ledger = db.load_ledger()?.shared();
        let goals = db.load_goals()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            db,
            clock,
            options,
            timers: Vec::new(),
            ledger,
            goals,
            background: None,
            events_tx,
            events_rx,
            notifier: Box::new(LogNotifier),
            wake_lock: Arc::new(NoWakeLock),
        })
    }

    /// Attach a background clock. Must happen before timers are loaded or
    /// created for them to use it.
    pub fn with_background(mut self, background: BackgroundClock) -> Self {
        let BackgroundClock {
            handle,
            reports,
            task,
        } = background;
        self.background = Some(BackgroundLink {
            handle,
            reports,
            task,
            last_heartbeat_ms: self.clock.now_ms(),
        });
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    fn timer_context(&self) -> TimerContext {
        let mut ctx = TimerContext::new(Arc::clone(&self.clock))
            .with_wake_lock(Arc::clone(&self.wake_lock))
            .with_ledger(Arc::clone(&self.ledger))
            .with_observer(Box::new(ChannelObserver::new(self.events_tx.clone())));
        if let Some(link) = &self.background {
            ctx = ctx.with_background(link.handle.clone());
        }
        ctx
    }

    /// Restore saved timers. Snapshots that fail validation are skipped.
    ///
    /// Returns the number of timers restored.
    pub fn load(&mut self) -> Result<usize> {
        let snapshots = self.db.load_timers()?;
        let mut restored = 0;
        for snapshot in snapshots {
            let id = snapshot.id.clone();
            if self.find(&id).is_some() {
                warn!(timer_id = %id, "skipping duplicate saved timer");
                continue;
            }
            match Timer::from_snapshot(snapshot, self.timer_context(), self.options.restore_policy)
            {
                Ok(timer) => {
                    self.timers.push(timer);
                    restored += 1;
                }
                Err(e) => warn!(timer_id = %id, "skipping saved timer: {e}"),
            }
        }
        info!(restored, "timers loaded");
        self.process_events()?;
        Ok(restored)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// All timers in creation order.
    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    pub fn find(&self, id: &TimerId) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id() == id)
    }

    /// Look a timer up by exact id, or by a unique id prefix.
    pub fn resolve(&self, query: &str) -> Result<TimerId> {
        if let Some(timer) = self.timers.iter().find(|t| t.id().as_str() == query) {
            return Ok(timer.id().clone());
        }
        let mut matches = self
            .timers
            .iter()
            .filter(|t| t.id().as_str().starts_with(query));
        match (matches.next(), matches.next()) {
            (Some(timer), None) if !query.is_empty() => Ok(timer.id().clone()),
            _ => Err(CoreError::UnknownTimer(query.to_string())),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn goals(&self) -> &WeeklyGoals {
        &self.goals
    }

    /// Copy of the project ledger.
    pub fn ledger(&self) -> ProjectLedger {
        lock_ledger(&self.ledger).clone()
    }

    pub fn weekly_report(&self, date: NaiveDate) -> WeeklyReport {
        WeeklyReport::build(&lock_ledger(&self.ledger), &self.goals, date)
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    /// True when no timer is running.
    pub fn is_idle(&self) -> bool {
        self.timers.iter().all(|t| t.status() != TimerStatus::Running)
    }

    fn timer_mut(&mut self, id: &TimerId) -> Result<&mut Timer> {
        self.timers
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or_else(|| CoreError::UnknownTimer(id.to_string()))
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn create_timer(&mut self, config: TimerConfig) -> Result<TimerId> {
        let id = TimerId::generate();
        let timer = Timer::new(id.clone(), config, self.timer_context());
        info!(timer_id = %id, name = timer.name(), "timer created");
        self.timers.push(timer);
        self.persist()?;
        Ok(id)
    }

    pub fn start(&mut self, id: &TimerId) -> Result<()> {
        self.timer_mut(id)?.start();
        self.process_events()?;
        Ok(())
    }

    pub fn pause(&mut self, id: &TimerId) -> Result<()> {
        self.timer_mut(id)?.pause();
        self.process_events()?;
        Ok(())
    }

    pub fn stop(&mut self, id: &TimerId) -> Result<()> {
        self.timer_mut(id)?.stop();
        self.process_events()?;
        Ok(())
    }

    /// Stop (booking any open session), deregister and forget a timer.
    pub fn delete(&mut self, id: &TimerId) -> Result<()> {
        let index = self
            .timers
            .iter()
            .position(|t| t.id() == id)
            .ok_or_else(|| CoreError::UnknownTimer(id.to_string()))?;
        let mut timer = self.timers.remove(index);
        timer.stop();
        timer.destroy();
        info!(timer_id = %id, "timer deleted");
        self.process_events()?;
        self.persist()
    }

    /// Apply a partial edit. Invalid intervals leave the timer untouched.
    pub fn edit(&mut self, id: &TimerId, edit: TimerEdit) -> Result<()> {
        let timer = self.timer_mut(id)?;
        if let Some(intervals) = edit.intervals {
            timer.update_intervals(intervals)?;
        }
        if let Some(cycles) = edit.cycles {
            timer.update_cycles(cycles);
        }
        if let Some(name) = edit.name {
            timer.rename(name);
        }
        if edit.project.is_some() || edit.project_color.is_some() {
            let project = edit
                .project
                .unwrap_or_else(|| timer.config().project.clone());
            timer.set_project(project, edit.project_color);
        }
        if let Some(auto_advance) = edit.auto_advance {
            timer.set_auto_advance(auto_advance);
        }
        timer.set_notification_texts(edit.work_notification_text, edit.break_notification_text);
        debug!(timer_id = %id, "timer edited");
        self.process_events()?;
        self.persist()
    }

    pub fn set_goal(&mut self, project: &str, hours: f64) -> Result<()> {
        self.goals.set(project, hours)?;
        self.db.save_goals(&self.goals)
    }

    pub fn remove_goal(&mut self, project: &str) -> Result<bool> {
        let removed = self.goals.remove(project).is_some();
        if removed {
            self.db.save_goals(&self.goals)?;
        }
        Ok(removed)
    }

    /// Recolour a project in the ledger and on every timer booking to it.
    pub fn set_project_color(&mut self, project: &str, color: &str) -> Result<()> {
        lock_ledger(&self.ledger).set_color(project, color);
        for timer in &mut self.timers {
            if timer.config().project_name() == Some(project) {
                let name = timer.config().project.clone();
                timer.set_project(name, Some(color.to_string()));
            }
        }
        self.persist()
    }

    // ── Driving ──────────────────────────────────────────────────────

    /// Foreground poll of every timer.
    pub fn tick_all(&mut self) -> Result<Vec<TimerEvent>> {
        for timer in &mut self.timers {
            timer.tick();
        }
        self.process_events()
    }

    /// Force a tick on running timers that have gone quiet.
    pub fn watchdog(&mut self) -> Result<Vec<TimerEvent>> {
        let now = self.clock.now_ms();
        let threshold = self.options.stale_after_ms;
        for timer in &mut self.timers {
            if timer.is_stale(now, threshold) {
                warn!(timer_id = %timer.id(), "timer stale, forcing tick");
                timer.tick();
            }
        }
        self.process_events()
    }

    /// Apply every report the background clock has queued.
    pub fn drain_background(&mut self) -> Result<Vec<TimerEvent>> {
        let mut pending = Vec::new();
        let mut disconnected = false;
        if let Some(link) = self.background.as_mut() {
            loop {
                match link.reports.try_recv() {
                    Ok(report) => pending.push(report),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        for report in pending {
            self.apply_report(report);
        }
        if disconnected {
            self.disable_background("report channel closed");
        }
        self.process_events()
    }

    /// Route one background report to its timer.
    pub fn apply_report(&mut self, report: ClockReport) {
        match report {
            ClockReport::Tick {
                id,
                remaining,
                timestamp,
            } => {
                if let Ok(timer) = self.timer_mut(&id) {
                    timer.apply_background_tick(remaining, timestamp);
                }
            }
            ClockReport::IntervalComplete { id } => {
                if let Ok(timer) = self.timer_mut(&id) {
                    timer.apply_background_interval_complete();
                }
            }
            ClockReport::Heartbeat { .. } => {
                let now = self.clock.now_ms();
                if let Some(link) = self.background.as_mut() {
                    link.last_heartbeat_ms = now;
                }
            }
        }
    }

    /// Probe the background clock and give up on it after a silent spell.
    pub fn check_heartbeat(&mut self) {
        let now = self.clock.now_ms();
        let timeout = self.options.heartbeat_timeout_ms;
        let Some(link) = &self.background else {
            return;
        };
        if now.saturating_sub(link.last_heartbeat_ms) > timeout {
            self.disable_background("heartbeat timed out");
        } else if link.handle.send(ClockCommand::Heartbeat).is_err() {
            self.disable_background("command channel closed");
        }
    }

    /// Fall back to foreground polling for every timer.
    pub fn disable_background(&mut self, reason: &str) {
        let Some(link) = self.background.take() else {
            return;
        };
        warn!(reason, "background clock unavailable, falling back to polling");
        link.task.abort();
        for timer in &mut self.timers {
            timer.disable_background();
        }
    }

    /// Turn queued timer events into notifications and persist if anything
    /// happened.
    pub fn process_events(&mut self) -> Result<Vec<TimerEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        if events.is_empty() {
            return Ok(events);
        }
        if self.options.notifications_enabled {
            for event in &events {
                let notification = match event {
                    TimerEvent::IntervalCompleted { timer_id, interval } => self
                        .find(timer_id)
                        .map(|t| Notification::interval_complete(t, interval)),
                    TimerEvent::Completed { timer_id } => {
                        self.find(timer_id).map(Notification::timer_complete)
                    }
                    TimerEvent::Updated { .. } => None,
                };
                if let Some(notification) = notification {
                    self.notifier.notify(&notification);
                }
            }
        }
        self.persist()?;
        Ok(events)
    }

    /// Write timers, ledger and goals to the store.
    pub fn persist(&self) -> Result<()> {
        let snapshots: Vec<_> = self.timers.iter().map(Timer::to_snapshot).collect();
        self.db.save_timers(&snapshots)?;
        self.db.save_ledger(&lock_ledger(&self.ledger))?;
        self.db.save_goals(&self.goals)?;
        Ok(())
    }

    /// Drive all timers until `shutdown` resolves, or until every timer is
    /// idle when `stop_when_idle` is set. Persists on the way out.
    ///
    /// `on_event` sees every event after it has been processed.
    pub async fn run<F, E>(&mut self, shutdown: F, stop_when_idle: bool, mut on_event: E) -> Result<()>
    where
        F: Future<Output = ()>,
        E: FnMut(&TimerManager, &TimerEvent),
    {
        let mut ticker = tokio::time::interval(self.options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut watchdog = tokio::time::interval(self.options.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = tokio::time::interval(self.options.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(timers = self.timers.len(), "timer loop started");
        loop {
            let events = tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let mut events = self.drain_background()?;
                    events.extend(self.tick_all()?);
                    events
                }
                _ = watchdog.tick() => self.watchdog()?,
                _ = heartbeat.tick() => {
                    self.check_heartbeat();
                    Vec::new()
                }
            };
            for event in &events {
                on_event(self, event);
            }
            if stop_when_idle && self.is_idle() {
                debug!("all timers idle");
                break;
            }
        }
        self.persist()?;
        info!("timer loop stopped");
        Ok(())
    }

    /// Persist and stop the background clock. Running timers stay running in
    /// the store and resume on the next load.
    pub fn shutdown(mut self) -> Result<()> {
        self.persist()?;
        if let Some(link) = self.background.take() {
            link.task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ValidationError;
    use crate::timer::{IntervalKind, IntervalSequence};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Notification>>>);

    impl Notifier for Recorder {
        fn notify(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.clone());
        }
    }

    fn manager(clock: &ManualClock) -> TimerManager {
        TimerManager::new(
            Database::open_memory().unwrap(),
            Arc::new(clock.clone()),
            ManagerOptions::default(),
        )
        .unwrap()
    }

    fn short() -> TimerConfig {
        TimerConfig {
            name: "Short".into(),
            project: Some("Writing".into()),
            intervals: IntervalSequence::new(vec![
                Interval::new(2, IntervalKind::Work, "Work"),
                Interval::new(1, IntervalKind::Break, "Break"),
            ])
            .unwrap(),
            cycles: Cycles::finite(1).unwrap(),
            ..TimerConfig::default()
        }
    }

    fn step(m: &mut TimerManager, clock: &ManualClock, secs: u64) {
        for _ in 0..secs {
            clock.advance(1_000);
            m.tick_all().unwrap();
        }
    }

    #[test]
    fn unknown_ids_are_errors() {
        let clock = ManualClock::new(0);
        let mut m = manager(&clock);
        let missing = TimerId::from("nope");
        assert!(matches!(m.start(&missing), Err(CoreError::UnknownTimer(_))));
        assert!(matches!(m.delete(&missing), Err(CoreError::UnknownTimer(_))));
    }

    #[test]
    fn completion_notifies_and_books() {
        let clock = ManualClock::new(1_700_000_000_000);
        let recorder = Recorder::default();
        let mut m = manager(&clock).with_notifier(Box::new(recorder.clone()));
        let id = m.create_timer(short()).unwrap();
        m.start(&id).unwrap();
        step(&mut m, &clock, 3);

        let timer = m.find(&id).unwrap();
        assert_eq!(timer.status(), TimerStatus::Stopped);
        let messages: Vec<_> = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect();
        assert_eq!(
            messages,
            vec!["Work complete!", "Break complete!", "Short complete!"]
        );
        assert_eq!(m.ledger().get("Writing").unwrap().total_time, 3);
    }

    #[test]
    fn notifications_can_be_disabled() {
        let clock = ManualClock::new(0);
        let recorder = Recorder::default();
        let options = ManagerOptions {
            notifications_enabled: false,
            ..ManagerOptions::default()
        };
        let mut m = TimerManager::new(Database::open_memory().unwrap(), Arc::new(clock.clone()), options)
            .unwrap()
            .with_notifier(Box::new(recorder.clone()));
        let id = m.create_timer(short()).unwrap();
        m.start(&id).unwrap();
        step(&mut m, &clock, 3);
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn delete_books_open_session() {
        let clock = ManualClock::new(1_700_000_000_000);
        let mut m = manager(&clock);
        let id = m.create_timer(TimerConfig {
            project: Some("Reading".into()),
            ..TimerConfig::default()
        })
        .unwrap();
        m.start(&id).unwrap();
        step(&mut m, &clock, 10);
        m.delete(&id).unwrap();
        assert!(m.find(&id).is_none());
        assert_eq!(m.ledger().get("Reading").unwrap().total_time, 10);
    }

    #[test]
    fn invalid_edit_leaves_timer_untouched() {
        let clock = ManualClock::new(0);
        let mut m = manager(&clock);
        let id = m.create_timer(TimerConfig::default()).unwrap();
        let err = m
            .edit(
                &id,
                TimerEdit {
                    name: Some("Renamed".into()),
                    intervals: Some(Vec::new()),
                    ..TimerEdit::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EmptySequence)
        ));
        assert_eq!(m.find(&id).unwrap().name(), "Timer");
    }

    #[test]
    fn edit_updates_fields() {
        let clock = ManualClock::new(0);
        let mut m = manager(&clock);
        let id = m.create_timer(TimerConfig::default()).unwrap();
        m.edit(
            &id,
            TimerEdit {
                name: Some("Deep".into()),
                project: Some(Some("Thesis".into())),
                project_color: Some("#ff0000".into()),
                cycles: Some(Cycles::finite(3).unwrap()),
                auto_advance: Some(false),
                work_notification_text: Some("Stretch".into()),
                ..TimerEdit::default()
            },
        )
        .unwrap();
        let config = m.find(&id).unwrap().config();
        assert_eq!(config.name, "Deep");
        assert_eq!(config.project.as_deref(), Some("Thesis"));
        assert_eq!(config.project_color, "#ff0000");
        assert_eq!(config.cycles, Cycles::finite(3).unwrap());
        assert!(!config.auto_advance);
        assert_eq!(config.work_notification_text, "Stretch");
    }

    #[test]
    fn watchdog_forces_stale_timer() {
        let clock = ManualClock::new(0);
        let mut m = manager(&clock);
        let id = m.create_timer(TimerConfig::default()).unwrap();
        m.start(&id).unwrap();
        clock.advance(1_500);
        m.watchdog().unwrap();
        assert_eq!(m.find(&id).unwrap().remaining_secs(), 25 * 60);
        clock.advance(1_000);
        m.watchdog().unwrap();
        assert_eq!(m.find(&id).unwrap().remaining_secs(), 25 * 60 - 2);
    }

    #[test]
    fn resolve_accepts_unique_prefix() {
        let clock = ManualClock::new(0);
        let mut m = manager(&clock);
        let id = m.create_timer(TimerConfig::default()).unwrap();
        assert_eq!(m.resolve(&id.as_str()[..8]).unwrap(), id);
        assert!(m.resolve("").is_err());
        assert!(m.resolve("zzzz-not-there").is_err());
    }

    #[test]
    fn goals_persist() {
        let clock = ManualClock::new(0);
        let mut m = manager(&clock);
        m.set_goal("Writing", 5.0).unwrap();
        assert!(m.set_goal("Writing", -2.0).is_err());
        assert_eq!(m.goals().get("Writing"), Some(5.0));
        assert!(m.remove_goal("Writing").unwrap());
        assert!(!m.remove_goal("Writing").unwrap());
    }

    #[test]
    fn project_color_applies_to_timers() {
        let clock = ManualClock::new(0);
        let mut m = manager(&clock);
        let id = m.create_timer(short()).unwrap();
        m.set_project_color("Writing", "#00ff00").unwrap();
        assert_eq!(m.find(&id).unwrap().config().project_color, "#00ff00");
        assert_eq!(m.ledger().get("Writing").unwrap().color, "#00ff00");
    }

    #[tokio::test]
    async fn silent_background_is_dropped() {
        let clock = ManualClock::new(0);
        let background = BackgroundClock::spawn(Arc::new(clock.clone()));
        let mut m = manager(&clock).with_background(background);
        let id = m.create_timer(TimerConfig::default()).unwrap();
        m.start(&id).unwrap();
        assert!(m.find(&id).unwrap().uses_background());

        clock.advance(m.options().heartbeat_timeout_ms + 1);
        m.check_heartbeat();
        assert!(!m.has_background());
        assert!(!m.find(&id).unwrap().uses_background());
    }

    #[tokio::test]
    async fn heartbeat_report_refreshes_liveness() {
        let clock = ManualClock::new(0);
        let background = BackgroundClock::spawn(Arc::new(clock.clone()));
        let mut m = manager(&clock).with_background(background);
        clock.advance(10_000);
        m.apply_report(ClockReport::Heartbeat { timestamp: 10_000 });
        clock.advance(10_000);
        m.check_heartbeat();
        assert!(m.has_background());
    }
}
