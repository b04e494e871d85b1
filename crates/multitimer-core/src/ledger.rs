//! Per-project time accounting.
//!
//! Every stopped session with a project is booked here: once into the
//! project's running total, once into the day it ended on, and once as a
//! session entry under that day. Days are local calendar dates.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One booked session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    /// Seconds.
    pub duration: u64,
    /// Epoch ms when the session was booked.
    pub timestamp: i64,
    pub timer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    /// Seconds across all days.
    #[serde(default)]
    pub total_time: u64,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub daily_time: BTreeMap<NaiveDate, u64>,
    #[serde(default)]
    pub sessions: BTreeMap<NaiveDate, Vec<SessionEntry>>,
}

/// Time spent per project, keyed by project name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectLedger(BTreeMap<String, ProjectRecord>);

pub type SharedLedger = Arc<Mutex<ProjectLedger>>;

/// Lock the shared ledger, recovering the data if a previous holder panicked.
pub fn lock_ledger(ledger: &SharedLedger) -> MutexGuard<'_, ProjectLedger> {
    ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Local time for an epoch-ms instant.
pub fn local_time(epoch_ms: u64) -> DateTime<Local> {
    Local
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .unwrap_or_else(Local::now)
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

impl ProjectLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    /// Book `duration` seconds of work on `project`.
    ///
    /// The stored colour follows the most recent session.
    pub fn record_session(
        &mut self,
        project: &str,
        duration: u64,
        timer_name: &str,
        color: &str,
        at: DateTime<Local>,
    ) {
        let day = at.date_naive();
        let record = self.0.entry(project.to_string()).or_default();
        record.total_time += duration;
        record.color = color.to_string();
        *record.daily_time.entry(day).or_insert(0) += duration;
        record.sessions.entry(day).or_default().push(SessionEntry {
            duration,
            timestamp: at.timestamp_millis(),
            timer_name: timer_name.to_string(),
        });
    }

    /// Set a project's colour, creating an empty record if needed.
    pub fn set_color(&mut self, project: &str, color: &str) {
        self.0.entry(project.to_string()).or_default().color = color.to_string();
    }

    pub fn get(&self, project: &str) -> Option<&ProjectRecord> {
        self.0.get(project)
    }

    pub fn projects(&self) -> impl Iterator<Item = (&String, &ProjectRecord)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn daily_seconds(&self, project: &str, day: NaiveDate) -> u64 {
        self.get(project)
            .and_then(|r| r.daily_time.get(&day).copied())
            .unwrap_or(0)
    }

    /// Seconds booked on `project` during the seven days from `week_start`.
    pub fn weekly_seconds(&self, project: &str, week_start: NaiveDate) -> u64 {
        let Some(record) = self.get(project) else {
            return 0;
        };
        let end = week_start + Duration::days(7);
        record
            .daily_time
            .range(week_start..end)
            .map(|(_, secs)| *secs)
            .sum()
    }

    /// Sessions booked on `project` on `day`, oldest first.
    pub fn sessions_on(&self, project: &str, day: NaiveDate) -> &[SessionEntry] {
        self.get(project)
            .and_then(|r| r.sessions.get(&day))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Target hours per week, keyed by project name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyGoals(BTreeMap<String, f64>);

impl WeeklyGoals {
    pub fn set(&mut self, project: &str, hours: f64) -> Result<(), ValidationError> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "hours".into(),
                message: format!("weekly goal must be a non-negative number, got {hours}"),
            });
        }
        self.0.insert(project.to_string(), hours);
        Ok(())
    }

    pub fn remove(&mut self, project: &str) -> Option<f64> {
        self.0.remove(project)
    }

    pub fn get(&self, project: &str) -> Option<f64> {
        self.0.get(project).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyEntry {
    pub project: String,
    pub color: String,
    pub seconds: u64,
    pub goal_hours: Option<f64>,
    pub percent_of_goal: Option<f64>,
}

/// Time per project for one Monday-to-Sunday week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub entries: Vec<WeeklyEntry>,
}

impl WeeklyReport {
    /// Build the report for the week containing `date`.
    ///
    /// Lists every project with time booked that week or with a goal.
    pub fn build(ledger: &ProjectLedger, goals: &WeeklyGoals, date: NaiveDate) -> Self {
        let start = week_start(date);
        let names: BTreeSet<&str> = ledger
            .projects()
            .filter(|(name, _)| ledger.weekly_seconds(name, start) > 0)
            .map(|(name, _)| name.as_str())
            .chain(goals.iter().map(|(name, _)| name.as_str()))
            .collect();

        let entries = names
            .into_iter()
            .map(|project| {
                let seconds = ledger.weekly_seconds(project, start);
                let goal_hours = goals.get(project);
                let percent_of_goal = goal_hours
                    .filter(|h| *h > 0.0)
                    .map(|h| seconds as f64 / (h * 3600.0) * 100.0);
                WeeklyEntry {
                    project: project.to_string(),
                    color: ledger
                        .get(project)
                        .map(|r| r.color.clone())
                        .unwrap_or_default(),
                    seconds,
                    goal_hours,
                    percent_of_goal,
                }
            })
            .collect();

        Self {
            week_start: start,
            week_end: start + Duration::days(6),
            entries,
        }
    }
}
