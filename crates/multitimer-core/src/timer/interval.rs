use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalKind {
    Work,
    Break,
}

impl IntervalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalKind::Work => "work",
            IntervalKind::Break => "break",
        }
    }
}

impl std::str::FromStr for IntervalKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "work" | "focus" => Ok(IntervalKind::Work),
            "break" | "rest" => Ok(IntervalKind::Break),
            other => Err(ValidationError::InvalidValue {
                field: "kind".into(),
                message: format!("expected 'work' or 'break', got '{other}'"),
            }),
        }
    }
}

/// One timed segment of a timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Duration in seconds.
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    #[serde(rename = "type")]
    pub kind: IntervalKind,
    pub label: String,
}

impl Interval {
    pub fn new(duration_secs: u64, kind: IntervalKind, label: impl Into<String>) -> Self {
        Self {
            duration_secs,
            kind,
            label: label.into(),
        }
    }

    pub fn work_minutes(minutes: u64) -> Self {
        Self::new(minutes.saturating_mul(60), IntervalKind::Work, "Work")
    }

    pub fn break_minutes(minutes: u64) -> Self {
        Self::new(minutes.saturating_mul(60), IntervalKind::Break, "Break")
    }
}

/// Ordered, non-empty list of intervals with positive durations.
///
/// The only way to obtain one is through validation, both in code and when
/// decoding persisted JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Interval>", into = "Vec<Interval>")]
pub struct IntervalSequence(Vec<Interval>);

impl IntervalSequence {
    pub fn new(intervals: Vec<Interval>) -> Result<Self, ValidationError> {
        if intervals.is_empty() {
            return Err(ValidationError::EmptySequence);
        }
        if let Some(index) = intervals.iter().position(|i| i.duration_secs == 0) {
            return Err(ValidationError::NonPositiveDuration { index });
        }
        Ok(Self(intervals))
    }

    /// `[Work 25:00, Break 5:00]`.
    pub fn pomodoro() -> Self {
        Self::with_minutes(25, 5)
    }

    /// A single work interval followed by a single break, both clamped to at
    /// least one minute.
    pub fn with_minutes(work_min: u64, break_min: u64) -> Self {
        Self(vec![
            Interval::work_minutes(work_min.max(1)),
            Interval::break_minutes(break_min.max(1)),
        ])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Interval> {
        self.0.get(index)
    }

    pub fn first(&self) -> &Interval {
        &self.0[0]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.0
    }

    /// Total seconds in one cycle.
    pub fn cycle_secs(&self) -> u64 {
        self.0.iter().map(|i| i.duration_secs).sum()
    }
}

impl Default for IntervalSequence {
    fn default() -> Self {
        Self::pomodoro()
    }
}

impl TryFrom<Vec<Interval>> for IntervalSequence {
    type Error = ValidationError;

    fn try_from(value: Vec<Interval>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IntervalSequence> for Vec<Interval> {
    fn from(value: IntervalSequence) -> Self {
        value.0
    }
}

/// How many passes through the sequence a timer makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cycles {
    Finite(NonZeroU32),
    #[default]
    Infinite,
}

impl Cycles {
    pub fn finite(n: u32) -> Result<Self, ValidationError> {
        NonZeroU32::new(n)
            .map(Cycles::Finite)
            .ok_or(ValidationError::InvalidCycles(n as i64))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Cycles::Infinite)
    }

    /// True once `cycle` (1-based) has gone past the last allowed cycle.
    pub fn exceeded_by(&self, cycle: u32) -> bool {
        match self {
            Cycles::Finite(total) => cycle > total.get(),
            Cycles::Infinite => false,
        }
    }

    /// Persisted form: the cycle count, or `-1` when infinite.
    pub fn as_i64(&self) -> i64 {
        match self {
            Cycles::Finite(total) => total.get() as i64,
            Cycles::Infinite => -1,
        }
    }
}
