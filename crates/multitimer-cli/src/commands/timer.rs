use clap::{Args, Subcommand};
use multitimer_core::clock::system_clock;
use multitimer_core::{
    BackgroundClock, Config, Cycles, Interval, IntervalKind, IntervalSequence, TimerEdit,
    TimerEvent, TimerManager, TimerView,
};
use serde::Serialize;
use tracing::{debug, info};

use super::{open_manager, print_json, CmdResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Create a new timer
    Create {
        #[command(flatten)]
        flags: TimerFlags,
    },
    /// List all timers
    List,
    /// Print one timer as JSON
    Show { id: String },
    /// Delete a timer, booking any open session
    Delete { id: String },
    /// Change a timer's settings
    Edit {
        id: String,
        #[command(flatten)]
        flags: TimerFlags,
    },
    /// Start or resume a timer
    Start { id: String },
    /// Pause a running timer
    Pause { id: String },
    /// Stop a timer and reset it to the first interval
    Stop { id: String },
    /// Drive timers in the foreground until all stop or Ctrl-C
    Run {
        /// Timers to start first
        ids: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct TimerFlags {
    /// Display name
    #[arg(long)]
    name: Option<String>,
    /// Interval as LABEL:KIND:DURATION (e.g. "Focus:work:25m"); repeatable
    #[arg(long = "interval", value_parser = parse_interval)]
    intervals: Vec<Interval>,
    /// Stop after this many cycles
    #[arg(long, conflicts_with = "infinite")]
    cycles: Option<u32>,
    /// Repeat forever
    #[arg(long)]
    infinite: bool,
    /// Pause at the end of each interval instead of starting the next
    #[arg(long, conflicts_with = "auto_advance")]
    no_auto_advance: bool,
    /// Start the next interval automatically
    #[arg(long)]
    auto_advance: bool,
    /// Project to book time on
    #[arg(long, conflicts_with = "no_project")]
    project: Option<String>,
    /// Stop booking time on a project
    #[arg(long)]
    no_project: bool,
    /// Project colour, e.g. "#4f46e5"
    #[arg(long)]
    color: Option<String>,
    /// Message shown when a work interval ends
    #[arg(long)]
    work_text: Option<String>,
    /// Message shown when a break ends
    #[arg(long)]
    break_text: Option<String>,
}

impl TimerFlags {
    fn cycles(&self) -> Result<Option<Cycles>, Box<dyn std::error::Error>> {
        if self.infinite {
            return Ok(Some(Cycles::Infinite));
        }
        Ok(self.cycles.map(Cycles::finite).transpose()?)
    }

    fn auto_advance(&self) -> Option<bool> {
        match (self.auto_advance, self.no_auto_advance) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    fn into_edit(self) -> Result<TimerEdit, Box<dyn std::error::Error>> {
        let cycles = self.cycles()?;
        let auto_advance = self.auto_advance();
        let project = if self.no_project {
            Some(None)
        } else {
            self.project.map(Some)
        };
        Ok(TimerEdit {
            name: self.name,
            project,
            project_color: self.color,
            intervals: (!self.intervals.is_empty()).then_some(self.intervals),
            cycles,
            auto_advance,
            work_notification_text: self.work_text,
            break_notification_text: self.break_text,
        })
    }
}

/// Parse `25m`, `90s`, `1h`, `1h30m` or bare minutes into seconds.
pub fn parse_duration(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }
    let invalid = || format!("invalid duration '{input}'");
    if let Ok(minutes) = s.parse::<u64>() {
        return minutes.checked_mul(60).ok_or_else(invalid);
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c.to_ascii_lowercase() {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("invalid duration '{input}': missing unit after {digits}"));
    }
    Ok(total)
}

/// Parse `LABEL:KIND:DURATION`, or `KIND:DURATION` with the label taken from
/// the kind.
pub fn parse_interval(input: &str) -> Result<Interval, String> {
    let parts: Vec<&str> = input.split(':').collect();
    let (label, kind, duration) = match parts.as_slice() {
        [label, kind, duration] => (Some(*label), *kind, *duration),
        [kind, duration] => (None, *kind, *duration),
        _ => return Err(format!("expected LABEL:KIND:DURATION, got '{input}'")),
    };
    let kind: IntervalKind = kind.parse().map_err(|e| format!("{e}"))?;
    let duration = parse_duration(duration)?;
    let label = match label {
        Some(l) if !l.trim().is_empty() => l.trim().to_string(),
        _ => match kind {
            IntervalKind::Work => "Work".to_string(),
            IntervalKind::Break => "Break".to_string(),
        },
    };
    Ok(Interval::new(duration, kind, label))
}

#[derive(Serialize)]
struct RunLine<'a> {
    event: &'a TimerEvent,
    timer: Option<TimerView>,
}

pub fn run(action: TimerAction) -> CmdResult {
    if let TimerAction::Run { ids } = action {
        return run_loop(ids);
    }

    let config = Config::load_or_default();
    let mut manager = open_manager(&config)?;
    manager.load()?;

    match action {
        TimerAction::Create { flags } => {
            let mut timer = config.timer_defaults();
            if let Some(cycles) = flags.cycles()? {
                timer.cycles = cycles;
            }
            if let Some(auto_advance) = flags.auto_advance() {
                timer.auto_advance = auto_advance;
            }
            if !flags.intervals.is_empty() {
                timer.intervals = IntervalSequence::new(flags.intervals)?;
            }
            if let Some(name) = flags.name {
                timer.name = name;
            }
            timer.project = flags.project.filter(|p| !p.trim().is_empty());
            if let Some(color) = flags.color {
                timer.project_color = color;
            }
            timer.work_notification_text = flags.work_text.unwrap_or_default();
            timer.break_notification_text = flags.break_text.unwrap_or_default();

            let id = manager.create_timer(timer)?;
            eprintln!("Timer created: {id}");
            show(&manager, &id.to_string())?;
        }
        TimerAction::List => {
            let views: Vec<TimerView> = manager.timers().iter().map(|t| t.view()).collect();
            print_json(&views)?;
        }
        TimerAction::Show { id } => show(&manager, &id)?,
        TimerAction::Delete { id } => {
            let id = manager.resolve(&id)?;
            manager.delete(&id)?;
            println!("{{\"type\": \"timer_deleted\", \"id\": \"{id}\"}}");
        }
        TimerAction::Edit { id, flags } => {
            let id = manager.resolve(&id)?;
            manager.edit(&id, flags.into_edit()?)?;
            show(&manager, id.as_str())?;
        }
        TimerAction::Start { id } => {
            let id = manager.resolve(&id)?;
            manager.start(&id)?;
            show(&manager, id.as_str())?;
        }
        TimerAction::Pause { id } => {
            let id = manager.resolve(&id)?;
            manager.pause(&id)?;
            show(&manager, id.as_str())?;
        }
        TimerAction::Stop { id } => {
            let id = manager.resolve(&id)?;
            manager.stop(&id)?;
            show(&manager, id.as_str())?;
        }
        TimerAction::Run { .. } => {}
    }

    manager.shutdown()?;
    Ok(())
}

fn show(manager: &TimerManager, query: &str) -> CmdResult {
    let id = manager.resolve(query)?;
    match manager.find(&id) {
        Some(timer) => print_json(&timer.view()),
        None => Err(format!("unknown timer: {query}").into()),
    }
}

fn run_loop(ids: Vec<String>) -> CmdResult {
    let config = Config::load_or_default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut manager = open_manager(&config)?;
        if config.engine.use_background_clock {
            manager = manager.with_background(BackgroundClock::spawn(system_clock()));
        }
        manager.load()?;
        for query in &ids {
            let id = manager.resolve(query)?;
            debug!(timer_id = %id, "starting before run");
            manager.start(&id)?;
        }
        if manager.is_idle() {
            eprintln!("no running timers");
            return manager.shutdown().map_err(Into::into);
        }

        info!(
            background = manager.has_background(),
            timers = manager.timers().len(),
            "running timers in the foreground"
        );
        let shutdown = async {
            // A failed signal handler only means Ctrl-C cannot end the loop early.
            let _ = tokio::signal::ctrl_c().await;
        };
        manager
            .run(shutdown, true, |manager, event| {
                if matches!(event, TimerEvent::Updated { .. }) {
                    return;
                }
                let line = RunLine {
                    event,
                    timer: manager.find(event.timer_id()).map(|t| t.view()),
                };
                if let Ok(json) = serde_json::to_string(&line) {
                    println!("{json}");
                }
            })
            .await?;
        manager.shutdown()?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("25"), Ok(25 * 60));
        assert_eq!(parse_duration("25m"), Ok(25 * 60));
        assert_eq!(parse_duration("90s"), Ok(90));
        assert_eq!(parse_duration("1h"), Ok(3600));
        assert_eq!(parse_duration("1h30m"), Ok(5400));
        assert_eq!(parse_duration("1H5s"), Ok(3605));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert!(parse_duration("307445734561825861").is_err());
        assert!(parse_duration("5124095576030432h").is_err());
        assert!(parse_duration("18446744073709551615s1s").is_err());
        assert!(parse_interval("work:307445734561825861").is_err());
        assert_eq!(parse_duration("18446744073709551615s"), Ok(u64::MAX));
    }

    #[test]
    fn intervals() {
        let i = parse_interval("Deep:work:50m").unwrap();
        assert_eq!(i, Interval::new(3000, IntervalKind::Work, "Deep"));
        let i = parse_interval("break:90s").unwrap();
        assert_eq!(i, Interval::new(90, IntervalKind::Break, "Break"));
        assert!(parse_interval("Deep:nap:5m").is_err());
        assert!(parse_interval("5m").is_err());
    }

    #[test]
    fn flags_map_to_edit() {
        let flags = TimerFlags {
            name: Some("N".into()),
            infinite: true,
            no_auto_advance: true,
            no_project: true,
            ..TimerFlags::default()
        };
        let edit = flags.into_edit().unwrap();
        assert_eq!(edit.name.as_deref(), Some("N"));
        assert_eq!(edit.cycles, Some(Cycles::Infinite));
        assert_eq!(edit.auto_advance, Some(false));
        assert_eq!(edit.project, Some(None));
        assert!(edit.intervals.is_none());

        let bad = TimerFlags {
            cycles: Some(0),
            ..TimerFlags::default()
        };
        assert!(bad.into_edit().is_err());
    }
}
