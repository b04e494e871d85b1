//! Project ledger commands for CLI.

use chrono::{Local, NaiveDate};
use clap::Subcommand;
use serde::Serialize;

use super::{load_manager, print_json, CmdResult};

#[derive(Subcommand)]
pub enum ProjectAction {
    /// List projects with their booked time
    List,
    /// Show the sessions booked on a project for one day
    Sessions {
        /// Project name
        name: String,
        /// Day as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Set a project's colour
    Color {
        /// Project name
        name: String,
        /// Colour, e.g. "#4f46e5"
        color: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSummary<'a> {
    name: &'a str,
    color: &'a str,
    total_time: u64,
    today: u64,
}

pub fn run(action: ProjectAction) -> CmdResult {
    let mut manager = load_manager()?;
    let today = Local::now().date_naive();

    match action {
        ProjectAction::List => {
            let ledger = manager.ledger();
            let summaries: Vec<ProjectSummary> = ledger
                .projects()
                .map(|(name, record)| ProjectSummary {
                    name,
                    color: &record.color,
                    total_time: record.total_time,
                    today: ledger.daily_seconds(name, today),
                })
                .collect();
            print_json(&summaries)?;
        }
        ProjectAction::Sessions { name, date } => {
            let ledger = manager.ledger();
            if ledger.get(&name).is_none() {
                return Err(format!("unknown project: {name}").into());
            }
            print_json(ledger.sessions_on(&name, date.unwrap_or(today)))?;
        }
        ProjectAction::Color { name, color } => {
            manager.set_project_color(&name, &color)?;
            println!("ok");
        }
    }
    manager.shutdown()?;
    Ok(())
}
