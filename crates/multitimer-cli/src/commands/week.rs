use chrono::{Local, NaiveDate};

use super::{load_manager, print_json, CmdResult};

/// Print the weekly report for the week containing `date` (default: today).
pub fn run(date: Option<NaiveDate>) -> CmdResult {
    let manager = load_manager()?;
    let report = manager.weekly_report(date.unwrap_or_else(|| Local::now().date_naive()));
    print_json(&report)?;
    manager.shutdown()?;
    Ok(())
}
