use clap::Subcommand;

use super::{load_manager, print_json, CmdResult};

#[derive(Subcommand)]
pub enum GoalAction {
    /// Set the weekly target for a project
    Set {
        /// Project name
        project: String,
        /// Hours per week
        hours: f64,
    },
    /// Remove a project's weekly target
    Unset {
        /// Project name
        project: String,
    },
    /// List weekly targets
    List,
}

pub fn run(action: GoalAction) -> CmdResult {
    let mut manager = load_manager()?;
    match action {
        GoalAction::Set { project, hours } => {
            manager.set_goal(&project, hours)?;
            println!("ok");
        }
        GoalAction::Unset { project } => {
            if !manager.remove_goal(&project)? {
                return Err(format!("no goal set for {project}").into());
            }
            println!("ok");
        }
        GoalAction::List => print_json(manager.goals())?,
    }
    manager.shutdown()?;
    Ok(())
}
