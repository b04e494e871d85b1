pub mod config;
pub mod goal;
pub mod project;
pub mod timer;
pub mod week;

use multitimer_core::clock::system_clock;
use multitimer_core::{Config, Database, ManagerOptions, TimerManager};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Open the store and build a manager without loading timers yet.
pub fn open_manager(config: &Config) -> Result<TimerManager, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let manager = TimerManager::new(db, system_clock(), ManagerOptions::from(config))?;
    Ok(manager)
}

/// Open the store and restore saved timers.
pub fn load_manager() -> Result<TimerManager, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mut manager = open_manager(&config)?;
    manager.load()?;
    Ok(manager)
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
