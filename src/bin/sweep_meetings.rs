//! Maintenance sweep, intended to run from cron.
//!
//! Completes meetings whose end time has passed and soft-deletes archives
//! past their retention horizon with auto-delete enabled.

use std::path::PathBuf;

use boardroom::Engine;

fn main() {
    env_logger::init();

    let path = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => {
            eprintln!("usage: sweep_meetings <database-path>");
            std::process::exit(2);
        }
    };

    let engine = match Engine::open(path) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to open database: {e}");
            std::process::exit(1);
        }
    };

    match engine.sweep() {
        Ok(report) => {
            log::info!(
                "Sweep finished: {} meetings completed, {} archives deleted",
                report.meetings_completed,
                report.archives_deleted
            );
        }
        Err(e) => {
            log::error!("Sweep failed: {e}");
            std::process::exit(1);
        }
    }
}
