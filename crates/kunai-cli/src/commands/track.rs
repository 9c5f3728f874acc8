//! Main tracking mode command.

use anyhow::Result;
use kunai::{
    LifecycleEvent, MonotonicClock, SpeedDisplay, SpeedTracker, SystemProcessProvider,
    TrackerConfig,
};
use owo_colors::OwoColorize;
use tracing::{debug, info};

use crate::shutdown::ShutdownSignal;

/// Run the tracking loop until Ctrl+C
pub fn run(config: &TrackerConfig) -> Result<()> {
    let shutdown = ShutdownSignal::install()?;
    let mut tracker = SpeedTracker::new(SystemProcessProvider, MonotonicClock::new(), config)?;

    info!("kunai {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Waiting for {}... (Press Ctrl+C to quit)",
        config.process_name
    );

    while !shutdown.is_shutdown() {
        let update = tracker.update();

        match &update.event {
            LifecycleEvent::Attached(info) => {
                println!(
                    "{} {} (PID: {})",
                    "Attached to".green(),
                    info.name,
                    info.pid
                );
            }
            LifecycleEvent::Exited(info) => {
                println!("{} (PID: {})", "Process exited".yellow(), info.pid);
                println!("Waiting for {}...", config.process_name);
            }
            _ => {}
        }

        if update.changed
            && let Some(text) = tracker.display()
        {
            debug!("{}", text);
            println!("{}", colorize(text));
        }

        if shutdown.wait(config.poll_interval()) {
            break;
        }
    }

    tracker.dispose();
    info!("Tracker stopped");
    Ok(())
}

fn colorize(display: &SpeedDisplay) -> String {
    format!(
        "{} {:>8}  {} {:>8}  {} {:>8}",
        "X:".dimmed(),
        display.x,
        "Y:".dimmed(),
        display.y,
        "Total:".bold(),
        display.total.cyan()
    )
}
