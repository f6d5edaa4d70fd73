//! Main entry point for the factory locator service.
//!
//! Attaches a lifecycle coordinator to the configured module host and keeps
//! the shared locator in sync with it until interrupted.

use clap::Parser;
use locator_config::Config;
use locator_core::LifecycleCoordinator;
use std::path::PathBuf;
use std::time::Duration;

mod factory_registry;

/// Command-line arguments for the locator service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Print the published factories after startup and exit
	#[arg(long)]
	once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started locator");

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.locator.id);
	let poll_interval = config.host.poll_interval_seconds;

	let coordinator = factory_registry::build_coordinator_from_config(config)?;
	let published = coordinator.start().await?;
	tracing::info!(modules = published, "Published module factories");

	let result = if args.once {
		print_snapshot(&coordinator)
	} else {
		run(&coordinator, poll_interval).await
	};

	coordinator.stop().await;
	tracing::info!("Stopped locator");
	result
}

/// Writes the locator's factory identifiers and their contributing modules as JSON.
fn print_snapshot(coordinator: &LifecycleCoordinator) -> Result<(), Box<dyn std::error::Error>> {
	let snapshot = coordinator.locator().snapshot();
	println!("{}", serde_json::to_string_pretty(&snapshot)?);
	Ok(())
}

/// Waits for Ctrl-C, refreshing the host every `poll_interval` seconds when non-zero.
async fn run(
	coordinator: &LifecycleCoordinator,
	poll_interval: u64,
) -> Result<(), Box<dyn std::error::Error>> {
	if poll_interval == 0 {
		tokio::signal::ctrl_c().await?;
		tracing::info!("Received shutdown signal");
		return Ok(());
	}

	let mut interval = tokio::time::interval(Duration::from_secs(poll_interval));
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	// The first tick completes immediately and the host was just scanned
	interval.tick().await;

	loop {
		tokio::select! {
			_ = interval.tick() => {
				let host = coordinator.host().clone();
				match tokio::task::spawn_blocking(move || host.refresh()).await? {
					Ok(0) => {}
					Ok(changes) => tracing::debug!(changes, "Refreshed module host"),
					Err(e) => tracing::warn!(error = %e, "Failed to refresh module host"),
				}
			}
			signal = tokio::signal::ctrl_c() => {
				signal?;
				tracing::info!("Received shutdown signal");
				return Ok(());
			}
		}
	}
}
