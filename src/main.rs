// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! stereokey - timed keyboard automation for stereotaxic positioning
//!
//! Converts a desired dorsoventral (DV) displacement into a counted
//! number of key presses and drives them on a repeating cycle, with
//! recording and one-shot test modes.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

mod calc;
mod injector;
mod keys;
mod recorder;
mod scheduler;
mod types;

use calc::reps_needed;
use injector::{EnigoInjector, send_sequence};
use keys::{format_combination, parse_combination, parse_intervals, parse_single_key, uniform_intervals};
use recorder::start_recording;
use scheduler::{Scheduler, SharedConfig};
use types::{CycleConfig, DEFAULT_DELAY_MS, RunMode};

#[derive(Parser)]
#[command(
    name = "stereokey",
    about = "Timed key-press automation for stereotaxic positioning"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repeat a key combination on a timed cycle
    Run {
        /// Keys separated by '+' (e.g. 'ctrl+shift+s' or 'down')
        keys: String,
        /// Per-adjacency delays in ms, comma separated (e.g. '50,75,25')
        #[arg(long)]
        intervals: Option<String>,
        /// Stop after this many cycles instead of running until Ctrl-C
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        repeats: Option<u32>,
        /// Delay used for every adjacency when --intervals is not given
        #[arg(long, default_value_t = DEFAULT_DELAY_MS)]
        delay: u64,
        /// Jitter fraction (0.0-1.0) applied to each inter-key delay
        #[arg(long, default_value_t = 0.0)]
        jitter: f64,
        /// Skip the pre-start countdown
        #[arg(long)]
        no_countdown: bool,
    },
    /// Send the combination once, sleeping the full interval table
    Test {
        keys: String,
        #[arg(long)]
        intervals: Option<String>,
    },
    /// Compute how many presses move the probe between two DV depths
    Calc {
        /// Current DV in mm
        current: f64,
        /// Final DV in mm
        r#final: f64,
        /// Presses per 0.001 mm of travel
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        step: u32,
    },
    /// Compute the press count for a DV move, then run it
    Drive {
        keys: String,
        /// Current DV in mm
        current: f64,
        /// Final DV in mm
        r#final: f64,
        /// Presses per 0.001 mm of travel
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        step: u32,
        #[arg(long)]
        intervals: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        jitter: f64,
        #[arg(long)]
        no_countdown: bool,
    },
    /// Record a key combination; press the stop key to finish
    Record {
        /// Key that ends the recording
        #[arg(long, default_value = "escape")]
        stop_key: String,
    },
}

fn resolve_intervals(table: Option<&str>, key_count: usize, default_delay: u64) -> Vec<u64> {
    match table {
        Some(raw) => parse_intervals(raw),
        None => uniform_intervals(key_count, default_delay),
    }
}

async fn run_automation(
    keys: &str,
    intervals: Option<&str>,
    default_delay: u64,
    mode: RunMode,
    jitter: f64,
    countdown: bool,
) -> Result<()> {
    let sequence = parse_combination(keys)?;
    let table = resolve_intervals(intervals, sequence.len(), default_delay);
    let config = SharedConfig::new(CycleConfig {
        keys: sequence,
        delays_ms: table,
    });

    let mut scheduler = Scheduler::new(EnigoInjector::new()?, config).with_jitter(jitter);

    let stop = scheduler.stop_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl-C, stopping...");
        stop.stop();
    })
    .context("Failed to install Ctrl-C handler")?;

    scheduler.run(mode, countdown).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            keys,
            intervals,
            repeats,
            delay,
            jitter,
            no_countdown,
        } => {
            let mode = match repeats {
                Some(target) => RunMode::Counted(target),
                None => RunMode::Continuous,
            };
            run_automation(&keys, intervals.as_deref(), delay, mode, jitter, !no_countdown).await
        }
        Commands::Test { keys, intervals } => {
            let sequence = parse_combination(&keys)?;
            let table = match intervals.as_deref() {
                Some(raw) => parse_intervals(raw),
                // Absent table: the sender falls back to a single default
                // trailing delay.
                None => Vec::new(),
            };
            let mut injector = EnigoInjector::new()?;
            info!("testing combination: {}", format_combination(&sequence));
            if send_sequence(&mut injector, &sequence, &table, true, 0.0).await {
                info!("test successful");
                Ok(())
            } else {
                bail!("test failed; check the key combination")
            }
        }
        Commands::Calc {
            current,
            r#final: target,
            step,
        } => {
            let plan = reps_needed(current, target, step)?;
            info!(
                "{} presses ({} by {:.3} mm)",
                plan.repetitions, plan.direction, plan.distance_mm
            );
            println!("{}", plan.repetitions);
            Ok(())
        }
        Commands::Drive {
            keys,
            current,
            r#final: target,
            step,
            intervals,
            jitter,
            no_countdown,
        } => {
            let plan = reps_needed(current, target, step)?;
            info!(
                "DV move {current:.3} -> {target:.3} mm: {} presses ({})",
                plan.repetitions, plan.direction
            );
            let repetitions = u32::try_from(plan.repetitions)
                .context("press count too large for a counted run")?;
            run_automation(
                &keys,
                intervals.as_deref(),
                DEFAULT_DELAY_MS,
                RunMode::Counted(repetitions),
                jitter,
                !no_countdown,
            )
            .await
        }
        Commands::Record { stop_key } => {
            let stop = parse_single_key(&stop_key)?;
            info!("recording; press {stop} to finish");
            let Some(receiver) = start_recording(stop) else {
                bail!("a recording session is already active");
            };
            match receiver.await {
                Ok(sequence) => {
                    info!("recorded: {}", format_combination(&sequence));
                    println!("{}", format_combination(&sequence));
                    Ok(())
                }
                Err(_) => {
                    info!("nothing recorded");
                    Ok(())
                }
            }
        }
    }
}
