//! utimer harness - snd-aloop driven by a userspace timer
//!
//! 1. Creates a userspace-driven ALSA timer
//! 2. Loads snd-aloop with `timer_source=-1.4.<timer id>`
//! 3. Fires the timer from a background thread while the recorder's output
//!    is drained on the main thread
//! 4. Closes the timer and unloads snd-aloop
//!
//! Exits with failure only if the timer can't be created (or the
//! configuration is unusable). Set RUST_LOG=debug for verbose output.

mod cli;

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use cli::Cli;
use utimer_core::capture::CaptureChunk;
use utimer_core::config::{
    default_config_path, load_config, load_config_or_default, save_config,
};
use utimer_core::{
    AloopModule, CaptureRelay, Harness, HarnessConfig, RecorderProcess, RunReport, SndTimerControl,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run(Cli::parse()) {
        Ok(report) => {
            log::info!(
                "Run complete: timer {} ({}), {} fires, {} chunks / {} bytes captured",
                report.timer_id,
                report.address,
                report.ticks.fired,
                report.capture.chunks,
                report.capture.bytes
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<RunReport> {
    // An explicit --config must exist; the default location is optional
    let (config_path, mut config): (_, HarnessConfig) = match &cli.config {
        Some(path) => (path.clone(), load_config(path)?),
        None => {
            let path = default_config_path();
            let config = load_config_or_default(&path)?;
            (path, config)
        }
    };
    cli.apply(&mut config);

    if cli.write_config {
        save_config(&config, &config_path)?;
    }

    let settings = config
        .harness_settings()
        .context("Invalid harness configuration")?;

    let capacity = config
        .capture_capacity()
        .context("Invalid harness configuration")?;
    let relay = CaptureRelay::new(capacity, config.capture.deadline());
    let mut harness = Harness::new(
        SndTimerControl::new(&config.timer.control_path),
        AloopModule::new(config.device.clone()),
        RecorderProcess::new(config.capture.recorder.clone()),
        relay,
        settings,
    );

    let mut stdout = std::io::stdout().lock();
    let report = harness.run(|chunk: &CaptureChunk<'_>| {
        log::debug!("Chunk {}: {} bytes", chunk.index, chunk.len());
        if let Err(e) = writeln!(stdout, "Some data: {}", chunk.text()) {
            log::warn!("Failed to print captured data: {}", e);
        }
    })?;

    Ok(report)
}
