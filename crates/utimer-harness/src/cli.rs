//! Command line flags
//!
//! Every flag overrides the matching key of the YAML config.

use std::path::PathBuf;

use clap::Parser;
use utimer_core::HarnessConfig;

#[derive(Debug, Parser)]
#[command(
    version,
    about = "Clock snd-aloop from a userspace-driven ALSA timer and record from it"
)]
pub struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// ALSA timer control node
    #[arg(long)]
    pub control_path: Option<PathBuf>,

    /// Timer rate in frames per second
    #[arg(long)]
    pub rate: Option<u32>,

    /// Timer period in frames
    #[arg(long)]
    pub period: Option<u32>,

    /// Number of timer fires
    #[arg(long)]
    pub ticks: Option<u32>,

    /// Milliseconds between fires
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Recorder command line whose stdout is captured
    #[arg(long)]
    pub recorder: Option<String>,

    /// Terminate the recorder after this many seconds
    #[arg(long)]
    pub capture_timeout_secs: Option<u64>,

    /// Leave snd-aloop loaded after the run
    #[arg(long)]
    pub no_unload: bool,

    /// Save the effective configuration back to the config file
    #[arg(long)]
    pub write_config: bool,
}

impl Cli {
    /// Apply flag overrides on top of `config`
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(path) = &self.control_path {
            config.timer.control_path = path.clone();
        }
        if let Some(rate) = self.rate {
            config.timer.rate = rate;
        }
        if let Some(period) = self.period {
            config.timer.period = period;
        }
        if let Some(ticks) = self.ticks {
            config.ticker.count = ticks;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.ticker.interval_ms = interval_ms;
        }
        if let Some(recorder) = &self.recorder {
            config.capture.recorder = recorder.clone();
        }
        if let Some(secs) = self.capture_timeout_secs {
            config.capture.timeout_secs = Some(secs);
        }
        if self.no_unload {
            config.device.unload_on_exit = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_keeps_config() {
        let cli = Cli::try_parse_from(["utimer-harness"]).unwrap();
        let mut config = HarnessConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "utimer-harness",
            "--rate",
            "48000",
            "--period",
            "480",
            "--ticks",
            "3",
            "--interval-ms",
            "250",
            "--recorder",
            "arecord -D hw:Loopback,1,0 -f S16_LE -c 1 -r 48000",
            "--capture-timeout-secs",
            "5",
            "--no-unload",
        ])
        .unwrap();

        let mut config = HarnessConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.timer.rate, 48000);
        assert_eq!(config.timer.period, 480);
        assert_eq!(config.ticker.count, 3);
        assert_eq!(config.ticker.interval_ms, 250);
        assert!(config.capture.recorder.starts_with("arecord"));
        assert_eq!(config.capture.timeout_secs, Some(5));
        assert!(!config.device.unload_on_exit);
    }

    #[test]
    fn test_rejects_non_numeric_rate() {
        assert!(Cli::try_parse_from(["utimer-harness", "--rate", "fast"]).is_err());
    }
}
