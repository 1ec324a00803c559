//! Harness configuration
//!
//! One YAML file with a section per component:
//!
//! ```yaml
//! timer:
//!   control_path: /dev/snd/timer
//!   rate: 8000
//!   period: 4410
//! ticker:
//!   count: 10
//!   interval_ms: 1000
//! capture:
//!   recorder: ./record.sh
//!   sample_bytes: 2
//!   channels: 1
//! device:
//!   module: snd-aloop
//!   modprobe: modprobe
//!   rmmod: rmmod
//!   unload_on_exit: true
//! ```
//!
//! Missing keys fall back to the defaults above.

mod io;
mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aloop::AloopModuleConfig;
use crate::capture::{CaptureConfig, MAX_CAPTURE_BUFFER};
use crate::harness::HarnessSettings;
use crate::ticker::TickerConfig;
use crate::timer::{TimerRequest, DEFAULT_CONTROL_PATH, DEFAULT_PERIOD, DEFAULT_RATE};

pub use io::{load_config, load_config_or_default, save_config};
pub use paths::{default_config_path, CONFIG_DIR_NAME};

/// Timer section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// ALSA timer control node
    pub control_path: PathBuf,
    /// Frames per second
    pub rate: u32,
    /// Frames per period
    pub period: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            control_path: PathBuf::from(DEFAULT_CONTROL_PATH),
            rate: DEFAULT_RATE,
            period: DEFAULT_PERIOD,
        }
    }
}

/// Complete harness configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub timer: TimerConfig,
    pub ticker: TickerConfig,
    pub capture: CaptureConfig,
    pub device: AloopModuleConfig,
}

/// Values that can't produce a meaningful run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Timer rate and period must be positive (rate={rate}, period={period})")]
    InvalidTimer { rate: u32, period: u32 },

    #[error(
        "Sample size and channel count must be positive \
         (sample_bytes={sample_bytes}, channels={channels})"
    )]
    InvalidFormat { sample_bytes: u32, channels: u32 },

    #[error(
        "Capture buffer for period={period}, sample_bytes={sample_bytes}, \
         channels={channels} exceeds {max} bytes",
        max = MAX_CAPTURE_BUFFER
    )]
    CaptureTooLarge {
        period: u32,
        sample_bytes: u32,
        channels: u32,
    },

    #[error("Recorder command is empty")]
    EmptyRecorder,
}

impl HarnessConfig {
    /// Timer request built from the timer section
    pub fn timer_request(&self) -> Result<TimerRequest, ConfigError> {
        TimerRequest::new(self.timer.rate, self.timer.period).ok_or(ConfigError::InvalidTimer {
            rate: self.timer.rate,
            period: self.timer.period,
        })
    }

    /// Check every section and derive the run settings
    pub fn harness_settings(&self) -> Result<HarnessSettings, ConfigError> {
        let request = self.timer_request()?;

        if self.capture.sample_bytes == 0 || self.capture.channels == 0 {
            return Err(ConfigError::InvalidFormat {
                sample_bytes: self.capture.sample_bytes,
                channels: self.capture.channels,
            });
        }
        self.capture_capacity()?;
        if self.capture.recorder.trim().is_empty() {
            return Err(ConfigError::EmptyRecorder);
        }

        Ok(HarnessSettings {
            request,
            ticker: self.ticker,
            teardown: self.device.unload_on_exit,
        })
    }

    /// Capture buffer capacity: one period of audio plus a terminator
    pub fn capture_capacity(&self) -> Result<usize, ConfigError> {
        self.capture
            .buffer_capacity(self.timer.period)
            .ok_or(ConfigError::CaptureTooLarge {
                period: self.timer.period,
                sample_bytes: self.capture.sample_bytes,
                channels: self.capture.channels,
            })
    }
}
