//! Userspace-driven ALSA timer
//!
//! Creation is a two-phase contract: a [`TimerRequest`] goes in, a
//! [`TimerHandle`] carrying the kernel-assigned [`TimerId`] comes out. The
//! handle is the only thing that can fire the timer, and closing it consumes
//! it, so a timer is released exactly once.
//!
//! # Example Usage
//!
//! ```ignore
//! use utimer_core::timer::{SndTimerControl, TimerProvider, TimerRequest, UserspaceTimer};
//!
//! let mut control = SndTimerControl::default();
//! let timer = control.create(&TimerRequest::default())?;
//! timer.trigger()?;
//! timer.close()?;
//! ```

mod error;
mod handle;
mod ioctl;

use std::fmt;
use std::io;
use std::time::Duration;

pub use error::{CreateFailure, TimerError, TimerResult};
pub use handle::{SndTimerControl, TimerHandle, DEFAULT_CONTROL_PATH};

/// Frame rate the loopback is expected to negotiate
pub const DEFAULT_RATE: u32 = 8000;

/// Period size (frames) the loopback is expected to negotiate
pub const DEFAULT_PERIOD: u32 = 4410;

/// Timer id assigned by the kernel on creation
///
/// Always a resolved value; the `-1` placeholder used in the raw request
/// record can't be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

impl TimerId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Convert the raw id from the kernel record, rejecting the sentinel
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested timer parameters
///
/// Must match the rate and period snd-aloop will negotiate with its clients,
/// otherwise the emulated hardware parameters come out wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    rate: u32,
    period: u32,
}

impl TimerRequest {
    /// Returns `None` if either parameter is zero
    pub fn new(rate: u32, period: u32) -> Option<Self> {
        (rate > 0 && period > 0).then_some(Self { rate, period })
    }

    /// Frames per second
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Frames per period
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Wall-clock length of one period at this rate
    pub fn period_duration(&self) -> Duration {
        Duration::from_secs_f64(self.period as f64 / self.rate as f64)
    }
}

impl Default for TimerRequest {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            period: DEFAULT_PERIOD,
        }
    }
}

/// A created timer that can be fired from any thread
pub trait UserspaceTimer: Send + Sync {
    /// Kernel-assigned id
    fn id(&self) -> TimerId;

    /// Signal that one period has elapsed
    fn trigger(&self) -> io::Result<()>;

    /// Release the timer
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Something that can create userspace-driven timers
pub trait TimerProvider {
    type Timer: UserspaceTimer;

    fn create(&mut self, request: &TimerRequest) -> TimerResult<Self::Timer>;
}
