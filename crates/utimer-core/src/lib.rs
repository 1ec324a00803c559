//! utimer core - snd-aloop clocked by a userspace-driven ALSA timer
//!
//! Building blocks for a harness that creates a userspace timer, points
//! snd-aloop at it, fires it from a background thread and records from the
//! loopback at the same time.
//!
//! # Architecture
//!
//! ```text
//! Harness ─┬─ TimerProvider  → TimerHandle (id + descriptor)
//!          ├─ DeviceActivator ← TimerSourceAddress "-1.4.<id>"
//!          ├─ ticking thread  → TimerHandle::trigger × N
//!          └─ CaptureRelay    ← recorder stdout, until end-of-data
//! ```

pub mod aloop;
pub mod capture;
pub mod command;
pub mod config;
pub mod harness;
pub mod ticker;
pub mod timer;

pub use aloop::{AloopModule, DeviceActivator, TimerSourceAddress};
pub use capture::{
    CaptureChunk, CaptureEnd, CaptureRelay, CaptureReport, RecorderProcess, RecordingSource,
};
pub use command::CommandOutcome;
pub use config::{ConfigError, HarnessConfig};
pub use harness::{Harness, HarnessError, HarnessSettings, HarnessState, RunReport};
pub use ticker::{TickReport, TickerConfig};
pub use timer::{
    SndTimerControl, TimerError, TimerHandle, TimerId, TimerProvider, TimerRequest, UserspaceTimer,
};
