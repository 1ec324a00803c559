//! Timer ticking thread
//!
//! Fires the userspace timer a fixed number of times, sleeping a fixed
//! interval after each fire. No catch-up and no jitter compensation: this is
//! a plain periodic driver.

use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::timer::UserspaceTimer;

/// Default number of fires per run
pub const DEFAULT_TICK_COUNT: u32 = 10;

/// Default spacing between fires (ms)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Ticking cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Number of fires per run
    pub count: u32,
    /// Sleep after each fire (ms)
    pub interval_ms: u64,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_TICK_COUNT,
            interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl TickerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Expected duration of a full run
    pub fn total_duration(&self) -> Duration {
        self.interval() * self.count
    }
}

/// What happened during a ticking run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Trigger calls issued
    pub fired: u32,
    /// Trigger calls the kernel rejected
    pub failed: u32,
    pub elapsed: Duration,
}

/// Fire `timer` according to `config`, blocking the calling thread
///
/// Trigger errors are counted, not propagated.
pub fn run_ticker<T: UserspaceTimer + ?Sized>(timer: &T, config: &TickerConfig) -> TickReport {
    let started = Instant::now();
    let interval = config.interval();
    let mut report = TickReport::default();

    log::info!(
        "[TICK] Firing timer {} {} times every {:?}",
        timer.id(),
        config.count,
        interval
    );

    for tick in 0..config.count {
        if let Err(e) = timer.trigger() {
            report.failed += 1;
            log::debug!("[TICK] Trigger {} failed: {}", tick, e);
        }
        report.fired += 1;
        log::trace!("[TICK] Fired {}/{}", tick + 1, config.count);
        thread::sleep(interval);
    }

    report.elapsed = started.elapsed();
    log::info!(
        "[TICK] Done: {} fires ({} rejected) in {:?}",
        report.fired,
        report.failed,
        report.elapsed
    );
    report
}

/// Start [`run_ticker`] on a named thread inside `scope`
///
/// The scope guarantees the thread is joined before `timer` can be closed.
pub fn spawn_ticker<'scope, 'env, T>(
    scope: &'scope Scope<'scope, 'env>,
    timer: &'env T,
    config: TickerConfig,
) -> std::io::Result<ScopedJoinHandle<'scope, TickReport>>
where
    T: UserspaceTimer + ?Sized,
{
    thread::Builder::new()
        .name("utimer-tick".into())
        .spawn_scoped(scope, move || run_ticker(timer, &config))
}
