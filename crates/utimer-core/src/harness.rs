//! Harness orchestration
//!
//! Sequences one run:
//!
//! ```text
//! Init → TimerCreated → DeviceActivated → Running → Joined → Closed
//!   └──→ Failed (no timer)                └──→ Failed (ticker never started)
//! ```
//!
//! Timer creation is the only fatal stage in practice; a ticking thread that
//! can't be spawned aborts the run too, after the timer is closed. Device
//! activation, the recorder and teardown are best-effort and only show up in
//! the [`RunReport`] and the log. The ticking thread is scoped, so the timer
//! can't be closed while it is still being fired.

use std::thread;

use thiserror::Error;

use crate::aloop::{DeviceActivator, TimerSourceAddress};
use crate::capture::{CaptureChunk, CaptureRelay, CaptureReport, RecordingSource};
use crate::command::CommandOutcome;
use crate::ticker::{spawn_ticker, TickReport, TickerConfig};
use crate::timer::{TimerError, TimerId, TimerProvider, TimerRequest, UserspaceTimer};

/// Harness lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Init,
    TimerCreated,
    DeviceActivated,
    Running,
    Joined,
    Closed,
    Failed,
}

impl HarnessState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(self, next: HarnessState) -> bool {
        use HarnessState::*;
        matches!(
            (self, next),
            (Init, TimerCreated)
                | (Init, Failed)
                | (TimerCreated, DeviceActivated)
                | (DeviceActivated, Running)
                | (Running, Joined)
                | (Running, Failed)
                | (Joined, Closed)
        )
    }
}

/// Errors that end a run early
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The timer could not be created
    #[error("Timer {stage} failed: {0}", stage = .0.stage())]
    Timer(#[from] TimerError),

    /// The ticking thread could not be started
    ///
    /// The timer is closed and the harness ends in [`HarnessState::Failed`].
    #[error("Failed to spawn ticking thread: {0}")]
    TickerSpawn(#[source] std::io::Error),
}

/// Everything observed during a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub timer_id: TimerId,
    pub address: TimerSourceAddress,
    pub activation: CommandOutcome,
    pub ticks: TickReport,
    pub capture: CaptureReport,
    /// States visited, in order
    pub states: Vec<HarnessState>,
}

/// Per-run parameters
#[derive(Debug, Clone, Default)]
pub struct HarnessSettings {
    pub request: TimerRequest,
    pub ticker: TickerConfig,
    /// Tear the loopback device down after the run, whatever the outcome
    pub teardown: bool,
}

/// Drives one timer, one loopback device and one recorder through a run
pub struct Harness<P, A, R> {
    timers: P,
    device: A,
    recorder: R,
    relay: CaptureRelay,
    settings: HarnessSettings,
    state: HarnessState,
    history: Vec<HarnessState>,
}

impl<P, A, R> Harness<P, A, R>
where
    P: TimerProvider,
    A: DeviceActivator,
    R: RecordingSource,
{
    pub fn new(
        timers: P,
        device: A,
        recorder: R,
        relay: CaptureRelay,
        settings: HarnessSettings,
    ) -> Self {
        Self {
            timers,
            device,
            recorder,
            relay,
            settings,
            state: HarnessState::Init,
            history: vec![HarnessState::Init],
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn device(&self) -> &A {
        &self.device
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    fn advance(&mut self, next: HarnessState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!("[HARNESS] {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Run once, then tear the device down if configured
    ///
    /// Chunks read from the recorder are handed to `sink` as they arrive.
    pub fn run<F>(&mut self, sink: F) -> Result<RunReport, HarnessError>
    where
        F: FnMut(&CaptureChunk<'_>),
    {
        let result = self.run_once(sink);

        if self.settings.teardown {
            self.device.deactivate();
        }

        result
    }

    fn run_once<F>(&mut self, sink: F) -> Result<RunReport, HarnessError>
    where
        F: FnMut(&CaptureChunk<'_>),
    {
        let request = self.settings.request;
        log::info!(
            "[HARNESS] Creating timer: rate={} period={}",
            request.rate(),
            request.period()
        );

        let timer = match self.timers.create(&request) {
            Ok(timer) => timer,
            Err(e) => {
                self.advance(HarnessState::Failed);
                return Err(e.into());
            }
        };
        self.advance(HarnessState::TimerCreated);

        let timer_id = timer.id();
        let address = TimerSourceAddress::global_udriven(timer_id);
        let activation = self.device.activate(&address);
        self.advance(HarnessState::DeviceActivated);

        self.advance(HarnessState::Running);
        let ticker = self.settings.ticker;
        let relay = &mut self.relay;
        let recorder = &mut self.recorder;
        let timer_ref = &timer;

        let concurrent = thread::scope(|s| {
            let ticking =
                spawn_ticker(s, timer_ref, ticker).map_err(HarnessError::TickerSpawn)?;
            let capture = relay.run(recorder, sink);
            let ticks = ticking.join().unwrap_or_else(|_| {
                log::error!("[HARNESS] Ticking thread panicked");
                TickReport::default()
            });
            Ok::<_, HarnessError>((ticks, capture))
        });

        let (ticks, capture) = match concurrent {
            Ok(done) => done,
            Err(e) => return Err(self.abort(timer, e)),
        };
        self.advance(HarnessState::Joined);

        close_timer(timer);
        self.advance(HarnessState::Closed);

        Ok(RunReport {
            timer_id,
            address,
            activation,
            ticks,
            capture,
            states: self.history.clone(),
        })
    }

    /// Give up on a running harness: release the timer and record the failure
    fn abort(&mut self, timer: P::Timer, err: HarnessError) -> HarnessError {
        close_timer(timer);
        self.advance(HarnessState::Failed);
        err
    }
}

fn close_timer<T: UserspaceTimer>(timer: T) {
    let id = timer.id();
    if let Err(e) = timer.close() {
        log::warn!("[HARNESS] Closing timer {} failed: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureEnd, KillSwitch};
    use crate::timer::CreateFailure;
    use std::collections::VecDeque;
    use std::io::{self, Read};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct FakeTimerState {
        fires: AtomicU32,
        closed: AtomicU32,
    }

    struct FakeTimer {
        id: TimerId,
        state: Arc<FakeTimerState>,
    }

    impl UserspaceTimer for FakeTimer {
        fn id(&self) -> TimerId {
            self.id
        }

        fn trigger(&self) -> io::Result<()> {
            self.state.fires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(self) -> io::Result<()> {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    enum Creation {
        Succeed(u32),
        OpenFails,
        BadDescriptor,
    }

    struct FakeProvider {
        creation: Creation,
        state: Arc<FakeTimerState>,
        requests: Vec<TimerRequest>,
    }

    impl FakeProvider {
        fn new(creation: Creation) -> Self {
            Self {
                creation,
                state: Arc::default(),
                requests: Vec::new(),
            }
        }
    }

    impl TimerProvider for FakeProvider {
        type Timer = FakeTimer;

        fn create(&mut self, request: &TimerRequest) -> Result<FakeTimer, TimerError> {
            self.requests.push(*request);
            match self.creation {
                Creation::Succeed(id) => Ok(FakeTimer {
                    id: TimerId::new(id),
                    state: self.state.clone(),
                }),
                Creation::OpenFails => Err(TimerError::Open {
                    path: PathBuf::from("/dev/snd/timer"),
                    source: io::Error::from(io::ErrorKind::NotFound),
                }),
                Creation::BadDescriptor => Err(CreateFailure::InvalidDescriptor(-1).into()),
            }
        }
    }

    #[derive(Default)]
    struct FakeDevice {
        activated: Vec<String>,
        deactivations: u32,
    }

    impl DeviceActivator for FakeDevice {
        fn activate(&mut self, address: &TimerSourceAddress) -> CommandOutcome {
            self.activated.push(address.to_string());
            CommandOutcome::Success
        }

        fn deactivate(&mut self) -> CommandOutcome {
            self.deactivations += 1;
            CommandOutcome::Success
        }
    }

    struct ChunkReader {
        sizes: VecDeque<usize>,
    }

    impl Read for ChunkReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.sizes.pop_front().unwrap_or(0).min(buf.len());
            buf[..n].fill(0x55);
            Ok(n)
        }
    }

    struct FakeRecorder {
        sizes: Vec<usize>,
        launches: u32,
    }

    impl FakeRecorder {
        fn new(sizes: Vec<usize>) -> Self {
            Self { sizes, launches: 0 }
        }
    }

    impl RecordingSource for FakeRecorder {
        type Stream = ChunkReader;

        fn launch(&mut self) -> io::Result<ChunkReader> {
            self.launches += 1;
            Ok(ChunkReader {
                sizes: self.sizes.clone().into(),
            })
        }

        fn kill_switch(&self) -> Option<KillSwitch> {
            None
        }

        fn release(&mut self) -> Option<CommandOutcome> {
            Some(CommandOutcome::Success)
        }
    }

    fn settings(count: u32) -> HarnessSettings {
        HarnessSettings {
            request: TimerRequest::new(8000, 4410).unwrap(),
            ticker: TickerConfig {
                count,
                interval_ms: 2,
            },
            teardown: true,
        }
    }

    fn harness(
        creation: Creation,
        sizes: Vec<usize>,
        count: u32,
    ) -> Harness<FakeProvider, FakeDevice, FakeRecorder> {
        Harness::new(
            FakeProvider::new(creation),
            FakeDevice::default(),
            FakeRecorder::new(sizes),
            CaptureRelay::new(8821, None),
            settings(count),
        )
    }

    #[test]
    fn test_transition_table() {
        use HarnessState::*;
        assert!(Init.can_advance_to(TimerCreated));
        assert!(Init.can_advance_to(Failed));
        assert!(!TimerCreated.can_advance_to(Failed));
        assert!(Running.can_advance_to(Failed));
        assert!(!Joined.can_advance_to(Failed));
        assert!(!Init.can_advance_to(DeviceActivated));
        assert!(!Running.can_advance_to(Closed));
        assert!(!Closed.can_advance_to(Init));
    }

    #[test]
    fn test_successful_run() {
        let mut harness = harness(Creation::Succeed(3), vec![512, 512, 0], 10);
        let mut chunk_sizes = Vec::new();
        let report = harness.run(|chunk| chunk_sizes.push(chunk.len())).unwrap();

        assert_eq!(report.timer_id, TimerId::new(3));
        assert_eq!(report.address.to_string(), "-1.4.3");
        assert_eq!(harness.device().activated, vec!["-1.4.3".to_string()]);

        assert_eq!(chunk_sizes, vec![512, 512]);
        assert_eq!(report.capture.end, CaptureEnd::EndOfStream);

        assert_eq!(report.ticks.fired, 10);
        assert_eq!(harness.timers.state.fires.load(Ordering::SeqCst), 10);
        assert_eq!(harness.timers.state.closed.load(Ordering::SeqCst), 1);

        assert_eq!(harness.timers.requests.len(), 1);
        assert_eq!(harness.timers.requests[0].rate(), 8000);
        assert_eq!(harness.timers.requests[0].period(), 4410);

        use HarnessState::*;
        assert_eq!(
            report.states,
            vec![Init, TimerCreated, DeviceActivated, Running, Joined, Closed]
        );
        assert_eq!(harness.state(), Closed);
        assert_eq!(harness.device().deactivations, 1);
    }

    #[test]
    fn test_open_failure_stops_before_device() {
        let mut harness = harness(Creation::OpenFails, vec![512], 10);
        let mut chunks = 0;
        let err = harness.run(|_| chunks += 1).unwrap_err();

        assert!(matches!(err, HarnessError::Timer(TimerError::Open { .. })));
        assert!(err.to_string().contains("open"));
        assert_eq!(harness.state(), HarnessState::Failed);
        assert!(harness.device().activated.is_empty());
        assert_eq!(harness.recorder().launches, 0);
        assert_eq!(chunks, 0);
    }

    #[test]
    fn test_create_failure_never_fires() {
        let mut harness = harness(Creation::BadDescriptor, vec![512], 10);
        let err = harness.run(|_| {}).unwrap_err();

        assert!(matches!(err, HarnessError::Timer(TimerError::Create(_))));
        assert_eq!(harness.state(), HarnessState::Failed);
        assert_eq!(harness.timers.state.fires.load(Ordering::SeqCst), 0);
        assert!(harness.device().activated.is_empty());
        assert_eq!(harness.recorder().launches, 0);
    }

    #[test]
    fn test_teardown_runs_regardless_of_outcome() {
        let mut failed = harness(Creation::OpenFails, vec![], 1);
        let _ = failed.run(|_| {});
        assert_eq!(failed.device().deactivations, 1);

        let mut skipped = harness(Creation::Succeed(0), vec![], 1);
        skipped.settings.teardown = false;
        skipped.run(|_| {}).unwrap();
        assert_eq!(skipped.device().deactivations, 0);
    }

    #[test]
    fn test_ticker_spawn_failure_is_recorded() {
        let mut harness = harness(Creation::Succeed(2), vec![], 4);
        let timer = harness.timers.create(&TimerRequest::default()).unwrap();
        harness.advance(HarnessState::TimerCreated);
        harness.advance(HarnessState::DeviceActivated);
        harness.advance(HarnessState::Running);

        let spawn_error = io::Error::from(io::ErrorKind::WouldBlock);
        let err = harness.abort(timer, HarnessError::TickerSpawn(spawn_error));

        assert!(matches!(err, HarnessError::TickerSpawn(_)));
        assert_eq!(harness.state(), HarnessState::Failed);
        assert_eq!(
            harness.history[harness.history.len() - 2..],
            [HarnessState::Running, HarnessState::Failed]
        );
        assert_eq!(harness.timers.state.closed.load(Ordering::SeqCst), 1);
        assert_eq!(harness.timers.state.fires.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_recording_still_joins_ticker() {
        let mut harness = harness(Creation::Succeed(1), vec![], 4);
        let report = harness.run(|_| {}).unwrap();
        assert_eq!(report.capture.chunks, 0);
        assert_eq!(report.ticks.fired, 4);
        assert_eq!(harness.timers.state.closed.load(Ordering::SeqCst), 1);
    }
}
