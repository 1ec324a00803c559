//! Capture relay
//!
//! Launches the recorder, drains its stdout into a fixed buffer until a read
//! returns zero bytes, and hands every chunk to a sink for inspection.
//!
//! # Termination
//!
//! End-of-data is the only normal way out of the read loop. With a deadline
//! configured, a watchdog thread terminates the recorder's process group
//! when it expires, which closes the pipe and produces that end-of-data.
//! Without one, a recorder that never closes stdout blocks the relay forever.
//!
//! Read errors other than `Interrupted` end the loop too; they are reported
//! as [`CaptureEnd::ReadError`] rather than failing the run.

use std::borrow::Cow;
use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::command::CommandOutcome;

/// Recorder launched when nothing else is configured
pub const DEFAULT_RECORDER: &str = "./record.sh";

/// Largest capture buffer a configuration may ask for (16 MiB)
pub const MAX_CAPTURE_BUFFER: usize = 16 * 1024 * 1024;

/// Recording parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recorder command line, split with shell quoting rules
    pub recorder: String,
    /// Bytes per sample (S16 = 2)
    pub sample_bytes: u32,
    /// Interleaved channel count
    pub channels: u32,
    /// Kill the recorder after this many seconds (None = wait for end-of-data)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recorder: DEFAULT_RECORDER.to_string(),
            sample_bytes: 2,
            channels: 1,
            timeout_secs: None,
        }
    }
}

impl CaptureConfig {
    /// Buffer capacity for one period plus a terminator slot
    ///
    /// `None` when the product overflows or exceeds [`MAX_CAPTURE_BUFFER`].
    pub fn buffer_capacity(&self, period_frames: u32) -> Option<usize> {
        (period_frames as usize)
            .checked_mul(self.sample_bytes as usize)?
            .checked_mul(self.channels as usize)?
            .checked_add(1)
            .filter(|&capacity| capacity <= MAX_CAPTURE_BUFFER)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Fixed-capacity read buffer reused across reads
///
/// Reads only ever fill `capacity - 1` bytes; the last slot is forced back
/// to `0` after every read so a chunk viewed as text never runs past valid
/// data.
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Box<[u8]>,
}

impl CaptureBuffer {
    /// Capacities below 2 are bumped to 2 (one data byte plus terminator)
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(2)].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes a single read may fill
    pub fn usable(&self) -> usize {
        self.data.len() - 1
    }

    /// Read once from `reader`, returning the number of valid bytes
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        let usable = self.usable();
        let n = reader.read(&mut self.data[..usable])?;
        self.data[usable] = 0;
        Ok(n)
    }

    /// View the first `len` bytes as chunk number `index`
    pub fn chunk(&self, index: usize, len: usize) -> CaptureChunk<'_> {
        CaptureChunk {
            index,
            bytes: &self.data[..len.min(self.usable())],
        }
    }

    pub fn terminator(&self) -> u8 {
        self.data[self.usable()]
    }
}

/// One non-empty read from the recorder
#[derive(Debug, Clone, Copy)]
pub struct CaptureChunk<'a> {
    /// Zero-based read number
    pub index: usize,
    pub bytes: &'a [u8],
}

impl<'a> CaptureChunk<'a> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Printable view: everything up to the first NUL, lossily decoded
    pub fn text(&self) -> Cow<'a, str> {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end])
    }
}

/// Why the capture loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEnd {
    /// A read returned zero bytes
    EndOfStream,
    /// The deadline expired and the recorder was terminated
    DeadlineExpired,
    /// A read failed with something other than `Interrupted`
    ReadError(String),
    /// The recorder could not be started
    LaunchFailed(String),
}

/// Summary of a capture run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    /// Non-empty chunks surfaced to the sink
    pub chunks: usize,
    pub bytes: usize,
    pub end: CaptureEnd,
    /// How the recorder exited, if it was reaped
    pub recorder: Option<CommandOutcome>,
    pub elapsed: Duration,
}

impl CaptureReport {
    fn launch_failed(error: &io::Error, started: Instant) -> Self {
        Self {
            chunks: 0,
            bytes: 0,
            end: CaptureEnd::LaunchFailed(error.to_string()),
            recorder: None,
            elapsed: started.elapsed(),
        }
    }
}

/// Terminates a running recorder from another thread
#[derive(Debug, Clone, Copy)]
pub struct KillSwitch {
    pgid: Pid,
}

impl KillSwitch {
    pub fn new(pgid: Pid) -> Self {
        Self { pgid }
    }

    /// SIGTERM the recorder's whole process group
    pub fn fire(&self) {
        if let Err(e) = killpg(self.pgid, Signal::SIGTERM) {
            log::warn!("[CAPTURE] Failed to signal recorder group {}: {}", self.pgid, e);
        }
    }
}

/// Producer of the byte stream the relay drains
pub trait RecordingSource {
    type Stream: Read;

    /// Start producing data
    fn launch(&mut self) -> io::Result<Self::Stream>;

    /// Handle that stops the producer early, if supported
    fn kill_switch(&self) -> Option<KillSwitch>;

    /// Reap the producer once its stream is drained
    fn release(&mut self) -> Option<CommandOutcome>;
}

/// Recorder running as a child process, read through its stdout
#[derive(Debug)]
pub struct RecorderProcess {
    command_line: String,
    child: Option<Child>,
}

impl RecorderProcess {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            child: None,
        }
    }

    fn argv(&self) -> io::Result<Vec<String>> {
        let argv = shlex::split(&self.command_line).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid quoting in recorder command: {}", self.command_line),
            )
        })?;
        if argv.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty recorder command",
            ));
        }
        Ok(argv)
    }
}

impl RecordingSource for RecorderProcess {
    type Stream = ChildStdout;

    fn launch(&mut self) -> io::Result<ChildStdout> {
        let argv = self.argv()?;
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            // Own process group so a deadline can take down the whole pipeline
            .process_group(0)
            .spawn()?;

        log::info!(
            "[CAPTURE] Recorder started (pid {}): {}",
            child.id(),
            self.command_line
        );

        let stdout = child.stdout.take();
        self.child = Some(child);
        stdout.ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "recorder stdout not piped")
        })
    }

    fn kill_switch(&self) -> Option<KillSwitch> {
        let pid = i32::try_from(self.child.as_ref()?.id()).ok()?;
        Some(KillSwitch::new(Pid::from_raw(pid)))
    }

    fn release(&mut self) -> Option<CommandOutcome> {
        let mut child = self.child.take()?;
        let outcome = match child.wait() {
            Ok(status) if status.success() => CommandOutcome::Success,
            Ok(status) => CommandOutcome::Failed {
                code: status.code(),
                stderr: String::new(),
            },
            Err(e) => CommandOutcome::SpawnFailed(e.to_string()),
        };
        log::info!("[CAPTURE] Recorder exited: {}", outcome);
        Some(outcome)
    }
}

struct Drained {
    chunks: usize,
    bytes: usize,
    error: Option<io::Error>,
}

/// Read until end-of-data or a hard error
fn drain<R, F>(mut reader: R, buffer: &mut CaptureBuffer, sink: &mut F) -> Drained
where
    R: Read,
    F: FnMut(&CaptureChunk<'_>),
{
    let mut drained = Drained {
        chunks: 0,
        bytes: 0,
        error: None,
    };

    loop {
        match buffer.fill_from(&mut reader) {
            Ok(0) => break,
            Ok(n) => {
                sink(&buffer.chunk(drained.chunks, n));
                drained.chunks += 1;
                drained.bytes += n;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                drained.error = Some(e);
                break;
            }
        }
    }

    drained
}

/// Drains a [`RecordingSource`] on the calling thread
#[derive(Debug)]
pub struct CaptureRelay {
    buffer: CaptureBuffer,
    deadline: Option<Duration>,
}

impl CaptureRelay {
    pub fn new(capacity: usize, deadline: Option<Duration>) -> Self {
        Self {
            buffer: CaptureBuffer::new(capacity),
            deadline,
        }
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Launch `source`, drain it into `sink` and reap it
    pub fn run<S, F>(&mut self, source: &mut S, mut sink: F) -> CaptureReport
    where
        S: RecordingSource,
        F: FnMut(&CaptureChunk<'_>),
    {
        let started = Instant::now();

        let stream = match source.launch() {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("[CAPTURE] Failed to start recorder: {}", e);
                return CaptureReport::launch_failed(&e, started);
            }
        };

        let kill_switch = source.kill_switch();
        let expired = AtomicBool::new(false);
        let deadline = self.deadline;
        let buffer = &mut self.buffer;

        let drained = thread::scope(|s| {
            let (done_tx, done_rx) = channel::bounded::<()>(1);

            match (deadline, kill_switch) {
                (Some(deadline), Some(switch)) => {
                    let expired = &expired;
                    let spawned = thread::Builder::new()
                        .name("capture-watchdog".into())
                        .spawn_scoped(s, move || {
                            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(deadline) {
                                log::warn!(
                                    "[CAPTURE] No end-of-data after {:?}, terminating recorder",
                                    deadline
                                );
                                expired.store(true, Ordering::SeqCst);
                                switch.fire();
                            }
                        });
                    if let Err(e) = spawned {
                        log::warn!(
                            "[CAPTURE] Watchdog unavailable, capture has no deadline: {}",
                            e
                        );
                    }
                }
                (Some(_), None) => {
                    log::debug!("[CAPTURE] Source can't be stopped early, ignoring deadline");
                }
                (None, _) => {}
            }

            let drained = drain(stream, buffer, &mut sink);
            // Disconnects the watchdog
            drop(done_tx);
            drained
        });

        let end = match drained.error {
            Some(e) => {
                log::warn!("[CAPTURE] Read failed, stopping capture: {}", e);
                // Don't block on a recorder that may still be writing
                if let Some(switch) = kill_switch {
                    switch.fire();
                }
                CaptureEnd::ReadError(e.to_string())
            }
            None if expired.load(Ordering::SeqCst) => CaptureEnd::DeadlineExpired,
            None => CaptureEnd::EndOfStream,
        };

        let recorder = source.release();
        let report = CaptureReport {
            chunks: drained.chunks,
            bytes: drained.bytes,
            end,
            recorder,
            elapsed: started.elapsed(),
        };
        log::info!(
            "[CAPTURE] {} chunks, {} bytes in {:?} ({:?})",
            report.chunks,
            report.bytes,
            report.elapsed,
            report.end
        );
        report
    }
}
