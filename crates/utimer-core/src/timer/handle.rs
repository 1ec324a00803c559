//! `/dev/snd/timer` backed timer creation

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use super::error::{TimerError, TimerResult};
use super::ioctl::{resolve_descriptor, snd_timer_create, snd_timer_trigger, SndUserspaceTimer};
use super::{TimerId, TimerProvider, TimerRequest, UserspaceTimer};

/// Default ALSA timer control node
pub const DEFAULT_CONTROL_PATH: &str = "/dev/snd/timer";

/// Creates userspace-driven timers through the ALSA timer control node
#[derive(Debug, Clone)]
pub struct SndTimerControl {
    path: PathBuf,
}

impl SndTimerControl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> TimerResult<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(&self.path)
            .map_err(|source| TimerError::Open {
                path: self.path.clone(),
                source,
            })
    }
}

impl Default for SndTimerControl {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_PATH)
    }
}

impl TimerProvider for SndTimerControl {
    type Timer = TimerHandle;

    fn create(&mut self, request: &TimerRequest) -> TimerResult<TimerHandle> {
        let control = self.open()?;
        log::debug!("[TIMER] Opened {:?}", self.path);

        let mut record = SndUserspaceTimer::from_request(request);
        // SAFETY: `record` is a valid, exclusively borrowed repr(C) struct for
        // the duration of the call.
        let ret = unsafe { snd_timer_create(control.as_raw_fd(), &mut record) };
        let raw_fd = resolve_descriptor(ret)?;
        // SAFETY: the kernel just handed us this descriptor and nothing else owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        let id = record.resolved_id()?;
        log::info!("[TIMER] {}", timer_id_line(id));
        log::debug!(
            "[TIMER] rate={} period={} ({:?} per period), fd={}",
            request.rate(),
            request.period(),
            request.period_duration(),
            raw_fd
        );

        Ok(TimerHandle {
            id,
            fd,
            _control: control,
        })
    }
}

/// Line reported once the kernel assigned an id
fn timer_id_line(id: TimerId) -> String {
    format!("Timer id: {}", id)
}

/// A live userspace-driven timer
///
/// Shared by reference with the ticking thread; released with
/// [`UserspaceTimer::close`] once nothing fires it anymore.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    fd: OwnedFd,
    /// Control node kept open for the timer's lifetime
    _control: File,
}

impl UserspaceTimer for TimerHandle {
    fn id(&self) -> TimerId {
        self.id
    }

    fn trigger(&self) -> io::Result<()> {
        // SAFETY: payload-less ioctl on a descriptor we own.
        unsafe { snd_timer_trigger(self.fd.as_raw_fd()) }
            .map(|_| ())
            .map_err(io::Error::from)
    }

    fn close(self) -> io::Result<()> {
        let raw = self.fd.into_raw_fd();
        // SAFETY: ownership of `raw` was released above, so this is the only close.
        if unsafe { libc::close(raw) } < 0 {
            return Err(io::Error::last_os_error());
        }
        log::debug!("[TIMER] Timer {} closed", self.id);
        Ok(())
    }
}
