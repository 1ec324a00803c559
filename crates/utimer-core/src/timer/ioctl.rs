//! Raw `/dev/snd/timer` ABI for userspace-driven timers
//!
//! The create ioctl takes a `snd_userspace_timer` record, returns the new
//! timer descriptor and writes the assigned timer id back into the record.
//! Firing is a payload-less ioctl on that descriptor.

use std::os::fd::RawFd;

use super::error::{CreateFailure, TimerResult};
use super::{TimerId, TimerRequest};

/// Id value the kernel overwrites on successful creation
pub const UNRESOLVED_ID: i32 = -1;

const SNDRV_TIMER_IOCTL_MAGIC: u8 = b'T';
const SNDRV_TIMER_IOCTL_CREATE: u8 = 0xa5;
const SNDRV_TIMER_IOCTL_TRIGGER: u8 = 0xa6;

/// Mirror of `struct snd_userspace_timer`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndUserspaceTimer {
    /// Frames per second
    pub rate: u32,
    /// Frames per period
    pub period: u32,
    /// Timer id, `-1` until the kernel assigns one
    pub id: i32,
}

impl SndUserspaceTimer {
    pub fn from_request(request: &TimerRequest) -> Self {
        Self {
            rate: request.rate(),
            period: request.period(),
            id: UNRESOLVED_ID,
        }
    }

    /// Read back the id the kernel assigned during creation
    pub fn resolved_id(&self) -> TimerResult<TimerId> {
        TimerId::from_raw(self.id).ok_or_else(|| CreateFailure::UnresolvedId(self.id).into())
    }
}

nix::ioctl_readwrite!(
    snd_timer_create,
    SNDRV_TIMER_IOCTL_MAGIC,
    SNDRV_TIMER_IOCTL_CREATE,
    SndUserspaceTimer
);
nix::ioctl_none!(
    snd_timer_trigger,
    SNDRV_TIMER_IOCTL_MAGIC,
    SNDRV_TIMER_IOCTL_TRIGGER
);

/// Validate the create ioctl's return value as a timer descriptor
pub fn resolve_descriptor(ret: nix::Result<libc::c_int>) -> TimerResult<RawFd> {
    match ret {
        Ok(fd) if fd >= 0 => Ok(fd),
        Ok(fd) => Err(CreateFailure::InvalidDescriptor(fd).into()),
        Err(errno) => Err(CreateFailure::Rejected(errno).into()),
    }
}
