//! snd-aloop activation
//!
//! snd-aloop picks its clock through the `timer_source` module parameter.
//! For a global timer the address is `-1.<device>.<subdevice>`, where the
//! device is the "global, userspace-driven" timer class and the subdevice is
//! the id the kernel assigned to our timer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::{run_command, CommandOutcome};
use crate::timer::TimerId;

/// `SNDRV_TIMER_GLOBAL_UDRIVEN`
pub const SNDRV_TIMER_GLOBAL_UDRIVEN: u32 = 4;

/// Card number used for global timers
pub const GLOBAL_TIMER_CARD: i32 = -1;

/// Timer source address handed to snd-aloop
///
/// Only constructible from a resolved [`TimerId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSourceAddress {
    card: i32,
    device: u32,
    subdevice: TimerId,
}

impl TimerSourceAddress {
    /// Address of a global userspace-driven timer
    pub fn global_udriven(id: TimerId) -> Self {
        Self {
            card: GLOBAL_TIMER_CARD,
            device: SNDRV_TIMER_GLOBAL_UDRIVEN,
            subdevice: id,
        }
    }

    pub fn timer_id(&self) -> TimerId {
        self.subdevice
    }
}

impl fmt::Display for TimerSourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.card, self.device, self.subdevice)
    }
}

/// Loads and unloads the loopback device
pub trait DeviceActivator {
    /// Bring the loopback device up, clocked by `address`
    fn activate(&mut self, address: &TimerSourceAddress) -> CommandOutcome;

    /// Tear the loopback device down
    fn deactivate(&mut self) -> CommandOutcome;
}

/// How to load and unload snd-aloop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AloopModuleConfig {
    /// Kernel module name
    pub module: String,
    /// Loader program
    pub modprobe: String,
    /// Unloader program
    pub rmmod: String,
    /// Unload the module when the harness exits
    pub unload_on_exit: bool,
}

impl Default for AloopModuleConfig {
    fn default() -> Self {
        Self {
            module: "snd-aloop".to_string(),
            modprobe: "modprobe".to_string(),
            rmmod: "rmmod".to_string(),
            unload_on_exit: true,
        }
    }
}

/// [`DeviceActivator`] that shells out to modprobe/rmmod
#[derive(Debug, Clone, Default)]
pub struct AloopModule {
    config: AloopModuleConfig,
}

impl AloopModule {
    pub fn new(config: AloopModuleConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to modprobe for `address`
    pub fn load_args(&self, address: &TimerSourceAddress) -> [String; 2] {
        [
            self.config.module.clone(),
            format!("timer_source={}", address),
        ]
    }
}

impl DeviceActivator for AloopModule {
    fn activate(&mut self, address: &TimerSourceAddress) -> CommandOutcome {
        log::info!(
            "[ALOOP] Loading {} with timer_source={}",
            self.config.module,
            address
        );
        let outcome = run_command(&self.config.modprobe, self.load_args(address));
        outcome.warn_on_failure("[ALOOP] Module load");
        outcome
    }

    fn deactivate(&mut self) -> CommandOutcome {
        log::info!("[ALOOP] Unloading {}", self.config.module);
        let outcome = run_command(&self.config.rmmod, [&self.config.module]);
        outcome.warn_on_failure("[ALOOP] Module unload");
        outcome
    }
}
