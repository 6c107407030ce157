use crate::config::DEFAULT_INTERVAL_SECS;
use crate::platform::{BackgroundTasks, ExtensionToken, TimerHandle, TimerScheduler};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keepalive loop phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Not started, or stopped by the host
    Idle,
    /// Sensor running, waiting for a reading
    Sampling,
    /// Reading taken, sensor stopped, restart timer armed
    Draining,
}

/// Restart-cycle bookkeeping.
///
/// `timer` is `Some` exactly while a restart is pending.
#[derive(Debug, Clone)]
pub struct KeepaliveState {
    pub enabled: bool,
    pub timer: Option<TimerHandle>,
    pub extension: Option<ExtensionToken>,
    pub interval_seconds: u32,
}

impl KeepaliveState {
    pub fn new(interval_seconds: u32) -> Self {
        KeepaliveState {
            enabled: false,
            timer: None,
            extension: None,
            interval_seconds,
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.enabled, self.timer) {
            (false, _) => Phase::Idle,
            (true, Some(_)) => Phase::Draining,
            (true, None) => Phase::Sampling,
        }
    }

    pub fn restart_pending(&self) -> bool {
        self.timer.is_some()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds))
    }

    /// Acquire a fresh extension, then release the one held before it.
    ///
    /// If the OS refuses, the previous extension stays held.
    pub fn rotate_extension(&mut self, background: &dyn BackgroundTasks) {
        match background.begin_extension() {
            Some(token) => {
                let previous = self.extension.replace(token);
                debug!("background extension {:?} acquired", token);
                if let Some(previous) = previous {
                    background.end_extension(previous);
                }
            }
            None => warn!(
                "background extension refused, keeping {:?}",
                self.extension
            ),
        }
    }

    pub fn release_extension(&mut self, background: &dyn BackgroundTasks) {
        if let Some(token) = self.extension.take() {
            debug!("background extension {:?} released", token);
            background.end_extension(token);
        }
    }

    /// Arm the restart timer for the current interval. On failure no restart
    /// is pending.
    pub fn arm(&mut self, timers: &dyn TimerScheduler) -> Option<TimerHandle> {
        self.timer = timers.arm(self.interval());
        match self.timer {
            Some(handle) => {
                debug!("restart timer {:?} armed for {}s", handle, self.interval_seconds)
            }
            None => warn!("restart timer could not be armed"),
        }
        self.timer
    }

    pub fn cancel_timer(&mut self, timers: &dyn TimerScheduler) {
        if let Some(handle) = self.timer.take() {
            debug!("restart timer {:?} cancelled", handle);
            timers.cancel(handle);
        }
    }

    /// Clear the pending timer if `handle` is the one armed
    pub fn take_fired(&mut self, handle: TimerHandle) -> bool {
        if self.timer == Some(handle) {
            self.timer = None;
            true
        } else {
            false
        }
    }
}

impl Default for KeepaliveState {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_SECS)
    }
}
