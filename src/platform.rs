//! Capabilities the plugin consumes from the host OS, and the event surface
//! the platform adapter drives.
//!
//! Implementations are called while the plugin holds its state lock, so they
//! must never call back into the plugin synchronously. Deliver events later
//! (next run-loop turn, another thread) instead.

use crate::reading::{AuthorizationStatus, Reading, SensorError};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Handle for a one-shot keepalive timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Handle for an OS-granted background execution extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionToken(pub u64);

/// Location updates (CoreLocation / fused location provider)
pub trait LocationSensor: Send + Sync {
    fn start_updates(&self);
    fn stop_updates(&self);
    /// Ask for a single fix outside the continuous update stream
    fn request_location(&self);
    fn authorization_status(&self) -> AuthorizationStatus;
}

/// Background execution extensions
pub trait BackgroundTasks: Send + Sync {
    /// `None` when the OS refuses another extension
    fn begin_extension(&self) -> Option<ExtensionToken>;
    fn end_extension(&self, token: ExtensionToken);
}

/// One-shot timers; a fire is reported through `LocationPlugin::on_timer_fired`
pub trait TimerScheduler: Send + Sync {
    /// `None` when no timer could be scheduled
    fn arm(&self, after: Duration) -> Option<TimerHandle>;
    /// Must not block waiting for the timer
    fn cancel(&self, handle: TimerHandle);
}

/// Pedometer / motion activity
pub trait MotionSensor: Send + Sync {
    fn start_updates(&self);
    fn stop_updates(&self);
    /// Range query over `since..now`. The answer comes back through
    /// `LocationPlugin::on_step_count` carrying the same `since`.
    fn query_steps(&self, since: DateTime<Utc>);
}

/// Everything the plugin talks to, wired by the composition root
pub struct PlatformServices {
    pub location: Box<dyn LocationSensor>,
    pub background: Box<dyn BackgroundTasks>,
    pub timers: Box<dyn TimerScheduler>,
    pub motion: Option<Box<dyn MotionSensor>>,
}

/// Sensor callbacks pushed by the platform adapter
pub trait SensorEvents {
    fn on_reading(&self, reading: Reading);
    fn on_error(&self, error: SensorError);
    fn on_authorization_changed(&self, status: AuthorizationStatus);
}
