// Unity Location Bridge
// Buffers device location/step readings for a Unity host and keeps the app
// sampling in the background through a stop / extend / re-arm cycle.

pub mod android_jni;
pub mod buffer;
pub mod config;
pub mod error;
pub mod ffi;
pub mod host;
pub mod keepalive;
pub mod logging;
pub mod platform;
pub mod plugin;
pub mod reading;
pub mod steps;
pub mod timer;

#[cfg(test)]
mod testing;

pub use buffer::{EventBuffer, DEFAULT_BUFFER_CAPACITY, MAX_BUFFER_CAPACITY};
pub use config::{ExpiryPolicy, IntervalUpdate, PluginConfig, DEFAULT_INTERVAL_SECS};
pub use error::{PResult, PluginError};
pub use keepalive::{KeepaliveState, Phase};
pub use platform::{
    BackgroundTasks, ExtensionToken, LocationSensor, MotionSensor, PlatformServices,
    SensorEvents, TimerHandle, TimerScheduler,
};
pub use plugin::{LocationPlugin, PluginStatus, EMPTY_SENTINEL};
pub use reading::{AuthorizationStatus, Reading, SensorError, StepSample};
pub use steps::{StepReporting, StepTracking};
pub use timer::ThreadTimer;
