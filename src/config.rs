use crate::buffer::{DEFAULT_BUFFER_CAPACITY, MAX_BUFFER_CAPACITY};
use crate::error::{PResult, PluginError};
use crate::steps::{StepReporting, StepTracking};
use serde::{Deserialize, Serialize};

/// Keepalive period used until the host changes it
pub const DEFAULT_INTERVAL_SECS: u32 = 30;

/// What an interval change does to a timer that is already armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUpdate {
    /// Only future arms use the new interval
    #[default]
    NextArm,
    /// Cancel the pending timer and re-arm it with the new interval
    RetargetPending,
}

/// What to do when the OS expires a background extension on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Release the token and let the internal timer restart sampling
    #[default]
    WaitForTimer,
    /// Release the token, cancel the timer and resume sampling now
    RestartImmediately,
}

/// Plugin configuration, passed by the host as JSON at install time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub buffer_capacity: usize,
    pub interval_seconds: u32,
    pub interval_update: IntervalUpdate,
    pub extension_expiry: ExpiryPolicy,
    pub step_tracking: StepTracking,
    pub step_reporting: StepReporting,
    /// Re-issue location updates when the app moves to the background
    pub restart_on_background: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            interval_seconds: DEFAULT_INTERVAL_SECS,
            interval_update: IntervalUpdate::default(),
            extension_expiry: ExpiryPolicy::default(),
            step_tracking: StepTracking::default(),
            step_reporting: StepReporting::default(),
            restart_on_background: true,
        }
    }
}

impl PluginConfig {
    /// Parse and validate. Blank input yields the defaults.
    pub fn from_json(json: &str) -> PResult<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: PluginConfig = serde_json::from_str(json)
            .map_err(|e| PluginError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PResult<()> {
        if self.buffer_capacity == 0 {
            return Err(PluginError::InvalidConfig(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(PluginError::InvalidConfig(format!(
                "buffer_capacity must be at most {}, got {}",
                MAX_BUFFER_CAPACITY, self.buffer_capacity
            )));
        }
        if self.interval_seconds == 0 {
            return Err(PluginError::InvalidConfig(
                "interval_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tracks_steps(&self) -> bool {
        self.step_tracking != StepTracking::Disabled
    }
}
