use crate::buffer::EventBuffer;
use crate::config::{ExpiryPolicy, IntervalUpdate, PluginConfig};
use crate::error::{PResult, PluginError};
use crate::keepalive::{KeepaliveState, Phase};
use crate::platform::{ExtensionToken, PlatformServices, SensorEvents, TimerHandle};
use crate::reading::{AuthorizationStatus, Reading, SensorError, StepSample};
use crate::steps::{StepCounter, StepReporting, StepTracking};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Returned to the host when there is nothing to drain
pub const EMPTY_SENTINEL: &str = "false";

/// Everything mutated by callbacks and host calls, guarded by one lock
struct PluginState {
    keepalive: KeepaliveState,
    locations: EventBuffer<Reading>,
    steps: EventBuffer<StepSample>,
    step_counter: StepCounter,
    config: PluginConfig,
}

/// Snapshot handed to the host as JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginStatus {
    pub enabled: bool,
    pub phase: Phase,
    pub buffered_locations: usize,
    pub buffered_steps: usize,
    pub buffer_capacity: usize,
    pub interval_seconds: u32,
    pub restart_pending: bool,
    pub extension_held: bool,
    pub step_count: Option<u64>,
}

/// Location plugin: reading buffer plus the keepalive restart loop
pub struct LocationPlugin {
    state: Mutex<PluginState>,
    platform: PlatformServices,
}

impl LocationPlugin {
    /// Create a stopped plugin. Step tracking without a motion capability is
    /// turned off.
    pub fn new(mut config: PluginConfig, platform: PlatformServices) -> Self {
        if config.tracks_steps() && platform.motion.is_none() {
            warn!(
                "step tracking {:?} requested without a motion sensor, disabling",
                config.step_tracking
            );
            config.step_tracking = StepTracking::Disabled;
        }

        let state = PluginState {
            keepalive: KeepaliveState::new(config.interval_seconds),
            locations: EventBuffer::new(config.buffer_capacity),
            steps: EventBuffer::new(config.buffer_capacity),
            step_counter: StepCounter::new(),
            config,
        };

        LocationPlugin {
            state: Mutex::new(state),
            platform,
        }
    }

    fn state(&self) -> PResult<MutexGuard<'_, PluginState>> {
        self.state
            .lock()
            .map_err(|_| PluginError::Internal("Failed to acquire plugin state lock".to_string()))
    }

    /// Begin sampling (any state → Sampling)
    pub fn start_plugin(&self) -> PResult<()> {
        let mut state = self.state()?;
        let previous = state.keepalive.phase();

        state.keepalive.cancel_timer(self.platform.timers.as_ref());
        state.keepalive.enabled = true;

        if previous == Phase::Idle && state.config.tracks_steps() {
            state.step_counter.restart(Utc::now());
        }
        if previous == Phase::Sampling {
            self.platform.location.start_updates();
        } else {
            self.resume_sampling(&mut state);
        }

        info!("plugin started (was {:?})", previous);
        Ok(())
    }

    /// Halt everything (any state → Idle). Safe to call repeatedly.
    pub fn stop_plugin(&self) -> PResult<()> {
        let mut state = self.state()?;
        let previous = state.keepalive.phase();

        self.platform.location.stop_updates();
        state.keepalive.cancel_timer(self.platform.timers.as_ref());
        state
            .keepalive
            .release_extension(self.platform.background.as_ref());
        if previous == Phase::Sampling {
            self.pause_motion(&state);
        }
        state.keepalive.enabled = false;

        info!("plugin stopped (was {:?})", previous);
        Ok(())
    }

    /// Set the keepalive period. Applies to the next arm unless configured
    /// with `IntervalUpdate::RetargetPending`.
    pub fn update_location_interval(&self, seconds: i64) -> PResult<()> {
        let seconds = u32::try_from(seconds)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                PluginError::InvalidParameters(format!(
                    "location interval must be a positive number of seconds, got {}",
                    seconds
                ))
            })?;

        let mut state = self.state()?;
        state.keepalive.interval_seconds = seconds;
        state.config.interval_seconds = seconds;

        if state.config.interval_update == IntervalUpdate::RetargetPending
            && state.keepalive.restart_pending()
        {
            state.keepalive.cancel_timer(self.platform.timers.as_ref());
            self.arm_or_resume(&mut state);
        }

        info!("location interval set to {}s", seconds);
        Ok(())
    }

    pub fn is_plugin_enabled(&self) -> PResult<bool> {
        Ok(self.state()?.keepalive.enabled)
    }

    /// Pop the oldest buffered reading
    pub fn consume_reading(&self) -> PResult<Option<Reading>> {
        Ok(self.state()?.locations.consume_one())
    }

    /// Pop one reading in host format, or `"false"` when empty
    pub fn get_location(&self) -> PResult<String> {
        Ok(self
            .consume_reading()?
            .map(|reading| reading.to_string())
            .unwrap_or_else(|| EMPTY_SENTINEL.to_string()))
    }

    /// Pop one separately buffered step sample, or `"false"` when empty
    pub fn get_steps(&self) -> PResult<String> {
        Ok(self
            .state()?
            .steps
            .consume_one()
            .map(|sample| sample.to_string())
            .unwrap_or_else(|| EMPTY_SENTINEL.to_string()))
    }

    pub fn status(&self) -> PResult<PluginStatus> {
        let state = self.state()?;
        Ok(PluginStatus {
            enabled: state.keepalive.enabled,
            phase: state.keepalive.phase(),
            buffered_locations: state.locations.len(),
            buffered_steps: state.steps.len(),
            buffer_capacity: state.locations.capacity(),
            interval_seconds: state.keepalive.interval_seconds,
            restart_pending: state.keepalive.restart_pending(),
            extension_held: state.keepalive.extension.is_some(),
            step_count: state
                .config
                .tracks_steps()
                .then(|| state.step_counter.current()),
        })
    }

    /// Sampling → Draining. A reading that arrives while the plugin is
    /// stopped only halts the sensor: nothing is buffered and no timer armed.
    pub fn handle_reading(&self, reading: Reading) -> PResult<()> {
        let mut state = self.state()?;

        if state.keepalive.restart_pending() {
            debug!("reading at {} ignored, restart pending", reading.timestamp);
            return Ok(());
        }
        if !state.keepalive.enabled {
            debug!("reading at {} while stopped, halting sensor", reading.timestamp);
            self.platform.location.stop_updates();
            return Ok(());
        }

        state
            .keepalive
            .rotate_extension(self.platform.background.as_ref());
        self.platform.location.stop_updates();
        self.pause_motion(&state);

        let reading = if state.config.tracks_steps() {
            let steps = state.step_counter.take(reading.timestamp);
            let reporting = state.config.step_reporting;
            match reporting {
                StepReporting::Inline => reading.with_step_count(steps),
                StepReporting::Separate => {
                    state.steps.record(StepSample::new(steps, reading.timestamp));
                    reading
                }
            }
        } else {
            reading
        };

        debug!("recording reading {}", reading);
        if let Some(dropped) = state.locations.record(reading) {
            debug!("buffer full, dropped reading from {}", dropped.timestamp);
        }

        self.release_unless_always_authorized(&mut state);
        self.arm_or_resume(&mut state);
        Ok(())
    }

    /// Same restart cycle as a reading, nothing buffered
    pub fn handle_error(&self, error: SensorError) -> PResult<()> {
        let mut state = self.state()?;
        warn!("location update failed: {}", error);

        if state.keepalive.restart_pending() {
            return Ok(());
        }
        if !state.keepalive.enabled {
            self.platform.location.stop_updates();
            return Ok(());
        }

        state
            .keepalive
            .rotate_extension(self.platform.background.as_ref());
        self.platform.location.stop_updates();
        self.pause_motion(&state);
        self.release_unless_always_authorized(&mut state);
        self.arm_or_resume(&mut state);
        Ok(())
    }

    pub fn handle_authorization_changed(&self, status: AuthorizationStatus) -> PResult<()> {
        let state = self.state()?;
        info!("location authorization changed to {:?}", status);

        if status.is_granted() && state.keepalive.phase() == Phase::Sampling {
            self.platform.location.request_location();
        }
        Ok(())
    }

    /// Draining → Sampling
    pub fn on_timer_fired(&self, handle: TimerHandle) -> PResult<()> {
        let mut state = self.state()?;

        if !state.keepalive.take_fired(handle) {
            debug!("stale restart timer {:?} ignored", handle);
            return Ok(());
        }

        debug!("restart timer {:?} fired, resuming updates", handle);
        self.resume_sampling(&mut state);
        Ok(())
    }

    /// The OS ended a background extension on its own
    pub fn on_extension_expired(&self, token: ExtensionToken) -> PResult<()> {
        let mut state = self.state()?;

        if state.keepalive.extension != Some(token) {
            debug!("expiry for released extension {:?} ignored", token);
            return Ok(());
        }

        warn!("background extension {:?} expired", token);
        state
            .keepalive
            .release_extension(self.platform.background.as_ref());

        if state.config.extension_expiry == ExpiryPolicy::RestartImmediately
            && state.keepalive.phase() == Phase::Draining
        {
            state.keepalive.cancel_timer(self.platform.timers.as_ref());
            self.resume_sampling(&mut state);
        }
        Ok(())
    }

    /// App moved to the background
    pub fn on_enter_background(&self) -> PResult<()> {
        let state = self.state()?;

        if state.config.restart_on_background && state.keepalive.phase() == Phase::Sampling {
            debug!("entered background, re-issuing location updates");
            self.platform.location.start_updates();
        }
        Ok(())
    }

    /// Continuous pedometer update
    pub fn on_step_delta(&self, steps: u64) -> PResult<()> {
        let mut state = self.state()?;
        if state.config.tracks_steps() {
            state.step_counter.add_delta(steps);
        }
        Ok(())
    }

    /// Range query answer for the window starting at `since`
    pub fn on_step_count(&self, since: DateTime<Utc>, steps: u64) -> PResult<()> {
        let mut state = self.state()?;
        if state.config.step_tracking == StepTracking::RangeQuery
            && !state.step_counter.answer_query(since, steps)
        {
            debug!("step count for window from {} dropped, window closed", since);
        }
        Ok(())
    }

    fn release_unless_always_authorized(&self, state: &mut PluginState) {
        let status = self.platform.location.authorization_status();
        if status != AuthorizationStatus::AuthorizedAlways {
            debug!("authorization is {:?}, releasing extension early", status);
            state
                .keepalive
                .release_extension(self.platform.background.as_ref());
        }
    }

    /// Arm the restart timer; if none can be scheduled, go straight back to
    /// sampling so the loop never stalls in Draining
    fn arm_or_resume(&self, state: &mut PluginState) {
        if state.keepalive.arm(self.platform.timers.as_ref()).is_none() {
            warn!("no restart timer available, resuming updates now");
            self.resume_sampling(state);
        }
    }

    fn resume_sampling(&self, state: &mut PluginState) {
        self.platform.location.start_updates();

        let Some(motion) = self.platform.motion.as_deref() else {
            return;
        };
        match state.config.step_tracking {
            StepTracking::Continuous => motion.start_updates(),
            StepTracking::RangeQuery => {
                motion.query_steps(state.step_counter.begin_query(Utc::now()))
            }
            StepTracking::Disabled => {}
        }
    }

    /// Continuous pedometer updates run only while sampling
    fn pause_motion(&self, state: &PluginState) {
        if state.config.step_tracking != StepTracking::Continuous {
            return;
        }
        if let Some(motion) = self.platform.motion.as_deref() {
            motion.stop_updates();
        }
    }
}

impl SensorEvents for LocationPlugin {
    fn on_reading(&self, reading: Reading) {
        if let Err(e) = self.handle_reading(reading) {
            warn!("failed to handle reading: {}", e);
        }
    }

    fn on_error(&self, error: SensorError) {
        if let Err(e) = self.handle_error(error) {
            warn!("failed to handle sensor error: {}", e);
        }
    }

    fn on_authorization_changed(&self, status: AuthorizationStatus) {
        if let Err(e) = self.handle_authorization_changed(status) {
            warn!("failed to handle authorization change: {}", e);
        }
    }
}
