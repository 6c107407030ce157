//! Composition root shared by the C ABI and JNI bindings.
//!
//! Owns the single process-wide plugin slot. Host calls never fail: errors
//! are logged and turned into the host contract's defaults.

use crate::config::PluginConfig;
use crate::error::{PResult, PluginError};
use crate::plugin::{LocationPlugin, EMPTY_SENTINEL};
use crate::platform::{BackgroundTasks, LocationSensor, MotionSensor, PlatformServices};
use crate::timer::ThreadTimer;
use log::{info, warn};
use std::sync::{Arc, Mutex, Weak};

// Installed plugin - stored as static to persist across host calls
lazy_static::lazy_static! {
    static ref GLOBAL_PLUGIN: Mutex<Option<Arc<LocationPlugin>>> = Mutex::new(None);
}

/// Wire a plugin to platform capabilities and a thread-backed restart timer
pub fn build_plugin(
    config: PluginConfig,
    location: Box<dyn LocationSensor>,
    background: Box<dyn BackgroundTasks>,
    motion: Option<Box<dyn MotionSensor>>,
) -> PResult<Arc<LocationPlugin>> {
    config.validate()?;

    Ok(Arc::new_cyclic(|weak: &Weak<LocationPlugin>| {
        let weak = weak.clone();
        let timers = ThreadTimer::new(move |handle| {
            if let Some(plugin) = weak.upgrade() {
                if let Err(e) = plugin.on_timer_fired(handle) {
                    warn!("restart timer {:?} failed: {}", handle, e);
                }
            }
        });

        LocationPlugin::new(
            config,
            PlatformServices {
                location,
                background,
                timers: Box::new(timers),
                motion,
            },
        )
    }))
}

/// Make `plugin` the one the host talks to. A previously installed plugin is
/// stopped first.
pub fn install(plugin: Arc<LocationPlugin>) -> PResult<()> {
    let mut slot = GLOBAL_PLUGIN.lock().map_err(|_| {
        PluginError::Internal("Failed to acquire global plugin lock".to_string())
    })?;

    if let Some(previous) = slot.replace(plugin) {
        if let Err(e) = previous.stop_plugin() {
            warn!("failed to stop replaced plugin: {}", e);
        }
    }

    info!("location plugin installed");
    Ok(())
}

/// Stop and drop the installed plugin
pub fn uninstall() -> PResult<()> {
    let mut slot = GLOBAL_PLUGIN.lock().map_err(|_| {
        PluginError::Internal("Failed to acquire global plugin lock".to_string())
    })?;

    if let Some(previous) = slot.take() {
        previous.stop_plugin()?;
    }
    Ok(())
}

/// Get the installed plugin
pub fn plugin() -> PResult<Arc<LocationPlugin>> {
    let slot = GLOBAL_PLUGIN.lock().map_err(|_| {
        PluginError::Internal("Failed to acquire global plugin lock".to_string())
    })?;
    slot.as_ref().map(Arc::clone).ok_or(PluginError::NotInstalled)
}

/// Run `f` against the installed plugin, logging any failure
pub fn with_plugin<T, F>(operation: &str, f: F) -> Option<T>
where
    F: FnOnce(&LocationPlugin) -> PResult<T>,
{
    match plugin().and_then(|p| f(p.as_ref())) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed: {}", operation, e);
            None
        }
    }
}

pub fn start_plugin() {
    with_plugin("startPlugin", |p| p.start_plugin());
}

pub fn stop_plugin() {
    with_plugin("stopPlugin", |p| p.stop_plugin());
}

pub fn update_location_interval(seconds: i64) {
    with_plugin("updateLocationInterval", |p| p.update_location_interval(seconds));
}

pub fn is_plugin_enabled() -> bool {
    with_plugin("isPluginEnabled", |p| p.is_plugin_enabled()).unwrap_or(false)
}

pub fn get_location() -> String {
    with_plugin("getLocation", |p| p.get_location())
        .unwrap_or_else(|| EMPTY_SENTINEL.to_string())
}

pub fn get_steps() -> String {
    with_plugin("getSteps", |p| p.get_steps()).unwrap_or_else(|| EMPTY_SENTINEL.to_string())
}

/// Status snapshot as JSON, `"{}"` if unavailable
pub fn status_json() -> String {
    with_plugin("getStatus", |p| {
        let status = p.status()?;
        serde_json::to_string(&status)
            .map_err(|e| PluginError::Internal(format!("JSON serialization failed: {}", e)))
    })
    .unwrap_or_else(|| "{}".to_string())
}
