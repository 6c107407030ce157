//! C ABI for the iOS Unity host (`DllImport("__Internal")`).
//!
//! The native side (Swift/ObjC) registers a [`NativePlatform`] table wrapping
//! CoreLocation, CoreMotion and `UIApplication` background tasks, then
//! forwards delegate callbacks through the `location_on_*` exports. Strings
//! returned to the host must be released with [`location_free_string`].

use crate::config::PluginConfig;
use crate::error::{PResult, PluginError};
use crate::host;
use crate::logging::init_logging;
use crate::platform::{
    BackgroundTasks, ExtensionToken, LocationSensor, MotionSensor, SensorEvents,
};
use crate::reading::{AuthorizationStatus, Reading, SensorError};
use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

/// Callback table supplied by the native adapter. `context` is passed back
/// untouched on every call.
///
/// `begin_background_task` returns 0 when the OS refuses
/// (`UIBackgroundTaskInvalid`). The motion entries are optional; a null
/// `start_motion_updates` means no motion capability.
#[repr(C)]
pub struct NativePlatform {
    pub context: *mut c_void,
    pub start_location_updates: extern "C" fn(*mut c_void),
    pub stop_location_updates: extern "C" fn(*mut c_void),
    pub request_location: extern "C" fn(*mut c_void),
    pub authorization_status: extern "C" fn(*mut c_void) -> i32,
    pub begin_background_task: extern "C" fn(*mut c_void) -> u64,
    pub end_background_task: extern "C" fn(*mut c_void, u64),
    pub start_motion_updates: Option<extern "C" fn(*mut c_void)>,
    pub stop_motion_updates: Option<extern "C" fn(*mut c_void)>,
    /// Argument is the window start in seconds since the Unix epoch
    pub query_steps: Option<extern "C" fn(*mut c_void, f64)>,
}

#[derive(Clone)]
struct NativeBridge {
    table: Arc<NativeTable>,
}

struct NativeTable(NativePlatform);

// SAFETY: the native adapter promises its callbacks may be invoked from any
// thread (it hops to the main queue itself) and that `context` outlives the
// installed plugin.
unsafe impl Send for NativeTable {}
unsafe impl Sync for NativeTable {}

impl NativeBridge {
    fn ctx(&self) -> *mut c_void {
        self.table.0.context
    }

    fn has_motion(&self) -> bool {
        self.table.0.start_motion_updates.is_some()
    }
}

impl LocationSensor for NativeBridge {
    fn start_updates(&self) {
        (self.table.0.start_location_updates)(self.ctx());
    }

    fn stop_updates(&self) {
        (self.table.0.stop_location_updates)(self.ctx());
    }

    fn request_location(&self) {
        (self.table.0.request_location)(self.ctx());
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        let raw = (self.table.0.authorization_status)(self.ctx());
        AuthorizationStatus::from_raw(raw).unwrap_or_else(|| {
            warn!("unknown authorization status {}, treating as not determined", raw);
            AuthorizationStatus::NotDetermined
        })
    }
}

impl BackgroundTasks for NativeBridge {
    fn begin_extension(&self) -> Option<ExtensionToken> {
        match (self.table.0.begin_background_task)(self.ctx()) {
            0 => None,
            id => Some(ExtensionToken(id)),
        }
    }

    fn end_extension(&self, token: ExtensionToken) {
        (self.table.0.end_background_task)(self.ctx(), token.0);
    }
}

impl MotionSensor for NativeBridge {
    fn start_updates(&self) {
        if let Some(start) = self.table.0.start_motion_updates {
            start(self.ctx());
        }
    }

    fn stop_updates(&self) {
        if let Some(stop) = self.table.0.stop_motion_updates {
            stop(self.ctx());
        }
    }

    fn query_steps(&self, since: DateTime<Utc>) {
        if let Some(query) = self.table.0.query_steps {
            let seconds = since.timestamp_millis() as f64 / 1000.0;
            query(self.ctx(), seconds);
        }
    }
}

/// Read an optional UTF-8 C string; null reads as empty
unsafe fn read_c_str<'a>(ptr: *const c_char) -> PResult<&'a str> {
    if ptr.is_null() {
        return Ok("");
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| PluginError::InvalidParameters(format!("string is not UTF-8: {}", e)))
}

fn into_c_string(value: String) -> *mut c_char {
    match CString::new(value) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

unsafe fn install_impl(platform: *const NativePlatform, config_json: *const c_char) -> PResult<()> {
    if platform.is_null() {
        return Err(PluginError::InvalidParameters(
            "native platform table is null".to_string(),
        ));
    }

    let config = PluginConfig::from_json(read_c_str(config_json)?)?;
    let table = std::ptr::read(platform);
    let bridge = NativeBridge {
        table: Arc::new(NativeTable(table)),
    };
    let motion: Option<Box<dyn MotionSensor>> = if bridge.has_motion() {
        Some(Box::new(bridge.clone()))
    } else {
        None
    };

    let plugin = host::build_plugin(
        config,
        Box::new(bridge.clone()),
        Box::new(bridge),
        motion,
    )?;
    host::install(plugin)
}

/// Build and install the plugin. Returns 0 on success, -1 on error.
///
/// # Safety
/// `platform` must point to a valid table (it is copied); `config_json` must
/// be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn location_plugin_install(
    platform: *const NativePlatform,
    config_json: *const c_char,
) -> i32 {
    init_logging();
    match install_impl(platform, config_json) {
        Ok(()) => 0,
        Err(e) => {
            warn!("location_plugin_install failed: {}", e);
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn location_plugin_uninstall() {
    if let Err(e) = host::uninstall() {
        warn!("location_plugin_uninstall failed: {}", e);
    }
}

#[no_mangle]
pub extern "C" fn location_start_plugin() {
    host::start_plugin();
}

#[no_mangle]
pub extern "C" fn location_stop_plugin() {
    host::stop_plugin();
}

#[no_mangle]
pub extern "C" fn location_update_interval(seconds: i64) {
    host::update_location_interval(seconds);
}

#[no_mangle]
pub extern "C" fn location_is_plugin_enabled() -> bool {
    host::is_plugin_enabled()
}

/// Pop one reading, `"false"` when empty. Free with `location_free_string`.
#[no_mangle]
pub extern "C" fn location_get_location() -> *mut c_char {
    into_c_string(host::get_location())
}

/// Pop one step sample, `"false"` when empty. Free with `location_free_string`.
#[no_mangle]
pub extern "C" fn location_get_steps() -> *mut c_char {
    into_c_string(host::get_steps())
}

/// Status snapshot as JSON. Free with `location_free_string`.
#[no_mangle]
pub extern "C" fn location_get_status_json() -> *mut c_char {
    into_c_string(host::status_json())
}

/// # Safety
/// `ptr` must come from one of this library's string-returning exports and
/// must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn location_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// `didUpdateLocations`: latest fix, timestamp in seconds since the epoch
#[no_mangle]
pub extern "C" fn location_on_update(latitude: f64, longitude: f64, timestamp: f64) {
    host::with_plugin("onLocationUpdate", |p| {
        p.on_reading(Reading::from_epoch_seconds(latitude, longitude, timestamp)?);
        Ok(())
    });
}

/// `didFailWithError`
#[no_mangle]
pub extern "C" fn location_on_error(code: i32) {
    host::with_plugin("onLocationError", |p| {
        p.on_error(SensorError::from_code(code));
        Ok(())
    });
}

/// `didChangeAuthorization`
#[no_mangle]
pub extern "C" fn location_on_authorization_changed(status: i32) {
    host::with_plugin("onAuthorizationChanged", |p| {
        let status = AuthorizationStatus::from_raw(status).ok_or_else(|| {
            PluginError::InvalidParameters(format!("unknown authorization status {}", status))
        })?;
        p.on_authorization_changed(status);
        Ok(())
    });
}

/// Background task expiration handler fired
#[no_mangle]
pub extern "C" fn location_on_extension_expired(task_id: u64) {
    host::with_plugin("onExtensionExpired", |p| {
        p.on_extension_expired(ExtensionToken(task_id))
    });
}

/// `UIApplication.didEnterBackgroundNotification`
#[no_mangle]
pub extern "C" fn location_on_enter_background() {
    host::with_plugin("onEnterBackground", |p| p.on_enter_background());
}

/// Pedometer delta since the previous update
#[no_mangle]
pub extern "C" fn location_on_step_delta(steps: u64) {
    host::with_plugin("onStepDelta", |p| p.on_step_delta(steps));
}

/// Pedometer range-query result. `since` echoes the window start passed to
/// `query_steps`, in seconds since the epoch.
#[no_mangle]
pub extern "C" fn location_on_step_count(steps: u64, since: f64) {
    host::with_plugin("onStepCount", |p| {
        // query_steps sends whole milliseconds; round back onto them
        let since = Utc
            .timestamp_millis_opt((since * 1000.0).round() as i64)
            .single()
            .ok_or_else(|| {
                PluginError::InvalidParameters(format!("step window out of range: {}", since))
            })?;
        p.on_step_count(since, steps)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    // Counters live in statics: the table holds plain fn pointers
    static STARTS: AtomicU64 = AtomicU64::new(0);
    static STOPS: AtomicU64 = AtomicU64::new(0);
    static NEXT_TASK: AtomicU64 = AtomicU64::new(0);
    static ENDED: Mutex<Vec<u64>> = Mutex::new(Vec::new());

    extern "C" fn start(_: *mut c_void) {
        STARTS.fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn stop(_: *mut c_void) {
        STOPS.fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn request(_: *mut c_void) {}

    extern "C" fn always(_: *mut c_void) -> i32 {
        3
    }

    extern "C" fn begin_task(_: *mut c_void) -> u64 {
        NEXT_TASK.fetch_add(1, Ordering::SeqCst) + 1
    }

    extern "C" fn end_task(_: *mut c_void, id: u64) {
        ENDED.lock().unwrap().push(id);
    }

    fn table() -> NativePlatform {
        NativePlatform {
            context: std::ptr::null_mut(),
            start_location_updates: start,
            stop_location_updates: stop,
            request_location: request,
            authorization_status: always,
            begin_background_task: begin_task,
            end_background_task: end_task,
            start_motion_updates: None,
            stop_motion_updates: None,
            query_steps: None,
        }
    }

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let value = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { location_free_string(ptr) };
        value
    }

    // Single test: the installed plugin is process-wide
    #[test]
    fn test_c_abi_round_trip() {
        // Nothing installed yet: host calls degrade
        location_start_plugin();
        assert!(!location_is_plugin_enabled());
        assert_eq!(take_string(location_get_location()), "false");

        let bad = CString::new(r#"{"interval_seconds": 0}"#).unwrap();
        assert_eq!(unsafe { location_plugin_install(&table(), bad.as_ptr()) }, -1);
        let oversized = CString::new(r#"{"buffer_capacity": 18446744073709551615}"#).unwrap();
        assert_eq!(
            unsafe { location_plugin_install(&table(), oversized.as_ptr()) },
            -1
        );
        assert_eq!(
            unsafe { location_plugin_install(std::ptr::null(), std::ptr::null()) },
            -1
        );

        let config = CString::new(r#"{"interval_seconds": 60}"#).unwrap();
        assert_eq!(unsafe { location_plugin_install(&table(), config.as_ptr()) }, 0);

        location_start_plugin();
        assert!(location_is_plugin_enabled());
        assert_eq!(STARTS.load(Ordering::SeqCst), 1);

        // 2020-04-02 10:15:30 UTC
        location_on_update(1.0, 2.0, 1_585_822_530.0);
        location_on_update(3.0, 4.0, 1_585_822_531.0);
        assert_eq!(STOPS.load(Ordering::SeqCst), 1);

        let status = take_string(location_get_status_json());
        assert!(status.contains("\"interval_seconds\":60"));
        assert!(status.contains("\"extension_held\":true"));

        assert_eq!(
            take_string(location_get_location()),
            "1,2,2020-04-02 10:15:30 +0000"
        );
        assert_eq!(take_string(location_get_location()), "false");
        assert_eq!(take_string(location_get_steps()), "false");

        location_on_extension_expired(1);
        assert_eq!(*ENDED.lock().unwrap(), vec![1]);

        location_update_interval(-5);
        assert!(take_string(location_get_status_json()).contains("\"interval_seconds\":60"));

        location_stop_plugin();
        location_stop_plugin();
        assert!(!location_is_plugin_enabled());

        location_plugin_uninstall();
        assert_eq!(take_string(location_get_status_json()), "{}");
    }
}
