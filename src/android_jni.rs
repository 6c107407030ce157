use crate::config::PluginConfig;
use crate::error::{throw_java_exception, PResult, PluginError};
use crate::host;
use crate::logging::init_logging;
use crate::platform::{
    BackgroundTasks, ExtensionToken, LocationSensor, MotionSensor, SensorEvents,
};
use crate::reading::{AuthorizationStatus, Reading, SensorError};
use chrono::{DateTime, TimeZone, Utc};
use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::sys::{jboolean, jdouble, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::{JNIEnv, JavaVM};
use log::warn;
use std::sync::Arc;

/// Kotlin-side `PlatformBridge` object, called back from any thread
#[derive(Clone)]
struct JavaPlatform {
    vm: Arc<JavaVM>,
    bridge: GlobalRef,
}

impl JavaPlatform {
    fn call_void(&self, name: &str, sig: &str, args: &[JValue]) -> PResult<()> {
        let mut env = self.vm.attach_current_thread()?;
        if let Err(e) = env.call_method(self.bridge.as_obj(), name, sig, args) {
            let _ = env.exception_clear();
            return Err(e.into());
        }
        Ok(())
    }

    fn call_int(&self, name: &str) -> PResult<i32> {
        let mut env = self.vm.attach_current_thread()?;
        match env.call_method(self.bridge.as_obj(), name, "()I", &[]).and_then(|v| v.i()) {
            Ok(value) => Ok(value),
            Err(e) => {
                let _ = env.exception_clear();
                Err(e.into())
            }
        }
    }

    fn call_long(&self, name: &str) -> PResult<i64> {
        let mut env = self.vm.attach_current_thread()?;
        match env.call_method(self.bridge.as_obj(), name, "()J", &[]).and_then(|v| v.j()) {
            Ok(value) => Ok(value),
            Err(e) => {
                let _ = env.exception_clear();
                Err(e.into())
            }
        }
    }

    fn call_bool(&self, name: &str) -> PResult<bool> {
        let mut env = self.vm.attach_current_thread()?;
        match env.call_method(self.bridge.as_obj(), name, "()Z", &[]).and_then(|v| v.z()) {
            Ok(value) => Ok(value),
            Err(e) => {
                let _ = env.exception_clear();
                Err(e.into())
            }
        }
    }

    fn fire(&self, name: &str) {
        if let Err(e) = self.call_void(name, "()V", &[]) {
            warn!("PlatformBridge.{} failed: {}", name, e);
        }
    }
}

impl LocationSensor for JavaPlatform {
    fn start_updates(&self) {
        self.fire("startLocationUpdates");
    }

    fn stop_updates(&self) {
        self.fire("stopLocationUpdates");
    }

    fn request_location(&self) {
        self.fire("requestLocation");
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        match self.call_int("authorizationStatus") {
            Ok(raw) => AuthorizationStatus::from_raw(raw).unwrap_or(AuthorizationStatus::NotDetermined),
            Err(e) => {
                warn!("PlatformBridge.authorizationStatus failed: {}", e);
                AuthorizationStatus::NotDetermined
            }
        }
    }
}

impl BackgroundTasks for JavaPlatform {
    fn begin_extension(&self) -> Option<ExtensionToken> {
        match self.call_long("beginBackgroundTask") {
            Ok(id) if id > 0 => Some(ExtensionToken(id as u64)),
            Ok(_) => None,
            Err(e) => {
                warn!("PlatformBridge.beginBackgroundTask failed: {}", e);
                None
            }
        }
    }

    fn end_extension(&self, token: ExtensionToken) {
        let args = [JValue::Long(token.0 as i64)];
        if let Err(e) = self.call_void("endBackgroundTask", "(J)V", &args) {
            warn!("PlatformBridge.endBackgroundTask failed: {}", e);
        }
    }
}

impl MotionSensor for JavaPlatform {
    fn start_updates(&self) {
        self.fire("startStepUpdates");
    }

    fn stop_updates(&self) {
        self.fire("stopStepUpdates");
    }

    fn query_steps(&self, since: DateTime<Utc>) {
        let args = [JValue::Long(since.timestamp_millis())];
        if let Err(e) = self.call_void("querySteps", "(J)V", &args) {
            warn!("PlatformBridge.querySteps failed: {}", e);
        }
    }
}

/// JNI: Install the plugin around a Kotlin `PlatformBridge`
/// Parameters: bridge object, config JSON (nullable)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_install(
    mut env: JNIEnv,
    _class: JClass,
    bridge: JObject,
    config_json: JString,
) -> jint {
    init_logging();
    match install_impl(&mut env, &bridge, &config_json) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn install_impl(env: &mut JNIEnv, bridge: &JObject, config_json: &JString) -> PResult<()> {
    if bridge.is_null() {
        return Err(PluginError::InvalidParameters(
            "PlatformBridge is null".to_string(),
        ));
    }

    let config = if config_json.is_null() {
        PluginConfig::default()
    } else {
        let json: String = env.get_string(config_json)?.into();
        PluginConfig::from_json(&json)?
    };

    let platform = JavaPlatform {
        vm: Arc::new(env.get_java_vm()?),
        bridge: env.new_global_ref(bridge)?,
    };
    let has_motion = platform.call_bool("hasStepCounter").unwrap_or(false);
    let motion: Option<Box<dyn MotionSensor>> = if has_motion {
        Some(Box::new(platform.clone()))
    } else {
        None
    };

    let plugin = host::build_plugin(
        config,
        Box::new(platform.clone()),
        Box::new(platform),
        motion,
    )?;
    host::install(plugin)
}

/// JNI: Begin sampling
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_startPlugin(
    _env: JNIEnv,
    _class: JClass,
) {
    host::start_plugin();
}

/// JNI: Halt sampling, safe to call repeatedly
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_stopPlugin(
    _env: JNIEnv,
    _class: JClass,
) {
    host::stop_plugin();
}

/// JNI: Set keepalive period in seconds
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_updateLocationInterval(
    _env: JNIEnv,
    _class: JClass,
    seconds: jint,
) {
    host::update_location_interval(i64::from(seconds));
}

#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_isPluginEnabled(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    if host::is_plugin_enabled() {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// JNI: Pop one reading
/// Returns: "<lat>,<lon>,<timestamp>[,<steps>]" or "false"
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_getLocation(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&mut env, host::get_location())
}

/// JNI: Pop one step sample
/// Returns: "<count>,<timestamp>" or "false"
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_getSteps(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&mut env, host::get_steps())
}

/// JNI: Plugin status as JSON string
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_getStatusJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&mut env, host::status_json())
}

/// JNI: Location fix from the fused provider
/// Parameters: latitude, longitude, fix time (milliseconds since epoch)
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_onLocation(
    _env: JNIEnv,
    _class: JClass,
    latitude: jdouble,
    longitude: jdouble,
    time_millis: jlong,
) {
    host::with_plugin("onLocation", |p| {
        let seconds = time_millis as f64 / 1000.0;
        p.on_reading(Reading::from_epoch_seconds(latitude, longitude, seconds)?);
        Ok(())
    });
}

#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_onLocationError(
    _env: JNIEnv,
    _class: JClass,
    code: jint,
) {
    host::with_plugin("onLocationError", |p| {
        p.on_error(SensorError::from_code(code));
        Ok(())
    });
}

/// JNI: Permission change, mapped by Kotlin onto the shared status codes
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_onAuthorizationChanged(
    _env: JNIEnv,
    _class: JClass,
    status: jint,
) {
    host::with_plugin("onAuthorizationChanged", |p| {
        let status = AuthorizationStatus::from_raw(status).ok_or_else(|| {
            PluginError::InvalidParameters(format!("unknown authorization status {}", status))
        })?;
        p.on_authorization_changed(status);
        Ok(())
    });
}

#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_onBackgroundTaskExpired(
    _env: JNIEnv,
    _class: JClass,
    task_id: jlong,
) {
    host::with_plugin("onBackgroundTaskExpired", |p| {
        p.on_extension_expired(ExtensionToken(task_id as u64))
    });
}

#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_onEnterBackground(
    _env: JNIEnv,
    _class: JClass,
) {
    host::with_plugin("onEnterBackground", |p| p.on_enter_background());
}

#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_onStepDelta(
    _env: JNIEnv,
    _class: JClass,
    steps: jlong,
) {
    host::with_plugin("onStepDelta", |p| p.on_step_delta(steps.max(0) as u64));
}

/// JNI: Step query answer
/// Parameters: step count, window start echoed from `querySteps` (milliseconds)
#[no_mangle]
pub extern "C" fn Java_com_locationbridge_unity_NativeBridge_onStepCount(
    _env: JNIEnv,
    _class: JClass,
    steps: jlong,
    since_millis: jlong,
) {
    host::with_plugin("onStepCount", |p| {
        let since = Utc.timestamp_millis_opt(since_millis).single().ok_or_else(|| {
            PluginError::InvalidParameters(format!("step window out of range: {}", since_millis))
        })?;
        p.on_step_count(since, steps.max(0) as u64)
    });
}

/// Helper: Rust string to Java string, null (with exception) on failure
fn to_jstring(env: &mut JNIEnv, value: String) -> jstring {
    match env.new_string(&value) {
        Ok(jstr) => jstr.into_raw(),
        Err(_) => {
            let _ = throw_java_exception(
                env,
                &PluginError::JniError("Failed to create Java string".to_string()),
            );
            std::ptr::null_mut()
        }
    }
}
