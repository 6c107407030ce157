//! Recording fake of every platform capability, for unit tests

use crate::platform::{
    BackgroundTasks, ExtensionToken, LocationSensor, MotionSensor, PlatformServices, TimerHandle,
    TimerScheduler,
};
use crate::reading::AuthorizationStatus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    next_extension: u64,
    next_timer: u64,
    refuse_extensions: bool,
    refuse_timers: bool,
    authorization: Option<AuthorizationStatus>,
    armed: HashMap<TimerHandle, Duration>,
    live_timers: Vec<TimerHandle>,
    held_extensions: Vec<ExtensionToken>,
    step_queries: Vec<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self::default()
    }

    pub fn services(&self) -> PlatformServices {
        PlatformServices {
            location: Box::new(self.clone()),
            background: Box::new(self.clone()),
            timers: Box::new(self.clone()),
            motion: None,
        }
    }

    pub fn services_with_motion(&self) -> PlatformServices {
        PlatformServices {
            motion: Some(Box::new(self.clone())),
            ..self.services()
        }
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn refuse_extensions(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_extensions = refuse;
    }

    pub fn refuse_timers(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_timers = refuse;
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.state.lock().unwrap().authorization = Some(status);
    }

    /// Duration a timer was armed with, if it ever was
    pub fn armed_for(&self, handle: TimerHandle) -> Option<Duration> {
        self.state.lock().unwrap().armed.get(&handle).copied()
    }

    /// Timers armed and neither cancelled nor fired
    pub fn live_timers(&self) -> Vec<TimerHandle> {
        self.state.lock().unwrap().live_timers.clone()
    }

    /// Simulate the OS firing the most recent live timer
    pub fn fire_latest(&self) -> Option<TimerHandle> {
        self.state.lock().unwrap().live_timers.pop()
    }

    pub fn held_extensions(&self) -> Vec<ExtensionToken> {
        self.state.lock().unwrap().held_extensions.clone()
    }

    pub fn step_queries(&self) -> Vec<DateTime<Utc>> {
        self.state.lock().unwrap().step_queries.clone()
    }
}

impl LocationSensor for FakePlatform {
    fn start_updates(&self) {
        self.log("start_updates".to_string());
    }

    fn stop_updates(&self) {
        self.log("stop_updates".to_string());
    }

    fn request_location(&self) {
        self.log("request_location".to_string());
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.state
            .lock()
            .unwrap()
            .authorization
            .unwrap_or(AuthorizationStatus::AuthorizedAlways)
    }
}

impl BackgroundTasks for FakePlatform {
    fn begin_extension(&self) -> Option<ExtensionToken> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_extensions {
            state.calls.push("begin_extension:refused".to_string());
            return None;
        }
        state.next_extension += 1;
        let token = ExtensionToken(state.next_extension);
        state.held_extensions.push(token);
        state.calls.push(format!("begin_extension:{}", token.0));
        Some(token)
    }

    fn end_extension(&self, token: ExtensionToken) {
        let mut state = self.state.lock().unwrap();
        state.held_extensions.retain(|t| *t != token);
        state.calls.push(format!("end_extension:{}", token.0));
    }
}

impl TimerScheduler for FakePlatform {
    fn arm(&self, after: Duration) -> Option<TimerHandle> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_timers {
            state.calls.push("arm:refused".to_string());
            return None;
        }
        state.next_timer += 1;
        let handle = TimerHandle(state.next_timer);
        state.armed.insert(handle, after);
        state.live_timers.push(handle);
        state.calls.push(format!("arm:{}:{}s", handle.0, after.as_secs()));
        Some(handle)
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut state = self.state.lock().unwrap();
        state.live_timers.retain(|h| *h != handle);
        state.calls.push(format!("cancel:{}", handle.0));
    }
}

impl MotionSensor for FakePlatform {
    fn start_updates(&self) {
        self.log("motion_start".to_string());
    }

    fn stop_updates(&self) {
        self.log("motion_stop".to_string());
    }

    fn query_steps(&self, since: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.step_queries.push(since);
        state.calls.push("query_steps".to_string());
    }
}
