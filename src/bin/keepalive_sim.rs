use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::info;
use serde::Deserialize;
use unity_location_bridge::host::build_plugin;
use unity_location_bridge::logging::init_logging;
use unity_location_bridge::{
    AuthorizationStatus, BackgroundTasks, ExtensionToken, LocationSensor, MotionSensor,
    PluginConfig, Reading, SensorEvents, StepTracking, EMPTY_SENTINEL,
};

/// Drive the keepalive loop with a recorded or synthetic track and poll it
/// the way the Unity host does.
#[derive(Parser, Debug)]
#[command(name = "keepalive_sim")]
struct Args {
    /// JSON array of {"latitude", "longitude", "timestamp"} (epoch seconds)
    #[arg(long)]
    track: Option<PathBuf>,

    /// Number of synthetic fixes when no track is given
    #[arg(long, default_value = "10")]
    points: usize,

    /// Keepalive interval in seconds
    #[arg(long, default_value = "1")]
    interval: u32,

    /// Delay between sensor start and the fix it delivers
    #[arg(long, default_value = "200")]
    fix_delay_ms: u64,

    /// Host polling period
    #[arg(long, default_value = "250")]
    poll_ms: u64,

    /// Simulate a pedometer pushing step deltas
    #[arg(long, default_value_t = false)]
    steps: bool,

    /// Run as if only "when in use" location access was granted
    #[arg(long, default_value_t = false)]
    when_in_use: bool,

    /// Optional plugin config JSON, overridden by the flags above
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Deserialize)]
struct TrackPoint {
    latitude: f64,
    longitude: f64,
    timestamp: f64,
}

#[derive(Default)]
struct SimState {
    sensor_started: Option<Instant>,
    next_task: u64,
    held_tasks: Vec<u64>,
    pedometer_on: bool,
}

/// Platform stand-in that just records what the plugin asked for
#[derive(Clone)]
struct SimPlatform {
    state: Arc<Mutex<SimState>>,
    authorization: AuthorizationStatus,
}

impl SimPlatform {
    fn sensor_started(&self) -> Option<Instant> {
        self.state.lock().ok().and_then(|s| s.sensor_started)
    }

    fn pedometer_on(&self) -> bool {
        self.state.lock().map(|s| s.pedometer_on).unwrap_or(false)
    }

    fn held_tasks(&self) -> usize {
        self.state.lock().map(|s| s.held_tasks.len()).unwrap_or(0)
    }
}

impl LocationSensor for SimPlatform {
    fn start_updates(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.sensor_started.get_or_insert_with(Instant::now);
        }
    }

    fn stop_updates(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.sensor_started = None;
        }
    }

    fn request_location(&self) {
        LocationSensor::start_updates(self);
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.authorization
    }
}

impl BackgroundTasks for SimPlatform {
    fn begin_extension(&self) -> Option<ExtensionToken> {
        let mut s = self.state.lock().ok()?;
        s.next_task += 1;
        let id = s.next_task;
        s.held_tasks.push(id);
        Some(ExtensionToken(id))
    }

    fn end_extension(&self, token: ExtensionToken) {
        if let Ok(mut s) = self.state.lock() {
            s.held_tasks.retain(|id| *id != token.0);
        }
    }
}

impl MotionSensor for SimPlatform {
    fn start_updates(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.pedometer_on = true;
        }
    }

    fn stop_updates(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.pedometer_on = false;
        }
    }

    fn query_steps(&self, _since: DateTime<Utc>) {}
}

fn load_track(args: &Args) -> Result<VecDeque<Reading>> {
    match &args.track {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading track {}", path.display()))?;
            let points: Vec<TrackPoint> = serde_json::from_str(&text)
                .with_context(|| format!("parsing track {}", path.display()))?;
            points
                .into_iter()
                .map(|p| {
                    Reading::from_epoch_seconds(p.latitude, p.longitude, p.timestamp)
                        .map_err(anyhow::Error::from)
                })
                .collect()
        }
        None => Ok((0..args.points)
            .map(|n| {
                // Walk north-east from a fixed origin, ~11 m per fix
                let step = n as f64 * 0.0001;
                Reading::new(48.8584 + step, 2.2945 + step, Utc::now())
            })
            .collect()),
    }
}

fn load_config(args: &Args) -> Result<PluginConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            PluginConfig::from_json(&text)?
        }
        None => PluginConfig::default(),
    };

    config.interval_seconds = args.interval;
    if args.steps {
        config.step_tracking = StepTracking::Continuous;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = load_config(&args)?;
    let mut track = load_track(&args)?;
    if track.is_empty() {
        bail!("track has no fixes");
    }

    let platform = SimPlatform {
        state: Arc::new(Mutex::new(SimState::default())),
        authorization: if args.when_in_use {
            AuthorizationStatus::AuthorizedWhenInUse
        } else {
            AuthorizationStatus::AuthorizedAlways
        },
    };
    let motion: Option<Box<dyn MotionSensor>> = if args.steps {
        Some(Box::new(platform.clone()))
    } else {
        None
    };

    let plugin = build_plugin(
        config,
        Box::new(platform.clone()),
        Box::new(platform.clone()),
        motion,
    )?;

    info!(
        "replaying {} fixes, interval {}s, fix delay {}ms",
        track.len(),
        args.interval,
        args.fix_delay_ms
    );
    plugin.start_plugin()?;

    let fix_delay = Duration::from_millis(args.fix_delay_ms);
    let poll = Duration::from_millis(args.poll_ms);
    let started = Instant::now();
    let mut drained = 0usize;

    loop {
        if let Some(since) = platform.sensor_started() {
            if since.elapsed() >= fix_delay {
                if let Some(mut reading) = track.pop_front() {
                    if args.track.is_none() {
                        reading.timestamp = Utc::now();
                    }
                    plugin.on_reading(reading);
                }
            }
        }

        if platform.pedometer_on() {
            plugin.on_step_delta(3)?;
        }

        loop {
            let line = plugin.get_location()?;
            if line == EMPTY_SENTINEL {
                break;
            }
            drained += 1;
            println!("[{:>6.1}s] {}", started.elapsed().as_secs_f64(), line);
        }

        let status = plugin.status()?;
        if track.is_empty() && status.buffered_locations == 0 {
            break;
        }
        thread::sleep(poll);
    }

    plugin.stop_plugin()?;
    println!(
        "drained {} readings in {:.1}s, {} background task(s) still held",
        drained,
        started.elapsed().as_secs_f64(),
        platform.held_tasks()
    );
    Ok(())
}
