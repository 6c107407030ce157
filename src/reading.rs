use crate::error::{PResult, PluginError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Timestamp layout handed to the host, e.g. `2020-04-02 10:15:30 +0000`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Convert seconds since the Unix epoch into a UTC instant
pub fn timestamp_from_epoch_seconds(seconds: f64) -> PResult<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(PluginError::InvalidParameters(format!(
            "timestamp is not finite: {}",
            seconds
        )));
    }

    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos)
        .single()
        .ok_or_else(|| {
            PluginError::InvalidParameters(format!("timestamp out of range: {}", seconds))
        })
}

/// One sampled location, optionally carrying the steps taken since the previous one
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub step_count: Option<u64>,
}

impl Reading {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            step_count: None,
        }
    }

    /// Build a reading from platform values (timestamp in epoch seconds)
    pub fn from_epoch_seconds(latitude: f64, longitude: f64, seconds: f64) -> PResult<Self> {
        Ok(Self::new(
            latitude,
            longitude,
            timestamp_from_epoch_seconds(seconds)?,
        ))
    }

    pub fn with_step_count(mut self, steps: u64) -> Self {
        self.step_count = Some(steps);
        self
    }
}

/// Host wire format: `<lat>,<lon>,<timestamp>[,<stepCount>]`
impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.latitude,
            self.longitude,
            self.timestamp.format(TIMESTAMP_FORMAT)
        )?;
        if let Some(steps) = self.step_count {
            write!(f, ",{}", steps)?;
        }
        Ok(())
    }
}

/// Step count buffered apart from locations
#[derive(Debug, Clone, PartialEq)]
pub struct StepSample {
    pub count: u64,
    pub timestamp: DateTime<Utc>,
}

impl StepSample {
    pub fn new(count: u64, timestamp: DateTime<Utc>) -> Self {
        Self { count, timestamp }
    }
}

/// Host wire format: `<count>,<timestamp>`
impl fmt::Display for StepSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.count, self.timestamp.format(TIMESTAMP_FORMAT))
    }
}

/// Location sensor failure reported by the platform
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("location currently unknown")]
    LocationUnknown,

    #[error("location access denied")]
    Denied,

    #[error("network unavailable")]
    Network,

    #[error("sensor error code {0}")]
    Other(i32),
}

impl SensorError {
    /// Map a raw platform error code (CLError numbering)
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => SensorError::LocationUnknown,
            1 => SensorError::Denied,
            2 => SensorError::Network,
            other => SensorError::Other(other),
        }
    }
}

/// Location permission as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
}

impl AuthorizationStatus {
    /// Map a raw platform status (CLAuthorizationStatus numbering)
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(AuthorizationStatus::NotDetermined),
            1 => Some(AuthorizationStatus::Restricted),
            2 => Some(AuthorizationStatus::Denied),
            3 => Some(AuthorizationStatus::AuthorizedAlways),
            4 => Some(AuthorizationStatus::AuthorizedWhenInUse),
            _ => None,
        }
    }

    pub fn is_granted(self) -> bool {
        matches!(
            self,
            AuthorizationStatus::AuthorizedAlways | AuthorizationStatus::AuthorizedWhenInUse
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 4, 2, h, m, s).unwrap()
    }

    #[test]
    fn test_reading_host_format() {
        let reading = Reading::new(1.0, 2.0, at(10, 15, 30));
        assert_eq!(reading.to_string(), "1,2,2020-04-02 10:15:30 +0000");
    }

    #[test]
    fn test_reading_host_format_with_steps() {
        let reading = Reading::new(51.5074, -0.1278, at(8, 0, 0)).with_step_count(42);
        assert_eq!(
            reading.to_string(),
            "51.5074,-0.1278,2020-04-02 08:00:00 +0000,42"
        );
    }

    #[test]
    fn test_step_sample_format() {
        let sample = StepSample::new(17, at(9, 30, 0));
        assert_eq!(sample.to_string(), "17,2020-04-02 09:30:00 +0000");
    }

    #[test]
    fn test_epoch_seconds_conversion() {
        let reading = Reading::from_epoch_seconds(1.0, 2.0, 1_585_822_530.5).unwrap();
        assert_eq!(reading.timestamp.timestamp(), 1_585_822_530);
        assert_eq!(reading.timestamp.timestamp_subsec_millis(), 500);

        assert!(Reading::from_epoch_seconds(1.0, 2.0, f64::NAN).is_err());
        assert!(Reading::from_epoch_seconds(1.0, 2.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_raw_platform_codes() {
        assert_eq!(
            AuthorizationStatus::from_raw(3),
            Some(AuthorizationStatus::AuthorizedAlways)
        );
        assert_eq!(AuthorizationStatus::from_raw(9), None);
        assert!(AuthorizationStatus::AuthorizedWhenInUse.is_granted());
        assert!(!AuthorizationStatus::Denied.is_granted());

        assert_eq!(SensorError::from_code(1), SensorError::Denied);
        assert_eq!(SensorError::from_code(17), SensorError::Other(17));
    }
}
