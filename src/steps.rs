use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How step counts are sourced from the motion capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTracking {
    #[default]
    Disabled,
    /// Platform pushes step deltas as they happen
    Continuous,
    /// Platform answers range queries with a point-in-time count
    RangeQuery,
}

/// Where a recorded step count goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepReporting {
    /// Attached to the location reading
    #[default]
    Inline,
    /// Kept in its own buffer, drained through `get_steps`
    Separate,
}

/// Steps accumulated since the last recorded reading.
///
/// In range-query mode a window is `since..queried_at`; an answer counts only
/// if it carries the `since` of the window still open.
#[derive(Debug, Clone, Default)]
pub struct StepCounter {
    count: u64,
    since: Option<DateTime<Utc>>,
    queried_at: Option<DateTime<Utc>>,
    answered_until: Option<DateTime<Utc>>,
}

impl StepCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart counting from `now`
    pub fn restart(&mut self, now: DateTime<Utc>) {
        self.count = 0;
        self.since = Some(now);
        self.queried_at = None;
        self.answered_until = None;
    }

    pub fn add_delta(&mut self, steps: u64) {
        self.count = self.count.saturating_add(steps);
    }

    /// Note a range query issued at `now`; returns the window start to ask for
    pub fn begin_query(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let since = *self.since.get_or_insert(now);
        self.queried_at = Some(now);
        since
    }

    /// Replace the count with a range-query answer. Answers for a window
    /// already handed out, or with no query outstanding, are dropped.
    pub fn answer_query(&mut self, since: DateTime<Utc>, steps: u64) -> bool {
        let same_window = self
            .since
            .map_or(false, |s| s.timestamp_millis() == since.timestamp_millis());
        match self.queried_at.take() {
            Some(queried_at) if same_window => {
                self.count = steps;
                self.answered_until = Some(queried_at);
                true
            }
            outstanding => {
                self.queried_at = outstanding;
                false
            }
        }
    }

    pub fn current(&self) -> u64 {
        self.count
    }

    /// Start of the window being counted
    #[cfg(test)]
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// Hand out the current count and open the next window. An answered
    /// query closes the window at the query time, otherwise it closes at `now`.
    pub fn take(&mut self, now: DateTime<Utc>) -> u64 {
        let count = self.count;
        let next = self.answered_until.unwrap_or(now);
        self.restart(next);
        count
    }
}
