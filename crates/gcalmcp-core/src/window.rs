//! Query windows for listing calendar events.
//!
//! An [`EventWindow`] bounds an events listing by start time and result count.
//! Unlike a closed range, the upper bound is optional: "the next ten events
//! from now" has a start and a limit but no end.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when building an [`EventWindow`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// `time_max` is not after `time_min`.
    #[error("window end must be after its start")]
    EndBeforeStart,

    /// `max_results` is outside the range the provider accepts.
    #[error("max_results must be between 1 and {max}, got {got}")]
    MaxResultsOutOfRange { got: usize, max: usize },
}

/// A range of event start times plus a result limit.
///
/// Built through the constructors, which enforce the bounds. A deserialized
/// window is not checked; call [`validate`](Self::validate) before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    time_min: DateTime<Utc>,
    time_max: Option<DateTime<Utc>>,
    max_results: usize,
}

impl EventWindow {
    /// Default number of events returned by a listing.
    pub const DEFAULT_MAX_RESULTS: usize = 10;

    /// Largest page size Google Calendar accepts.
    pub const MAX_RESULTS_LIMIT: usize = 2500;

    /// Creates an open-ended window starting at `time_min`.
    pub fn starting_at(time_min: DateTime<Utc>) -> Self {
        Self {
            time_min,
            time_max: None,
            max_results: Self::DEFAULT_MAX_RESULTS,
        }
    }

    /// Creates an open-ended window starting now.
    pub fn upcoming() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a closed window from a start time and duration.
    pub fn from_duration(time_min: DateTime<Utc>, duration: Duration) -> Result<Self, WindowError> {
        Self::starting_at(time_min).with_time_max(time_min + duration)
    }

    /// Sets the upper bound.
    pub fn with_time_max(mut self, time_max: DateTime<Utc>) -> Result<Self, WindowError> {
        if time_max <= self.time_min {
            return Err(WindowError::EndBeforeStart);
        }
        self.time_max = Some(time_max);
        Ok(self)
    }

    /// Sets the result limit.
    pub fn with_max_results(mut self, max_results: usize) -> Result<Self, WindowError> {
        check_max_results(max_results)?;
        self.max_results = max_results;
        Ok(self)
    }

    /// Lower bound for event end time (inclusive), as the provider defines `timeMin`.
    pub fn time_min(&self) -> DateTime<Utc> {
        self.time_min
    }

    /// Upper bound for event start time (exclusive), if any.
    pub fn time_max(&self) -> Option<DateTime<Utc>> {
        self.time_max
    }

    /// Maximum number of events to return.
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Re-checks the bounds the builders enforce.
    pub fn validate(&self) -> Result<(), WindowError> {
        check_max_results(self.max_results)?;
        if self.time_max.is_some_and(|max| max <= self.time_min) {
            return Err(WindowError::EndBeforeStart);
        }
        Ok(())
    }

    /// Returns true if an event starting at `start` falls inside the window.
    pub fn contains(&self, start: DateTime<Utc>) -> bool {
        start >= self.time_min && self.time_max.is_none_or(|max| start < max)
    }
}

fn check_max_results(max_results: usize) -> Result<(), WindowError> {
    if max_results == 0 || max_results > EventWindow::MAX_RESULTS_LIMIT {
        return Err(WindowError::MaxResultsOutOfRange {
            got: max_results,
            max: EventWindow::MAX_RESULTS_LIMIT,
        });
    }
    Ok(())
}
