// Error types for boxbox

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum BoxboxError {
    // Errors from the upstream data provider
    #[snafu(display("No data available for {year} {event} {session}"))]
    DataUnavailable {
        year: i32,
        event: String,
        session: String,
    },
    #[snafu(display("Network error while fetching {endpoint}: {reason}"))]
    NetworkError { endpoint: String, reason: String },

    // Session cache errors
    #[snafu(display("Session cache entry {path} is unreadable: {reason}"))]
    CacheCorrupt { path: String, reason: String },
    #[snafu(display("Error accessing session cache"))]
    CacheIOError { source: io::Error },
    #[snafu(display("Invalid session file: {path}"))]
    InvalidSessionFile { path: String },

    // Errors while building or analyzing session data
    #[snafu(display("Invalid session data: {reason}"))]
    InvalidSessionData { reason: String },
    #[snafu(display("Driver {driver} not found in session"))]
    DriverNotFound { driver: String },
    #[snafu(display("Lap {lap_number} of {driver} has {count} telemetry samples, at least 2 are needed"))]
    InsufficientSamples {
        driver: String,
        lap_number: u32,
        count: usize,
    },
    #[snafu(display("Insufficient data: {reason}"))]
    InsufficientData { reason: String },

    // Config management errors
    #[snafu(display("Could not find application data directory"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // UI errors
    #[snafu(display("Could not start the dashboard: {reason}"))]
    DashboardError { reason: String },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}

impl BoxboxError {
    /// Loader-level failures block the whole dashboard, everything else only
    /// degrades the view that asked for it.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            BoxboxError::DataUnavailable { .. }
                | BoxboxError::NetworkError { .. }
                | BoxboxError::CacheCorrupt { .. }
                | BoxboxError::CacheIOError { .. }
                | BoxboxError::InvalidSessionFile { .. }
        )
    }

    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        BoxboxError::InsufficientData {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for BoxboxError {
    fn from(value: reqwest::Error) -> Self {
        BoxboxError::NetworkError {
            endpoint: value
                .url()
                .map(|u| u.path().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            reason: value.to_string(),
        }
    }
}
