// Session data model
// Typed entities produced at the provider boundary and shared read-only by
// every analysis module

pub mod types;

use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::BoxboxError;

pub use types::{Compound, SessionKey, SessionKind};

/// Driver entry list information for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DriverInfo {
    /// Car number
    pub number: u32,
    /// Three letter code, e.g. "VER"
    pub abbreviation: String,
    pub full_name: String,
    pub team_name: String,
    /// Team colour as a hex string without the leading '#'
    pub team_colour: Option<String>,
}

impl DriverInfo {
    /// Team colour as RGB, grey when the provider did not publish one
    pub fn rgb(&self) -> (u8, u8, u8) {
        self.team_colour
            .as_deref()
            .and_then(parse_hex_colour)
            .unwrap_or((128, 128, 128))
    }
}

fn parse_hex_colour(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// One timed lap of one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Lap {
    pub driver: String,
    pub lap_number: u32,
    pub lap_time_s: Option<f64>,
    pub sector_times_s: [Option<f64>; 3],
    pub compound: Compound,
    /// Stint number as reported by the provider, 0 when unknown
    pub stint: u32,
    /// Tyre age in laps at the start of this lap
    pub tyre_age: Option<u32>,
    /// Driver entered the pit lane at the end of this lap
    pub pit_in: bool,
    /// Driver started this lap from the pit lane
    pub pit_out: bool,
    /// Lap time deleted by race control
    pub deleted: bool,
    /// Time spent in the pit lane, set on the in-lap
    pub pit_duration_s: Option<f64>,
}

impl Lap {
    /// A lap counts for pace analysis when it was timed and neither started
    /// nor ended in the pit lane
    pub fn is_valid(&self) -> bool {
        self.lap_time_s.is_some() && !self.pit_in && !self.pit_out && !self.deleted
    }

    pub fn sector(&self, sector: usize) -> Option<f64> {
        self.sector_times_s.get(sector).copied().flatten()
    }
}

/// A single telemetry sample within a lap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TelemetrySample {
    /// Meters traveled from the start of the lap
    pub distance_m: f64,
    /// Seconds since the start of the lap
    pub time_s: f64,
    pub speed_kph: f64,
    /// Throttle use. 0=off throttle to 100=full throttle
    pub throttle: f64,
    /// Brake use. 0=released to 100=pressed
    pub brake: f64,
    pub gear: u8,
    pub rpm: f64,
    pub drs_open: bool,
    /// Track position, when position data was loaded
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Telemetry stream of one lap of one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LapTelemetry {
    pub driver: String,
    pub lap_number: u32,
    pub samples: Vec<TelemetrySample>,
}

impl LapTelemetry {
    pub fn max_distance(&self) -> f64 {
        self.samples.last().map(|s| s.distance_m).unwrap_or(0.)
    }
}

/// Track side weather reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct WeatherSample {
    /// Seconds since the start of the session
    pub time_s: f64,
    pub air_temp_c: f64,
    pub track_temp_c: f64,
    pub humidity_pct: f64,
    pub rainfall: bool,
    pub wind_speed_mps: f64,
}

/// An event in the season calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub round: u32,
    pub name: String,
    pub country: String,
    pub location: String,
    /// Provider identifier for the event
    pub meeting_key: u64,
}

/// Which optional channels to load along with laps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub telemetry: bool,
    pub weather: bool,
    /// Track X/Y positions merged into telemetry samples
    pub positions: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            telemetry: true,
            weather: true,
            positions: true,
        }
    }
}

impl LoadOptions {
    pub fn laps_only() -> Self {
        Self {
            telemetry: false,
            weather: false,
            positions: false,
        }
    }

    /// Whether data loaded with `self` contains everything `other` asks for
    pub fn covers(&self, other: &LoadOptions) -> bool {
        (self.telemetry || !other.telemetry)
            && (self.weather || !other.weather)
            && (self.positions || !other.positions || !other.telemetry)
    }
}

/// A fully loaded session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    /// Channels that were requested when the session was loaded
    pub loaded: LoadOptions,
    pub drivers: Vec<DriverInfo>,
    pub laps: Vec<Lap>,
    pub telemetry: Vec<LapTelemetry>,
    pub weather: Vec<WeatherSample>,
}

impl Session {
    /// Build a session, checking that laps are uniquely numbered per driver.
    /// Laps are ordered by driver and lap number, telemetry samples by distance.
    pub fn new(
        key: SessionKey,
        loaded: LoadOptions,
        drivers: Vec<DriverInfo>,
        mut laps: Vec<Lap>,
        mut telemetry: Vec<LapTelemetry>,
        mut weather: Vec<WeatherSample>,
    ) -> Result<Self, BoxboxError> {
        let mut seen = HashSet::new();
        for lap in &laps {
            if !seen.insert((lap.driver.as_str(), lap.lap_number)) {
                return Err(BoxboxError::InvalidSessionData {
                    reason: format!("duplicate lap {} for {}", lap.lap_number, lap.driver),
                });
            }
        }

        laps.sort_by(|a, b| {
            a.driver
                .cmp(&b.driver)
                .then(a.lap_number.cmp(&b.lap_number))
        });
        for trace in telemetry.iter_mut() {
            trace
                .samples
                .sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        }
        telemetry.sort_by(|a, b| {
            a.driver
                .cmp(&b.driver)
                .then(a.lap_number.cmp(&b.lap_number))
        });
        weather.sort_by(|a, b| a.time_s.total_cmp(&b.time_s));

        Ok(Self {
            key,
            loaded,
            drivers,
            laps,
            telemetry,
            weather,
        })
    }

    /// Driver abbreviations, in entry list order, falling back to the drivers
    /// found in lap data when the entry list is empty
    pub fn driver_codes(&self) -> Vec<String> {
        if !self.drivers.is_empty() {
            return self
                .drivers
                .iter()
                .map(|d| d.abbreviation.clone())
                .collect();
        }
        self.laps
            .iter()
            .map(|l| l.driver.clone())
            .unique()
            .collect()
    }

    pub fn driver(&self, code: &str) -> Option<&DriverInfo> {
        self.drivers.iter().find(|d| d.abbreviation == code)
    }

    pub fn has_driver(&self, code: &str) -> bool {
        self.driver(code).is_some() || self.laps.iter().any(|l| l.driver == code)
    }

    /// Laps of one driver in lap order
    pub fn laps_for<'a, 'd>(&'a self, driver: &'d str) -> impl Iterator<Item = &'a Lap> + use<'a, 'd> {
        self.laps.iter().filter(move |l| l.driver == driver)
    }

    /// Same as `laps_for` but fails when the driver is not part of the session
    pub fn driver_laps(&self, driver: &str) -> Result<Vec<&Lap>, BoxboxError> {
        if !self.has_driver(driver) {
            return Err(BoxboxError::DriverNotFound {
                driver: driver.to_string(),
            });
        }
        Ok(self.laps_for(driver).collect())
    }

    pub fn lap(&self, driver: &str, lap_number: u32) -> Option<&Lap> {
        self.laps
            .iter()
            .find(|l| l.driver == driver && l.lap_number == lap_number)
    }

    pub fn lap_telemetry(&self, driver: &str, lap_number: u32) -> Option<&LapTelemetry> {
        self.telemetry
            .iter()
            .find(|t| t.driver == driver && t.lap_number == lap_number)
    }

    pub fn valid_laps(&self) -> impl Iterator<Item = &Lap> {
        self.laps.iter().filter(|l| l.is_valid())
    }

    pub fn total_laps(&self) -> u32 {
        self.laps.iter().map(|l| l.lap_number).max().unwrap_or(0)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_duplicate_laps_rejected() {
        let result = Session::new(
            SessionKey::new(2024, "Test", SessionKind::Race),
            LoadOptions::default(),
            Vec::new(),
            vec![
                lap("VER", 1, 90., Compound::Soft),
                lap("VER", 1, 91., Compound::Soft),
            ],
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(
            result,
            Err(BoxboxError::InvalidSessionData { .. })
        ));
    }

    #[test]
    fn test_laps_sorted_by_driver_and_number() {
        let session = session(
            vec![
                lap("VER", 2, 90., Compound::Soft),
                lap("LEC", 1, 91., Compound::Soft),
                lap("VER", 1, 92., Compound::Soft),
            ],
            Vec::new(),
        );
        let order: Vec<_> = session
            .laps
            .iter()
            .map(|l| (l.driver.as_str(), l.lap_number))
            .collect();
        assert_eq!(order, vec![("LEC", 1), ("VER", 1), ("VER", 2)]);
    }

    #[test]
    fn test_valid_lap_flags() {
        let mut l = lap("VER", 1, 90., Compound::Soft);
        assert!(l.is_valid());
        l.pit_in = true;
        assert!(!l.is_valid());
        l.pit_in = false;
        l.lap_time_s = None;
        assert!(!l.is_valid());
    }

    #[test]
    fn test_unknown_driver_fails() {
        let session = session(vec![lap("VER", 1, 90., Compound::Soft)], Vec::new());
        assert!(matches!(
            session.driver_laps("HAM"),
            Err(BoxboxError::DriverNotFound { .. })
        ));
        assert_eq!(session.driver_laps("VER").unwrap().len(), 1);
    }

    #[test]
    fn test_team_colour_parsing() {
        assert_eq!(driver("VER", 1).rgb(), (0x36, 0x71, 0xC6));
        let mut d = driver("VER", 1);
        d.team_colour = Some("xyz".to_string());
        assert_eq!(d.rgb(), (128, 128, 128));
    }

    #[test]
    fn test_load_options_coverage() {
        assert!(LoadOptions::default().covers(&LoadOptions::laps_only()));
        assert!(!LoadOptions::laps_only().covers(&LoadOptions::default()));
    }
}
