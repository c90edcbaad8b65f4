// Lap and pace analysis: fastest laps, sector bests, rolling and race pace

use std::cmp::Ordering;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::regression::{mean, median, std_dev};
use crate::errors::BoxboxError;
use crate::session::{Lap, Session};

pub const DEFAULT_ROLLING_WINDOW: usize = 3;
/// Laps slower than this multiple of the fastest lap are not "quick laps"
pub const DEFAULT_QUICK_LAP_THRESHOLD: f64 = 1.07;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastestLap {
    pub driver: String,
    pub lap_number: u32,
    pub lap_time_s: f64,
}

impl FastestLap {
    fn from_lap(lap: &Lap) -> Option<Self> {
        Some(Self {
            driver: lap.driver.clone(),
            lap_number: lap.lap_number,
            lap_time_s: lap.lap_time_s?,
        })
    }
}

fn by_lap_time(a: &&Lap, b: &&Lap) -> Ordering {
    a.lap_time_s
        .unwrap_or(f64::INFINITY)
        .total_cmp(&b.lap_time_s.unwrap_or(f64::INFINITY))
        .then(a.lap_number.cmp(&b.lap_number))
        .then(a.driver.cmp(&b.driver))
}

/// Fastest valid lap of the session. Ties go to the earlier lap, then to the
/// driver code.
pub fn fastest_lap(session: &Session) -> Option<FastestLap> {
    session
        .valid_laps()
        .min_by(by_lap_time)
        .and_then(FastestLap::from_lap)
}

/// Fastest valid lap of every driver, quickest first
pub fn fastest_laps_per_driver(session: &Session) -> Vec<FastestLap> {
    session
        .valid_laps()
        .into_group_map_by(|l| l.driver.as_str())
        .into_values()
        .filter_map(|laps| laps.into_iter().min_by(by_lap_time))
        .filter_map(FastestLap::from_lap)
        .sorted_by(|a, b| {
            a.lap_time_s
                .total_cmp(&b.lap_time_s)
                .then(a.driver.cmp(&b.driver))
        })
        .collect()
}

/// The `n` fastest valid laps across all drivers
pub fn top_fastest_laps(session: &Session, n: usize) -> Vec<FastestLap> {
    session
        .valid_laps()
        .sorted_by(by_lap_time)
        .take(n)
        .filter_map(FastestLap::from_lap)
        .collect()
}

/// Valid laps within `threshold` times the session's fastest lap
pub fn quick_laps(session: &Session, threshold: f64) -> Vec<&Lap> {
    let Some(fastest) = fastest_lap(session) else {
        return Vec::new();
    };
    let limit = fastest.lap_time_s * threshold;
    session
        .valid_laps()
        .filter(|l| l.lap_time_s.is_some_and(|t| t <= limit))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacePoint {
    pub lap_number: u32,
    /// Mean lap time of the window ending at this lap
    pub average_s: f64,
}

/// Moving average of a driver's valid lap times. The first point is emitted
/// once `window` valid laps have been seen.
pub fn rolling_pace(
    session: &Session,
    driver: &str,
    window: usize,
) -> Result<Vec<PacePoint>, BoxboxError> {
    if window == 0 {
        return Err(BoxboxError::InvalidUserInput {
            field: "window".to_string(),
            reason: "rolling window must be at least one lap".to_string(),
        });
    }
    let laps: Vec<(u32, f64)> = session
        .driver_laps(driver)?
        .into_iter()
        .filter(|l| l.is_valid())
        .filter_map(|l| Some((l.lap_number, l.lap_time_s?)))
        .collect();

    Ok(laps
        .windows(window)
        .map(|w| PacePoint {
            lap_number: w[w.len() - 1].0,
            average_s: w.iter().map(|(_, t)| t).sum::<f64>() / window as f64,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorBests {
    pub driver: String,
    pub sectors_s: [Option<f64>; 3],
    /// Sum of the three bests, when all are known
    pub theoretical_best_s: Option<f64>,
    /// Best actual lap, for comparison with the theoretical one
    pub best_lap_s: Option<f64>,
}

/// Per driver minimum of each sector, regardless of which lap produced it
pub fn sector_bests(session: &Session) -> Vec<SectorBests> {
    session
        .driver_codes()
        .into_iter()
        .filter_map(|driver| {
            let laps: Vec<&Lap> = session.laps_for(&driver).filter(|l| !l.deleted).collect();
            if laps.is_empty() {
                return None;
            }
            let mut sectors_s = [None; 3];
            for (i, best) in sectors_s.iter_mut().enumerate() {
                *best = laps
                    .iter()
                    .filter_map(|l| l.sector(i))
                    .min_by(f64::total_cmp);
            }
            let theoretical_best_s = match sectors_s {
                [Some(a), Some(b), Some(c)] => Some(a + b + c),
                _ => None,
            };
            let best_lap_s = laps
                .iter()
                .filter(|l| l.is_valid())
                .filter_map(|l| l.lap_time_s)
                .min_by(f64::total_cmp);
            Some(SectorBests {
                driver,
                sectors_s,
                theoretical_best_s,
                best_lap_s,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorAverages {
    pub driver: String,
    pub sectors_s: [Option<f64>; 3],
}

/// Mean sector times over each driver's quick laps
pub fn sector_averages(session: &Session, threshold: f64) -> Vec<SectorAverages> {
    let quick = quick_laps(session, threshold);
    session
        .driver_codes()
        .into_iter()
        .filter_map(|driver| {
            let laps: Vec<&&Lap> = quick.iter().filter(|l| l.driver == driver).collect();
            if laps.is_empty() {
                return None;
            }
            let mut sectors_s = [None; 3];
            for (i, avg) in sectors_s.iter_mut().enumerate() {
                let times: Vec<f64> = laps.iter().filter_map(|l| l.sector(i)).collect();
                *avg = mean(&times);
            }
            Some(SectorAverages { driver, sectors_s })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDelta {
    pub driver: String,
    /// Positive means slower than the reference driver
    pub deltas_s: [Option<f64>; 3],
}

/// Sector average deltas against a reference driver
pub fn sector_deltas(
    averages: &[SectorAverages],
    reference: &str,
) -> Result<Vec<SectorDelta>, BoxboxError> {
    let reference_row = averages
        .iter()
        .find(|a| a.driver == reference)
        .ok_or_else(|| BoxboxError::DriverNotFound {
            driver: reference.to_string(),
        })?;
    Ok(averages
        .iter()
        .map(|row| {
            let mut deltas_s = [None; 3];
            for (i, delta) in deltas_s.iter_mut().enumerate() {
                *delta = match (row.sectors_s[i], reference_row.sectors_s[i]) {
                    (Some(a), Some(b)) => Some(a - b),
                    _ => None,
                };
            }
            SectorDelta {
                driver: row.driver.clone(),
                deltas_s,
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRanks {
    pub driver: String,
    /// 1 is fastest. Equal times share the lower rank.
    pub ranks: [Option<usize>; 3],
}

pub fn sector_ranks(averages: &[SectorAverages]) -> Vec<SectorRanks> {
    averages
        .iter()
        .map(|row| {
            let mut ranks = [None; 3];
            for (i, rank) in ranks.iter_mut().enumerate() {
                *rank = row.sectors_s[i].map(|own| {
                    1 + averages
                        .iter()
                        .filter_map(|other| other.sectors_s[i])
                        .filter(|other| *other < own)
                        .count()
                });
            }
            SectorRanks {
                driver: row.driver.clone(),
                ranks,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacePace {
    pub driver: String,
    pub median_s: f64,
    pub mean_s: f64,
    pub std_dev_s: f64,
    pub lap_count: usize,
}

/// Median, mean and spread of valid lap times, for drivers with at least two
/// valid laps, ordered by median
pub fn race_pace(session: &Session) -> Vec<RacePace> {
    session
        .driver_codes()
        .into_iter()
        .filter_map(|driver| {
            let times: Vec<f64> = session
                .laps_for(&driver)
                .filter(|l| l.is_valid())
                .filter_map(|l| l.lap_time_s)
                .collect();
            Some(RacePace {
                median_s: median(&times)?,
                mean_s: mean(&times)?,
                std_dev_s: std_dev(&times)?,
                lap_count: times.len(),
                driver,
            })
        })
        .sorted_by(|a, b| a.median_s.total_cmp(&b.median_s))
        .collect()
}

/// Format seconds as `m:ss.mmm`
pub fn format_lap_time(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s.is_finite() && s >= 0. => {
            let millis = (s * 1000.).round() as u64;
            format!(
                "{}:{:02}.{:03}",
                millis / 60_000,
                (millis / 1000) % 60,
                millis % 1000
            )
        }
        _ => "--".to_string(),
    }
}
