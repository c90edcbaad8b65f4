// Head to head comparison of two drivers

use serde::{Deserialize, Serialize};

use super::pace::{DEFAULT_QUICK_LAP_THRESHOLD, SectorDelta, sector_averages, sector_deltas};
use super::telemetry::{AlignedLaps, align_laps, fastest_lap_telemetry};
use crate::errors::BoxboxError;
use crate::session::Session;

/// Speed difference in km/h below which neither driver counts as faster
pub const DEFAULT_SEGMENT_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapDelta {
    pub lap_number: u32,
    pub time_a_s: f64,
    pub time_b_s: f64,
    /// Positive when A was slower on this lap
    pub delta_s: f64,
    /// Sum of deltas up to and including this lap
    pub gap_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapComparison {
    pub driver_a: String,
    pub driver_b: String,
    pub laps: Vec<LapDelta>,
}

/// Lap by lap delta of two drivers over the laps both of them completed with
/// a time
pub fn compare_laps(
    session: &Session,
    driver_a: &str,
    driver_b: &str,
) -> Result<LapComparison, BoxboxError> {
    let laps_a = session.driver_laps(driver_a)?;
    let laps_b = session.driver_laps(driver_b)?;

    let mut gap_s = 0.;
    let laps: Vec<LapDelta> = laps_a
        .iter()
        .filter_map(|a| {
            let b = laps_b.iter().find(|b| b.lap_number == a.lap_number)?;
            Some((a.lap_number, a.lap_time_s?, b.lap_time_s?))
        })
        .map(|(lap_number, time_a_s, time_b_s)| {
            let delta_s = time_a_s - time_b_s;
            gap_s += delta_s;
            LapDelta {
                lap_number,
                time_a_s,
                time_b_s,
                delta_s,
                gap_s,
            }
        })
        .collect();

    if laps.is_empty() {
        return Err(BoxboxError::insufficient(format!(
            "{} and {} have no timed lap in common",
            driver_a, driver_b
        )));
    }
    Ok(LapComparison {
        driver_a: driver_a.to_string(),
        driver_b: driver_b.to_string(),
        laps,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryComparison {
    pub driver_a: String,
    pub driver_b: String,
    /// Lap A is `aligned.laps[0]`, lap B is `aligned.laps[1]`
    pub aligned: AlignedLaps,
    /// Speed of A minus speed of B, km/h
    pub speed_delta: Vec<f64>,
    /// Elapsed time of A minus elapsed time of B. Positive means A is behind.
    pub time_delta: Vec<f64>,
}

/// Fastest laps of two drivers aligned on the distance both of them cover
pub fn compare_telemetry(
    session: &Session,
    driver_a: &str,
    driver_b: &str,
    points: usize,
) -> Result<TelemetryComparison, BoxboxError> {
    let trace_a = fastest_lap_telemetry(session, driver_a)?;
    let trace_b = fastest_lap_telemetry(session, driver_b)?;
    let aligned = align_laps(&[trace_a, trace_b], points)?;

    let (a, b) = (&aligned.laps[0], &aligned.laps[1]);
    let speed_delta = a
        .speed_kph
        .iter()
        .zip(&b.speed_kph)
        .map(|(sa, sb)| sa - sb)
        .collect();
    let time_delta = a
        .time_s
        .iter()
        .zip(&b.time_s)
        .map(|(ta, tb)| ta - tb)
        .collect();

    Ok(TelemetryComparison {
        driver_a: driver_a.to_string(),
        driver_b: driver_b.to_string(),
        aligned,
        speed_delta,
        time_delta,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Leader {
    DriverA,
    DriverB,
    Even,
}

/// A contiguous stretch of track where the same driver was faster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDelta {
    /// Index range into the aligned axis, inclusive
    pub start_index: usize,
    pub end_index: usize,
    pub start_m: f64,
    pub end_m: f64,
    pub leader: Leader,
    pub mean_delta: f64,
}

fn classify(delta: f64, threshold: f64) -> Leader {
    if delta > threshold {
        Leader::DriverA
    } else if delta < -threshold {
        Leader::DriverB
    } else {
        Leader::Even
    }
}

/// Group a speed delta (A minus B) into runs with the same leader
pub fn split_segments(distance_m: &[f64], delta: &[f64], threshold: f64) -> Vec<SegmentDelta> {
    let n = distance_m.len().min(delta.len());
    let mut segments: Vec<SegmentDelta> = Vec::new();
    let mut start = 0;
    for i in 1..=n {
        let boundary = i == n || classify(delta[i], threshold) != classify(delta[start], threshold);
        if !boundary {
            continue;
        }
        let run = &delta[start..i];
        segments.push(SegmentDelta {
            start_index: start,
            end_index: i - 1,
            start_m: distance_m[start],
            end_m: distance_m[i - 1],
            leader: classify(delta[start], threshold),
            mean_delta: run.iter().sum::<f64>() / run.len() as f64,
        });
        start = i;
    }
    segments
}

/// Sector average deltas of every driver against `reference`, best first
pub fn compare_sectors(
    session: &Session,
    reference: &str,
) -> Result<Vec<SectorDelta>, BoxboxError> {
    let mut deltas = sector_deltas(
        &sector_averages(session, DEFAULT_QUICK_LAP_THRESHOLD),
        reference,
    )?;
    deltas.sort_by(|a, b| {
        let total = |d: &SectorDelta| d.deltas_s.iter().flatten().sum::<f64>();
        total(a).total_cmp(&total(b))
    });
    Ok(deltas)
}
