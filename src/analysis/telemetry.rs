// Distance alignment of lap telemetry

use serde::{Deserialize, Serialize};

use super::pace::FastestLap;
use crate::errors::BoxboxError;
use crate::session::{LapTelemetry, Session, TelemetrySample};

pub const DEFAULT_ALIGNMENT_POINTS: usize = 2000;

/// Telemetry channels that can be read off an aligned lap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Speed,
    Throttle,
    Brake,
    Gear,
    Rpm,
    Drs,
    Time,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Speed => "Speed (km/h)",
            Channel::Throttle => "Throttle (%)",
            Channel::Brake => "Brake (%)",
            Channel::Gear => "Gear",
            Channel::Rpm => "RPM",
            Channel::Drs => "DRS",
            Channel::Time => "Time (s)",
        }
    }
}

/// One lap resampled onto the shared distance axis of an `AlignedLaps`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedLap {
    pub driver: String,
    pub lap_number: u32,
    pub time_s: Vec<f64>,
    pub speed_kph: Vec<f64>,
    pub throttle: Vec<f64>,
    pub brake: Vec<f64>,
    pub gear: Vec<u8>,
    pub rpm: Vec<f64>,
    pub drs_open: Vec<bool>,
    pub x: Vec<Option<f64>>,
    pub y: Vec<Option<f64>>,
}

impl AlignedLap {
    pub fn channel(&self, channel: Channel) -> Vec<f64> {
        match channel {
            Channel::Speed => self.speed_kph.clone(),
            Channel::Throttle => self.throttle.clone(),
            Channel::Brake => self.brake.clone(),
            Channel::Gear => self.gear.iter().map(|g| *g as f64).collect(),
            Channel::Rpm => self.rpm.clone(),
            Channel::Drs => self
                .drs_open
                .iter()
                .map(|open| if *open { 1. } else { 0. })
                .collect(),
            Channel::Time => self.time_s.clone(),
        }
    }

    /// Track outline as (x, y) pairs, skipping points without position data
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.x
            .iter()
            .zip(&self.y)
            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedLaps {
    /// Shared axis in meters, evenly spaced from 0
    pub distance_m: Vec<f64>,
    pub laps: Vec<AlignedLap>,
}

impl AlignedLaps {
    /// `(distance, value)` pairs of one lap, ready for plotting
    pub fn series(&self, lap: usize, channel: Channel) -> Vec<[f64; 2]> {
        self.laps
            .get(lap)
            .map(|l| {
                self.distance_m
                    .iter()
                    .zip(l.channel(channel))
                    .map(|(d, v)| [*d, v])
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resample laps onto a common distance axis.
///
/// The axis runs from 0 to the shortest lap's final distance with `points`
/// evenly spaced samples. Continuous channels are interpolated linearly; gear
/// and DRS keep the value of the last sample at or before each point.
///
/// # Errors
///
/// `InsufficientSamples` when a lap has fewer than 2 samples,
/// `InsufficientData` when there is nothing to align.
pub fn align_laps(traces: &[&LapTelemetry], points: usize) -> Result<AlignedLaps, BoxboxError> {
    if points < 2 {
        return Err(BoxboxError::InvalidUserInput {
            field: "points".to_string(),
            reason: "alignment needs at least 2 points".to_string(),
        });
    }
    if traces.is_empty() {
        return Err(BoxboxError::insufficient("no laps to align"));
    }
    for trace in traces {
        if trace.samples.len() < 2 {
            return Err(BoxboxError::InsufficientSamples {
                driver: trace.driver.clone(),
                lap_number: trace.lap_number,
                count: trace.samples.len(),
            });
        }
    }

    let max_distance = traces
        .iter()
        .map(|t| t.max_distance())
        .fold(f64::INFINITY, f64::min);
    if max_distance.is_nan() || max_distance <= 0. {
        return Err(BoxboxError::insufficient(
            "telemetry does not cover any distance",
        ));
    }

    let step = max_distance / (points - 1) as f64;
    let distance_m: Vec<f64> = (0..points).map(|i| i as f64 * step).collect();
    let laps = traces
        .iter()
        .map(|trace| resample(trace, &distance_m))
        .collect();

    Ok(AlignedLaps { distance_m, laps })
}

fn resample(trace: &LapTelemetry, axis: &[f64]) -> AlignedLap {
    let samples = &trace.samples;
    let mut lap = AlignedLap {
        driver: trace.driver.clone(),
        lap_number: trace.lap_number,
        time_s: Vec::with_capacity(axis.len()),
        speed_kph: Vec::with_capacity(axis.len()),
        throttle: Vec::with_capacity(axis.len()),
        brake: Vec::with_capacity(axis.len()),
        gear: Vec::with_capacity(axis.len()),
        rpm: Vec::with_capacity(axis.len()),
        drs_open: Vec::with_capacity(axis.len()),
        x: Vec::with_capacity(axis.len()),
        y: Vec::with_capacity(axis.len()),
    };

    // axis and samples are both ascending, so one cursor walk covers the lap
    let mut cursor = 0;
    for &d in axis {
        while cursor + 2 < samples.len() && samples[cursor + 1].distance_m <= d {
            cursor += 1;
        }
        let (a, b) = (&samples[cursor], &samples[cursor + 1]);
        let span = b.distance_m - a.distance_m;
        let t = if span > 0. {
            ((d - a.distance_m) / span).clamp(0., 1.)
        } else {
            0.
        };
        // last sample at or before d, the first one when d precedes the trace
        let held = if b.distance_m <= d { b } else { a };

        lap.time_s.push(lerp(a.time_s, b.time_s, t));
        lap.speed_kph.push(lerp(a.speed_kph, b.speed_kph, t));
        lap.throttle.push(lerp(a.throttle, b.throttle, t));
        lap.brake.push(lerp(a.brake, b.brake, t));
        lap.rpm.push(lerp(a.rpm, b.rpm, t));
        lap.gear.push(held.gear);
        lap.drs_open.push(held.drs_open);
        lap.x.push(lerp_position(a, b, t, |s| s.x));
        lap.y.push(lerp_position(a, b, t, |s| s.y));
    }
    lap
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_position(
    a: &TelemetrySample,
    b: &TelemetrySample,
    t: f64,
    field: impl Fn(&TelemetrySample) -> Option<f64>,
) -> Option<f64> {
    match (field(a), field(b)) {
        (Some(pa), Some(pb)) => Some(lerp(pa, pb, t)),
        (pa, pb) => pa.or(pb),
    }
}

/// Telemetry of a driver's fastest valid lap
pub fn fastest_lap_telemetry<'a>(
    session: &'a Session,
    driver: &str,
) -> Result<&'a LapTelemetry, BoxboxError> {
    let fastest = session
        .driver_laps(driver)?
        .into_iter()
        .filter(|l| l.is_valid())
        .filter_map(|l| {
            Some(FastestLap {
                driver: l.driver.clone(),
                lap_number: l.lap_number,
                lap_time_s: l.lap_time_s?,
            })
        })
        .min_by(|a, b| {
            a.lap_time_s
                .total_cmp(&b.lap_time_s)
                .then(a.lap_number.cmp(&b.lap_number))
        })
        .ok_or_else(|| {
            BoxboxError::insufficient(format!("{} has no valid timed lap", driver))
        })?;

    session
        .lap_telemetry(driver, fastest.lap_number)
        .ok_or_else(|| BoxboxError::InsufficientSamples {
            driver: driver.to_string(),
            lap_number: fastest.lap_number,
            count: 0,
        })
}

/// Speed over distance of one lap, raw samples
pub fn speed_trace(trace: &LapTelemetry) -> Vec<[f64; 2]> {
    trace
        .samples
        .iter()
        .map(|s| [s.distance_m, s.speed_kph])
        .collect()
}

/// Brake application over distance of one lap, raw samples
pub fn brake_trace(trace: &LapTelemetry) -> Vec<[f64; 2]> {
    trace
        .samples
        .iter()
        .map(|s| [s.distance_m, s.brake])
        .collect()
}
