// Tyre degradation models fitted on stint history and single driver lap
// trends. Models live in memory only.

use std::collections::HashMap;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::analysis::regression::{LinearFit, mean, median};
use crate::analysis::{all_stints, summarize_weather};
use crate::errors::BoxboxError;
use crate::session::types::normalize_name;
use crate::session::{Compound, Lap, Session};

/// Lap time increase over the opening laps that calls for a stop
pub const PIT_WINDOW_MARGIN_S: f64 = 2.0;
const PIT_WINDOW_MIN_LAPS: usize = 8;
const PIT_WINDOW_BASELINE_LAPS: usize = 5;
const TREND_MIN_LAPS: usize = 5;

/// Training row: how fast one stint degraded and under which conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StintRecord {
    pub compound: Compound,
    /// Normalised event name
    pub track: String,
    pub ambient_temp_c: f64,
    /// Seconds lost per lap
    pub slope: f64,
}

/// Degradation slopes of every fitted stint of a session, paired with the mean
/// air temperature. Sessions without weather data produce no records.
pub fn stint_records(session: &Session) -> Vec<StintRecord> {
    let Some(weather) = summarize_weather(&session.weather) else {
        debug!("{} has no weather data, no stint records", session.key);
        return Vec::new();
    };
    let track = session.key.normalized_event();
    all_stints(session)
        .into_iter()
        .filter_map(|stint| {
            Some(StintRecord {
                compound: stint.compound,
                track: track.clone(),
                ambient_temp_c: weather.air_temp_c.mean,
                slope: stint.degradation?.slope,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompoundModel {
    /// Slope as a function of ambient temperature
    Line(LinearFit),
    /// Temperatures did not vary, so only the mean slope is known
    Constant(f64),
}

impl CompoundModel {
    fn predict(&self, temp_c: f64) -> f64 {
        match self {
            CompoundModel::Line(fit) => fit.predict(temp_c),
            CompoundModel::Constant(slope) => *slope,
        }
    }
}

/// Per compound degradation slope against temperature, corrected by a per
/// track offset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DegradationPredictor {
    compounds: HashMap<Compound, CompoundModel>,
    track_offsets: HashMap<String, f64>,
}

impl DegradationPredictor {
    pub fn train(records: &[StintRecord]) -> Result<Self, BoxboxError> {
        if records.is_empty() {
            return Err(BoxboxError::insufficient("no stint records to train on"));
        }

        let mut compounds = HashMap::new();
        for (compound, rows) in records.iter().into_group_map_by(|r| r.compound) {
            let temps = rows.iter().map(|r| r.ambient_temp_c).collect_vec();
            let slopes = rows.iter().map(|r| r.slope).collect_vec();
            let model = match LinearFit::fit(&temps, &slopes) {
                Ok(fit) => CompoundModel::Line(fit),
                Err(_) => CompoundModel::Constant(mean(&slopes).unwrap_or_default()),
            };
            compounds.insert(compound, model);
        }

        let track_offsets = records
            .iter()
            .into_group_map_by(|r| r.track.clone())
            .into_iter()
            .filter_map(|(track, rows)| {
                let residuals = rows
                    .iter()
                    .filter_map(|r| {
                        let model = compounds.get(&r.compound)?;
                        Some(r.slope - model.predict(r.ambient_temp_c))
                    })
                    .collect_vec();
                Some((track, mean(&residuals)?))
            })
            .collect();

        Ok(Self {
            compounds,
            track_offsets,
        })
    }

    /// Expected seconds lost per lap. Unknown tracks get no offset.
    pub fn predict(
        &self,
        compound: Compound,
        track: &str,
        temp_c: f64,
    ) -> Result<f64, BoxboxError> {
        let model = self.compounds.get(&compound).ok_or_else(|| {
            BoxboxError::insufficient(format!("no training data for {} tyres", compound))
        })?;
        let offset = self
            .track_offsets
            .get(&normalize_name(track))
            .copied()
            .unwrap_or_default();
        Ok(model.predict(temp_c) + offset)
    }

    pub fn compounds(&self) -> Vec<Compound> {
        self.compounds.keys().copied().sorted().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub lap_number: u32,
    pub actual_s: f64,
    pub predicted_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationTrend {
    pub fit: LinearFit,
    pub points: Vec<TrendPoint>,
}

fn timed_valid_laps(laps: &[&Lap]) -> (Vec<u32>, Vec<f64>) {
    laps.iter()
        .filter(|l| l.is_valid())
        .filter_map(|l| Some((l.lap_number, l.lap_time_s?)))
        .unzip()
}

/// Lap time against lap number over a driver's valid laps
pub fn degradation_trend(laps: &[&Lap]) -> Result<DegradationTrend, BoxboxError> {
    let (numbers, times) = timed_valid_laps(laps);
    if times.len() < TREND_MIN_LAPS {
        return Err(BoxboxError::insufficient(format!(
            "degradation trend needs {} valid laps, got {}",
            TREND_MIN_LAPS,
            times.len()
        )));
    }
    let xs = numbers.iter().map(|n| *n as f64).collect_vec();
    let fit = LinearFit::fit(&xs, &times)?;
    let points = numbers
        .iter()
        .zip(&times)
        .map(|(n, t)| TrendPoint {
            lap_number: *n,
            actual_s: *t,
            predicted_s: fit.predict(*n as f64),
        })
        .collect();
    Ok(DegradationTrend { fit, points })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitWindow {
    pub trend: DegradationTrend,
    /// Median of the first valid laps
    pub baseline_s: f64,
    pub threshold_s: f64,
    /// First lap whose fitted time reaches the threshold
    pub pit_lap: Option<u32>,
}

/// Estimate when lap times will have dropped off enough to stop
pub fn predict_pit_window(laps: &[&Lap]) -> Result<PitWindow, BoxboxError> {
    let (_, times) = timed_valid_laps(laps);
    if times.len() < PIT_WINDOW_MIN_LAPS {
        return Err(BoxboxError::insufficient(format!(
            "pit window needs {} valid laps, got {}",
            PIT_WINDOW_MIN_LAPS,
            times.len()
        )));
    }
    let baseline_s = median(&times[..PIT_WINDOW_BASELINE_LAPS])
        .ok_or_else(|| BoxboxError::insufficient("no baseline laps"))?;
    let threshold_s = baseline_s + PIT_WINDOW_MARGIN_S;
    let trend = degradation_trend(laps)?;
    let pit_lap = trend
        .points
        .iter()
        .find(|p| p.predicted_s >= threshold_s)
        .map(|p| p.lap_number);

    Ok(PitWindow {
        trend,
        baseline_s,
        threshold_s,
        pit_lap,
    })
}
