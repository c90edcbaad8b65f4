// Stints, pit stops and tyre usage

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::regression::{LinearFit, mean, median};
use crate::errors::BoxboxError;
use crate::session::{Compound, Lap, Session};

/// Consecutive laps of one driver on one set of tyres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stint {
    pub driver: String,
    /// 1-based position of the stint in the driver's race
    pub index: usize,
    pub compound: Compound,
    pub start_lap: u32,
    pub end_lap: u32,
    pub lap_count: usize,
    /// Lap time against lap-in-stint index, over the stint's valid laps
    pub degradation: Option<LinearFit>,
}

impl Stint {
    pub fn contains(&self, lap_number: u32) -> bool {
        (self.start_lap..=self.end_lap).contains(&lap_number)
    }
}

/// The transition between two adjacent stints of a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitStop {
    pub driver: String,
    /// Last lap of the earlier stint
    pub in_lap: u32,
    /// First lap of the later stint
    pub out_lap: u32,
    pub compound_before: Compound,
    pub compound_after: Compound,
    pub stint_before: usize,
    pub stint_after: usize,
    /// Pit lane time as reported by the provider
    pub pit_duration_s: Option<f64>,
    /// Time lost against the surrounding pace, when it can be estimated
    pub delta_s: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitDelta {
    pub delta_s: f64,
    /// Mean of the valid laps around the stop
    pub baseline_s: f64,
    pub reference_laps: usize,
}

/// Laps needed around a stop to estimate the time it cost
const MIN_REFERENCE_LAPS: usize = 2;
/// Laps taken on each side of a stop for the baseline
const REFERENCE_WINDOW: usize = 3;

fn starts_new_stint(previous: &Lap, lap: &Lap) -> bool {
    lap.compound != previous.compound
        || (lap.stint != 0 && previous.stint != 0 && lap.stint != previous.stint)
        || previous.pit_in
        || lap.pit_out
}

/// Split one driver's laps, in lap order, into stints.
///
/// A new stint starts when the compound changes, the provider stint number
/// changes, the previous lap ended in the pit lane or the lap starts from it.
/// The first lap of the race is never a boundary even when flagged as pit out.
pub fn segment_stints(laps: &[&Lap]) -> Vec<Stint> {
    let mut groups: Vec<Vec<&Lap>> = Vec::new();
    for &lap in laps {
        let continues = groups
            .last()
            .and_then(|group| group.last())
            .is_some_and(|prev| !starts_new_stint(prev, lap));
        match groups.last_mut() {
            Some(group) if continues => group.push(lap),
            _ => groups.push(vec![lap]),
        }
    }

    groups
        .into_iter()
        .enumerate()
        .filter_map(|(i, group)| {
            let first = group.first()?;
            let last = group.last()?;
            let (xs, ys): (Vec<f64>, Vec<f64>) = group
                .iter()
                .enumerate()
                .filter(|(_, l)| l.is_valid())
                .filter_map(|(pos, l)| Some((pos as f64, l.lap_time_s?)))
                .unzip();
            Some(Stint {
                driver: first.driver.clone(),
                index: i + 1,
                compound: first.compound,
                start_lap: first.lap_number,
                end_lap: last.lap_number,
                lap_count: group.len(),
                degradation: LinearFit::fit(&xs, &ys).ok(),
            })
        })
        .collect()
}

/// One pit stop per stint boundary
pub fn pit_stops(laps: &[&Lap]) -> Vec<PitStop> {
    segment_stints(laps)
        .iter()
        .tuple_windows()
        .map(|(before, after)| {
            let in_lap = laps.iter().find(|l| l.lap_number == before.end_lap);
            let mut stop = PitStop {
                driver: before.driver.clone(),
                in_lap: before.end_lap,
                out_lap: after.start_lap,
                compound_before: before.compound,
                compound_after: after.compound,
                stint_before: before.index,
                stint_after: after.index,
                pit_duration_s: in_lap.and_then(|l| l.pit_duration_s),
                delta_s: None,
            };
            stop.delta_s = pit_delta(laps, &stop).ok().map(|d| d.delta_s);
            stop
        })
        .collect()
}

/// Time lost across the in-lap and out-lap of a stop.
///
/// The baseline is the mean of up to three valid laps before the in-lap and
/// three after the out-lap.
///
/// # Errors
///
/// `InsufficientData` when fewer than 2 reference laps surround the stop or
/// the in-lap or out-lap has no time.
pub fn pit_delta(laps: &[&Lap], stop: &PitStop) -> Result<PitDelta, BoxboxError> {
    let lap_time = |number: u32| {
        laps.iter()
            .find(|l| l.lap_number == number)
            .and_then(|l| l.lap_time_s)
    };
    let (Some(in_time), Some(out_time)) = (lap_time(stop.in_lap), lap_time(stop.out_lap)) else {
        return Err(BoxboxError::insufficient(format!(
            "in-lap {} or out-lap {} of {} has no time",
            stop.in_lap, stop.out_lap, stop.driver
        )));
    };

    let valid_times = |l: &&&Lap| l.is_valid();
    let before = laps
        .iter()
        .filter(|l| l.lap_number < stop.in_lap)
        .filter(valid_times)
        .filter_map(|l| l.lap_time_s)
        .collect_vec();
    let after = laps
        .iter()
        .filter(|l| l.lap_number > stop.out_lap)
        .filter(valid_times)
        .filter_map(|l| l.lap_time_s)
        .take(REFERENCE_WINDOW);
    let reference: Vec<f64> = before
        .iter()
        .rev()
        .take(REFERENCE_WINDOW)
        .copied()
        .chain(after)
        .collect();

    if reference.len() < MIN_REFERENCE_LAPS {
        return Err(BoxboxError::insufficient(format!(
            "pit stop of {} on lap {} has {} reference laps, at least {} are needed",
            stop.driver,
            stop.in_lap,
            reference.len(),
            MIN_REFERENCE_LAPS
        )));
    }
    let baseline_s = mean(&reference).unwrap_or_default();
    Ok(PitDelta {
        delta_s: in_time + out_time - 2. * baseline_s,
        baseline_s,
        reference_laps: reference.len(),
    })
}

/// Stints of every driver in entry list order
pub fn all_stints(session: &Session) -> Vec<Stint> {
    session
        .driver_codes()
        .iter()
        .flat_map(|driver| segment_stints(&session.laps_for(driver).collect_vec()))
        .collect()
}

pub fn all_pit_stops(session: &Session) -> Vec<PitStop> {
    session
        .driver_codes()
        .iter()
        .flat_map(|driver| pit_stops(&session.laps_for(driver).collect_vec()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundUsage {
    pub driver: String,
    pub compound: Compound,
    pub lap_count: usize,
}

/// Laps driven on each compound by each driver
pub fn compound_usage(session: &Session) -> Vec<CompoundUsage> {
    session
        .driver_codes()
        .into_iter()
        .flat_map(|driver| {
            let counts = session.laps_for(&driver).counts_by(|l| l.compound);
            Compound::ALL
                .iter()
                .filter_map(|compound| {
                    Some(CompoundUsage {
                        driver: driver.clone(),
                        compound: *compound,
                        lap_count: *counts.get(compound)?,
                    })
                })
                .collect_vec()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StintPace {
    pub driver: String,
    pub stint: usize,
    pub compound: Compound,
    pub start_lap: u32,
    pub end_lap: u32,
    pub median_s: f64,
    /// Timed laps in the stint
    pub lap_count: usize,
}

/// Median lap time of every stint with at least one timed lap
pub fn stint_pace_table(session: &Session) -> Vec<StintPace> {
    all_stints(session)
        .into_iter()
        .filter_map(|stint| {
            let times = session
                .laps_for(&stint.driver)
                .filter(|l| stint.contains(l.lap_number))
                .filter_map(|l| l.lap_time_s)
                .collect_vec();
            Some(StintPace {
                median_s: median(&times)?,
                lap_count: times.len(),
                stint: stint.index,
                compound: stint.compound,
                start_lap: stint.start_lap,
                end_lap: stint.end_lap,
                driver: stint.driver,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndercutEffect {
    pub undercut_driver: String,
    pub target_driver: String,
    /// First lap after the undercut driver's last stop
    pub lap_number: u32,
    /// Positive when the undercut driver was faster on that lap
    pub gain_s: f64,
}

/// Compare the first lap after `undercut_driver`'s last stop with the same
/// lap of `target_driver`
pub fn undercut_effect(
    session: &Session,
    undercut_driver: &str,
    target_driver: &str,
) -> Result<UndercutEffect, BoxboxError> {
    let undercut_laps = session.driver_laps(undercut_driver)?;
    session.driver_laps(target_driver)?;

    let stop = pit_stops(&undercut_laps).pop().ok_or_else(|| {
        BoxboxError::insufficient(format!("{} made no pit stop", undercut_driver))
    })?;
    let lap_number = stop.out_lap + 1;
    let time_of = |driver: &str| {
        session
            .lap(driver, lap_number)
            .and_then(|l| l.lap_time_s)
            .ok_or_else(|| {
                BoxboxError::insufficient(format!("{} has no time for lap {}", driver, lap_number))
            })
    };

    Ok(UndercutEffect {
        undercut_driver: undercut_driver.to_string(),
        target_driver: target_driver.to_string(),
        lap_number,
        gain_s: time_of(target_driver)? - time_of(undercut_driver)?,
    })
}
