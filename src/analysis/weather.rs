use serde::{Deserialize, Serialize};

use super::regression::mean;
use crate::session::WeatherSample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl Range {
    fn of(values: &[f64]) -> Option<Self> {
        Some(Self {
            min: values.iter().copied().reduce(f64::min)?,
            mean: mean(values)?,
            max: values.iter().copied().reduce(f64::max)?,
        })
    }
}

/// Conditions over a whole session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub air_temp_c: Range,
    pub track_temp_c: Range,
    pub mean_humidity_pct: f64,
    pub mean_wind_speed_mps: f64,
    pub rainfall: bool,
    pub samples: usize,
}

/// Summarise weather readings, `None` when there are none
pub fn summarize(weather: &[WeatherSample]) -> Option<WeatherSummary> {
    let column = |f: fn(&WeatherSample) -> f64| weather.iter().map(f).collect::<Vec<f64>>();
    Some(WeatherSummary {
        air_temp_c: Range::of(&column(|w| w.air_temp_c))?,
        track_temp_c: Range::of(&column(|w| w.track_temp_c))?,
        mean_humidity_pct: mean(&column(|w| w.humidity_pct))?,
        mean_wind_speed_mps: mean(&column(|w| w.wind_speed_mps))?,
        rainfall: weather.iter().any(|w| w.rainfall),
        samples: weather.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time_s: f64, air: f64, track: f64, rain: bool) -> WeatherSample {
        WeatherSample {
            time_s,
            air_temp_c: air,
            track_temp_c: track,
            humidity_pct: 50.,
            rainfall: rain,
            wind_speed_mps: 2.,
        }
    }

    #[test]
    fn test_summary() {
        let summary = summarize(&[
            sample(0., 24., 40., false),
            sample(60., 26., 44., true),
            sample(120., 25., 42., false),
        ])
        .unwrap();
        assert_eq!(summary.air_temp_c.min, 24.);
        assert_eq!(summary.air_temp_c.max, 26.);
        assert!((summary.track_temp_c.mean - 42.).abs() < 1e-9);
        assert!(summary.rainfall);
        assert_eq!(summary.samples, 3);
    }

    #[test]
    fn test_no_samples() {
        assert_eq!(summarize(&[]), None);
    }
}
