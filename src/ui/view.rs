// Analysis results for the session on screen. Computed once per session and
// driver selection, not per frame.

use std::sync::Arc;

use crate::analysis::{
    FastestLap, LapComparison, PacePoint, PitStop, RacePace, SectorBests, SegmentDelta, Stint,
    TelemetryComparison, WeatherSummary, all_pit_stops, all_stints, compare_laps,
    compare_telemetry, fastest_lap, fastest_laps_per_driver, race_pace, rolling_pace,
    sector_bests, split_segments, summarize_weather,
};
use crate::analysis::compare::DEFAULT_SEGMENT_THRESHOLD;
use crate::config::AppConfig;
use crate::predictor::{DegradationTrend, PitWindow, degradation_trend, predict_pit_window};
use crate::session::Session;

/// Result of one view's analysis. Errors are kept as their message so one
/// failing panel does not take the rest of the dashboard down.
pub(crate) type Outcome<T> = Result<T, String>;

fn outcome<T>(result: Result<T, crate::errors::BoxboxError>) -> Outcome<T> {
    result.map_err(|e| e.to_string())
}

pub(crate) struct SessionView {
    pub(crate) session: Arc<Session>,
    pub(crate) driver_a: Option<String>,
    pub(crate) driver_b: Option<String>,
    pub(crate) weather: Option<WeatherSummary>,
    pub(crate) fastest_lap: Option<FastestLap>,
    pub(crate) fastest_laps: Vec<FastestLap>,
    pub(crate) sector_bests: Vec<SectorBests>,
    pub(crate) race_pace: Vec<RacePace>,
    pub(crate) rolling_pace: Vec<(String, Outcome<Vec<PacePoint>>)>,
    pub(crate) lap_comparison: Outcome<LapComparison>,
    pub(crate) telemetry: Outcome<TelemetryComparison>,
    pub(crate) segments: Vec<SegmentDelta>,
    pub(crate) stints: Vec<Stint>,
    pub(crate) pit_stops: Vec<PitStop>,
    pub(crate) trend: Outcome<DegradationTrend>,
    pub(crate) pit_window: Outcome<PitWindow>,
}

impl SessionView {
    /// Run every analysis the dashboard shows. Drivers default to the two
    /// quickest of the session when none are picked.
    pub(crate) fn build(
        session: Arc<Session>,
        driver_a: Option<&str>,
        driver_b: Option<&str>,
        config: &AppConfig,
    ) -> Self {
        let fastest_laps = fastest_laps_per_driver(&session);
        // B never repeats A, it falls back to the quickest other driver
        let pick = |chosen: Option<&str>, other: Option<&str>| {
            chosen
                .filter(|d| session.has_driver(d) && Some(*d) != other)
                .map(str::to_string)
                .or_else(|| {
                    fastest_laps
                        .iter()
                        .find(|l| Some(l.driver.as_str()) != other)
                        .map(|l| l.driver.clone())
                })
        };
        let driver_a = pick(driver_a, None);
        let driver_b = pick(driver_b, driver_a.as_deref());
        let selected: Vec<String> = driver_a.iter().chain(driver_b.iter()).cloned().collect();

        let rolling_pace = selected
            .iter()
            .map(|d| {
                (
                    d.clone(),
                    outcome(rolling_pace(&session, d, config.rolling_window)),
                )
            })
            .collect();

        let (lap_comparison, telemetry) = match (&driver_a, &driver_b) {
            (Some(a), Some(b)) => (
                outcome(compare_laps(&session, a, b)),
                outcome(compare_telemetry(&session, a, b, config.alignment_points)),
            ),
            _ => (
                Err("Select two drivers to compare".to_string()),
                Err("Select two drivers to compare".to_string()),
            ),
        };
        let segments = telemetry
            .as_ref()
            .map(|t| {
                split_segments(
                    &t.aligned.distance_m,
                    &t.speed_delta,
                    DEFAULT_SEGMENT_THRESHOLD,
                )
            })
            .unwrap_or_default();

        let (trend, pit_window) = match &driver_a {
            Some(a) => match session.driver_laps(a) {
                Ok(laps) => (
                    outcome(degradation_trend(&laps)),
                    outcome(predict_pit_window(&laps)),
                ),
                Err(e) => (Err(e.to_string()), Err(e.to_string())),
            },
            None => (
                Err("No driver selected".to_string()),
                Err("No driver selected".to_string()),
            ),
        };

        Self {
            weather: summarize_weather(&session.weather),
            fastest_lap: fastest_lap(&session),
            sector_bests: sector_bests(&session),
            race_pace: race_pace(&session),
            stints: all_stints(&session),
            pit_stops: all_pit_stops(&session),
            fastest_laps,
            rolling_pace,
            lap_comparison,
            telemetry,
            segments,
            trend,
            pit_window,
            driver_a,
            driver_b,
            session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Compound;
    use crate::session::test_support::{lap, session, trace};

    fn race() -> Arc<Session> {
        let mut laps = Vec::new();
        for n in 1..=10 {
            laps.push(lap("VER", n, 90. + n as f64 * 0.1, Compound::Medium));
            laps.push(lap("LEC", n, 90.5 + n as f64 * 0.1, Compound::Medium));
        }
        Arc::new(session(
            laps,
            vec![trace("VER", 1, 50, 200.), trace("LEC", 1, 50, 190.)],
        ))
    }

    #[test]
    fn test_default_driver_selection() {
        let view = SessionView::build(race(), None, None, &AppConfig::default());
        assert_eq!(view.driver_a.as_deref(), Some("VER"));
        assert_eq!(view.driver_b.as_deref(), Some("LEC"));
        assert_eq!(view.rolling_pace.len(), 2);
        assert!(view.telemetry.is_ok());
        assert!(!view.segments.is_empty());
        assert!(view.pit_window.is_ok());
        assert_eq!(view.stints.len(), 2);
        assert!(view.weather.is_none());
    }

    #[test]
    fn test_failures_stay_local() {
        let view = SessionView::build(race(), Some("LEC"), Some("HAM"), &AppConfig::default());
        // unknown driver falls back to the quickest driver other than A
        assert_eq!(view.driver_a.as_deref(), Some("LEC"));
        assert_eq!(view.driver_b.as_deref(), Some("VER"));

        let config = AppConfig {
            rolling_window: 0,
            ..Default::default()
        };
        let view = SessionView::build(race(), None, None, &config);
        assert!(view.rolling_pace.iter().all(|(_, r)| r.is_err()));
        assert!(view.telemetry.is_ok());
        assert_eq!(view.fastest_laps.len(), 2);
    }

    #[test]
    fn test_driver_b_never_repeats_driver_a() {
        let view = SessionView::build(race(), Some("VER"), Some("VER"), &AppConfig::default());
        assert_eq!(view.driver_a.as_deref(), Some("VER"));
        assert_eq!(view.driver_b.as_deref(), Some("LEC"));

        let view = SessionView::build(race(), Some("LEC"), None, &AppConfig::default());
        assert_eq!(view.driver_b.as_deref(), Some("VER"));
        assert_eq!(view.rolling_pace.len(), 2);
    }
}
