// Raw OpenF1 records and their conversion into typed session entities.
//
// Nothing loosely typed leaves this module: every record is checked and
// converted here, records that cannot be interpreted are dropped with a warning.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use log::{debug, warn};
use serde::Deserialize;
use uom::si::f64::{Length, Time, Velocity};
use uom::si::{length::meter, time::second, velocity::kilometer_per_hour};

use crate::errors::BoxboxError;
use crate::session::{
    Compound, DriverInfo, EventInfo, Lap, LapTelemetry, LoadOptions, Session, SessionKey,
    TelemetrySample, WeatherSample, types::normalize_name,
};

/// DRS values at or above this mean the flap is open
const DRS_OPEN_MIN: u32 = 10;
/// Position samples further than this from a car data sample are not merged
const MAX_POSITION_GAP_S: f64 = 1.0;

#[derive(Deserialize, Debug, Clone)]
pub struct MeetingRecord {
    pub meeting_key: u64,
    pub meeting_name: String,
    pub country_name: Option<String>,
    pub location: Option<String>,
    pub date_start: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SessionRecord {
    pub session_key: u64,
    pub session_name: String,
    pub meeting_key: u64,
    pub date_start: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DriverRecord {
    pub driver_number: u32,
    pub name_acronym: Option<String>,
    pub full_name: Option<String>,
    pub team_name: Option<String>,
    pub team_colour: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LapRecord {
    pub driver_number: u32,
    pub lap_number: u32,
    pub lap_duration: Option<f64>,
    pub duration_sector_1: Option<f64>,
    pub duration_sector_2: Option<f64>,
    pub duration_sector_3: Option<f64>,
    pub is_pit_out_lap: Option<bool>,
    pub date_start: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StintRecord {
    pub driver_number: u32,
    pub stint_number: u32,
    pub lap_start: Option<u32>,
    pub lap_end: Option<u32>,
    pub compound: Option<String>,
    pub tyre_age_at_start: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PitRecord {
    pub driver_number: u32,
    pub lap_number: u32,
    pub pit_duration: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CarDataRecord {
    pub driver_number: u32,
    pub date: String,
    pub speed: Option<f64>,
    pub throttle: Option<f64>,
    pub brake: Option<f64>,
    pub n_gear: Option<u8>,
    pub rpm: Option<f64>,
    pub drs: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LocationRecord {
    pub driver_number: u32,
    pub date: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WeatherRecord {
    pub date: String,
    pub air_temperature: Option<f64>,
    pub track_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// Everything fetched for one session, before conversion
#[derive(Debug, Default, Clone)]
pub struct RawSession {
    pub session_start: Option<String>,
    pub drivers: Vec<DriverRecord>,
    pub laps: Vec<LapRecord>,
    pub stints: Vec<StintRecord>,
    pub pits: Vec<PitRecord>,
    pub car_data: Vec<CarDataRecord>,
    pub locations: Vec<LocationRecord>,
    pub weather: Vec<WeatherRecord>,
}

/// Parse provider timestamps. Most carry an offset, a few older records do not
/// and are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_microseconds().unwrap_or(0) as f64 / 1e6
}

/// Turn the meeting list of a season into calendar events, ordered by date and
/// without pre-season testing
pub fn events_from_meetings(mut meetings: Vec<MeetingRecord>) -> Vec<EventInfo> {
    meetings.sort_by_key(|m| m.date_start.as_deref().and_then(parse_timestamp));
    meetings
        .into_iter()
        .filter(|m| !m.meeting_name.to_lowercase().contains("testing"))
        .enumerate()
        .map(|(i, m)| EventInfo {
            round: i as u32 + 1,
            name: m.meeting_name,
            country: m.country_name.unwrap_or_default(),
            location: m.location.unwrap_or_default(),
            meeting_key: m.meeting_key,
        })
        .collect()
}

/// Find the event a user typed. Exact (normalised) name matches win over
/// partial matches on name, location or country.
pub fn match_event<'a>(events: &'a [EventInfo], query: &str) -> Option<&'a EventInfo> {
    let query = normalize_name(query);
    if query.is_empty() {
        return None;
    }
    if let Some(event) = events.iter().find(|e| normalize_name(&e.name) == query) {
        return Some(event);
    }
    events.iter().find(|e| {
        normalize_name(&e.name).contains(&query)
            || normalize_name(&e.location) == query
            || normalize_name(&e.country) == query
    })
}

fn driver_infos(records: &[DriverRecord]) -> Vec<DriverInfo> {
    records
        .iter()
        .unique_by(|d| d.driver_number)
        .map(|d| DriverInfo {
            number: d.driver_number,
            abbreviation: d
                .name_acronym
                .clone()
                .unwrap_or_else(|| d.driver_number.to_string()),
            full_name: d.full_name.clone().unwrap_or_default(),
            team_name: d.team_name.clone().unwrap_or_default(),
            team_colour: d.team_colour.clone(),
        })
        .collect()
}

/// Convert fetched records into a session
pub fn build_session(
    key: SessionKey,
    options: LoadOptions,
    raw: RawSession,
) -> Result<Session, BoxboxError> {
    let drivers = driver_infos(&raw.drivers);
    let codes: HashMap<u32, String> = drivers
        .iter()
        .map(|d| (d.number, d.abbreviation.clone()))
        .collect();
    let code_for = |number: u32| {
        codes
            .get(&number)
            .cloned()
            .unwrap_or_else(|| number.to_string())
    };

    let pits: HashMap<(u32, u32), Option<f64>> = raw
        .pits
        .iter()
        .map(|p| ((p.driver_number, p.lap_number), p.pit_duration))
        .collect();

    let mut seen = HashSet::new();
    let mut laps = Vec::with_capacity(raw.laps.len());
    let mut lap_windows = Vec::new();
    for record in &raw.laps {
        if !seen.insert((record.driver_number, record.lap_number)) {
            warn!(
                "Dropping duplicate lap {} for car {}",
                record.lap_number, record.driver_number
            );
            continue;
        }
        let stint = raw.stints.iter().find(|s| {
            s.driver_number == record.driver_number
                && s.lap_start.is_some_and(|start| start <= record.lap_number)
                && s.lap_end.is_none_or(|end| record.lap_number <= end)
        });
        let pit = pits.get(&(record.driver_number, record.lap_number));

        let lap = Lap {
            driver: code_for(record.driver_number),
            lap_number: record.lap_number,
            lap_time_s: record.lap_duration.filter(|t| *t > 0.),
            sector_times_s: [
                record.duration_sector_1,
                record.duration_sector_2,
                record.duration_sector_3,
            ],
            compound: stint
                .and_then(|s| s.compound.as_deref())
                .map(Compound::from_label)
                .unwrap_or_default(),
            stint: stint.map(|s| s.stint_number).unwrap_or(0),
            tyre_age: stint.and_then(|s| {
                let start = s.lap_start?;
                Some(s.tyre_age_at_start.unwrap_or(0) + record.lap_number - start)
            }),
            pit_in: pit.is_some(),
            pit_out: record.is_pit_out_lap.unwrap_or(false),
            deleted: false,
            pit_duration_s: pit.copied().flatten(),
        };

        if let Some(start) = record.date_start.as_deref().and_then(parse_timestamp) {
            lap_windows.push((record.driver_number, lap.lap_number, start, lap.lap_time_s));
        }
        laps.push(lap);
    }

    let telemetry = if options.telemetry {
        build_telemetry(&raw, &lap_windows, &code_for, options.positions)
    } else {
        Vec::new()
    };

    let weather = if options.weather {
        build_weather(&raw)
    } else {
        Vec::new()
    };

    Session::new(key, options, drivers, laps, telemetry, weather)
}

struct TimedCarData<'a> {
    at: DateTime<Utc>,
    record: &'a CarDataRecord,
}

fn build_telemetry(
    raw: &RawSession,
    lap_windows: &[(u32, u32, DateTime<Utc>, Option<f64>)],
    code_for: &dyn Fn(u32) -> String,
    with_positions: bool,
) -> Vec<LapTelemetry> {
    let mut by_driver: HashMap<u32, Vec<TimedCarData>> = HashMap::new();
    let mut skipped = 0usize;
    for record in &raw.car_data {
        match parse_timestamp(&record.date) {
            Some(at) => by_driver
                .entry(record.driver_number)
                .or_default()
                .push(TimedCarData { at, record }),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} car data records with unreadable timestamps", skipped);
    }
    for samples in by_driver.values_mut() {
        samples.sort_by_key(|s| s.at);
    }

    let mut positions: HashMap<u32, Vec<(DateTime<Utc>, f64, f64)>> = HashMap::new();
    if with_positions {
        for record in &raw.locations {
            if let (Some(at), Some(x), Some(y)) =
                (parse_timestamp(&record.date), record.x, record.y)
            {
                positions
                    .entry(record.driver_number)
                    .or_default()
                    .push((at, x, y));
            }
        }
        for track in positions.values_mut() {
            track.sort_by_key(|p| p.0);
        }
    }

    // Lap end is the start of the driver's next lap, or start + lap time
    let mut windows_by_driver: HashMap<u32, Vec<(u32, DateTime<Utc>, Option<f64>)>> =
        HashMap::new();
    for (driver, lap_number, start, lap_time) in lap_windows {
        windows_by_driver
            .entry(*driver)
            .or_default()
            .push((*lap_number, *start, *lap_time));
    }

    let mut traces = Vec::new();
    for (driver, mut windows) in windows_by_driver {
        let Some(car_data) = by_driver.get(&driver) else {
            debug!("No car data for car {}", driver);
            continue;
        };
        windows.sort_by_key(|w| w.0);
        for (i, (lap_number, start, lap_time)) in windows.iter().enumerate() {
            let end = match lap_time {
                Some(t) => *start + chrono::Duration::microseconds((t * 1e6) as i64),
                None => match windows.get(i + 1) {
                    Some(next) => next.1,
                    None => continue,
                },
            };
            let from = car_data.partition_point(|s| s.at < *start);
            let to = car_data.partition_point(|s| s.at < end);
            if from >= to {
                continue;
            }
            let samples = lap_samples(
                &car_data[from..to],
                *start,
                positions.get(&driver).map(Vec::as_slice),
            );
            traces.push(LapTelemetry {
                driver: code_for(driver),
                lap_number: *lap_number,
                samples,
            });
        }
    }
    traces
}

/// Convert one lap worth of car data, integrating distance from speed
fn lap_samples(
    car_data: &[TimedCarData],
    lap_start: DateTime<Utc>,
    positions: Option<&[(DateTime<Utc>, f64, f64)]>,
) -> Vec<TelemetrySample> {
    let mut samples: Vec<TelemetrySample> = Vec::with_capacity(car_data.len());
    let mut distance = Length::new::<meter>(0.);
    for point in car_data {
        let time_s = seconds_between(lap_start, point.at);
        let speed_kph = point.record.speed.unwrap_or(0.);
        if let Some(prev) = samples.last() {
            let avg_speed = Velocity::new::<kilometer_per_hour>((prev.speed_kph + speed_kph) / 2.);
            let dt = Time::new::<second>((time_s - prev.time_s).max(0.));
            let step: Length = avg_speed * dt;
            distance += step;
        }
        let (x, y) = positions
            .and_then(|track| nearest_position(track, point.at))
            .map(|(x, y)| (Some(x), Some(y)))
            .unwrap_or((None, None));
        samples.push(TelemetrySample {
            distance_m: distance.get::<meter>(),
            time_s,
            speed_kph,
            throttle: point.record.throttle.unwrap_or(0.).clamp(0., 100.),
            brake: point.record.brake.unwrap_or(0.).clamp(0., 100.),
            gear: point.record.n_gear.unwrap_or(0),
            rpm: point.record.rpm.unwrap_or(0.),
            drs_open: point.record.drs.is_some_and(|d| d >= DRS_OPEN_MIN),
            x,
            y,
        });
    }
    samples
}

fn nearest_position(
    track: &[(DateTime<Utc>, f64, f64)],
    at: DateTime<Utc>,
) -> Option<(f64, f64)> {
    let idx = track.partition_point(|p| p.0 < at);
    let candidates = [idx.checked_sub(1), Some(idx)];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|i| track.get(i))
        .map(|p| (seconds_between(p.0, at).abs(), p.1, p.2))
        .filter(|(gap, _, _)| *gap <= MAX_POSITION_GAP_S)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, x, y)| (x, y))
}

fn build_weather(raw: &RawSession) -> Vec<WeatherSample> {
    let readings: Vec<_> = raw
        .weather
        .iter()
        .filter_map(|w| parse_timestamp(&w.date).map(|at| (at, w)))
        .collect();
    let origin = raw
        .session_start
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| readings.iter().map(|(at, _)| *at).min());
    let Some(origin) = origin else {
        return Vec::new();
    };
    // a reading without temperatures or humidity is of no use to any view
    readings
        .into_iter()
        .filter_map(|(at, w)| {
            let (Some(air), Some(track), Some(humidity)) =
                (w.air_temperature, w.track_temperature, w.humidity)
            else {
                debug!("Dropping incomplete weather reading at {}", w.date);
                return None;
            };
            Some(WeatherSample {
                time_s: seconds_between(origin, at),
                air_temp_c: air,
                track_temp_c: track,
                humidity_pct: humidity,
                rainfall: w.rainfall.is_some_and(|r| r > 0.),
                wind_speed_mps: w.wind_speed.unwrap_or(0.),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKind;

    fn key() -> SessionKey {
        SessionKey::new(2024, "Bahrain Grand Prix", SessionKind::Race)
    }

    fn raw_session() -> RawSession {
        let drivers: Vec<DriverRecord> = serde_json::from_str(
            r#"[{"driver_number":1,"name_acronym":"VER","full_name":"Max VERSTAPPEN","team_name":"Red Bull Racing","team_colour":"3671C6","broadcast_name":"M VERSTAPPEN"}]"#,
        )
        .unwrap();
        let laps: Vec<LapRecord> = serde_json::from_str(
            r#"[
              {"driver_number":1,"lap_number":1,"lap_duration":null,"duration_sector_1":null,"duration_sector_2":40.1,"duration_sector_3":35.2,"is_pit_out_lap":false,"date_start":null},
              {"driver_number":1,"lap_number":2,"lap_duration":10.0,"duration_sector_1":3.0,"duration_sector_2":4.0,"duration_sector_3":3.0,"is_pit_out_lap":false,"date_start":"2024-03-02T15:05:00.000000+00:00"},
              {"driver_number":1,"lap_number":3,"lap_duration":99.5,"duration_sector_1":30.0,"duration_sector_2":39.5,"duration_sector_3":30.0,"is_pit_out_lap":true,"date_start":"2024-03-02T15:05:10.000000+00:00"}
            ]"#,
        )
        .unwrap();
        let stints: Vec<StintRecord> = serde_json::from_str(
            r#"[
              {"driver_number":1,"stint_number":1,"lap_start":1,"lap_end":2,"compound":"SOFT","tyre_age_at_start":3},
              {"driver_number":1,"stint_number":2,"lap_start":3,"lap_end":57,"compound":"HARD","tyre_age_at_start":0}
            ]"#,
        )
        .unwrap();
        let pits: Vec<PitRecord> = serde_json::from_str(
            r#"[{"driver_number":1,"lap_number":2,"pit_duration":23.4,"date":"2024-03-02T15:05:08+00:00"}]"#,
        )
        .unwrap();
        let car_data: Vec<CarDataRecord> = serde_json::from_str(
            r#"[
              {"driver_number":1,"date":"2024-03-02T15:05:00.000000+00:00","speed":180,"throttle":100,"brake":0,"n_gear":6,"rpm":11000,"drs":12},
              {"driver_number":1,"date":"2024-03-02T15:05:01.000000+00:00","speed":180,"throttle":100,"brake":0,"n_gear":6,"rpm":11000,"drs":8},
              {"driver_number":1,"date":"2024-03-02T15:05:02.000000+00:00","speed":0,"throttle":0,"brake":100,"n_gear":1,"rpm":4000,"drs":0},
              {"driver_number":1,"date":"not a date","speed":100,"throttle":0,"brake":0,"n_gear":1,"rpm":4000,"drs":0}
            ]"#,
        )
        .unwrap();
        let weather: Vec<WeatherRecord> = serde_json::from_str(
            r#"[{"date":"2024-03-02T15:00:30+00:00","air_temperature":18.5,"track_temperature":26.1,"humidity":45,"rainfall":0,"wind_speed":1.2,"pressure":1017}]"#,
        )
        .unwrap();
        RawSession {
            session_start: Some("2024-03-02T15:00:00+00:00".to_string()),
            drivers,
            laps,
            stints,
            pits,
            car_data,
            locations: Vec::new(),
            weather,
        }
    }

    #[test]
    fn test_timestamp_parsing() {
        assert!(parse_timestamp("2024-03-02T15:05:00.123000+00:00").is_some());
        assert!(parse_timestamp("2024-03-02T15:05:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        let a = parse_timestamp("2024-03-02T15:05:00+00:00").unwrap();
        let b = parse_timestamp("2024-03-02T16:05:01.5+01:00").unwrap();
        assert_eq!(seconds_between(a, b), 1.5);
    }

    #[test]
    fn test_laps_are_typed_at_the_boundary() {
        let session = build_session(key(), LoadOptions::default(), raw_session()).unwrap();
        assert_eq!(session.laps.len(), 3);

        let lap1 = session.lap("VER", 1).unwrap();
        assert_eq!(lap1.lap_time_s, None);
        assert_eq!(lap1.compound, Compound::Soft);
        assert_eq!(lap1.tyre_age, Some(3));
        assert!(!lap1.is_valid());

        let lap2 = session.lap("VER", 2).unwrap();
        assert!(lap2.pit_in);
        assert_eq!(lap2.pit_duration_s, Some(23.4));
        assert_eq!(lap2.stint, 1);

        let lap3 = session.lap("VER", 3).unwrap();
        assert!(lap3.pit_out);
        assert_eq!(lap3.compound, Compound::Hard);
    }

    #[test]
    fn test_telemetry_distance_integration() {
        let session = build_session(key(), LoadOptions::default(), raw_session()).unwrap();
        let trace = session.lap_telemetry("VER", 2).unwrap();
        assert_eq!(trace.samples.len(), 3);
        assert_eq!(trace.samples[0].distance_m, 0.);
        // one second at 180 km/h is 50 m
        assert!((trace.samples[1].distance_m - 50.).abs() < 1e-9);
        // decelerating from 180 to 0 over a second covers 25 m
        assert!((trace.samples[2].distance_m - 75.).abs() < 1e-9);
        assert!(trace.samples[0].drs_open);
        assert!(!trace.samples[1].drs_open);
        assert_eq!(trace.samples[2].gear, 1);
    }

    #[test]
    fn test_weather_relative_to_session_start() {
        let session = build_session(key(), LoadOptions::default(), raw_session()).unwrap();
        assert_eq!(session.weather.len(), 1);
        assert_eq!(session.weather[0].time_s, 30.);
        assert!(!session.weather[0].rainfall);
    }

    #[test]
    fn test_incomplete_weather_readings_are_dropped() {
        let mut raw = raw_session();
        raw.weather.extend(
            serde_json::from_str::<Vec<WeatherRecord>>(
                r#"[
                  {"date":"2024-03-02T15:01:30+00:00","air_temperature":null,"track_temperature":27.0,"humidity":44,"rainfall":0,"wind_speed":1.0},
                  {"date":"2024-03-02T15:02:30+00:00","air_temperature":18.9,"track_temperature":27.3,"humidity":null,"rainfall":null,"wind_speed":null}
                ]"#,
            )
            .unwrap(),
        );
        let session = build_session(key(), LoadOptions::default(), raw).unwrap();
        assert_eq!(session.weather.len(), 1);
        assert_eq!(session.weather[0].air_temp_c, 18.5);
        assert_eq!(session.weather[0].humidity_pct, 45.);
    }

    #[test]
    fn test_laps_only_skips_channels() {
        let session = build_session(key(), LoadOptions::laps_only(), raw_session()).unwrap();
        assert!(session.telemetry.is_empty());
        assert!(session.weather.is_empty());
    }

    #[test]
    fn test_event_matching() {
        let events = events_from_meetings(vec![
            MeetingRecord {
                meeting_key: 1,
                meeting_name: "Pre-Season Testing".to_string(),
                country_name: Some("Bahrain".to_string()),
                location: Some("Sakhir".to_string()),
                date_start: Some("2024-02-21T07:00:00+00:00".to_string()),
            },
            MeetingRecord {
                meeting_key: 3,
                meeting_name: "Saudi Arabian Grand Prix".to_string(),
                country_name: Some("Saudi Arabia".to_string()),
                location: Some("Jeddah".to_string()),
                date_start: Some("2024-03-07T13:30:00+00:00".to_string()),
            },
            MeetingRecord {
                meeting_key: 2,
                meeting_name: "Bahrain Grand Prix".to_string(),
                country_name: Some("Bahrain".to_string()),
                location: Some("Sakhir".to_string()),
                date_start: Some("2024-02-29T11:30:00+00:00".to_string()),
            },
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "Bahrain Grand Prix");
        assert_eq!(events[0].round, 1);
        assert_eq!(match_event(&events, "bahrain grand prix").unwrap().meeting_key, 2);
        assert_eq!(match_event(&events, "Jeddah").unwrap().meeting_key, 3);
        assert_eq!(match_event(&events, "saudi").unwrap().meeting_key, 3);
        assert!(match_event(&events, "Monaco").is_none());
        assert!(match_event(&events, "").is_none());
    }
}
