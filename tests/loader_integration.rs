// End to end: provider -> loader -> file cache -> analysis, without network

use std::sync::Arc;

use boxbox::analysis::{all_pit_stops, fastest_lap};
use boxbox::cache::read_session_file;
use boxbox::provider::records::{
    DriverRecord, LapRecord, RawSession, StintRecord, WeatherRecord, build_session,
};
use boxbox::session::{DriverInfo, EventInfo, Lap, LoadOptions};
use boxbox::{
    BoxboxError, Compound, FileSessionCache, MockSessionProvider, Session, SessionKey,
    SessionKind, SessionLoader, SessionStore,
};
use tempfile::TempDir;

fn monza() -> Session {
    let compounds = [
        Compound::Medium,
        Compound::Medium,
        Compound::Medium,
        Compound::Hard,
        Compound::Hard,
        Compound::Hard,
    ];
    let laps = compounds
        .iter()
        .enumerate()
        .map(|(i, compound)| Lap {
            driver: "LEC".to_string(),
            lap_number: i as u32 + 1,
            lap_time_s: Some(82. + i as f64 * 0.1),
            compound: *compound,
            ..Default::default()
        })
        .collect();
    Session::new(
        SessionKey::new(2024, "Italian Grand Prix", SessionKind::Race),
        LoadOptions::laps_only(),
        vec![DriverInfo {
            number: 16,
            abbreviation: "LEC".to_string(),
            full_name: "Charles Leclerc".to_string(),
            team_name: "Ferrari".to_string(),
            team_colour: Some("E8002D".to_string()),
        }],
        laps,
        Vec::new(),
        Vec::new(),
    )
    .unwrap()
}

fn loader(
    provider: MockSessionProvider,
    dir: &TempDir,
) -> SessionLoader<MockSessionProvider, FileSessionCache> {
    let store = FileSessionCache::new(dir.path().to_path_buf()).unwrap();
    SessionLoader::new(provider, store, LoadOptions::laps_only())
}

#[test]
fn test_load_then_analyze() {
    let dir = TempDir::new().unwrap();
    let loader = loader(MockSessionProvider::new().with_session(monza()), &dir);
    let key = SessionKey::new(2024, "Italian Grand Prix", SessionKind::Race);

    let session = loader.load(&key).unwrap();
    let fastest = fastest_lap(&session).unwrap();
    assert_eq!(fastest.lap_number, 1);
    assert_eq!(all_pit_stops(&session).len(), 1);

    // the cached file is a complete session on its own
    let cached = read_session_file(&loader.store().path_for(&key)).unwrap();
    assert_eq!(cached, *session);
}

#[test]
fn test_cache_outlives_the_provider() {
    let dir = TempDir::new().unwrap();
    let key = SessionKey::new(2024, "Italian Grand Prix", SessionKind::Race);
    let first = loader(MockSessionProvider::new().with_session(monza()), &dir)
        .load(&key)
        .unwrap();

    let offline = loader(MockSessionProvider::new().offline(), &dir);
    let second = offline.load(&key).unwrap();
    assert_eq!(first, second);
    assert_eq!(offline.provider().fetch_count(), 0);

    // the same session is served from memory afterwards
    assert!(Arc::ptr_eq(&second, &offline.load(&key).unwrap()));
}

#[test]
fn test_missing_session_is_a_load_failure() {
    let dir = TempDir::new().unwrap();
    let loader = loader(MockSessionProvider::new(), &dir);
    let err = loader
        .load(&SessionKey::new(2024, "Atlantis Grand Prix", SessionKind::Race))
        .unwrap_err();
    assert!(matches!(err, BoxboxError::DataUnavailable { .. }));
    assert!(err.is_load_failure());
}

#[test]
fn test_list_and_clear_cache() {
    let dir = TempDir::new().unwrap();
    let loader = loader(MockSessionProvider::new().with_session(monza()), &dir);
    let key = SessionKey::new(2024, "Italian Grand Prix", SessionKind::Race);
    loader.load(&key).unwrap();

    assert_eq!(loader.store().list().unwrap(), vec![key.clone()]);
    assert_eq!(loader.store().clear().unwrap(), 1);
    assert!(loader.store().list().unwrap().is_empty());
    assert!(loader.store().load(&key).unwrap().is_none());
}

#[test]
fn test_events_come_from_the_provider() {
    let dir = TempDir::new().unwrap();
    let event = EventInfo {
        round: 16,
        name: "Italian Grand Prix".to_string(),
        country: "Italy".to_string(),
        location: "Monza".to_string(),
        meeting_key: 1245,
    };
    let loader = loader(
        MockSessionProvider::new().with_events(2024, vec![event.clone()]),
        &dir,
    );
    assert_eq!(loader.list_events(2024).unwrap(), vec![event]);
}

/// Session as assembled from provider records, with the gaps real feeds have
fn sakhir_from_records() -> Session {
    let drivers: Vec<DriverRecord> = serde_json::from_str(
        r#"[{"driver_number":44,"name_acronym":"HAM","full_name":"Lewis HAMILTON","team_name":"Mercedes","team_colour":"27F4D2"}]"#,
    )
    .unwrap();
    let laps: Vec<LapRecord> = serde_json::from_str(
        r#"[
          {"driver_number":44,"lap_number":1,"lap_duration":null,"duration_sector_1":null,"duration_sector_2":41.2,"duration_sector_3":null,"is_pit_out_lap":false,"date_start":null},
          {"driver_number":44,"lap_number":2,"lap_duration":96.4,"duration_sector_1":31.0,"duration_sector_2":null,"duration_sector_3":24.1,"is_pit_out_lap":false,"date_start":"2024-03-02T15:05:00+00:00"}
        ]"#,
    )
    .unwrap();
    let stints: Vec<StintRecord> = serde_json::from_str(
        r#"[{"driver_number":44,"stint_number":1,"lap_start":1,"lap_end":2,"compound":"MEDIUM","tyre_age_at_start":0}]"#,
    )
    .unwrap();
    let weather: Vec<WeatherRecord> = serde_json::from_str(
        r#"[
          {"date":"2024-03-02T15:00:30+00:00","air_temperature":18.5,"track_temperature":26.1,"humidity":45,"rainfall":0,"wind_speed":1.2},
          {"date":"2024-03-02T15:01:30+00:00","air_temperature":null,"track_temperature":null,"humidity":null,"rainfall":null,"wind_speed":null},
          {"date":"2024-03-02T15:02:30+00:00","air_temperature":18.7,"track_temperature":26.4,"humidity":null,"rainfall":0,"wind_speed":1.0}
        ]"#,
    )
    .unwrap();
    let raw = RawSession {
        session_start: Some("2024-03-02T15:00:00+00:00".to_string()),
        drivers,
        laps,
        stints,
        weather,
        ..Default::default()
    };
    build_session(
        SessionKey::new(2024, "Bahrain Grand Prix", SessionKind::Race),
        LoadOptions::default(),
        raw,
    )
    .unwrap()
}

#[test]
fn test_provider_session_with_gaps_survives_the_cache() {
    let dir = TempDir::new().unwrap();
    let session = sakhir_from_records();
    assert_eq!(session.weather.len(), 1);

    let store = FileSessionCache::new(dir.path().to_path_buf()).unwrap();
    store.save(&session).unwrap();
    let cached = store.load(&session.key).unwrap();
    assert_eq!(cached.as_ref(), Some(&session));
}

#[test]
fn test_provider_session_with_gaps_is_served_offline() {
    let dir = TempDir::new().unwrap();
    let key = SessionKey::new(2024, "Bahrain Grand Prix", SessionKind::Race);
    let store = FileSessionCache::new(dir.path().to_path_buf()).unwrap();
    let online = SessionLoader::new(
        MockSessionProvider::new().with_session(sakhir_from_records()),
        store,
        LoadOptions::default(),
    );
    let first = online.load(&key).unwrap();

    let store = FileSessionCache::new(dir.path().to_path_buf()).unwrap();
    let offline = SessionLoader::new(
        MockSessionProvider::new().offline(),
        store,
        LoadOptions::default(),
    );
    assert_eq!(offline.load(&key).unwrap(), first);
    assert_eq!(offline.provider().fetch_count(), 0);
}
