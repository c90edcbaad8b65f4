use std::time::Duration;

use log::{debug, info};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;

use super::SessionProvider;
use super::records::{
    CarDataRecord, DriverRecord, LapRecord, LocationRecord, MeetingRecord, PitRecord, RawSession,
    SessionRecord, StintRecord, WeatherRecord, build_session, events_from_meetings, match_event,
};
use crate::errors::BoxboxError;
use crate::session::{EventInfo, LoadOptions, Session, SessionKey};

pub const DEFAULT_BASE_URL: &str = "https://api.openf1.org/v1";
pub const DEFAULT_TIMEOUT_S: u64 = 30;

/// Client for the public OpenF1 timing API
pub struct OpenF1Provider {
    client: Client,
    base_url: String,
}

impl OpenF1Provider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BoxboxError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("boxbox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Query one endpoint. The API answers 404 when a filter matches nothing,
    /// which is reported here as an empty result.
    fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BoxboxError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, query);
        let response = self.client.get(&url).query(query).send()?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(BoxboxError::NetworkError {
                endpoint: endpoint.to_string(),
                reason: format!("server answered {}", status),
            });
        }

        response
            .json::<Vec<T>>()
            .map_err(|e| BoxboxError::NetworkError {
                endpoint: endpoint.to_string(),
                reason: format!("could not decode response: {}", e),
            })
    }

    fn unavailable(key: &SessionKey) -> BoxboxError {
        BoxboxError::DataUnavailable {
            year: key.year,
            event: key.event.clone(),
            session: key.kind.to_string(),
        }
    }

    fn meetings(&self, year: i32) -> Result<Vec<MeetingRecord>, BoxboxError> {
        self.get("meetings", &[("year", year.to_string())])
    }

    /// Find the provider's session record for a key
    fn resolve_session(&self, key: &SessionKey) -> Result<SessionRecord, BoxboxError> {
        let events = events_from_meetings(self.meetings(key.year)?);
        let event = match_event(&events, &key.event).ok_or_else(|| Self::unavailable(key))?;

        let sessions: Vec<SessionRecord> =
            self.get("sessions", &[("meeting_key", event.meeting_key.to_string())])?;
        sessions
            .into_iter()
            .find(|s| {
                s.meeting_key == event.meeting_key
                    && key
                        .kind
                        .provider_names()
                        .iter()
                        .any(|name| name.eq_ignore_ascii_case(&s.session_name))
            })
            .ok_or_else(|| Self::unavailable(key))
    }
}

impl SessionProvider for OpenF1Provider {
    fn fetch_session(
        &self,
        key: &SessionKey,
        options: &LoadOptions,
    ) -> Result<Session, BoxboxError> {
        let session = self.resolve_session(key)?;
        let session_key = session.session_key.to_string();
        let by_session = [("session_key", session_key.clone())];
        info!("Fetching {} (session key {})", key, session_key);

        let laps: Vec<LapRecord> = self.get("laps", &by_session)?;
        if laps.is_empty() {
            return Err(Self::unavailable(key));
        }
        let drivers: Vec<DriverRecord> = self.get("drivers", &by_session)?;

        let mut raw = RawSession {
            session_start: session.date_start,
            drivers,
            laps,
            stints: self.get::<StintRecord>("stints", &by_session)?,
            pits: self.get::<PitRecord>("pit", &by_session)?,
            ..Default::default()
        };

        if options.telemetry {
            for driver in &raw.drivers {
                let by_driver = [
                    ("session_key", session_key.clone()),
                    ("driver_number", driver.driver_number.to_string()),
                ];
                raw.car_data
                    .extend(self.get::<CarDataRecord>("car_data", &by_driver)?);
                if options.positions {
                    raw.locations
                        .extend(self.get::<LocationRecord>("location", &by_driver)?);
                }
            }
        }
        if options.weather {
            raw.weather = self.get::<WeatherRecord>("weather", &by_session)?;
        }

        info!(
            "Fetched {}: {} drivers, {} laps, {} car data samples",
            key,
            raw.drivers.len(),
            raw.laps.len(),
            raw.car_data.len()
        );
        build_session(key.clone(), *options, raw)
    }

    fn list_events(&self, year: i32) -> Result<Vec<EventInfo>, BoxboxError> {
        let events = events_from_meetings(self.meetings(year)?);
        if events.is_empty() {
            return Err(BoxboxError::DataUnavailable {
                year,
                event: "calendar".to_string(),
                session: "-".to_string(),
            });
        }
        Ok(events)
    }
}
