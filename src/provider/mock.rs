use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::SessionProvider;
use crate::errors::BoxboxError;
use crate::session::{EventInfo, LoadOptions, Session, SessionKey};

/// MockSessionProvider serves prepared sessions instead of calling a timing
/// service.
///
/// This enables:
/// - Unit testing of the loader and cache without network access
/// - Offline demos from previously exported sessions
/// - Counting how often the loader actually went to the provider
#[derive(Default)]
pub struct MockSessionProvider {
    sessions: HashMap<SessionKey, Session>,
    events: HashMap<i32, Vec<EventInfo>>,
    fetches: AtomicUsize,
    offline: bool,
}

impl MockSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to serve under its own key
    pub fn with_session(mut self, session: Session) -> Self {
        self.sessions.insert(session.key.clone(), session);
        self
    }

    pub fn with_events(mut self, year: i32, events: Vec<EventInfo>) -> Self {
        self.events.insert(year, events);
        self
    }

    /// Make every request fail as if the network was down
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Number of `fetch_session` calls so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SessionProvider for MockSessionProvider {
    fn fetch_session(
        &self,
        key: &SessionKey,
        _options: &LoadOptions,
    ) -> Result<Session, BoxboxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(BoxboxError::NetworkError {
                endpoint: "mock".to_string(),
                reason: "provider is offline".to_string(),
            });
        }
        self.sessions
            .get(key)
            .cloned()
            .ok_or_else(|| BoxboxError::DataUnavailable {
                year: key.year,
                event: key.event.clone(),
                session: key.kind.to_string(),
            })
    }

    fn list_events(&self, year: i32) -> Result<Vec<EventInfo>, BoxboxError> {
        if self.offline {
            return Err(BoxboxError::NetworkError {
                endpoint: "mock".to_string(),
                reason: "provider is offline".to_string(),
            });
        }
        self.events
            .get(&year)
            .cloned()
            .ok_or(BoxboxError::DataUnavailable {
                year,
                event: "calendar".to_string(),
                session: "-".to_string(),
            })
    }
}
