// Session loader: memory, then disk cache, then provider

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::cache::SessionStore;
use crate::errors::BoxboxError;
use crate::provider::SessionProvider;
use crate::session::{EventInfo, LoadOptions, Session, SessionKey};

/// Loads sessions on demand and keeps them for the lifetime of the loader.
///
/// Lookups go to the in-memory map first, then to the injected store, and only
/// then to the provider. A fetched session is written back to the store.
/// Requests for the same key are serialised so that at most one fetch per key
/// is in flight; different keys load independently.
pub struct SessionLoader<P, S> {
    provider: P,
    store: S,
    options: LoadOptions,
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
    in_flight: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Loader state stays consistent even if a holder panicked
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<P: SessionProvider, S: SessionStore> SessionLoader<P, S> {
    pub fn new(provider: P, store: S, options: LoadOptions) -> Self {
        Self {
            provider,
            store,
            options,
            sessions: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Session for `key`, loading it if needed.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` or `NetworkError` from the provider. An unreadable
    /// cache entry is evicted and re-fetched rather than reported.
    pub fn load(&self, key: &SessionKey) -> Result<Arc<Session>, BoxboxError> {
        if let Some(session) = self.cached(key) {
            debug!("{} served from memory", key);
            return Ok(session);
        }

        self.with_key_lock(key, || {
            // Another request may have finished loading while we waited
            if let Some(session) = self.cached(key) {
                return Ok(session);
            }

            let session = match self.load_from_store(key) {
                Some(session) => session,
                None => self.fetch_and_store(key)?,
            };
            Ok(self.remember(session))
        })
    }

    /// Drop any cached copy and fetch the session again
    pub fn refresh(&self, key: &SessionKey) -> Result<Arc<Session>, BoxboxError> {
        self.with_key_lock(key, || {
            lock(&self.sessions).remove(key);
            if let Err(e) = self.store.evict(key) {
                warn!("Could not evict {} from cache: {}", key, e);
            }
            let session = self.fetch_and_store(key)?;
            Ok(self.remember(session))
        })
    }

    /// Session already held in memory, without touching store or provider
    pub fn cached(&self, key: &SessionKey) -> Option<Arc<Session>> {
        lock(&self.sessions).get(key).cloned()
    }

    pub fn list_events(&self, year: i32) -> Result<Vec<EventInfo>, BoxboxError> {
        self.provider.list_events(year)
    }

    /// Run `f` while holding the lock for `key`. The lock is forgotten again
    /// once no other request is waiting on it.
    fn with_key_lock<T>(&self, key: &SessionKey, f: impl FnOnce() -> T) -> T {
        let key_lock = lock(&self.in_flight)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock(&key_lock);
            f()
        };

        let mut in_flight = lock(&self.in_flight);
        // held only by the map and by us: nobody is queued behind this request
        if Arc::strong_count(&key_lock) == 2 {
            in_flight.remove(key);
        }
        result
    }

    fn remember(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        lock(&self.sessions).insert(session.key.clone(), session.clone());
        session
    }

    fn load_from_store(&self, key: &SessionKey) -> Option<Session> {
        match self.store.load(key) {
            Ok(Some(session)) if session.loaded.covers(&self.options) => {
                info!("{} loaded from cache", key);
                Some(session)
            }
            Ok(Some(_)) => {
                debug!("Cached {} lacks requested channels, fetching again", key);
                None
            }
            Ok(None) => None,
            Err(e @ BoxboxError::CacheCorrupt { .. }) => {
                warn!("{}; fetching again", e);
                if let Err(evict_error) = self.store.evict(key) {
                    warn!("Could not evict corrupt entry for {}: {}", key, evict_error);
                }
                None
            }
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", key, e);
                None
            }
        }
    }

    fn fetch_and_store(&self, key: &SessionKey) -> Result<Session, BoxboxError> {
        let session = self.provider.fetch_session(key, &self.options)?;
        // Not being able to cache only costs a re-fetch next time
        if let Err(e) = self.store.save(&session) {
            warn!("Could not cache {}: {}", key, e);
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FileSessionCache;
    use crate::provider::MockSessionProvider;
    use crate::session::test_support::{lap, session};
    use crate::session::{Compound, SessionKind};
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn loader_with(
        provider: MockSessionProvider,
        dir: &TempDir,
    ) -> SessionLoader<MockSessionProvider, FileSessionCache> {
        let store = FileSessionCache::new(dir.path().to_path_buf()).unwrap();
        SessionLoader::new(provider, store, LoadOptions::default())
    }

    fn race() -> Session {
        session(
            vec![
                lap("VER", 1, 96.0, Compound::Soft),
                lap("VER", 2, 94.1, Compound::Soft),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_second_load_served_without_fetch() {
        let dir = TempDir::new().unwrap();
        let race = race();
        let loader = loader_with(MockSessionProvider::new().with_session(race.clone()), &dir);

        let first = loader.load(&race.key).unwrap();
        let second = loader.load(&race.key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.provider().fetch_count(), 1);
    }

    #[test]
    fn test_disk_cache_survives_new_loader() {
        let dir = TempDir::new().unwrap();
        let race = race();
        {
            let loader = loader_with(MockSessionProvider::new().with_session(race.clone()), &dir);
            loader.load(&race.key).unwrap();
        }
        // offline provider: anything but a cache hit would fail
        let loader = loader_with(MockSessionProvider::new().offline(), &dir);
        let loaded = loader.load(&race.key).unwrap();
        assert_eq!(*loaded, race);
        assert_eq!(loader.provider().fetch_count(), 0);
    }

    #[test]
    fn test_corrupt_cache_falls_back_to_fetch() {
        let dir = TempDir::new().unwrap();
        let race = race();
        let loader = loader_with(MockSessionProvider::new().with_session(race.clone()), &dir);
        let path = loader.store().path_for(&race.key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "garbage\n").unwrap();

        let loaded = loader.load(&race.key).unwrap();
        assert_eq!(*loaded, race);
        assert_eq!(loader.provider().fetch_count(), 1);
        // the bad entry was replaced by a good one
        assert!(loader.store().load(&race.key).unwrap().is_some());
    }

    #[test]
    fn test_provider_errors_surface() {
        let dir = TempDir::new().unwrap();
        let key = SessionKey::new(2024, "Nowhere Grand Prix", SessionKind::Race);

        let loader = loader_with(MockSessionProvider::new(), &dir);
        assert!(matches!(
            loader.load(&key),
            Err(BoxboxError::DataUnavailable { .. })
        ));

        let loader = loader_with(MockSessionProvider::new().offline(), &dir);
        assert!(matches!(
            loader.load(&key),
            Err(BoxboxError::NetworkError { .. })
        ));
    }

    #[test]
    fn test_partial_cache_entry_is_refetched() {
        let dir = TempDir::new().unwrap();
        let mut partial = race();
        partial.loaded = LoadOptions::laps_only();
        FileSessionCache::new(dir.path().to_path_buf())
            .unwrap()
            .save(&partial)
            .unwrap();

        let loader = loader_with(MockSessionProvider::new().with_session(race()), &dir);
        let loaded = loader.load(&partial.key).unwrap();
        assert_eq!(loaded.loaded, LoadOptions::default());
        assert_eq!(loader.provider().fetch_count(), 1);
    }

    #[test]
    fn test_refresh_fetches_again() {
        let dir = TempDir::new().unwrap();
        let race = race();
        let loader = loader_with(MockSessionProvider::new().with_session(race.clone()), &dir);
        loader.load(&race.key).unwrap();
        loader.refresh(&race.key).unwrap();
        assert_eq!(loader.provider().fetch_count(), 2);
    }

    #[test]
    fn test_concurrent_loads_fetch_once() {
        let dir = TempDir::new().unwrap();
        let race = race();
        let loader = Arc::new(loader_with(
            MockSessionProvider::new().with_session(race.clone()),
            &dir,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = loader.clone();
                let key = race.key.clone();
                thread::spawn(move || loader.load(&key).map(|s| s.laps.len()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 2);
        }
        assert_eq!(loader.provider().fetch_count(), 1);
        assert!(lock(&loader.in_flight).is_empty());
    }

    #[test]
    fn test_key_locks_are_released() {
        let dir = TempDir::new().unwrap();
        let race = race();
        let loader = loader_with(MockSessionProvider::new().with_session(race.clone()), &dir);

        loader.load(&race.key).unwrap();
        assert!(lock(&loader.in_flight).is_empty());
        loader.refresh(&race.key).unwrap();
        assert!(lock(&loader.in_flight).is_empty());

        // failed loads do not leave their key behind either
        for round in 1..=3 {
            let event = format!("Round {} Grand Prix", round);
            let key = SessionKey::new(2024, event, SessionKind::Race);
            assert!(loader.load(&key).is_err());
        }
        assert!(lock(&loader.in_flight).is_empty());
    }
}
