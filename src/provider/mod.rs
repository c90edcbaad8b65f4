// Upstream data providers

pub mod mock;
pub mod openf1;
pub mod records;

use crate::errors::BoxboxError;
use crate::session::{EventInfo, LoadOptions, Session, SessionKey};

pub use mock::MockSessionProvider;
pub use openf1::OpenF1Provider;

/// Source of session data.
///
/// Implementations talk to an external timing service (or replay prepared
/// data) and hand back fully typed sessions. They are called from the loader
/// only, which takes care of caching.
pub trait SessionProvider: Send + Sync {
    /// Fetch one session with the channels selected in `options`.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` when the provider has no such event or session,
    /// `NetworkError` when the request itself failed.
    fn fetch_session(
        &self,
        key: &SessionKey,
        options: &LoadOptions,
    ) -> Result<Session, BoxboxError>;

    /// Calendar of a season, in round order
    fn list_events(&self, year: i32) -> Result<Vec<EventInfo>, BoxboxError>;
}
