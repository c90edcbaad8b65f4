// Library interface for boxbox
// The binary and the integration tests both go through these modules

pub mod analysis;
pub mod cache;
pub mod config;
pub mod errors;
pub mod loader;
pub mod predictor;
pub mod provider;
pub mod session;
pub mod ui;

// Re-export commonly used types
pub use cache::{FileSessionCache, SessionStore};
pub use config::AppConfig;
pub use errors::BoxboxError;
pub use loader::SessionLoader;
pub use provider::{MockSessionProvider, OpenF1Provider, SessionProvider};
pub use session::{Compound, Lap, Session, SessionKey, SessionKind};
