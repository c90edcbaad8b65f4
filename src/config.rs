use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::{
    DEFAULT_ALIGNMENT_POINTS, DEFAULT_QUICK_LAP_THRESHOLD, DEFAULT_ROLLING_WINDOW,
};
use crate::errors::BoxboxError;
use crate::provider::openf1::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_S};
use crate::session::{LoadOptions, SessionKey, SessionKind};

const APP_DIR_NAME: &str = "boxbox";
const CONFIG_FILE_NAME: &str = "config.json";

/// The session picked last in the dashboard, restored on the next start
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LastSelection {
    pub year: i32,
    pub event: String,
    pub session: SessionKind,
    pub driver_a: Option<String>,
    pub driver_b: Option<String>,
}

impl LastSelection {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.year, self.event.clone(), self.session)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,
    pub api_base_url: String,
    pub request_timeout_s: u64,
    pub rolling_window: usize,
    pub alignment_points: usize,
    pub quick_lap_threshold: f64,
    pub load_options: LoadOptions,
    pub last_selection: Option<LastSelection>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_s: DEFAULT_TIMEOUT_S,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            alignment_points: DEFAULT_ALIGNMENT_POINTS,
            quick_lap_threshold: DEFAULT_QUICK_LAP_THRESHOLD,
            load_options: LoadOptions::default(),
            last_selection: None,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        Some(
            dirs::config_dir()?
                .join(APP_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        )
    }

    /// Config from the user's config directory, defaults when there is none
    pub fn from_local_file() -> Result<Self, BoxboxError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, BoxboxError> {
        let file = File::open(path).map_err(|e| BoxboxError::ConfigIOError { source: e })?;
        serde_json::from_reader(file).map_err(|e| BoxboxError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), BoxboxError> {
        let config_path = Self::default_path().ok_or(BoxboxError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), BoxboxError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BoxboxError::ConfigIOError { source: e })?;
        }
        let file = File::create(path).map_err(|e| BoxboxError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| BoxboxError::ConfigSerializeError { source: e })?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s)
    }

    /// Reject values the analysis code cannot work with
    pub fn validate(&self) -> Result<(), BoxboxError> {
        let invalid = |field: &str, reason: &str| {
            Err(BoxboxError::InvalidUserInput {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.rolling_window == 0 {
            return invalid("rolling_window", "must be at least 1");
        }
        if self.alignment_points < 2 {
            return invalid("alignment_points", "must be at least 2");
        }
        if self.quick_lap_threshold.is_nan() || self.quick_lap_threshold < 1. {
            return invalid("quick_lap_threshold", "must be 1.0 or more");
        }
        if self.request_timeout_s == 0 {
            return invalid("request_timeout_s", "must be at least 1 second");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = AppConfig {
            rolling_window: 5,
            last_selection: Some(LastSelection {
                year: 2024,
                event: "Monaco Grand Prix".to_string(),
                session: SessionKind::Qualifying,
                driver_a: Some("LEC".to_string()),
                driver_b: None,
            }),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.last_selection.unwrap().key().kind, SessionKind::Qualifying);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "rolling_window": 7 }"#).unwrap();
        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.rolling_window, 7);
        assert_eq!(loaded.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(loaded.load_options, LoadOptions::default());
    }

    #[test]
    fn test_unparseable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(BoxboxError::ConfigSerializeError { .. })
        ));
    }

    #[test]
    fn test_validation() {
        assert!(AppConfig::default().validate().is_ok());
        let config = AppConfig {
            rolling_window: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BoxboxError::InvalidUserInput { .. })
        ));
        let config = AppConfig {
            quick_lap_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
