// On-disk session cache
// Sessions are stored as JSON lines under <root>/<year>/<event>/<session>.jsonl

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::BoxboxError;
use crate::session::{
    DriverInfo, Lap, LapTelemetry, LoadOptions, Session, SessionKey, WeatherSample,
};

/// Bumped whenever the record layout changes; older files are treated as corrupt
pub const CACHE_FORMAT_VERSION: u32 = 1;
const CACHE_FILE_EXTENSION: &str = "jsonl";

static TEMP_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Storage for loaded sessions, keyed by session identity
pub trait SessionStore: Send + Sync {
    /// Load a session. `Ok(None)` when nothing is stored for the key,
    /// `CacheCorrupt` when an entry exists but cannot be read.
    fn load(&self, key: &SessionKey) -> Result<Option<Session>, BoxboxError>;

    /// Store a session, replacing any previous entry for its key
    fn save(&self, session: &Session) -> Result<(), BoxboxError>;

    /// Remove the entry for a key. Removing a missing entry is not an error.
    fn evict(&self, key: &SessionKey) -> Result<(), BoxboxError>;

    /// Keys of all stored sessions
    fn list(&self) -> Result<Vec<SessionKey>, BoxboxError>;

    /// Remove every stored session, returning how many were removed
    fn clear(&self) -> Result<usize, BoxboxError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct CacheHeader {
    format_version: u32,
    key: SessionKey,
    loaded: LoadOptions,
}

#[derive(Deserialize, Debug)]
enum CacheRecord {
    Header(CacheHeader),
    Driver(DriverInfo),
    Lap(Lap),
    Telemetry(LapTelemetry),
    Weather(WeatherSample),
}

/// Borrowing twin of `CacheRecord` so that saving does not clone the session
#[derive(Serialize)]
enum CacheRecordRef<'a> {
    Header(&'a CacheHeader),
    Driver(&'a DriverInfo),
    Lap(&'a Lap),
    Telemetry(&'a LapTelemetry),
    Weather(&'a WeatherSample),
}

/// File-based implementation of the session cache
pub struct FileSessionCache {
    root: PathBuf,
}

impl FileSessionCache {
    /// Create a cache rooted at `root`, creating the directory if needed
    pub fn new(root: PathBuf) -> Result<Self, BoxboxError> {
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| BoxboxError::CacheIOError { source: e })?;
        }
        Ok(Self { root })
    }

    /// Create a cache in the platform cache directory
    pub fn new_default() -> Result<Self, BoxboxError> {
        Self::new(Self::default_root()?)
    }

    pub fn default_root() -> Result<PathBuf, BoxboxError> {
        let cache_dir = dirs::cache_dir().ok_or(BoxboxError::NoConfigDir)?;
        Ok(cache_dir.join("boxbox"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the entry for a key
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.root
            .join(key.year.to_string())
            .join(key.normalized_event())
            .join(format!(
                "{}.{}",
                key.kind.code().to_lowercase(),
                CACHE_FILE_EXTENSION
            ))
    }

    fn write_atomically(&self, path: &Path, session: &Session) -> Result<(), BoxboxError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BoxboxError::CacheIOError { source: e })?;
        }

        // Concurrent writers each get their own temporary file, the last
        // rename wins
        let temp_path = path.with_extension(format!(
            "{}.{}.{}.tmp",
            CACHE_FILE_EXTENSION,
            std::process::id(),
            TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let header = CacheHeader {
            format_version: CACHE_FORMAT_VERSION,
            key: session.key.clone(),
            loaded: session.loaded,
        };
        let records = std::iter::once(CacheRecordRef::Header(&header))
            .chain(session.drivers.iter().map(CacheRecordRef::Driver))
            .chain(session.laps.iter().map(CacheRecordRef::Lap))
            .chain(session.telemetry.iter().map(CacheRecordRef::Telemetry))
            .chain(session.weather.iter().map(CacheRecordRef::Weather));

        if let Err(e) = serde_jsonlines::write_json_lines(&temp_path, records) {
            let _ = fs::remove_file(&temp_path);
            return Err(BoxboxError::CacheIOError { source: e });
        }

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            BoxboxError::CacheIOError { source: e }
        })
    }

    fn read_header(path: &Path) -> Option<CacheHeader> {
        let file = File::open(path).ok()?;
        let mut first_line = String::new();
        BufReader::new(file).read_line(&mut first_line).ok()?;
        match serde_json::from_str::<CacheRecord>(&first_line) {
            Ok(CacheRecord::Header(header)) => Some(header),
            _ => None,
        }
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, BoxboxError> {
        let mut files = Vec::new();
        for year_dir in read_dir_paths(&self.root)? {
            if !year_dir.is_dir() {
                continue;
            }
            for event_dir in read_dir_paths(&year_dir)? {
                if !event_dir.is_dir() {
                    continue;
                }
                for file in read_dir_paths(&event_dir)? {
                    if file.extension().and_then(|e| e.to_str()) == Some(CACHE_FILE_EXTENSION) {
                        files.push(file);
                    }
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>, BoxboxError> {
    let entries = fs::read_dir(dir).map_err(|e| BoxboxError::CacheIOError { source: e })?;
    Ok(entries.flatten().map(|entry| entry.path()).collect())
}

/// Read a session from a cache file. Used for cache lookups and for opening
/// exported session files directly.
pub fn read_session_file(path: &Path) -> Result<Session, BoxboxError> {
    if !path.exists() {
        return Err(BoxboxError::InvalidSessionFile {
            path: format!("{:?}", path),
        });
    }

    let corrupt = |reason: String| BoxboxError::CacheCorrupt {
        path: path.display().to_string(),
        reason,
    };

    let records = serde_jsonlines::json_lines(path)
        .map_err(|e| corrupt(e.to_string()))?
        .collect::<Result<Vec<CacheRecord>, io::Error>>()
        .map_err(|e| corrupt(e.to_string()))?;

    let mut records = records.into_iter();
    let header = match records.next() {
        Some(CacheRecord::Header(header)) => header,
        _ => return Err(corrupt("missing header record".to_string())),
    };
    if header.format_version != CACHE_FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {} is not supported",
            header.format_version
        )));
    }

    let mut drivers = Vec::new();
    let mut laps = Vec::new();
    let mut telemetry = Vec::new();
    let mut weather = Vec::new();
    for record in records {
        match record {
            CacheRecord::Header(_) => return Err(corrupt("duplicate header record".to_string())),
            CacheRecord::Driver(driver) => drivers.push(driver),
            CacheRecord::Lap(lap) => laps.push(lap),
            CacheRecord::Telemetry(trace) => telemetry.push(trace),
            CacheRecord::Weather(sample) => weather.push(sample),
        }
    }

    Session::new(header.key, header.loaded, drivers, laps, telemetry, weather)
        .map_err(|e| corrupt(e.to_string()))
}

/// Write a session to an arbitrary file in the cache format
pub fn write_session_file(path: &Path, session: &Session) -> Result<(), BoxboxError> {
    let cache = FileSessionCache {
        root: path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    cache.write_atomically(path, session)
}

impl SessionStore for FileSessionCache {
    fn load(&self, key: &SessionKey) -> Result<Option<Session>, BoxboxError> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!("No cache entry for {} at {:?}", key, path);
            return Ok(None);
        }

        let session = read_session_file(&path)?;
        if session.key != *key {
            // Two event spellings normalising to the same path
            return Err(BoxboxError::CacheCorrupt {
                path: path.display().to_string(),
                reason: format!("entry belongs to {}", session.key),
            });
        }
        debug!("Loaded {} from cache", key);
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<(), BoxboxError> {
        let path = self.path_for(&session.key);
        self.write_atomically(&path, session)?;
        info!("Cached {} at {:?}", session.key, path);
        Ok(())
    }

    fn evict(&self, key: &SessionKey) -> Result<(), BoxboxError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Evicted cache entry {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BoxboxError::CacheIOError { source: e }),
        }
    }

    fn list(&self) -> Result<Vec<SessionKey>, BoxboxError> {
        let mut keys = Vec::new();
        for file in self.entry_files()? {
            match Self::read_header(&file) {
                Some(header) => keys.push(header.key),
                None => warn!("Skipping unreadable cache entry {:?}", file),
            }
        }
        Ok(keys)
    }

    fn clear(&self) -> Result<usize, BoxboxError> {
        let files = self.entry_files()?;
        for file in &files {
            fs::remove_file(file).map_err(|e| BoxboxError::CacheIOError { source: e })?;
        }
        info!("Removed {} cached sessions from {:?}", files.len(), self.root);
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{lap, session, trace};
    use crate::session::{Compound, SessionKind};
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_session() -> Session {
        session(
            vec![
                lap("VER", 1, 95.2, Compound::Soft),
                lap("VER", 2, 93.4, Compound::Soft),
                lap("LEC", 1, 95.9, Compound::Medium),
            ],
            vec![trace("VER", 2, 50, 250.)],
        )
    }

    #[test]
    fn test_cache_path_layout() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSessionCache::new(temp_dir.path().to_path_buf()).unwrap();
        let key = SessionKey::new(2024, "Bahrain Grand Prix", SessionKind::Qualifying);
        assert_eq!(
            cache.path_for(&key),
            temp_dir
                .path()
                .join("2024")
                .join("bahrain_grand_prix")
                .join("qualifying.jsonl")
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSessionCache::new(temp_dir.path().to_path_buf()).unwrap();
        let session = sample_session();

        assert!(cache.load(&session.key).unwrap().is_none());
        cache.save(&session).unwrap();

        let loaded = cache.load(&session.key).unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(cache.list().unwrap(), vec![session.key.clone()]);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSessionCache::new(temp_dir.path().to_path_buf()).unwrap();
        let session = sample_session();
        cache.save(&session).unwrap();

        let dir = cache.path_for(&session.key).parent().unwrap().to_path_buf();
        let names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["race.jsonl".to_string()]);
    }

    #[test]
    fn test_corrupt_entry_reported() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSessionCache::new(temp_dir.path().to_path_buf()).unwrap();
        let session = sample_session();
        let path = cache.path_for(&session.key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{{\"Lap\": 12").unwrap();

        assert!(matches!(
            cache.load(&session.key),
            Err(BoxboxError::CacheCorrupt { .. })
        ));
    }

    #[test]
    fn test_missing_header_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.jsonl");
        serde_jsonlines::write_json_lines(
            &path,
            [CacheRecordRef::Lap(&lap("VER", 1, 90., Compound::Soft))],
        )
        .unwrap();
        assert!(matches!(
            read_session_file(&path),
            Err(BoxboxError::CacheCorrupt { .. })
        ));
    }

    #[test]
    fn test_evict_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSessionCache::new(temp_dir.path().to_path_buf()).unwrap();
        let session = sample_session();
        cache.save(&session).unwrap();
        cache.evict(&session.key).unwrap();
        assert!(cache.load(&session.key).unwrap().is_none());
        // evicting twice is fine
        cache.evict(&session.key).unwrap();

        cache.save(&session).unwrap();
        let mut other = session.clone();
        other.key = SessionKey::new(2023, "Monaco Grand Prix", SessionKind::Race);
        cache.save(&other).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.list().unwrap().is_empty());
    }

    #[test]
    fn test_missing_session_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            read_session_file(&temp_dir.path().join("nope.jsonl")),
            Err(BoxboxError::InvalidSessionFile { .. })
        ));
    }
}
