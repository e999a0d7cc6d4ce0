//! On-disk cache of raw session downloads

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::session::{RawLap, SessionKey, TimingError, TimingProvider};

/// Directory of raw lap tables, one JSON file per session
#[derive(Debug, Clone)]
pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    /// Open the cache, creating the directory if missing
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for a session, e.g. `2024_20_R.json`
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!(
            "{}_{:02}_{}.json",
            key.year,
            key.round,
            key.session.code()
        ))
    }

    /// Read a cached session; unreadable or corrupt entries count as misses
    pub fn read(&self, key: &SessionKey) -> Option<Vec<RawLap>> {
        let path = self.path_for(key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(laps) => Some(laps),
            Err(e) => {
                warn!("Ignoring corrupt cache entry {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn write(&self, key: &SessionKey, laps: &[RawLap]) -> io::Result<()> {
        let json = serde_json::to_string(laps).map_err(io::Error::other)?;
        fs::write(self.path_for(key), json)
    }
}

/// Timing provider that consults the cache before the wrapped provider
pub struct CachedProvider<P> {
    inner: P,
    cache: SessionCache,
}

impl<P: TimingProvider> CachedProvider<P> {
    pub fn new(inner: P, cache: SessionCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }
}

impl<P: TimingProvider> TimingProvider for CachedProvider<P> {
    fn fetch_laps(&self, key: &SessionKey) -> Result<Vec<RawLap>, TimingError> {
        if let Some(laps) = self.cache.read(key) {
            debug!("Cache hit for {}", key);
            return Ok(laps);
        }

        let laps = self.inner.fetch_laps(key)?;
        if !laps.is_empty() {
            if let Err(e) = self.cache.write(key, &laps) {
                warn!("Failed to write cache entry for {}: {}", key, e);
            }
        }
        Ok(laps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::session::SessionType;
    use std::cell::Cell;

    struct CountingProvider {
        calls: Cell<usize>,
        laps: Vec<RawLap>,
    }

    impl TimingProvider for CountingProvider {
        fn fetch_laps(&self, _key: &SessionKey) -> Result<Vec<RawLap>, TimingError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.laps.clone())
        }
    }

    fn lap(driver: &str) -> RawLap {
        RawLap {
            driver: driver.to_string(),
            lap_time: Some(75.0),
            sector1: Some(24.0),
            sector2: Some(26.0),
            sector3: Some(25.0),
        }
    }

    #[test]
    fn test_open_creates_directory_idempotently() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("f1_cache");
        SessionCache::open(&dir).unwrap();
        assert!(dir.is_dir());
        SessionCache::open(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_path_for_session() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = SessionCache::open(tmp.path()).unwrap();
        let key = SessionKey::new(2024, 7, SessionType::Qualifying);
        assert_eq!(cache.path_for(&key), tmp.path().join("2024_07_Q.json"));
    }

    #[test]
    fn test_second_fetch_served_from_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = SessionCache::open(tmp.path()).unwrap();
        let provider = CachedProvider::new(
            CountingProvider {
                calls: Cell::new(0),
                laps: vec![lap("VER"), lap("NOR")],
            },
            cache,
        );
        let key = SessionKey::new(2024, 20, SessionType::Race);

        let first = provider.fetch_laps(&key).unwrap();
        let second = provider.fetch_laps(&key).unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.inner.calls.get(), 1);
    }

    #[test]
    fn test_empty_result_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = SessionCache::open(tmp.path()).unwrap();
        let provider = CachedProvider::new(
            CountingProvider {
                calls: Cell::new(0),
                laps: Vec::new(),
            },
            cache,
        );
        let key = SessionKey::new(2024, 20, SessionType::Race);

        provider.fetch_laps(&key).unwrap();
        provider.fetch_laps(&key).unwrap();
        assert_eq!(provider.inner.calls.get(), 2);
        assert!(!provider.cache().path_for(&key).exists());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = SessionCache::open(tmp.path()).unwrap();
        let key = SessionKey::new(2023, 1, SessionType::Race);
        fs::write(cache.path_for(&key), "not json").unwrap();
        assert!(cache.read(&key).is_none());
    }
}
