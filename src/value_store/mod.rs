//! Cross-cycle counter state
//!
//! Per-second rates need the previous sample of a counter. A [`ValueStore`]
//! keeps the last `(timestamp, value)` pair per key for one monitored object;
//! [`get_rate`] reads the previous pair, stores the current one and returns
//! the delta per second.
//!
//! Per key the store moves from "absent" to "one sample" (no rate yet, the
//! call fails with [`GetRateError::Initialized`]) to "two or more samples",
//! after which every call yields a rate.
//!
//! # Examples
//!
//! ```
//! use wmilib::value_store::{get_rate, GetRateError, MemoryValueStore};
//!
//! let mut store = MemoryValueStore::new();
//! assert!(matches!(
//!     get_rate(&mut store, "DiskReads_", 10.0, 100.0, false),
//!     Err(GetRateError::Initialized { .. })
//! ));
//! assert_eq!(get_rate(&mut store, "DiskReads_", 20.0, 150.0, false).unwrap(), 5.0);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::Result;

/// Rate computation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GetRateError {
    /// First sample for this key, nothing to compare against yet
    #[error("Initialized: {key:?}")]
    Initialized { key: String },

    /// Current sample is not newer than the stored one
    #[error("No time difference: {key:?}")]
    NoTimeDifference { key: String },

    /// Counter went backwards
    #[error("Value overflow: {key:?}")]
    Overflow { key: String },
}

/// One stored counter sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample time in seconds
    pub timestamp: f64,
    pub value: f64,
}

/// Key/value state that survives between check cycles
pub trait ValueStore {
    fn get(&self, key: &str) -> Option<Sample>;
    fn set(&mut self, key: &str, sample: Sample);
}

/// Per-second rate of a monotonic counter
///
/// The current sample is stored even when no rate can be computed, so the
/// next call has something to compare against. With `raise_overflow`, a
/// counter that decreased fails with [`GetRateError::Overflow`]; otherwise
/// the negative rate is returned.
pub fn get_rate(
    store: &mut dyn ValueStore,
    key: &str,
    timestamp: f64,
    value: f64,
    raise_overflow: bool,
) -> std::result::Result<f64, GetRateError> {
    let last = store.get(key);
    store.set(key, Sample { timestamp, value });

    let last = match last {
        Some(last) => last,
        None => {
            log::debug!("Counter {:?} initialized", key);
            return Err(GetRateError::Initialized {
                key: key.to_string(),
            });
        }
    };

    if timestamp <= last.timestamp {
        return Err(GetRateError::NoTimeDifference {
            key: key.to_string(),
        });
    }

    let rate = (value - last.value) / (timestamp - last.timestamp);
    if raise_overflow && rate < 0.0 {
        return Err(GetRateError::Overflow {
            key: key.to_string(),
        });
    }
    Ok(rate)
}

/// Value store kept in memory only
#[derive(Debug, Clone, Default)]
pub struct MemoryValueStore {
    samples: HashMap<String, Sample>,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl ValueStore for MemoryValueStore {
    fn get(&self, key: &str) -> Option<Sample> {
        self.samples.get(key).copied()
    }

    fn set(&mut self, key: &str, sample: Sample) {
        self.samples.insert(key.to_string(), sample);
    }
}

/// Value store persisted as a JSON file between runs
///
/// Changes are only written by [`FileValueStore::save`].
#[derive(Debug)]
pub struct FileValueStore {
    path: PathBuf,
    inner: MemoryValueStore,
}

impl FileValueStore {
    /// Load the store at `path`
    ///
    /// A missing file starts an empty store. A file that cannot be decoded is
    /// discarded with a warning, which restarts every counter.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let samples = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, Sample>>(&content) {
                Ok(samples) => {
                    log::info!("Loaded {} counters from {}", samples.len(), path.display());
                    samples
                }
                Err(e) => {
                    log::warn!("Discarding corrupt value store {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            inner: MemoryValueStore { samples },
        })
    }

    /// Write all samples, replacing the file atomically
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.inner.samples)?)?;
        fs::rename(&tmp, &self.path)?;
        log::info!(
            "Saved {} counters to {}",
            self.inner.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ValueStore for FileValueStore {
    fn get(&self, key: &str) -> Option<Sample> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, sample: Sample) {
        self.inner.set(key, sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_initializes() {
        let mut store = MemoryValueStore::new();
        let err = get_rate(&mut store, "foo", 1.0, 10.0, false).unwrap_err();
        assert_eq!(
            err,
            GetRateError::Initialized {
                key: "foo".to_string()
            }
        );
        assert_eq!(
            store.get("foo"),
            Some(Sample {
                timestamp: 1.0,
                value: 10.0
            })
        );
    }

    #[test]
    fn test_rate_between_samples() {
        let mut store = MemoryValueStore::new();
        let _ = get_rate(&mut store, "foo", 0.0, 0.0, false);
        assert_eq!(get_rate(&mut store, "foo", 10.0, 50.0, false).unwrap(), 5.0);
        assert_eq!(get_rate(&mut store, "foo", 20.0, 150.0, false).unwrap(), 10.0);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut store = MemoryValueStore::new();
        let _ = get_rate(&mut store, "a", 0.0, 0.0, false);
        assert!(get_rate(&mut store, "b", 1.0, 1.0, false).is_err());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_no_time_difference() {
        let mut store = MemoryValueStore::new();
        let _ = get_rate(&mut store, "foo", 5.0, 1.0, false);
        assert!(matches!(
            get_rate(&mut store, "foo", 5.0, 2.0, false),
            Err(GetRateError::NoTimeDifference { .. })
        ));
    }

    #[test]
    fn test_overflow() {
        let mut store = MemoryValueStore::new();
        let _ = get_rate(&mut store, "foo", 0.0, 100.0, true);
        assert!(matches!(
            get_rate(&mut store, "foo", 1.0, 50.0, true),
            Err(GetRateError::Overflow { .. })
        ));
        // the wrapped sample is still stored
        assert_eq!(get_rate(&mut store, "foo", 2.0, 60.0, true).unwrap(), 10.0);
    }

    #[test]
    fn test_negative_rate_without_overflow_check() {
        let mut store = MemoryValueStore::new();
        let _ = get_rate(&mut store, "foo", 0.0, 100.0, false);
        assert_eq!(get_rate(&mut store, "foo", 1.0, 50.0, false).unwrap(), -50.0);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");

        let mut store = FileValueStore::open(&path).unwrap();
        let _ = get_rate(&mut store, "DiskReads_", 100.0, 1000.0, false);
        store.save().unwrap();

        let mut store = FileValueStore::open(&path).unwrap();
        assert_eq!(
            get_rate(&mut store, "DiskReads_", 110.0, 1500.0, false).unwrap(),
            50.0
        );
    }

    #[test]
    fn test_file_store_discards_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        fs::write(&path, "not json").unwrap();

        let store = FileValueStore::open(&path).unwrap();
        assert!(store.get("anything").is_none());
        assert_eq!(store.path(), path.as_path());
    }
}
