//! Sample loading and caching.
//!
//! [`SampleLibrary`] resolves a sample name to a decoded [`SampleBuffer`]. Raw bytes come from a
//! [`ResourceProvider`]; the first load of a name decodes and caches it, later loads return the
//! cached buffer.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio_engine::errors::SampleLoadError;
use crate::audio_engine::sample_loader::decode_audio_bytes;
use crate::messages::SampleBuffer;

/// Source of raw sample bytes, looked up by name.
pub trait ResourceProvider: Send + Sync {
    /// Reads the resource registered under `name`.
    ///
    /// Returns [`SampleLoadError::ResourceNotFound`] when nothing matches.
    fn read(&self, name: &str) -> Result<Vec<u8>, SampleLoadError>;

    /// File extension used as a decoder hint.
    fn extension_hint(&self) -> Option<&str> {
        None
    }
}

/// Reads `<dir>/<name>.<extension>` from disk.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
    extension: String,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", self.extension))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ResourceProvider for DirectoryProvider {
    fn read(&self, name: &str) -> Result<Vec<u8>, SampleLoadError> {
        match fs::read(self.path_for(name)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(SampleLoadError::ResourceNotFound {
                    name: name.to_string(),
                })
            }
            Err(err) => Err(SampleLoadError::Io(err)),
        }
    }

    fn extension_hint(&self) -> Option<&str> {
        Some(&self.extension)
    }
}

/// Named byte blobs held in memory, e.g. assets bundled with `include_bytes!`.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.resources.insert(name.into(), bytes);
    }

    pub fn with(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl ResourceProvider for MemoryProvider {
    fn read(&self, name: &str) -> Result<Vec<u8>, SampleLoadError> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| SampleLoadError::ResourceNotFound {
                name: name.to_string(),
            })
    }
}

/// Decoded sample cache.
pub struct SampleLibrary {
    provider: Box<dyn ResourceProvider>,
    cache: Mutex<HashMap<String, SampleBuffer>>,
}

impl SampleLibrary {
    pub fn new(provider: Box<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the decoded buffer for `name`, decoding it on first use.
    ///
    /// The cache lock is not held while decoding, so loads of different names run
    /// concurrently. When two loads of the same name race, the first one cached wins and
    /// both callers get that buffer.
    pub fn load(&self, name: &str) -> Result<SampleBuffer, SampleLoadError> {
        if let Some(sample) = self.lock_cache().get(name) {
            return Ok(sample.clone());
        }

        let bytes = self.provider.read(name)?;
        let sample = decode_audio_bytes(bytes, self.provider.extension_hint())?;
        log::debug!(
            "Decoded sample {name} ({} ch@{} Hz, {} frames)",
            sample.channels,
            sample.sample_rate,
            sample.frames()
        );

        Ok(self
            .lock_cache()
            .entry(name.to_string())
            .or_insert(sample)
            .clone())
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.lock_cache().contains_key(name)
    }

    pub fn cached_count(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, SampleBuffer>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
