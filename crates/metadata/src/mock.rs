//! Scripted extractor for testing.

use crate::bag::MetadataBag;
use crate::error::{ErrorKind, Result};
use crate::{Extracted, MetadataExtractor};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// In-memory extractor for testing.
///
/// Every path extracts successfully (with a `File` directory holding the file
/// name) unless it was scripted to fail. Each call is recorded so tests can
/// assert that every file was attempted exactly once.
///
/// # Examples
///
/// ```
/// use pixport_metadata::{MetadataExtractor, MockExtractor};
/// use std::path::Path;
///
/// let extractor = MockExtractor::default().failing("/photos/corrupt.jpg");
/// assert!(extractor.extract(Path::new("/photos/ok.jpg")).is_ok());
/// assert!(extractor.extract(Path::new("/photos/corrupt.jpg")).is_err());
/// assert_eq!(extractor.calls().len(), 2);
/// ```
#[derive(Default)]
pub struct MockExtractor {
    failing: HashSet<PathBuf>,
    scripted: HashMap<PathBuf, Extracted>,
    calls: Mutex<Vec<PathBuf>>,
}

impl MockExtractor {
    /// Makes extraction of `path` fail with [`ErrorKind::UnreadableImage`].
    pub fn failing(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Returns exactly this metadata and thumbnail for `path`.
    pub fn with(mut self, path: impl Into<PathBuf>, metadata: MetadataBag, thumbnail: impl Into<Vec<u8>>) -> Self {
        self.scripted.insert(path.into(), Extracted { metadata, thumbnail: thumbnail.into() });
        self
    }

    /// Every path passed to [`extract`](MetadataExtractor::extract), in call order.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl MetadataExtractor for MockExtractor {
    fn extract(&self, path: &Path) -> Result<Extracted> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(path.to_path_buf());
        if self.failing.contains(path) {
            exn::bail!(ErrorKind::UnreadableImage(path.to_path_buf()));
        }
        if let Some(extracted) = self.scripted.get(path) {
            return Ok(extracted.clone());
        }
        let mut metadata = MetadataBag::new();
        if let Some(name) = path.file_name() {
            metadata.insert(crate::reader::FILE_DIRECTORY, "FileName", name.to_string_lossy());
        }
        Ok(Extracted { metadata, thumbnail: Vec::new() })
    }
}
