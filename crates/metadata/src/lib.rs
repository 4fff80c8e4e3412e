//! Image metadata extraction.
//!
//! Turns an image file into a [`MetadataBag`] (`directory -> tag -> value`)
//! plus the raw bytes of its embedded thumbnail. Extraction is synchronous
//! and blocking; async callers are expected to run it on a blocking thread.

mod bag;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod reader;

pub use crate::bag::{Directory, MetadataBag, sanitize_tag};
#[cfg(feature = "mock")]
pub use crate::mock::MockExtractor;
pub use crate::reader::{
    ExifExtractor, FILE_DIRECTORY, GPS_DIRECTORY, IFD0_DIRECTORY, INTEROP_DIRECTORY, SUB_IFD_DIRECTORY,
    THUMBNAIL_DIRECTORY,
};
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;

pub type ExtractorHandle = Arc<dyn MetadataExtractor>;

/// The result of a successful extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub metadata: MetadataBag,
    /// Embedded thumbnail (usually JPEG); empty when the image has none.
    pub thumbnail: Vec<u8>,
}

/// Pure function from a file to its metadata and thumbnail.
///
/// Implementations must be callable from many threads at once; failures are
/// per file and carry the offending path.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Extracted>;
}
