//! Per-picture metadata from outside the image file.
//!
//! A spreadsheet exported as CSV can supply extra template variables for each
//! picture (a title, a category, a catalogue number). Rows are matched to
//! pictures by comparing one column against a key rendered from the picture
//! itself, usually `<< file_name >>`. The key template sees the same
//! variables as a description template, except `external`.
//!
//! The matched row is available to description templates as
//! `external.<column>`. When no row matched, `external` is unset and tests
//! false in `<% if external %>`.
//!
//! ```
//! use pixport_core::{CsvMetadata, ExternalMetadataSource};
//! use pixport_metadata::MetadataBag;
//! use pixport_session::User;
//!
//! let csv = "file,title\ncat.jpg,A cat\n";
//! let source = CsvMetadata::from_reader(csv.as_bytes(), "file", "<< file_name >>").unwrap();
//! let user = User::new("alice", "secret", "Alice");
//! let row = source.lookup("cat.jpg", &MetadataBag::new(), &user).unwrap();
//! assert_eq!(row["title"], "A cat");
//! ```

use crate::error::{ErrorKind, Result};
use crate::template::DescriptionTemplate;
use exn::ResultExt;
use pixport_metadata::MetadataBag;
use pixport_session::User;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// One matched row: column name to value.
pub type ExternalRow = BTreeMap<String, String>;

/// Source of extra template variables for pictures being added.
pub trait ExternalMetadataSource: Send + Sync {
    /// The row for this picture, if there is one.
    fn lookup(&self, file_name: &str, metadata: &MetadataBag, user: &User) -> Option<ExternalRow>;
}

pub type ExternalHandle = Arc<dyn ExternalMetadataSource>;

/// CSV rows indexed by one of their columns.
///
/// The first row wins when several share a key; later ones are logged and
/// ignored. Keys and looked-up values are compared with surrounding
/// whitespace trimmed.
pub struct CsvMetadata {
    column: String,
    key: DescriptionTemplate,
    rows: HashMap<String, ExternalRow>,
}

impl CsvMetadata {
    /// Reads a CSV file with a header row. Rows are matched on `column`
    /// against `key` rendered for each picture.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>, column: impl Into<String>, key: &str) -> Result<Self> {
        let reader = csv::Reader::from_path(path.as_ref()).or_raise(|| ErrorKind::ExternalMetadata)?;
        Self::from_csv(reader, column.into(), key)
    }

    /// Like [`load`](Self::load), reading CSV text from `reader`.
    pub fn from_reader(reader: impl Read, column: impl Into<String>, key: &str) -> Result<Self> {
        Self::from_csv(csv::Reader::from_reader(reader), column.into(), key)
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>, column: String, key: &str) -> Result<Self> {
        let key = DescriptionTemplate::new("external-key", "", key)?;
        let headers = reader.headers().or_raise(|| ErrorKind::ExternalMetadata)?.clone();
        let Some(position) = headers.iter().position(|header| header == column) else {
            exn::bail!(ErrorKind::UnknownColumn(column));
        };

        let mut rows = HashMap::new();
        for record in reader.records() {
            let record = record.or_raise(|| ErrorKind::ExternalMetadata)?;
            let Some(value) = record.get(position).map(str::trim) else {
                continue;
            };
            let row: ExternalRow = headers.iter().zip(record.iter()).map(|(h, v)| (h.to_string(), v.to_string())).collect();
            match rows.entry(value.to_string()) {
                Entry::Occupied(_) => tracing::warn!(column = %column, key = %value, "Duplicate row; keeping the first"),
                Entry::Vacant(entry) => {
                    entry.insert(row);
                },
            }
        }
        tracing::debug!(column = %column, rows = rows.len(), "External metadata loaded");
        Ok(Self { column, key, rows })
    }

    /// The column rows are matched on.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ExternalMetadataSource for CsvMetadata {
    fn lookup(&self, file_name: &str, metadata: &MetadataBag, user: &User) -> Option<ExternalRow> {
        let key = match self.key.render(file_name, metadata, user) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(file_name, error = %e, "Can't render external metadata key");
                return None;
            },
        };
        let row = self.rows.get(key.trim()).cloned();
        if row.is_none() {
            tracing::debug!(file_name, key = %key.trim(), "No external metadata row");
        }
        row
    }
}

impl std::fmt::Debug for CsvMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvMetadata")
            .field("column", &self.column)
            .field("key", &self.key.source())
            .field("rows", &self.rows.len())
            .finish()
    }
}
