//! Picture ingestion and batch upload orchestration.
//!
//! [`Core`] owns the picture set and the active session. Files are turned
//! into [`Picture`]s by the [`Ingestor`] (metadata extraction plus a rendered
//! description, many files at once), and uploaded by the [`Uploader`], which
//! fans a batch out over a bounded [`WorkerPool`], tracks every in-flight
//! task for cancellation, and tears the session down once the batch is over.
//! Progress is reported through [`Event`]s to any number of [`Observer`]s.
//! Pictures can pick up extra template variables from an
//! [`ExternalMetadataSource`] such as a [`CsvMetadata`] spreadsheet.

pub mod error;
mod events;
mod external;
mod ingest;
mod manager;
mod picture;
mod pool;
mod template;
mod upload;

pub use crate::events::{Event, Observer, observer_fn};
pub use crate::external::{CsvMetadata, ExternalHandle, ExternalMetadataSource, ExternalRow};
pub use crate::ingest::Ingestor;
pub use crate::manager::{Core, CoreBuilder};
pub use crate::picture::{Picture, PictureState};
pub use crate::pool::WorkerPool;
pub use crate::template::{DEFAULT_TEMPLATE, DescriptionTemplate};
pub use crate::upload::{BatchReport, DEFAULT_SUMMARY, TaskHandle, TaskRegistry, Uploader};
