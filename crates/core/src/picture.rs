use crate::error::Result;
use crate::external::ExternalRow;
use crate::template::DescriptionTemplate;
use pixport_metadata::{Extracted, MetadataBag};
use pixport_session::{UploadItem, User};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureState {
    Pending,
    UploadedSuccessfully,
    FailedUpload,
}

impl PictureState {
    /// `UploadedSuccessfully` is terminal; every other move is allowed.
    fn can_become(self, next: PictureState) -> bool {
        self != PictureState::UploadedSuccessfully || next == PictureState::UploadedSuccessfully
    }
}

/// One image file queued for upload.
///
/// Identified by its absolute path. Metadata and thumbnail are fixed at
/// ingestion; the description is re-rendered whenever the active user
/// changes, and the state moves as uploads succeed or fail. Pictures are
/// shared between the orchestrator, running tasks and observers as
/// `Arc<Picture>`, so both mutable parts sit behind locks.
pub struct Picture {
    path: PathBuf,
    file_name: String,
    template: Arc<DescriptionTemplate>,
    metadata: MetadataBag,
    thumbnail: Vec<u8>,
    external: Option<ExternalRow>,
    description: RwLock<String>,
    state: Mutex<PictureState>,
}

impl Picture {
    /// A `Pending` picture with an empty description; see [`render`](Self::render).
    pub fn new(path: impl Into<PathBuf>, template: Arc<DescriptionTemplate>, extracted: Extracted) -> Self {
        let path = path.into();
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Self {
            path,
            file_name,
            template,
            metadata: extracted.metadata,
            thumbnail: extracted.thumbnail,
            external: None,
            description: RwLock::new(String::new()),
            state: Mutex::new(PictureState::Pending),
        }
    }

    /// Attaches the row matched in an external metadata source.
    pub fn with_external(mut self, external: Option<ExternalRow>) -> Self {
        self.external = external;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn template(&self) -> &Arc<DescriptionTemplate> {
        &self.template
    }

    pub fn metadata(&self) -> &MetadataBag {
        &self.metadata
    }

    pub fn external(&self) -> Option<&ExternalRow> {
        self.external.as_ref()
    }

    /// Embedded JPEG thumbnail; empty if the file has none.
    pub fn thumbnail(&self) -> &[u8] {
        &self.thumbnail
    }

    pub fn description(&self) -> String {
        self.description.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn state(&self) -> PictureState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_uploaded(&self) -> bool {
        self.state() == PictureState::UploadedSuccessfully
    }

    /// Moves to `next`, refusing to leave `UploadedSuccessfully`. Returns
    /// whether the state was changed.
    pub(crate) fn set_state(&self, next: PictureState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_become(next) {
            tracing::warn!(path = %self.path.display(), from = ?*state, to = ?next, "Refusing picture state change");
            return false;
        }
        *state = next;
        true
    }

    /// Re-renders the description for `user`. On failure the previous
    /// description is kept.
    pub fn render(&self, user: &User) -> Result<()> {
        let text = self.template.render_with(&self.file_name, &self.metadata, self.external.as_ref(), user)?;
        *self.description.write().unwrap_or_else(PoisonError::into_inner) = text;
        Ok(())
    }

    /// Snapshot handed to a [`Session`](pixport_session::Session).
    pub fn upload_item(&self, summary: &str) -> UploadItem {
        UploadItem {
            path: self.path.clone(),
            file_name: self.file_name.clone(),
            description: self.description(),
            summary: summary.to_string(),
        }
    }
}

impl std::fmt::Debug for Picture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Picture")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("template", &self.template.name())
            .field("thumbnail", &self.thumbnail.len())
            .finish_non_exhaustive()
    }
}
