//! Parallel ingestion of image files into [`Picture`]s.
//!
//! Each file is extracted on its own blocking task, bounded by the shared
//! [`WorkerPool`]. [`Ingestor::ingest`] only returns once every file has been
//! attempted; unreadable files are logged and left out of the result.
//!
//! With [`Ingestor::ingest_with`], each picture is also matched against an
//! [`ExternalMetadataSource`](crate::ExternalMetadataSource) before its
//! description is rendered.

use crate::external::ExternalHandle;
use crate::picture::Picture;
use crate::pool::WorkerPool;
use crate::template::DescriptionTemplate;
use pixport_metadata::ExtractorHandle;
use pixport_session::User;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::instrument;

#[derive(Clone)]
pub struct Ingestor {
    pool: WorkerPool,
    extractor: ExtractorHandle,
}

impl Ingestor {
    pub fn new(pool: WorkerPool, extractor: ExtractorHandle) -> Self {
        Self { pool, extractor }
    }

    /// Extracts and renders every file, returning one picture per readable
    /// file in input order. Duplicate paths are attempted once.
    pub async fn ingest<P: AsRef<Path>>(
        &self,
        files: impl IntoIterator<Item = P>,
        template: &Arc<DescriptionTemplate>,
        user: &User,
    ) -> Vec<Arc<Picture>> {
        self.ingest_with(files, template, user, None).await
    }

    /// Like [`ingest`](Self::ingest), attaching each picture's row from
    /// `external` (if any) before rendering its description.
    #[instrument(skip_all, fields(template = %template.name(), user = %user.login, external = external.is_some()))]
    pub async fn ingest_with<P: AsRef<Path>>(
        &self,
        files: impl IntoIterator<Item = P>,
        template: &Arc<DescriptionTemplate>,
        user: &User,
        external: Option<ExternalHandle>,
    ) -> Vec<Arc<Picture>> {
        let files = normalize(files);
        if files.is_empty() {
            return Vec::new();
        }
        let requested = files.len();
        tracing::debug!(files = requested, workers = self.pool.size(), "Ingesting files");

        let mut tasks = JoinSet::new();
        for (index, path) in files.into_iter().enumerate() {
            let pool = self.pool.clone();
            let extractor = Arc::clone(&self.extractor);
            let template = Arc::clone(template);
            let external = external.clone();
            let user = user.clone();
            tasks.spawn(async move { (index, read_picture(pool, extractor, path, template, external, &user).await) });
        }

        // The join set is the barrier: nothing is returned until every file
        // has either produced a picture or been skipped.
        let mut pictures = Vec::with_capacity(requested);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Some(picture))) => pictures.push((index, picture)),
                Ok((_, None)) => {},
                Err(e) => tracing::warn!(error = %e, "Ingestion task panicked"),
            }
        }
        pictures.sort_by_key(|(index, _)| *index);
        tracing::info!(requested, ingested = pictures.len(), "Ingestion complete");
        pictures.into_iter().map(|(_, picture)| picture).collect()
    }
}

async fn read_picture(
    pool: WorkerPool,
    extractor: ExtractorHandle,
    path: PathBuf,
    template: Arc<DescriptionTemplate>,
    external: Option<ExternalHandle>,
    user: &User,
) -> Option<Arc<Picture>> {
    let Some(_permit) = pool.acquire().await else {
        tracing::warn!(path = %path.display(), "Worker pool closed; skipping file");
        return None;
    };
    let extracted = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&path)).await
    };
    let extracted = match extracted {
        Ok(Ok(extracted)) => extracted,
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "Can't read image metadata; skipping file");
            return None;
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Metadata extraction panicked; skipping file");
            return None;
        },
    };
    let mut picture = Picture::new(path, template, extracted);
    if let Some(source) = external {
        let row = source.lookup(picture.file_name(), picture.metadata(), user);
        picture = picture.with_external(row);
    }
    if let Err(e) = picture.render(user) {
        tracing::warn!(path = %picture.path().display(), error = %e, "Can't render description; keeping picture");
    }
    Some(Arc::new(picture))
}

/// Absolute, de-duplicated paths in first-seen order. Paths that can't be
/// made absolute are logged and dropped.
pub(crate) fn normalize<P: AsRef<Path>>(files: impl IntoIterator<Item = P>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter_map(|file| match std::path::absolute(file.as_ref()) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(path = %file.as_ref().display(), error = %e, "Can't resolve path; skipping file");
                None
            },
        })
        .filter(|path| seen.insert(path.clone()))
        .collect()
}
