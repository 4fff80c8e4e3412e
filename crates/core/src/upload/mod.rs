//! Batch upload orchestration.
//!
//! [`Uploader::upload_all`] fans a batch of pictures out over the shared
//! [`WorkerPool`], waits for all of them, then tears the batch down: the
//! session is logged out and [`Event::UploadDone`] is emitted, exactly once,
//! however the batch ended.

mod registry;
mod task;

pub use crate::upload::registry::{TaskHandle, TaskRegistry};
use crate::events::{Event, Notifier};
use crate::picture::Picture;
use crate::pool::WorkerPool;
use crate::upload::registry::Registration;
use crate::upload::task::{Outcome, UploadTask};
use pixport_session::SessionHandle;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Edit summary sent with every upload unless overridden.
pub const DEFAULT_SUMMARY: &str = "Uploaded with pixport";

/// What happened to one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Tasks submitted (pictures that weren't already uploaded).
    pub submitted: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// Tasks that ended through [`abort`](Uploader::abort) or an interrupt.
    /// Those cancelled mid-transfer were also reported as
    /// [`TransferFailed`](Event::TransferFailed).
    pub cancelled: usize,
    /// Tasks that panicked; their pictures keep their previous state.
    pub crashed: usize,
    /// The wait was interrupted and the remaining tasks were cancelled.
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct Uploader {
    pool: WorkerPool,
    registry: TaskRegistry,
    notifier: Notifier,
    summary: Arc<str>,
}

impl Uploader {
    pub(crate) fn new(pool: WorkerPool, notifier: Notifier) -> Self {
        Self {
            pool,
            registry: TaskRegistry::default(),
            notifier,
            summary: Arc::from(DEFAULT_SUMMARY),
        }
    }

    pub(crate) fn with_summary(mut self, summary: impl AsRef<str>) -> Self {
        self.summary = Arc::from(summary.as_ref());
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Uploads every picture that isn't already uploaded through `session`,
    /// then logs the session out and emits [`Event::UploadDone`].
    ///
    /// Cancelling `interrupt` stops the wait: every task still in flight is
    /// cancelled and drained before teardown, and the report is marked
    /// [`interrupted`](BatchReport::interrupted). Dropping the returned future
    /// cancels the remaining tasks and still tears the batch down.
    #[instrument(skip_all, fields(site = %session.site().key))]
    pub async fn upload_all(
        &self,
        pictures: &[Arc<Picture>],
        session: SessionHandle,
        interrupt: &CancellationToken,
    ) -> BatchReport {
        let teardown = Teardown::new(Arc::clone(&session), self.notifier.clone());
        let pending: Vec<Arc<Picture>> = pictures.iter().filter(|p| !p.is_uploaded()).cloned().collect();
        tracing::info!(pictures = pending.len(), site = %session.site().name, "Upload starting");
        self.notifier.notify(Event::UploadStarting(pending.clone()));

        let mut report = BatchReport::default();
        let mut handles = Vec::with_capacity(pending.len());
        let login = Arc::new(Mutex::new(()));
        // Aborting the join set on drop cancels whatever is still in flight.
        let mut tasks = JoinSet::new();
        for picture in pending {
            let Some(handle) = self.registry.register(picture.path()) else {
                tracing::warn!(path = %picture.path().display(), "Upload already in flight; skipping");
                continue;
            };
            handles.push(handle.clone());
            let task = UploadTask {
                registration: Registration::new(self.registry.clone(), picture.path().to_path_buf(), handle),
                picture,
                session: Arc::clone(&session),
                login: Arc::clone(&login),
                pool: self.pool.clone(),
                notifier: self.notifier.clone(),
                summary: Arc::clone(&self.summary),
            };
            tasks.spawn(task.run());
            report.submitted += 1;
        }

        loop {
            tokio::select! {
                biased;
                _ = interrupt.cancelled(), if !report.interrupted => {
                    report.interrupted = true;
                    let cancelled = handles.iter().filter(|h| h.cancel()).count();
                    tracing::warn!(cancelled, "Interrupted while waiting for uploads; cancelling the rest");
                },
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Outcome::Uploaded)) => report.uploaded += 1,
                    Some(Ok(Outcome::Failed)) => report.failed += 1,
                    Some(Ok(Outcome::Cancelled)) => report.cancelled += 1,
                    Some(Err(e)) if e.is_cancelled() => report.cancelled += 1,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Upload task panicked");
                        report.crashed += 1;
                    },
                },
            }
        }

        teardown.finish().await;
        tracing::info!(
            uploaded = report.uploaded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Upload done"
        );
        report
    }

    /// Cancels every in-flight task that hasn't started committing its
    /// result, and returns how many were cancelled. A no-op when idle.
    pub fn abort(&self) -> usize {
        let cancelled = self.registry.abort();
        if cancelled > 0 {
            tracing::info!(cancelled, "Aborted uploads");
        }
        cancelled
    }
}

/// End-of-batch logout and [`Event::UploadDone`], run exactly once.
///
/// Normally driven by [`finish`](Self::finish). If the batch future is
/// dropped first, the logout is moved to a background task instead.
struct Teardown {
    session: Option<SessionHandle>,
    notifier: Notifier,
}

impl Teardown {
    fn new(session: SessionHandle, notifier: Notifier) -> Self {
        Self { session: Some(session), notifier }
    }

    async fn finish(mut self) {
        if let Some(session) = self.session.take() {
            logout(&session).await;
            self.notifier.notify(Event::UploadDone);
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::warn!("Upload batch dropped before completion");
        let notifier = self.notifier.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    logout(&session).await;
                    notifier.notify(Event::UploadDone);
                });
            },
            Err(_) => {
                tracing::warn!("No runtime available; skipping logout");
                notifier.notify(Event::UploadDone);
            },
        }
    }
}

async fn logout(session: &SessionHandle) {
    if let Err(e) = session.logout().await {
        tracing::warn!(error = ?e, site = %session.site().key, "Logout failed");
    }
}
