use crate::events::{Event, Notifier};
use crate::picture::{Picture, PictureState};
use crate::pool::WorkerPool;
use crate::upload::registry::Registration;
use pixport_session::error::{ErrorKind as SessionErrorKind, Result as SessionResult};
use pixport_session::{Progress, Session, SessionHandle, UploadItem};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Uploaded,
    Failed,
    Cancelled,
}

/// Uploads one picture through the session captured at submission.
///
/// Errors never escape: they end up in the picture's state and a
/// [`TransferFailed`](Event::TransferFailed) event. Once
/// [`TransferStarting`](Event::TransferStarting) has been sent, exactly one of
/// `TransferDone` or `TransferFailed` follows, cancellation included.
pub(crate) struct UploadTask {
    pub(crate) picture: Arc<Picture>,
    pub(crate) session: SessionHandle,
    /// Shared by every task of a batch so that only one of them logs in.
    pub(crate) login: Arc<Mutex<()>>,
    pub(crate) registration: Registration,
    pub(crate) pool: WorkerPool,
    pub(crate) notifier: Notifier,
    pub(crate) summary: Arc<str>,
}

impl UploadTask {
    #[instrument(skip_all, fields(path = %self.picture.path().display()))]
    pub(crate) async fn run(self) -> Outcome {
        let handle = self.registration.handle();
        let _permit = tokio::select! {
            biased;
            _ = handle.cancelled() => {
                tracing::debug!("Upload cancelled before it started");
                return Outcome::Cancelled;
            },
            permit = self.pool.acquire() => match permit {
                Some(permit) => permit,
                None => {
                    tracing::warn!("Worker pool closed; upload not started");
                    return Outcome::Cancelled;
                },
            },
        };
        if !handle.start() {
            tracing::debug!("Upload cancelled before it started");
            return Outcome::Cancelled;
        }

        // A retry of a failed picture starts over from pending.
        self.picture.set_state(PictureState::Pending);
        let progress = Arc::new(Progress::new());
        self.notifier.notify(Event::TransferStarting(Arc::clone(&self.picture), Arc::clone(&progress)));
        let item = self.picture.upload_item(&self.summary);
        tracing::debug!("Uploading");

        let result = tokio::select! {
            biased;
            _ = handle.cancelled() => return self.cancelled_transfer(),
            result = upload_with_relogin(self.session.as_ref(), &self.login, &item, &progress) => result,
        };
        // Lost the race against a cancellation: the result is discarded.
        if !handle.commit() {
            return self.cancelled_transfer();
        }

        match result {
            Ok(()) => {
                self.picture.set_state(PictureState::UploadedSuccessfully);
                tracing::debug!("Uploaded");
                self.notifier.notify(Event::TransferDone(Arc::clone(&self.picture)));
                Outcome::Uploaded
            },
            Err(e) => {
                tracing::warn!(error = ?e, "Upload failed");
                self.picture.set_state(PictureState::FailedUpload);
                self.notifier.notify(Event::TransferFailed(Arc::clone(&self.picture), Arc::new(e)));
                Outcome::Failed
            },
        }
    }

    /// Closes a started transfer that was cancelled. The picture keeps the
    /// state it had before the transfer.
    fn cancelled_transfer(&self) -> Outcome {
        tracing::debug!("Upload cancelled while transferring");
        let error = exn::Exn::from(SessionErrorKind::Cancelled);
        self.notifier.notify(Event::TransferFailed(Arc::clone(&self.picture), Arc::new(error)));
        Outcome::Cancelled
    }
}

/// Logs `session` in unless it already is. Tasks queue on `gate`, so a batch
/// starting on a fresh session logs in once rather than once per worker.
async fn ensure_logged_in(session: &dyn Session, gate: &Mutex<()>) -> SessionResult<()> {
    if session.is_logged_in() {
        return Ok(());
    }
    let _gate = gate.lock().await;
    if session.is_logged_in() {
        return Ok(());
    }
    tracing::debug!(site = %session.site().key, "Logging in");
    session.login().await
}

/// Uploads `item`, logging in first if the session isn't authenticated. If
/// the site still answers `NotLoggedIn` (an expired session) and this call
/// hasn't logged in yet, it logs in and retries once. At most one login and
/// one retry per call.
pub(crate) async fn upload_with_relogin(
    session: &dyn Session,
    gate: &Mutex<()>,
    item: &UploadItem,
    progress: &Progress,
) -> SessionResult<()> {
    let fresh = !session.is_logged_in();
    if fresh {
        ensure_logged_in(session, gate).await?;
    }
    match session.upload_item(item, progress).await {
        Err(e) if !fresh && matches!(&*e, SessionErrorKind::NotLoggedIn(_)) => {
            tracing::debug!(site = %session.site().key, "Session expired; logging in and retrying");
            session.login().await?;
            session.upload_item(item, progress).await
        },
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixport_session::{MockSession, Site, User};

    fn site() -> Site {
        Site {
            key: "test".to_string(),
            name: "Test".to_string(),
            url: "https://example.org/api".to_string(),
            user: User::new("alice", "secret", "Alice"),
        }
    }

    fn item() -> UploadItem {
        UploadItem {
            path: "/photos/a.jpg".into(),
            file_name: "a.jpg".to_string(),
            description: String::new(),
            summary: String::new(),
        }
    }

    #[tokio::test]
    async fn test_logs_in_before_first_upload() {
        let session = MockSession::new(site());
        upload_with_relogin(&session, &Mutex::new(()), &item(), &Progress::new()).await.unwrap();
        assert_eq!(session.login_count(), 1);
        assert_eq!(session.upload_attempts(), 1);
        assert_eq!(session.uploaded(), ["a.jpg"]);
    }

    #[tokio::test]
    async fn test_no_login_when_authenticated() {
        let session = MockSession::new(site()).logged_in();
        upload_with_relogin(&session, &Mutex::new(()), &item(), &Progress::new()).await.unwrap();
        assert_eq!(session.login_count(), 0);
        assert_eq!(session.upload_attempts(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_retried_once() {
        let session = MockSession::new(site()).expired();
        upload_with_relogin(&session, &Mutex::new(()), &item(), &Progress::new()).await.unwrap();
        assert_eq!(session.login_count(), 1);
        assert_eq!(session.upload_attempts(), 2);
        assert_eq!(session.uploaded(), ["a.jpg"]);
    }

    #[tokio::test]
    async fn test_rejected_login_is_final() {
        let session = MockSession::new(site()).rejecting_login();
        let err = upload_with_relogin(&session, &Mutex::new(()), &item(), &Progress::new()).await.unwrap_err();
        assert!(matches!(&*err, SessionErrorKind::NotLoggedIn(_)));
        assert_eq!(session.login_count(), 1);
        assert_eq!(session.upload_attempts(), 0);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let session = MockSession::new(site()).logged_in().failing_upload("a.jpg");
        let err = upload_with_relogin(&session, &Mutex::new(()), &item(), &Progress::new()).await.unwrap_err();
        assert_eq!(*err, SessionErrorKind::FailedUpload);
        assert_eq!(session.upload_attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_uploads_log_in_once() {
        let session = Arc::new(MockSession::new(site()));
        let gate = Arc::new(Mutex::new(()));
        let uploads: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { upload_with_relogin(session.as_ref(), &gate, &item(), &Progress::new()).await })
            })
            .collect();
        for upload in uploads {
            upload.await.unwrap().unwrap();
        }
        assert_eq!(session.login_count(), 1);
        assert_eq!(session.upload_attempts(), 4);
    }
}
