//! In-memory session for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{Site, UploadItem};
use crate::progress::Progress;
use crate::session::{Session, SessionFactory, SessionHandle};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

const MOCK_FILE_SIZE: u64 = 1024;

/// Scriptable in-memory [`Session`] for testing.
///
/// Starts logged out, so the first upload reports
/// [`NotLoggedIn`](ErrorKind::NotLoggedIn) unless [`logged_in`](Self::logged_in)
/// was used. Uploads can be held open with [`blocked`](Self::blocked) until
/// [`release`](Self::release) is called, which gives tests a deterministic
/// window in which transfers are in flight.
///
/// # Examples
///
/// ```
/// use pixport_session::{MockSession, Progress, Session, Site, UploadItem, User};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let site = Site {
///     key: "test".into(),
///     name: "Test".into(),
///     url: "https://example.org/api".into(),
///     user: User::new("alice", "secret", "Alice"),
/// };
/// let session = MockSession::new(site).logged_in().failing_upload("bad.jpg");
/// let item = UploadItem {
///     path: "/photos/bad.jpg".into(),
///     file_name: "bad.jpg".into(),
///     description: String::new(),
///     summary: String::new(),
/// };
/// assert!(session.upload_item(&item, &Progress::new()).await.is_err());
/// assert_eq!(session.upload_attempts(), 1);
/// # }
/// ```
pub struct MockSession {
    site: Site,
    logged_in: AtomicBool,
    expired: AtomicBool,
    reject_login: bool,
    fail_logout: bool,
    failing: HashSet<String>,
    gate: watch::Sender<bool>,
    uploading: watch::Sender<usize>,
    logins: AtomicUsize,
    logouts: AtomicUsize,
    attempts: AtomicUsize,
    uploaded: Mutex<Vec<UploadItem>>,
}

impl MockSession {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            logged_in: AtomicBool::new(false),
            expired: AtomicBool::new(false),
            reject_login: false,
            fail_logout: false,
            failing: HashSet::new(),
            gate: watch::Sender::new(true),
            uploading: watch::Sender::new(0),
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    /// Starts the session already authenticated.
    pub fn logged_in(self) -> Self {
        self.logged_in.store(true, Ordering::SeqCst);
        self
    }

    /// Claims to be authenticated, but the site has dropped the session: the
    /// next upload fails with [`NotLoggedIn`](ErrorKind::NotLoggedIn) until
    /// the session logs in again.
    pub fn expired(self) -> Self {
        self.logged_in.store(true, Ordering::SeqCst);
        self.expired.store(true, Ordering::SeqCst);
        self
    }

    /// Uploads of `file_name` fail with [`FailedUpload`](ErrorKind::FailedUpload).
    pub fn failing_upload(mut self, file_name: impl Into<String>) -> Self {
        self.failing.insert(file_name.into());
        self
    }

    /// Every login is refused with [`NotLoggedIn`](ErrorKind::NotLoggedIn).
    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Every logout fails with [`FailedLogout`](ErrorKind::FailedLogout).
    pub fn failing_logout(mut self) -> Self {
        self.fail_logout = true;
        self
    }

    /// Authenticated uploads wait until [`release`](Self::release) is called.
    pub fn blocked(self) -> Self {
        self.gate.send_replace(false);
        self
    }

    /// Lets every held (and future) upload proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Waits until at least `count` uploads are in progress at the same time.
    pub async fn wait_until_uploading(&self, count: usize) {
        let mut uploading = self.uploading.subscribe();
        // The sender lives in `self`, so the channel can't close while we wait.
        let _ = uploading.wait_for(|n| *n >= count).await;
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    /// Number of `upload_item` calls, successful or not.
    pub fn upload_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// File names of successful uploads, in completion order.
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap_or_else(PoisonError::into_inner).iter().map(|i| i.file_name.clone()).collect()
    }

    /// Items of successful uploads, in completion order.
    pub fn uploaded_items(&self) -> Vec<UploadItem> {
        self.uploaded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Decrements the in-progress counter even when the upload future is dropped.
struct Uploading<'a>(&'a watch::Sender<usize>);
impl<'a> Uploading<'a> {
    fn start(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter)
    }
}
impl Drop for Uploading<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[async_trait]
impl Session for MockSession {
    fn site(&self) -> &Site {
        &self.site
    }

    async fn login(&self) -> Result<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.reject_login {
            exn::bail!(ErrorKind::NotLoggedIn(format!("credentials of {} rejected", self.site.user.login)));
        }
        self.expired.store(false, Ordering::SeqCst);
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn upload_item(&self, item: &UploadItem, progress: &Progress) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.is_logged_in() {
            exn::bail!(ErrorKind::NotLoggedIn("session not authenticated".to_string()));
        }
        if self.expired.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::NotLoggedIn("session expired".to_string()));
        }
        let _uploading = Uploading::start(&self.uploading);
        progress.set_total(MOCK_FILE_SIZE);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        if self.failing.contains(&item.file_name) {
            exn::bail!(ErrorKind::FailedUpload);
        }
        progress.advance(MOCK_FILE_SIZE);
        self.uploaded.lock().unwrap_or_else(PoisonError::into_inner).push(item.clone());
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout {
            exn::bail!(ErrorKind::FailedLogout);
        }
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

type Configure = Box<dyn Fn(MockSession) -> MockSession + Send + Sync>;

/// Builds [`MockSession`]s and keeps hold of each one for later inspection.
pub struct MockSessionFactory {
    configure: Configure,
    built: Mutex<Vec<Arc<MockSession>>>,
}

impl MockSessionFactory {
    /// Every built session is passed through `configure` first.
    pub fn new(configure: impl Fn(MockSession) -> MockSession + Send + Sync + 'static) -> Self {
        Self {
            configure: Box::new(configure),
            built: Mutex::new(Vec::new()),
        }
    }

    /// All sessions built so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.built.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The most recently built session.
    pub fn last(&self) -> Option<Arc<MockSession>> {
        self.built.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

impl Default for MockSessionFactory {
    fn default() -> Self {
        Self::new(|session| session)
    }
}

impl SessionFactory for MockSessionFactory {
    fn build(&self, site: &Site) -> SessionHandle {
        let session = Arc::new((self.configure)(MockSession::new(site.clone())));
        self.built.lock().unwrap_or_else(PoisonError::into_inner).push(Arc::clone(&session));
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn site() -> Site {
        Site {
            key: "test".to_string(),
            name: "Test".to_string(),
            url: "https://example.org/api".to_string(),
            user: User::new("alice", "secret", "Alice"),
        }
    }

    fn item(name: &str) -> UploadItem {
        UploadItem {
            path: format!("/photos/{name}").into(),
            file_name: name.to_string(),
            description: "A picture".to_string(),
            summary: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upload_requires_login() {
        let session = MockSession::new(site());
        let err = session.upload_item(&item("a.jpg"), &Progress::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotLoggedIn(_)));
        session.login().await.unwrap();
        session.upload_item(&item("a.jpg"), &Progress::new()).await.unwrap();
        assert_eq!(session.uploaded(), vec!["a.jpg".to_string()]);
        assert_eq!(session.upload_attempts(), 2);
    }

    #[tokio::test]
    async fn test_expired_session() {
        let session = MockSession::new(site()).expired();
        assert!(session.is_logged_in());
        let err = session.upload_item(&item("a.jpg"), &Progress::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotLoggedIn(_)));
        session.login().await.unwrap();
        session.upload_item(&item("a.jpg"), &Progress::new()).await.unwrap();
        assert_eq!(session.uploaded(), vec!["a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_upload() {
        let session = MockSession::new(site()).logged_in().failing_upload("b.jpg");
        let progress = Progress::new();
        let err = session.upload_item(&item("b.jpg"), &progress).await.unwrap_err();
        assert_eq!(*err, ErrorKind::FailedUpload);
        assert!(session.uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_progress_reported() {
        let session = MockSession::new(site()).logged_in();
        let progress = Progress::new();
        session.upload_item(&item("a.jpg"), &progress).await.unwrap();
        assert_eq!(progress.fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_rejecting_login() {
        let session = MockSession::new(site()).rejecting_login();
        let err = session.login().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotLoggedIn(_)));
        assert!(!session.is_logged_in());
        assert_eq!(session.login_count(), 1);
    }

    #[tokio::test]
    async fn test_logout() {
        let session = MockSession::new(site()).logged_in();
        session.logout().await.unwrap();
        assert!(!session.is_logged_in());
        let failing = MockSession::new(site()).logged_in().failing_logout();
        assert_eq!(*failing.logout().await.unwrap_err(), ErrorKind::FailedLogout);
        assert_eq!(failing.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_factory_keeps_sessions() {
        let factory = MockSessionFactory::new(|s| s.logged_in());
        let session = factory.build(&site());
        assert!(session.is_logged_in());
        assert_eq!(factory.sessions().len(), 1);
        assert_eq!(factory.last().map(|s| s.site().key.clone()), Some("test".to_string()));
    }
}
