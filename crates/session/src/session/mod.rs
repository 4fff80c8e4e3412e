//! Session trait and implementations.
//!
//! A [`Session`] is an authenticated connection to one remote [`Site`]. The
//! transport behind it (HTTP API, credentials handling, chunked uploads) is
//! the implementation's business; callers only see the four operations below
//! and the [`ErrorKind`](crate::error::ErrorKind) each may fail with.

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use self::mock::{MockSession, MockSessionFactory};
use crate::error::Result;
use crate::models::{Site, UploadItem};
use crate::progress::Progress;
use async_trait::async_trait;
use std::sync::Arc;

/// Authenticated connection to a remote hosting site.
///
/// Sessions are shared between concurrently running upload tasks, so every
/// method takes `&self` and implementations must be internally synchronised.
///
/// # Cancellation
/// Callers may drop an in-progress [`upload_item`](Self::upload_item) future
/// at any await point to cancel the transfer. Implementations must leave the
/// session usable afterwards.
///
/// # Examples
///
/// ```no_run
/// use pixport_session::{Progress, Session, UploadItem, error::Result};
///
/// async fn upload_once(session: &dyn Session, item: &UploadItem) -> Result<()> {
///     if !session.is_logged_in() {
///         session.login().await?;
///     }
///     session.upload_item(item, &Progress::new()).await?;
///     session.logout().await
/// }
/// ```
#[async_trait]
pub trait Session: Send + Sync {
    /// The site this session is bound to.
    fn site(&self) -> &Site;

    /// Authenticate with the site's configured user.
    ///
    /// Fails with [`NotLoggedIn`](crate::error::ErrorKind::NotLoggedIn) when
    /// the site answered but refused the credentials, and
    /// [`FailedLogin`](crate::error::ErrorKind::FailedLogin) when the login
    /// request itself failed.
    async fn login(&self) -> Result<()>;

    fn is_logged_in(&self) -> bool;

    /// Upload one file, reporting transferred bytes through `progress`.
    ///
    /// Fails with [`NotLoggedIn`](crate::error::ErrorKind::NotLoggedIn) if
    /// the session is not (or no longer) authenticated.
    async fn upload_item(&self, item: &UploadItem, progress: &Progress) -> Result<()>;

    /// Close the session. Logging out of a session that isn't logged in is a
    /// no-op.
    async fn logout(&self) -> Result<()>;
}

pub type SessionHandle = Arc<dyn Session>;

/// Builds a fresh, not-yet-authenticated [`Session`] for a site.
pub trait SessionFactory: Send + Sync {
    fn build(&self, site: &Site) -> SessionHandle;
}
