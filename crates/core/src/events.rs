//! Notifications emitted by the [`Core`](crate::Core).
//!
//! Events are delivered synchronously on whichever task produced them, so
//! observers must not block. Channel senders implement [`Observer`] directly;
//! anything else can wrap a closure with [`observer_fn`].

use crate::picture::Picture;
use pixport_session::{Progress, Site};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone)]
pub enum Event {
    /// Pictures added to the set by one ingestion call. Not sent when nothing
    /// was added.
    BatchAdded(Vec<Arc<Picture>>),
    PictureRemoved(Arc<Picture>),
    /// An upload batch is about to start with these pictures.
    UploadStarting(Vec<Arc<Picture>>),
    /// A transfer has begun; `Progress` is updated by the session.
    TransferStarting(Arc<Picture>, Arc<Progress>),
    TransferDone(Arc<Picture>),
    /// Also closes a started transfer that was cancelled, with
    /// [`Cancelled`](pixport_session::error::ErrorKind::Cancelled).
    TransferFailed(Arc<Picture>, Arc<pixport_session::error::Error>),
    /// Emitted exactly once per batch, after logout was attempted.
    UploadDone,
    ActiveSiteChanged(Site),
}

pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event);
}

impl Observer for mpsc::UnboundedSender<Event> {
    fn notify(&self, event: &Event) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.send(event.clone());
    }
}

impl Observer for broadcast::Sender<Event> {
    fn notify(&self, event: &Event) {
        let _ = self.send(event.clone());
    }
}

struct FnObserver<F>(F);
impl<F> Observer for FnObserver<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn notify(&self, event: &Event) {
        (self.0)(event)
    }
}

/// Wraps a closure as an [`Observer`].
pub fn observer_fn(f: impl Fn(&Event) + Send + Sync + 'static) -> Arc<dyn Observer> {
    Arc::new(FnObserver(f))
}

/// Fan-out to every registered observer.
#[derive(Clone, Default)]
pub(crate) struct Notifier {
    observers: Vec<Arc<dyn Observer>>,
}

impl Notifier {
    pub(crate) fn subscribe(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    pub(crate) fn notify(&self, event: Event) {
        for observer in &self.observers {
            observer.notify(&event);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").field("observers", &self.observers.len()).finish()
    }
}
