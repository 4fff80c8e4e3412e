use crate::error::{ErrorKind, Result};
use crate::events::{Event, Notifier, Observer};
use crate::external::ExternalHandle;
use crate::ingest::{self, Ingestor};
use crate::picture::{Picture, PictureState};
use crate::pool::WorkerPool;
use crate::template::DescriptionTemplate;
use crate::upload::{BatchReport, Uploader};
use exn::ResultExt;
use pixport_config::Config;
use pixport_metadata::ExtractorHandle;
use pixport_session::{SessionFactory, SessionHandle, Site};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const DEFAULT_WORKERS: usize = 4;

/// Builds a [`Core`]; see [`Core::builder`] and [`CoreBuilder::from_config`].
pub struct CoreBuilder {
    sites: BTreeMap<String, Site>,
    active_site: Option<String>,
    template: Option<DescriptionTemplate>,
    workers: usize,
    summary: Option<String>,
    observers: Vec<Arc<dyn Observer>>,
}

impl CoreBuilder {
    /// Starts from a loaded [`Config`]: its sites, active site, template and
    /// worker count.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Core::builder().workers(config.workers).sites(config.sites());
        if let Some(key) = &config.active_site {
            builder = builder.active_site(key);
        }
        if let Some(text) = config.template().or_raise(|| ErrorKind::Config)? {
            builder = builder.template(DescriptionTemplate::new(text.name, text.description, text.text)?);
        }
        Ok(builder)
    }

    pub fn site(mut self, site: Site) -> Self {
        self.sites.insert(site.key.clone(), site);
        self
    }

    pub fn sites(self, sites: impl IntoIterator<Item = Site>) -> Self {
        sites.into_iter().fold(self, Self::site)
    }

    pub fn active_site(mut self, key: impl Into<String>) -> Self {
        self.active_site = Some(key.into());
        self
    }

    /// Template used for ingestion; the [built-in one](crate::DEFAULT_TEMPLATE)
    /// when not set.
    pub fn template(mut self, template: DescriptionTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Edit summary sent with every upload.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Fails with [`ErrorKind::InvalidActiveSite`] unless the active site is
    /// one of the configured sites.
    pub fn build(self, extractor: ExtractorHandle, factory: Arc<dyn SessionFactory>) -> Result<Core> {
        let key = self.active_site.unwrap_or_default();
        let Some(site) = self.sites.get(&key) else {
            exn::bail!(ErrorKind::InvalidActiveSite(key));
        };
        let template = match self.template {
            Some(template) => template,
            None => DescriptionTemplate::builtin()?,
        };
        let session = factory.build(site);
        let mut notifier = Notifier::default();
        for observer in self.observers {
            notifier.subscribe(observer);
        }
        let pool = WorkerPool::new(self.workers);
        let mut uploader = Uploader::new(pool.clone(), notifier.clone());
        if let Some(summary) = self.summary {
            uploader = uploader.with_summary(summary);
        }
        tracing::debug!(site = %key, workers = pool.size(), "Core ready");
        Ok(Core {
            sites: self.sites,
            factory,
            session: RwLock::new(session),
            template: RwLock::new(Arc::new(template)),
            pictures: RwLock::new(Vec::new()),
            ingestor: Ingestor::new(pool, extractor),
            uploader,
            notifier,
            batch: Mutex::new(()),
        })
    }
}

/// Owner of the picture set, the active session and the worker pool.
///
/// Ingestion, uploads and site switches never overlap: uploads and ingestion
/// wait their turn, while [`switch_site`](Self::switch_site) and
/// [`remove_picture`](Self::remove_picture) are refused with
/// [`ErrorKind::BatchInProgress`] instead. [`abort`](Self::abort) and the
/// read-only accessors work at any time.
pub struct Core {
    sites: BTreeMap<String, Site>,
    factory: Arc<dyn SessionFactory>,
    session: RwLock<SessionHandle>,
    template: RwLock<Arc<DescriptionTemplate>>,
    pictures: RwLock<Vec<Arc<Picture>>>,
    ingestor: Ingestor,
    uploader: Uploader,
    notifier: Notifier,
    batch: Mutex<()>,
}

impl Core {
    pub fn builder() -> CoreBuilder {
        CoreBuilder {
            sites: BTreeMap::new(),
            active_site: None,
            template: None,
            workers: DEFAULT_WORKERS,
            summary: None,
            observers: Vec::new(),
        }
    }

    /// Every configured site, ordered by key.
    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    pub fn active_site(&self) -> Site {
        self.session().site().clone()
    }

    /// The session uploads currently go through.
    pub fn session(&self) -> SessionHandle {
        Arc::clone(&self.session.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Template used for pictures added from now on.
    pub fn template(&self) -> Arc<DescriptionTemplate> {
        Arc::clone(&self.template.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Pictures already in the set keep the template they were added with.
    pub fn set_template(&self, template: DescriptionTemplate) {
        tracing::debug!(template = %template.name(), "Default template changed");
        *self.template.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(template);
    }

    /// Snapshot of the picture set, in insertion order.
    pub fn pictures(&self) -> Vec<Arc<Picture>> {
        self.pictures.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count_pictures_to_upload(&self) -> usize {
        self.pictures.read().unwrap_or_else(PoisonError::into_inner).iter().filter(|p| !p.is_uploaded()).count()
    }

    /// Uploads currently registered as in flight.
    pub fn in_flight(&self) -> usize {
        self.uploader.registry().len()
    }

    /// Ingests `files` with the current template and user and appends the
    /// resulting pictures. Paths already in the set are skipped. Waits for a
    /// running batch to finish first.
    pub async fn add_pictures<P: AsRef<Path>>(&self, files: impl IntoIterator<Item = P>) -> Vec<Arc<Picture>> {
        self.add_pictures_with(files, None).await
    }

    /// Like [`add_pictures`](Self::add_pictures), matching every new picture
    /// against `external` so its row is available to the template.
    #[instrument(skip_all, fields(external = external.is_some()))]
    pub async fn add_pictures_with<P: AsRef<Path>>(
        &self,
        files: impl IntoIterator<Item = P>,
        external: Option<ExternalHandle>,
    ) -> Vec<Arc<Picture>> {
        let _batch = self.batch.lock().await;
        let files: Vec<PathBuf> = {
            let pictures = self.pictures.read().unwrap_or_else(PoisonError::into_inner);
            let known: HashSet<&Path> = pictures.iter().map(|p| p.path()).collect();
            ingest::normalize(files).into_iter().filter(|path| !known.contains(path.as_path())).collect()
        };
        let user = self.active_site().user;
        let added = self.ingestor.ingest_with(files, &self.template(), &user, external).await;
        if added.is_empty() {
            tracing::debug!("No new pictures");
            return added;
        }
        self.pictures.write().unwrap_or_else(PoisonError::into_inner).extend(added.iter().cloned());
        self.notifier.notify(Event::BatchAdded(added.clone()));
        added
    }

    /// Removes the picture at `path`. `None` if there is no such picture.
    pub fn remove_picture(&self, path: impl AsRef<Path>) -> Result<Option<Arc<Picture>>> {
        let Ok(_batch) = self.batch.try_lock() else {
            exn::bail!(ErrorKind::BatchInProgress);
        };
        let path = path.as_ref();
        let removed = {
            let mut pictures = self.pictures.write().unwrap_or_else(PoisonError::into_inner);
            pictures.iter().position(|p| p.path() == path).map(|index| pictures.remove(index))
        };
        if let Some(picture) = &removed {
            tracing::debug!(path = %path.display(), "Picture removed");
            self.notifier.notify(Event::PictureRemoved(Arc::clone(picture)));
        }
        Ok(removed)
    }

    /// Uploads every picture not yet uploaded; see [`upload_pictures_until`](Self::upload_pictures_until).
    pub async fn upload_pictures(&self) -> BatchReport {
        self.upload_pictures_until(CancellationToken::new()).await
    }

    /// Uploads every picture not yet uploaded through the active session,
    /// which is logged out afterwards. Cancelling `interrupt` stops waiting:
    /// outstanding uploads are cancelled and the batch is torn down.
    pub async fn upload_pictures_until(&self, interrupt: CancellationToken) -> BatchReport {
        let _batch = self.batch.lock().await;
        let session = self.session();
        let pictures = self.pictures();
        self.uploader.upload_all(&pictures, session, &interrupt).await
    }

    /// Cancels every upload that hasn't started committing its result and
    /// returns how many were cancelled. A no-op when nothing is in flight.
    pub fn abort(&self) -> usize {
        self.uploader.abort()
    }

    /// Makes `key` the active site: logs the old session out, opens a new
    /// one and re-renders every description for the new user. Upload states
    /// are left alone.
    #[instrument(skip(self))]
    pub async fn switch_site(&self, key: &str) -> Result<()> {
        let Ok(_batch) = self.batch.try_lock() else {
            exn::bail!(ErrorKind::BatchInProgress);
        };
        let Some(site) = self.sites.get(key) else {
            exn::bail!(ErrorKind::InvalidActiveSite(key.to_string()));
        };

        let previous = self.session();
        if previous.is_logged_in() {
            if let Err(e) = previous.logout().await {
                tracing::warn!(error = ?e, site = %previous.site().key, "Logout failed");
            }
        }
        let session = self.factory.build(site);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;

        for picture in self.pictures() {
            if let Err(e) = picture.render(&site.user) {
                tracing::warn!(path = %picture.path().display(), error = %e, "Can't re-render description");
            }
        }
        tracing::info!(site = %site.name, "Active site changed");
        self.notifier.notify(Event::ActiveSiteChanged(site.clone()));
        Ok(())
    }

    /// Pictures in `state`, in insertion order.
    pub fn pictures_in(&self, state: PictureState) -> Vec<Arc<Picture>> {
        let pictures = self.pictures.read().unwrap_or_else(PoisonError::into_inner);
        pictures.iter().filter(|p| p.state() == state).cloned().collect()
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("active_site", &self.active_site().key)
            .field("pictures", &self.pictures.read().unwrap_or_else(PoisonError::into_inner).len())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
