use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use url::Url;

use crate::auth::{SessionBridge, SessionContext};
use crate::backend::functions::{HostedFeedback, NoFeedback};
use crate::backend::local::{LocalAuth, LocalBackend};
use crate::backend::rest::{RestAuth, RestBackend, RestClient};
use crate::backend::storage::LocalObjectStorage;
use crate::backend::{
    AuthProvider, FeedbackFunction, ObjectStorage, PostRepository, ProfileRepository,
    ReviewRepository,
};
use crate::config::{BackendKind, Config, RemoteConfig};
use crate::feed::{PostFeed, PostLimits};
use crate::feedback::FeedbackService;
use crate::ingest::ImageIngestor;
use crate::profile::ProfileService;
use crate::reviews::ReviewLedger;

pub type DbPool = Pool<SqliteConnectionManager>;

/// The backend implementations selected by the configuration.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub auth: Arc<dyn AuthProvider>,
    pub posts: Arc<dyn PostRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub feedback: Arc<dyn FeedbackFunction>,
}

fn remote_client(remote: &RemoteConfig) -> anyhow::Result<Option<RestClient>> {
    match (&remote.url, &remote.anon_key) {
        (Some(url), Some(key)) => Ok(Some(RestClient::new(Url::parse(url)?, key.clone()))),
        _ => Ok(None),
    }
}

impl AppState {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        match config.backend.kind {
            BackendKind::Local => Self::local(config),
            BackendKind::Remote => Self::remote(config),
        }
    }

    fn local(config: Config) -> anyhow::Result<Self> {
        let pool = crate::db::create_pool(&config.db_path())?;
        crate::db::run_migrations(&pool)?;
        tracing::info!("Using local backend at {}", config.db_path().display());

        let backend = Arc::new(LocalBackend::new(pool.clone()));
        let auth = Arc::new(LocalAuth::new(
            pool,
            config.session_file(),
            config.auth.session_hours,
        ));

        let public_base = config
            .storage
            .public_base_url
            .as_deref()
            .map(Url::parse)
            .transpose()?;
        let storage = Arc::new(LocalObjectStorage::new(config.uploads_path(), public_base)?);

        // The feedback function only exists on a hosted project.
        let feedback: Arc<dyn FeedbackFunction> = match remote_client(&config.remote)? {
            Some(client) => Arc::new(HostedFeedback::new(client)),
            None => Arc::new(NoFeedback),
        };

        Ok(Self {
            config,
            auth,
            posts: backend.clone(),
            reviews: backend.clone(),
            profiles: backend,
            storage,
            feedback,
        })
    }

    fn remote(config: Config) -> anyhow::Result<Self> {
        let client = remote_client(&config.remote)?
            .ok_or_else(|| anyhow::anyhow!("the remote backend needs [remote] url and anon_key"))?;
        tracing::info!("Using remote backend at {}", client.base_url());

        let backend = Arc::new(RestBackend::new(client.clone(), config.remote.bucket.clone()));
        let auth = Arc::new(RestAuth::new(client.clone(), config.session_file()));

        Ok(Self {
            config,
            auth,
            posts: backend.clone(),
            reviews: backend.clone(),
            profiles: backend.clone(),
            storage: backend,
            feedback: Arc::new(HostedFeedback::new(client)),
        })
    }

    pub fn session_bridge(&self) -> SessionBridge {
        SessionBridge::new(self.auth.clone())
    }

    pub fn feed(&self, session: SessionContext) -> PostFeed {
        PostFeed::new(
            self.posts.clone(),
            session,
            PostLimits::from_config(&self.config.posts, &self.config.images),
        )
    }

    pub fn review_ledger(&self) -> ReviewLedger {
        ReviewLedger::new(self.reviews.clone())
    }

    pub fn profile_service(&self, session: SessionContext) -> ProfileService {
        ProfileService::new(
            self.profiles.clone(),
            self.posts.clone(),
            self.reviews.clone(),
            session,
        )
    }

    pub fn image_ingestor(&self) -> ImageIngestor {
        ImageIngestor::new(
            self.storage.clone(),
            self.config.images.compress_threshold_bytes(),
        )
    }

    pub fn feedback_service(&self) -> FeedbackService {
        FeedbackService::new(self.posts.clone(), self.feedback.clone())
    }
}
