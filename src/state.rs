use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::accounts::Accounts;
use crate::auth::IdentityProvider;
use crate::blob::BlobStore;
use crate::comments::CommentService;
use crate::config::Config;
use crate::feed::FeedSync;
use crate::graphql::{build_schema, SafeWalkSchema};
use crate::notifications::NotificationCenter;
use crate::posts::PostService;
use crate::store::{SharedStore, SqliteDocumentStore};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub store: SharedStore,
    pub blobs: BlobStore,
    pub identity: IdentityProvider,
    pub graphql_schema: SafeWalkSchema,
}

impl AppState {
    /// Wire the services over an already migrated pool.
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let store: SharedStore = Arc::new(SqliteDocumentStore::new(db.clone()));
        let blobs = BlobStore::new(config.blobs_path(), &config.public_url())?;
        let identity = IdentityProvider::new(
            db.clone(),
            config.auth.session_hours,
            config.auth.bcrypt_cost,
        );

        Ok(Self {
            db,
            config,
            store,
            blobs,
            identity,
            graphql_schema: build_schema(),
        })
    }

    pub fn feed(&self) -> FeedSync {
        FeedSync::new(self.store.clone())
    }

    pub fn notifications(&self) -> NotificationCenter {
        NotificationCenter::new(self.store.clone())
    }

    pub fn comments(&self) -> CommentService {
        CommentService::new(self.store.clone(), self.config.comments.order)
    }

    pub fn accounts(&self) -> Accounts {
        Accounts::new(
            self.store.clone(),
            self.identity.clone(),
            self.blobs.clone(),
            self.config.clone(),
        )
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.store.clone(), self.blobs.clone(), self.notifications())
    }

    /// Clamp a requested feed size to the configured page limit.
    pub fn feed_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.feed.page_limit)
            .clamp(1, self.config.feed.page_limit.max(1))
    }
}
