#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use safewalk::accounts::{SignUpForm, SignedIn};
use safewalk::config::Config;
use safewalk::db;
use safewalk::state::AppState;
use safewalk::store::{
    CollectionPath, DocPath, Document, DocumentStore, Query, SharedStore, StoreError,
    TypedSubscription, WriteBatch,
};
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const PASSWORD: &str = "secret123";
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// App state over a throwaway database and blob directory.
pub struct TestApp {
    pub state: AppState,
    _dir: TempDir,
}

pub fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut config = Config::default();
    config.server.public_url = Some("http://safewalk.test".to_string());
    config.storage.path = Some(dir.path().join("blobs"));
    config.auth.bcrypt_cost = 4;
    config.auth.admin_emails = vec![ADMIN_EMAIL.to_string()];

    let state = AppState::new(pool, config).unwrap();
    TestApp { state, _dir: dir }
}

pub fn signup_form(username: &str, email: &str) -> SignUpForm {
    SignUpForm {
        username: username.to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        confirm_password: PASSWORD.to_string(),
    }
}

pub async fn sign_up(state: &AppState, username: &str) -> SignedIn {
    let email = format!("{}@example.com", username);
    state
        .accounts()
        .sign_up(&signup_form(username, &email))
        .await
        .unwrap_or_else(|e| panic!("signup of {} failed: {:?}", username, e))
}

/// Wait for a snapshot satisfying `done`. Snapshots collapse, so
/// intermediate states may be skipped.
pub async fn wait_for<T, F>(sub: &mut TypedSubscription<T>, mut done: F) -> Vec<T>
where
    T: DeserializeOwned,
    F: FnMut(&[T]) -> bool,
{
    if let Some(current) = sub.latest() {
        if done(&current) {
            return current;
        }
    }
    loop {
        let snapshot = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("snapshot timed out")
            .expect("subscription ended");
        if done(&snapshot) {
            return snapshot;
        }
    }
}

/// Keep consecutive server timestamps apart.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// Passes everything through to the real store, except that queries fail
/// while `fail_queries(true)` is in effect.
pub struct FlakyQueries {
    inner: SharedStore,
    failing: AtomicBool,
}

impl FlakyQueries {
    pub fn new(inner: SharedStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: AtomicBool::new(false),
        })
    }

    pub fn fail_queries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyQueries {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.inner.get(path).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Invalid(format!(
                "query on {} refused",
                query.collection
            )));
        }
        self.inner.query(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.inner.commit(batch).await
    }

    fn changes(&self) -> broadcast::Receiver<CollectionPath> {
        self.inner.changes()
    }
}

/// A copy of `state` whose services all go through `store`.
pub fn with_store(state: &AppState, store: SharedStore) -> AppState {
    let mut state = state.clone();
    state.store = store;
    state
}
