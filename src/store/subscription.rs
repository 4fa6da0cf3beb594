use std::marker::PhantomData;
use std::sync::Arc;

use futures::Stream;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::{CollectionPath, Document, Query, SharedStore};

type Snapshot = Option<Arc<Vec<Document>>>;

/// A live query. The background task re-runs the query whenever its
/// collection changes and publishes the full result. Dropping the
/// subscription stops the task.
pub struct Subscription {
    rx: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

/// Open a snapshot subscription on `query`.
///
/// Must be called inside a tokio runtime.
pub fn subscribe(store: SharedStore, query: Query) -> Subscription {
    let (tx, rx) = watch::channel(None);
    // Listen before the first read so no change can slip in between
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        loop {
            match store.query(&query).await {
                Ok(docs) => {
                    tx.send_replace(Some(Arc::new(docs)));
                }
                Err(e) => {
                    tracing::warn!(
                        collection = %query.collection,
                        "Snapshot query failed, keeping last snapshot: {}",
                        e
                    );
                }
            }

            tokio::select! {
                _ = tx.closed() => return,
                changed = wait_for_change(&mut changes, &query.collection) => {
                    if !changed {
                        return;
                    }
                }
            }
        }
    });

    Subscription { rx, task }
}

async fn wait_for_change(
    changes: &mut broadcast::Receiver<CollectionPath>,
    watched: &CollectionPath,
) -> bool {
    loop {
        match changes.recv().await {
            Ok(collection) if &collection == watched => return true,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Some of the missed changes may be ours; a re-read is cheap
                tracing::debug!(collection = %watched, missed, "Change feed lagged");
                return true;
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}

impl Subscription {
    /// Last delivered snapshot, if the first read has completed.
    pub fn latest(&self) -> Option<Arc<Vec<Document>>> {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. Snapshots published while nobody was
    /// waiting collapse into the newest one. Returns `None` once the
    /// listener has stopped.
    pub async fn next(&mut self) -> Option<Arc<Vec<Document>>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }

    /// False once the background task has stopped.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A subscription whose documents are decoded into `T`. Documents that fail
/// to decode are logged and skipped.
pub struct TypedSubscription<T> {
    inner: Subscription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSubscription<T> {
    pub fn new(inner: Subscription) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn open(store: SharedStore, query: Query) -> Self {
        Self::new(subscribe(store, query))
    }

    pub fn latest(&self) -> Option<Vec<T>> {
        self.inner.latest().map(|docs| decode_all(&docs))
    }

    pub async fn next(&mut self) -> Option<Vec<T>> {
        let docs = self.inner.next().await?;
        Some(decode_all(&docs))
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

impl<T: DeserializeOwned + Send + 'static> TypedSubscription<T> {
    /// Turn the subscription into a stream of snapshots. The listener lives
    /// as long as the stream.
    pub fn into_stream(self) -> impl Stream<Item = Vec<T>> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let snapshot = sub.next().await?;
            Some((snapshot, sub))
        })
    }
}

/// Decode a snapshot, logging and skipping documents that do not fit `T`.
pub fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(id = %doc.id, "Skipping undecodable document: {}", e);
                None
            }
        })
        .collect()
}

/// Holds at most one subscription for a logical slot (one screen, one
/// panel). Opening a new one releases the previous listener first.
pub struct SubscriptionSlot<T> {
    current: Option<TypedSubscription<T>>,
}

impl<T> Default for SubscriptionSlot<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<T: DeserializeOwned> SubscriptionSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a subscription in this slot. The old listener is dropped before
    /// `open` runs.
    pub fn replace_with(
        &mut self,
        open: impl FnOnce() -> TypedSubscription<T>,
    ) -> &mut TypedSubscription<T> {
        self.current = None;
        self.current.insert(open())
    }

    pub fn get_mut(&mut self) -> Option<&mut TypedSubscription<T>> {
        self.current.as_mut()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
