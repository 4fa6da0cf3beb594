// Notification fan-out and the per-user notification feed.
use crate::accounts::users_collection;
use crate::auth::Session;
use crate::db::models::Notification;
use crate::error::{AppError, AppResult};
use crate::store::{
    decode_all, new_id, CollectionPath, Direction, Query, SharedStore, TypedSubscription,
    WriteBatch, Writes,
};

pub const NOTIFICATIONS: &str = "notifications";

pub type NotificationSubscription = TypedSubscription<Notification>;

pub fn notifications_collection() -> CollectionPath {
    CollectionPath::new(NOTIFICATIONS)
}

/// What every recipient is told about a new post.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPostNotice {
    pub from_user_id: String,
    pub from_username: String,
    pub post_title: String,
    pub post_id: String,
}

#[derive(Clone)]
pub struct NotificationCenter {
    store: SharedStore,
}

impl NotificationCenter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// One create per recipient, ready to commit as a unit.
    pub fn fanout_batch<'a>(
        recipients: impl IntoIterator<Item = &'a str>,
        notice: &NewPostNotice,
    ) -> WriteBatch {
        let collection = notifications_collection();
        let mut batch = WriteBatch::new();
        for to in recipients {
            batch.create(
                collection.doc(new_id()),
                Writes::new()
                    .set("toUserId", to)
                    .set("fromUserId", notice.from_user_id.as_str())
                    .set("fromUsername", notice.from_username.as_str())
                    .set("type", "new_post")
                    .set("postTitle", notice.post_title.as_str())
                    .set("postId", notice.post_id.as_str())
                    .server_timestamp("createdAt")
                    .set("read", false),
            );
        }
        batch
    }

    /// Notify every registered user except the author. All notifications are
    /// written in one batch: either everyone gets one or nobody does.
    pub async fn notify_all_except(
        &self,
        author_uid: &str,
        notice: &NewPostNotice,
    ) -> AppResult<usize> {
        let users = self.store.query(&Query::collection(users_collection())).await?;
        let recipients = users
            .iter()
            .map(|doc| doc.id.as_str())
            .filter(|uid| *uid != author_uid);

        let batch = Self::fanout_batch(recipients, notice);
        let count = batch.len();
        if count == 0 {
            return Ok(0);
        }

        self.store.commit(batch).await?;
        tracing::info!(author = %author_uid, post = %notice.post_id, count, "Sent new-post notifications");
        Ok(count)
    }

    pub fn inbox_query(uid: &str) -> Query {
        Query::collection(notifications_collection())
            .where_eq("toUserId", uid)
            .order_by("createdAt", Direction::Desc)
    }

    pub fn subscribe(&self, uid: &str) -> NotificationSubscription {
        TypedSubscription::open(self.store.clone(), Self::inbox_query(uid))
    }

    pub async fn list(&self, uid: &str) -> AppResult<Vec<Notification>> {
        let docs = self.store.query(&Self::inbox_query(uid)).await?;
        Ok(decode_all(&docs))
    }

    pub async fn unread_count(&self, uid: &str) -> AppResult<usize> {
        let unread = Self::inbox_query(uid).where_eq("read", false);
        Ok(self.store.query(&unread).await?.len())
    }

    /// Flag every unread notification of the user as read.
    pub async fn mark_all_read(&self, session: &Session) -> AppResult<usize> {
        let unread = Self::inbox_query(&session.uid).where_eq("read", false);
        let docs = self.store.query(&unread).await?;

        let collection = notifications_collection();
        let mut batch = WriteBatch::new();
        for doc in &docs {
            batch.update(collection.doc(&doc.id), Writes::new().set("read", true));
        }
        let count = batch.len();
        self.store.commit(batch).await?;
        Ok(count)
    }

    /// Delete every notification addressed to the user in one batch.
    pub async fn clear(&self, session: &Session) -> AppResult<usize> {
        let docs = self.store.query(&Self::inbox_query(&session.uid)).await?;

        let collection = notifications_collection();
        let mut batch = WriteBatch::new();
        for doc in &docs {
            batch.delete(collection.doc(&doc.id));
        }
        let count = batch.len();
        self.store.commit(batch).await?;
        tracing::debug!(uid = %session.uid, count, "Cleared notifications");
        Ok(count)
    }

    /// Delete one notification. Only its recipient may do so.
    pub async fn delete(&self, session: &Session, id: &str) -> AppResult<()> {
        let path = notifications_collection().doc(id);
        let doc = self.store.get(&path).await?.ok_or(AppError::NotFound)?;
        let notification: Notification = doc.decode()?;
        if notification.to_user_id != session.uid {
            return Err(AppError::Forbidden);
        }
        self.store.delete(&path).await?;
        Ok(())
    }
}
