// Comment sub-feed - live comments under one post, with add/delete.
use crate::auth::Session;
use crate::db::models::{Anonymity, Comment, User};
use crate::error::{AppError, AppResult};
use crate::feed::post_path;
use crate::store::{
    decode_all, new_id, CollectionPath, Direction, Query, SharedStore, SubscriptionSlot,
    TypedSubscription, WriteBatch, Writes,
};

pub const COMMENTS: &str = "comments";
pub const MAX_COMMENT_LEN: usize = 500;

pub type CommentSubscription = TypedSubscription<Comment>;

pub fn comments_of(post_id: &str) -> CollectionPath {
    post_path(post_id).subcollection(COMMENTS)
}

/// Who is writing a comment, as stored on the comment itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentAuthor {
    pub uid: String,
    pub username: String,
    pub photo_url: Option<String>,
}

impl From<&User> for CommentAuthor {
    fn from(user: &User) -> Self {
        Self {
            uid: user.uid.clone(),
            username: user.username.clone(),
            photo_url: user.photo_url.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CommentService {
    store: SharedStore,
    order: Direction,
}

impl CommentService {
    pub fn new(store: SharedStore, order: Direction) -> Self {
        Self { store, order }
    }

    pub fn query(&self, post_id: &str) -> Query {
        Query::collection(comments_of(post_id)).order_by("createdAt", self.order)
    }

    pub fn subscribe(&self, post_id: &str) -> CommentSubscription {
        TypedSubscription::open(self.store.clone(), self.query(post_id))
    }

    pub async fn list(&self, post_id: &str) -> AppResult<Vec<Comment>> {
        let docs = self.store.query(&self.query(post_id)).await?;
        Ok(decode_all(&docs))
    }

    /// Add a comment and bump the post's comment count in the same batch.
    /// Returns the new comment id.
    pub async fn add_comment(
        &self,
        post_id: &str,
        text: &str,
        author: &CommentAuthor,
        anonymous: bool,
    ) -> AppResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Comment cannot be empty".into()));
        }
        if text.chars().count() > MAX_COMMENT_LEN {
            return Err(AppError::BadRequest(format!(
                "Comment must be {} characters or less",
                MAX_COMMENT_LEN
            )));
        }

        let post = post_path(post_id);
        if self.store.get(&post).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let id = new_id();
        let mut batch = WriteBatch::new();
        batch
            .create(
                comments_of(post_id).doc(&id),
                Writes::new()
                    .set("userId", author.uid.as_str())
                    .set("username", author.username.as_str())
                    .set("photoURL", author.photo_url.clone())
                    .set("anonymous", Anonymity::from_flag(anonymous).as_str())
                    .set("text", text)
                    .server_timestamp("createdAt"),
            )
            .update(post, Writes::new().increment("commentCount", 1));
        self.store.commit(batch).await?;

        Ok(id)
    }

    /// Delete a comment. Only its author may do this.
    pub async fn delete_comment(
        &self,
        post_id: &str,
        comment_id: &str,
        session: &Session,
    ) -> AppResult<()> {
        let path = comments_of(post_id).doc(comment_id);
        let doc = self.store.get(&path).await?.ok_or(AppError::NotFound)?;
        let comment: Comment = doc.decode()?;
        if comment.user_id != session.uid {
            return Err(AppError::Forbidden);
        }

        let mut batch = WriteBatch::new();
        batch.delete(path);
        // Comments outlive deleted posts; only adjust a count that still exists
        let post = post_path(post_id);
        if self.store.get(&post).await?.is_some() {
            batch.update(post, Writes::new().increment("commentCount", -1));
        }
        self.store.commit(batch).await?;
        Ok(())
    }
}

/// Comment panel of one screen. At most one post's comments are watched at a
/// time; opening another post releases the previous listener first.
pub struct CommentFeed {
    service: CommentService,
    slot: SubscriptionSlot<Comment>,
    post_id: Option<String>,
}

impl CommentFeed {
    pub fn new(service: CommentService) -> Self {
        Self {
            service,
            slot: SubscriptionSlot::new(),
            post_id: None,
        }
    }

    pub fn open_comments(&mut self, post_id: &str) -> &mut CommentSubscription {
        self.post_id = Some(post_id.to_string());
        let service = &self.service;
        self.slot.replace_with(|| service.subscribe(post_id))
    }

    pub fn active_post(&self) -> Option<&str> {
        self.post_id.as_deref()
    }

    pub fn current(&mut self) -> Option<&mut CommentSubscription> {
        self.slot.get_mut()
    }

    pub fn close(&mut self) {
        self.slot.clear();
        self.post_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_live_under_their_post() {
        assert_eq!(comments_of("p1").as_str(), "posts/p1/comments");
    }

    #[test]
    fn author_from_user_copies_identity() {
        let user = User {
            uid: "u1".into(),
            username: "alice".into(),
            name: String::new(),
            bio: String::new(),
            email: "a@example.com".into(),
            photo_url: Some("http://x/p.jpg".into()),
            role: Default::default(),
            created_at: None,
        };
        let author = CommentAuthor::from(&user);
        assert_eq!(author.uid, "u1");
        assert_eq!(author.photo_url.as_deref(), Some("http://x/p.jpg"));
    }
}
