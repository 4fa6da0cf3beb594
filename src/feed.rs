// Feed sync - live list of posts, newest first, plus like/save toggles.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::Session;
use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::store::{
    decode_all, CollectionPath, DocPath, Direction, Query, SharedStore, TypedSubscription,
    Writes,
};

pub const POSTS: &str = "posts";

pub type FeedSubscription = TypedSubscription<Post>;

pub fn posts_collection() -> CollectionPath {
    CollectionPath::new(POSTS)
}

pub fn post_path(id: &str) -> DocPath {
    posts_collection().doc(id)
}

/// Which set-valued field of a post a toggle acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Likes,
    Saves,
}

impl Membership {
    fn field(self) -> &'static str {
        match self {
            Membership::Likes => "likes",
            Membership::Saves => "saves",
        }
    }

    fn contains(self, post: &Post, uid: &str) -> bool {
        match self {
            Membership::Likes => post.liked_by(uid),
            Membership::Saves => post.saved_by(uid),
        }
    }
}

#[derive(Clone)]
pub struct FeedSync {
    store: SharedStore,
}

impl FeedSync {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// All posts by `createdAt` descending, optionally capped (home preview).
    pub fn feed_query(limit: Option<usize>) -> Query {
        let query = Query::collection(posts_collection()).order_by("createdAt", Direction::Desc);
        match limit {
            Some(n) => query.limit(n),
            None => query,
        }
    }

    pub fn saved_query(uid: &str) -> Query {
        Query::collection(posts_collection())
            .where_array_contains("saves", uid)
            .order_by("createdAt", Direction::Desc)
    }

    pub fn subscribe(&self, limit: Option<usize>) -> FeedSubscription {
        TypedSubscription::open(self.store.clone(), Self::feed_query(limit))
    }

    pub fn subscribe_saved(&self, uid: &str) -> FeedSubscription {
        TypedSubscription::open(self.store.clone(), Self::saved_query(uid))
    }

    /// One-off read of the feed.
    pub async fn snapshot(&self, limit: Option<usize>) -> AppResult<Vec<Post>> {
        self.load(&Self::feed_query(limit)).await
    }

    pub async fn saved(&self, uid: &str) -> AppResult<Vec<Post>> {
        self.load(&Self::saved_query(uid)).await
    }

    pub async fn post(&self, id: &str) -> AppResult<Post> {
        let doc = self
            .store
            .get(&post_path(id))
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(doc.decode()?)
    }

    /// Flip the viewer's like on `post` as the caller last saw it. Returns
    /// the new membership; the feed picks up the stored result on its own.
    pub async fn toggle_like(&self, post: &Post, session: &Session) -> AppResult<bool> {
        self.toggle(post, session, Membership::Likes).await
    }

    pub async fn toggle_save(&self, post: &Post, session: &Session) -> AppResult<bool> {
        self.toggle(post, session, Membership::Saves).await
    }

    async fn toggle(&self, post: &Post, session: &Session, which: Membership) -> AppResult<bool> {
        let member = which.contains(post, &session.uid);
        let writes = if member {
            Writes::new().array_remove(which.field(), session.uid.as_str())
        } else {
            Writes::new().array_union(which.field(), session.uid.as_str())
        };

        self.store.update(&post_path(&post.id), writes).await?;
        tracing::debug!(post = %post.id, uid = %session.uid, field = which.field(), now = !member, "Toggled membership");
        Ok(!member)
    }

    async fn load(&self, query: &Query) -> AppResult<Vec<Post>> {
        let docs = self.store.query(query).await?;
        Ok(decode_all(&docs))
    }
}

/// A post as one viewer sees it. Anonymous posts carry no author identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCard {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub title: String,
    pub location: String,
    pub description: String,
    pub image_url: Option<String>,
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub like_count: usize,
    pub liked: bool,
    pub saved: bool,
    pub comment_count: i64,
    pub mine: bool,
}

impl PostCard {
    pub fn for_viewer(post: &Post, viewer: Option<&str>) -> Self {
        let viewer = viewer.unwrap_or_default();
        Self {
            id: post.id.clone(),
            display_name: post.display_name().to_string(),
            avatar_url: post.display_avatar().map(str::to_string),
            title: post.title.clone(),
            location: post.location.clone(),
            description: post.description.clone(),
            image_url: post.image_url.clone(),
            anonymous: post.anonymous.is_anonymous(),
            created_at: post.created_at,
            like_count: post.likes.len(),
            liked: !viewer.is_empty() && post.liked_by(viewer),
            saved: !viewer.is_empty() && post.saved_by(viewer),
            comment_count: post.comment_count.max(0),
            mine: !viewer.is_empty() && post.user_id == viewer,
        }
    }

    pub fn list(posts: &[Post], viewer: Option<&str>) -> Vec<Self> {
        posts.iter().map(|p| Self::for_viewer(p, viewer)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Anonymity;

    fn post(anonymous: Anonymity) -> Post {
        Post {
            id: "p1".into(),
            user_id: "u1".into(),
            username: "alice".into(),
            title: "Broken streetlight".into(),
            location: "Main St".into(),
            description: "Dark corner".into(),
            image_url: None,
            photo_url: Some("http://x/me.jpg".into()),
            anonymous,
            created_at: Utc::now(),
            likes: vec!["u2".into()],
            saves: vec![],
            comment_count: 2,
        }
    }

    #[test]
    fn card_reflects_viewer_membership() {
        let card = PostCard::for_viewer(&post(Anonymity::No), Some("u2"));
        assert!(card.liked);
        assert!(!card.saved);
        assert!(!card.mine);
        assert_eq!(card.like_count, 1);
        assert_eq!(card.display_name, "alice");
        assert_eq!(card.comment_count, 2);
    }

    #[test]
    fn anonymous_card_hides_author() {
        let card = PostCard::for_viewer(&post(Anonymity::Yes), Some("u1"));
        assert_eq!(card.display_name, "Anonymous");
        assert!(card.avatar_url.is_none());
        assert!(card.mine);
    }

    #[test]
    fn signed_out_viewer_has_no_membership() {
        let card = PostCard::for_viewer(&post(Anonymity::No), None);
        assert!(!card.liked && !card.saved && !card.mine);
    }

    #[test]
    fn feed_query_orders_newest_first() {
        let q = FeedSync::feed_query(Some(3));
        assert_eq!(q.order_by, Some(("createdAt".to_string(), Direction::Desc)));
        assert_eq!(q.limit, Some(3));
        assert!(FeedSync::feed_query(None).limit.is_none());
    }
}
