use async_graphql::*;
use chrono::{DateTime, Utc};

use crate::db::models::{Comment, Notification, Role, User};
use crate::feed::PostCard;

/// A post in the feed, as the requesting user sees it
#[derive(Clone, Debug, SimpleObject)]
pub struct PostNode {
    /// Document id
    pub id: String,

    /// Author username, or "Anonymous"
    pub display_name: String,

    /// Author avatar (hidden for anonymous posts)
    pub avatar_url: Option<String>,

    pub title: String,
    pub location: String,
    pub description: String,
    pub image_url: Option<String>,
    pub anonymous: bool,

    /// Server timestamp of the first write
    pub created_at: DateTime<Utc>,

    pub like_count: i32,

    /// Whether the requesting user liked this post
    pub liked: bool,

    /// Whether the requesting user saved this post
    pub saved: bool,

    pub comment_count: i32,

    /// Whether the requesting user wrote this post
    pub mine: bool,
}

impl From<PostCard> for PostNode {
    fn from(card: PostCard) -> Self {
        Self {
            id: card.id,
            display_name: card.display_name,
            avatar_url: card.avatar_url,
            title: card.title,
            location: card.location,
            description: card.description,
            image_url: card.image_url,
            anonymous: card.anonymous,
            created_at: card.created_at,
            like_count: card.like_count as i32,
            liked: card.liked,
            saved: card.saved,
            comment_count: card.comment_count as i32,
            mine: card.mine,
        }
    }
}

/// A comment under a post
#[derive(Clone, Debug, SimpleObject)]
pub struct CommentNode {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub text: String,
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub mine: bool,
}

impl CommentNode {
    pub fn for_viewer(comment: &Comment, viewer: Option<&str>) -> Self {
        let anonymous = comment.anonymous.is_anonymous();
        Self {
            id: comment.id.clone(),
            display_name: comment.display_name().to_string(),
            avatar_url: if anonymous {
                None
            } else {
                comment.photo_url.clone()
            },
            text: comment.text.clone(),
            anonymous,
            created_at: comment.created_at,
            mine: viewer.is_some_and(|uid| uid == comment.user_id),
        }
    }
}

/// A notification in the requesting user's inbox
#[derive(Clone, Debug, SimpleObject)]
pub struct NotificationNode {
    pub id: String,
    pub from_username: String,
    pub post_title: String,
    pub post_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl From<Notification> for NotificationNode {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            from_username: n.from_username,
            post_title: n.post_title,
            post_id: n.post_id,
            created_at: n.created_at,
            read: n.read,
        }
    }
}

/// The requesting user's profile
#[derive(Clone, Debug, SimpleObject)]
pub struct UserNode {
    pub uid: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub email: String,
    #[graphql(name = "photoURL")]
    pub photo_url: Option<String>,
    pub is_admin: bool,
}

impl From<User> for UserNode {
    fn from(user: User) -> Self {
        Self {
            uid: user.uid,
            username: user.username,
            name: user.name,
            bio: user.bio,
            email: user.email,
            photo_url: user.photo_url,
            is_admin: user.role == Role::Admin,
        }
    }
}
