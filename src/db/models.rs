use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name shown instead of the author on anonymous posts and comments.
pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Stored as `"yes"` / `"no"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anonymity {
    Yes,
    #[default]
    No,
}

impl Anonymity {
    pub fn from_flag(anonymous: bool) -> Self {
        if anonymous {
            Anonymity::Yes
        } else {
            Anonymity::No
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Anonymity::Yes)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Anonymity::Yes => "yes",
            Anonymity::No => "no",
        }
    }
}

/// `users/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    pub email: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// `usernames/{username}` - reservation record emulating a unique index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameClaim {
    pub uid: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// `posts/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub anonymous: Anonymity,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub saves: Vec<String>,
    #[serde(default)]
    pub comment_count: i64,
}

impl Post {
    pub fn liked_by(&self, uid: &str) -> bool {
        self.likes.iter().any(|u| u == uid)
    }

    pub fn saved_by(&self, uid: &str) -> bool {
        self.saves.iter().any(|u| u == uid)
    }

    /// Author name as readers see it.
    pub fn display_name(&self) -> &str {
        if self.anonymous.is_anonymous() {
            ANONYMOUS_NAME
        } else {
            &self.username
        }
    }

    pub fn display_avatar(&self) -> Option<&str> {
        if self.anonymous.is_anonymous() {
            None
        } else {
            self.photo_url.as_deref()
        }
    }
}

/// `posts/{postId}/comments/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub anonymous: Anonymity,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn display_name(&self) -> &str {
        if self.anonymous.is_anonymous() {
            ANONYMOUS_NAME
        } else {
            &self.username
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "new_post")]
    NewPost,
}

/// `notifications/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    pub to_user_id: String,
    pub from_user_id: String,
    pub from_username: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_title: String,
    #[serde(default)]
    pub post_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(anonymous: &str) -> Post {
        serde_json::from_value(json!({
            "id": "p1",
            "userId": "u1",
            "username": "alice",
            "title": "Broken streetlight",
            "photoURL": "http://x/blobs/profilePictures/u1.jpg",
            "anonymous": anonymous,
            "createdAt": "2026-01-01T00:00:00.000000Z",
            "likes": ["u2"],
        }))
        .unwrap()
    }

    #[test]
    fn post_decodes_store_layout() {
        let p = post("no");
        assert_eq!(p.user_id, "u1");
        assert!(p.liked_by("u2"));
        assert!(!p.saved_by("u2"));
        assert_eq!(p.comment_count, 0);
        assert_eq!(p.display_name(), "alice");
        assert!(p.display_avatar().is_some());
    }

    #[test]
    fn anonymous_post_hides_author_but_keeps_user_id() {
        let p = post("yes");
        assert_eq!(p.display_name(), ANONYMOUS_NAME);
        assert!(p.display_avatar().is_none());
        assert_eq!(p.user_id, "u1");
    }

    #[test]
    fn notification_kind_uses_snake_case_tag() {
        assert_eq!(
            serde_json::to_value(NotificationKind::NewPost).unwrap(),
            json!("new_post")
        );
    }

    #[test]
    fn role_defaults_to_user() {
        let u: User = serde_json::from_value(json!({
            "uid": "u1",
            "username": "alice",
            "email": "a@example.com"
        }))
        .unwrap();
        assert_eq!(u.role, Role::User);
        assert_eq!(u.name, "");
    }
}
