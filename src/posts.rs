// Post publishing - create, edit, and delete alerts with their images.
use bytes::Bytes;
use serde_json::Value;

use crate::accounts::users_collection;
use crate::auth::Session;
use crate::blob::BlobStore;
use crate::db::models::{Anonymity, Post, Role, User, ANONYMOUS_NAME};
use crate::error::{ActionContext, AppError, AppResult};
use crate::feed::post_path;
use crate::notifications::{NewPostNotice, NotificationCenter};
use crate::store::{new_id, SharedStore, Writes};

pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// User input for a new or edited post.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub location: String,
    pub description: String,
    pub anonymous: bool,
    pub image: Option<Bytes>,
}

impl PostDraft {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty()
            || self.location.trim().is_empty()
            || self.description.trim().is_empty()
        {
            return Err(AppError::BadRequest("All fields are required.".into()));
        }
        if self.title.trim().chars().count() > MAX_TITLE_LEN {
            return Err(AppError::BadRequest(format!(
                "Title must be {} characters or less",
                MAX_TITLE_LEN
            )));
        }
        if self.description.trim().chars().count() > MAX_DESCRIPTION_LEN {
            return Err(AppError::BadRequest(format!(
                "Description must be {} characters or less",
                MAX_DESCRIPTION_LEN
            )));
        }
        Ok(())
    }

    fn image(&self) -> Option<&Bytes> {
        self.image.as_ref().filter(|data| !data.is_empty())
    }
}

/// Result of sharing a post. `notified` is `None` when the post was stored
/// but the notification fan-out failed.
#[derive(Debug, Clone)]
pub struct Published {
    pub post: Post,
    pub notified: Option<usize>,
}

#[derive(Clone)]
pub struct PostService {
    store: SharedStore,
    blobs: BlobStore,
    notifications: NotificationCenter,
}

impl PostService {
    pub fn new(store: SharedStore, blobs: BlobStore, notifications: NotificationCenter) -> Self {
        Self {
            store,
            blobs,
            notifications,
        }
    }

    pub async fn create(&self, session: &Session, draft: &PostDraft) -> AppResult<Published> {
        draft.validate()?;
        let author = self.author(session).await?;

        let image_url = match draft.image() {
            Some(data) => Some(self.upload_image(data.clone()).await?),
            None => None,
        };

        let id = new_id();
        let anonymity = Anonymity::from_flag(draft.anonymous);
        let writes = Writes::new()
            .set("userId", session.uid.as_str())
            .set("username", author.username.as_str())
            .set("title", draft.title.trim())
            .set("location", draft.location.trim())
            .set("description", draft.description.trim())
            .set("imageUrl", image_url.clone())
            .set("photoURL", author.photo_url.clone())
            .set("anonymous", anonymity.as_str())
            .server_timestamp("createdAt")
            .set("likes", Value::Array(Vec::new()))
            .set("saves", Value::Array(Vec::new()))
            .set("commentCount", 0);

        if let Err(e) = self.store.create(&post_path(&id), writes).await {
            if let Some(url) = &image_url {
                self.discard_image(url).await;
            }
            return Err(e).or_failed("Failed to share post.");
        }
        tracing::info!(post = %id, uid = %session.uid, anonymous = anonymity.is_anonymous(), "Post created");

        let notice = NewPostNotice {
            from_user_id: session.uid.clone(),
            from_username: if anonymity.is_anonymous() {
                ANONYMOUS_NAME.to_string()
            } else {
                author.username.clone()
            },
            post_title: draft.title.trim().to_string(),
            post_id: id.clone(),
        };
        let notified = match self.notifications.notify_all_except(&session.uid, &notice).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::error!(post = %id, "Failed to send notifications: {}", e);
                None
            }
        };

        let post = self.load(&id).await?;
        Ok(Published { post, notified })
    }

    /// Owner-only edit. A new image replaces the old blob.
    pub async fn edit(&self, session: &Session, id: &str, draft: &PostDraft) -> AppResult<Post> {
        let post = self.load(id).await?;
        if post.user_id != session.uid {
            return Err(AppError::Forbidden);
        }
        draft.validate()?;

        let mut writes = Writes::new()
            .set("title", draft.title.trim())
            .set("location", draft.location.trim())
            .set("description", draft.description.trim())
            .set("anonymous", Anonymity::from_flag(draft.anonymous).as_str());

        if let Some(data) = draft.image() {
            let url = self.upload_image(data.clone()).await?;
            if let Some(old) = &post.image_url {
                self.discard_image(old).await;
            }
            writes = writes.set("imageUrl", url);
        }

        self.store
            .update(&post_path(id), writes)
            .await
            .or_failed("Failed to update post.")?;
        tracing::info!(post = %id, "Post updated");
        self.load(id).await
    }

    /// Delete a post and its image. Allowed for the author and for admins.
    pub async fn delete(&self, session: &Session, role: Role, id: &str) -> AppResult<()> {
        let post = self.load(id).await?;
        if post.user_id != session.uid && role != Role::Admin {
            return Err(AppError::Forbidden);
        }

        self.store
            .delete(&post_path(id))
            .await
            .or_failed("Failed to delete post.")?;
        if let Some(url) = &post.image_url {
            self.discard_image(url).await;
        }
        tracing::info!(post = %id, by = %session.uid, "Post deleted");
        Ok(())
    }

    async fn author(&self, session: &Session) -> AppResult<User> {
        let doc = self
            .store
            .get(&users_collection().doc(&session.uid))
            .await
            .or_failed("Failed to share post.")?
            .ok_or_else(|| AppError::BadRequest("User data not found.".into()))?;
        Ok(doc.decode()?)
    }

    async fn upload_image(&self, data: Bytes) -> AppResult<String> {
        let path = format!("posts/{}.jpg", new_id());
        self.blobs
            .upload(&path, data)
            .await
            .or_failed("Failed to upload image.")
    }

    async fn discard_image(&self, url: &str) {
        if let Err(e) = self.blobs.delete_by_url(url).await {
            tracing::warn!(%url, "Failed to delete image: {}", e);
        }
    }

    async fn load(&self, id: &str) -> AppResult<Post> {
        let doc = self
            .store
            .get(&post_path(id))
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(doc.decode()?)
    }
}
