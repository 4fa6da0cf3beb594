use async_graphql::*;

use crate::auth::Session;
use crate::error::{ActionContext, AppError};
use crate::feed::PostCard;
use crate::graphql::types::{CommentNode, NotificationNode, PostNode, UserNode};
use crate::state::AppState;

/// Session of the caller, if the request carried one
pub(crate) fn viewer<'a>(ctx: &'a Context<'_>) -> Option<&'a Session> {
    ctx.data_opt::<Session>()
}

pub(crate) fn require_session<'a>(ctx: &'a Context<'_>) -> Result<&'a Session> {
    viewer(ctx).ok_or_else(|| Error::new("Unauthorized"))
}

/// GraphQL Query root
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Posts, newest first
    async fn feed(&self, ctx: &Context<'_>, limit: Option<i32>) -> Result<Vec<PostNode>> {
        let state = ctx.data::<AppState>()?;
        let limit = state.feed_limit(limit.map(|n| n.max(1) as usize));
        let posts = state
            .feed()
            .snapshot(Some(limit))
            .await
            .or_failed("Failed to load posts.")?;
        let uid = viewer(ctx).map(|s| s.uid.as_str());

        Ok(PostCard::list(&posts, uid)
            .into_iter()
            .map(PostNode::from)
            .collect())
    }

    /// Posts the caller has saved
    async fn saved_posts(&self, ctx: &Context<'_>) -> Result<Vec<PostNode>> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let posts = state
            .feed()
            .saved(&session.uid)
            .await
            .or_failed("Failed to load saved posts.")?;

        Ok(PostCard::list(&posts, Some(&session.uid))
            .into_iter()
            .map(PostNode::from)
            .collect())
    }

    /// A single post by id
    async fn post(&self, ctx: &Context<'_>, id: String) -> Result<Option<PostNode>> {
        let state = ctx.data::<AppState>()?;
        match state.feed().post(&id).await.or_failed("Failed to load post.") {
            Ok(post) => {
                let uid = viewer(ctx).map(|s| s.uid.as_str());
                Ok(Some(PostCard::for_viewer(&post, uid).into()))
            }
            Err(AppError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Comments of a post in display order
    async fn comments(&self, ctx: &Context<'_>, post_id: String) -> Result<Vec<CommentNode>> {
        let state = ctx.data::<AppState>()?;
        let comments = state
            .comments()
            .list(&post_id)
            .await
            .or_failed("Failed to load comments.")?;
        let uid = viewer(ctx).map(|s| s.uid.as_str());

        Ok(comments
            .iter()
            .map(|c| CommentNode::for_viewer(c, uid))
            .collect())
    }

    /// The caller's notifications, newest first
    async fn notifications(&self, ctx: &Context<'_>) -> Result<Vec<NotificationNode>> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let list = state
            .notifications()
            .list(&session.uid)
            .await
            .or_failed("Failed to load notifications.")?;
        Ok(list.into_iter().map(NotificationNode::from).collect())
    }

    async fn unread_count(&self, ctx: &Context<'_>) -> Result<i32> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let count = state
            .notifications()
            .unread_count(&session.uid)
            .await
            .or_failed("Failed to load notifications.")?;
        Ok(count as i32)
    }

    /// The caller's profile
    async fn me(&self, ctx: &Context<'_>) -> Result<UserNode> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let user = state
            .accounts()
            .profile(&session.uid)
            .await
            .or_failed("Failed to load profile.")?;
        Ok(user.into())
    }
}
