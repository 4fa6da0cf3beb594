use async_graphql::*;

use crate::comments::CommentAuthor;
use crate::error::ActionContext;
use crate::graphql::queries::require_session;
use crate::state::AppState;

/// GraphQL Mutation root
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Like or unlike a post. Returns whether the caller now likes it.
    async fn toggle_like(&self, ctx: &Context<'_>, post_id: String) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let feed = state.feed();
        let post = feed.post(&post_id).await.or_failed("Failed to update like.")?;
        Ok(feed
            .toggle_like(&post, session)
            .await
            .or_failed("Failed to update like.")?)
    }

    /// Save or unsave a post. Returns whether the caller now has it saved.
    async fn toggle_save(&self, ctx: &Context<'_>, post_id: String) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let feed = state.feed();
        let post = feed
            .post(&post_id)
            .await
            .or_failed("Failed to update saved posts.")?;
        Ok(feed
            .toggle_save(&post, session)
            .await
            .or_failed("Failed to update saved posts.")?)
    }

    /// Comment on a post. Returns the new comment id.
    async fn add_comment(
        &self,
        ctx: &Context<'_>,
        post_id: String,
        text: String,
        #[graphql(default)] anonymous: bool,
    ) -> Result<String> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let profile = state
            .accounts()
            .profile(&session.uid)
            .await
            .or_failed("Failed to add comment.")?;
        Ok(state
            .comments()
            .add_comment(&post_id, &text, &CommentAuthor::from(&profile), anonymous)
            .await
            .or_failed("Failed to add comment.")?)
    }

    async fn delete_comment(
        &self,
        ctx: &Context<'_>,
        post_id: String,
        comment_id: String,
    ) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        state
            .comments()
            .delete_comment(&post_id, &comment_id, session)
            .await
            .or_failed("Failed to delete comment.")?;
        Ok(true)
    }

    /// Delete every notification of the caller. Returns how many were removed.
    async fn clear_notifications(&self, ctx: &Context<'_>) -> Result<i32> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let cleared = state
            .notifications()
            .clear(session)
            .await
            .or_failed("Failed to clear notifications.")?;
        Ok(cleared as i32)
    }

    async fn mark_notifications_read(&self, ctx: &Context<'_>) -> Result<i32> {
        let state = ctx.data::<AppState>()?;
        let session = require_session(ctx)?;
        let updated = state
            .notifications()
            .mark_all_read(session)
            .await
            .or_failed("Failed to update notifications.")?;
        Ok(updated as i32)
    }
}
