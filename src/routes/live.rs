// Server-sent event streams. Each connection owns one subscription; closing
// the connection drops the stream and releases the listener.
use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use serde::Serialize;
use tokio_stream::StreamExt as _;

use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::feed::PostCard;
use crate::routes::comments::CommentView;
use crate::routes::notifications::NotificationView;
use crate::routes::posts::FeedParams;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/live/feed", get(live_feed))
        .route("/api/live/saved", get(live_saved))
        .route("/api/live/notifications", get(live_notifications))
        .route("/api/live/posts/{id}/comments", get(live_comments))
        .route("/api/live/profile", get(live_profile))
}

fn snapshot_event<T: Serialize>(items: &T) -> Event {
    match Event::default().event("snapshot").json_data(items) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Failed to encode snapshot: {}", e);
            Event::default().event("error").data("encode failed")
        }
    }
}

fn sse<S, T>(
    snapshots: S,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + 'static,
{
    let events = snapshots.map(|items| Ok(snapshot_event(&items)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn live_feed(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(params): Query<FeedParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let limit = state.feed_limit(params.limit);
    let viewer = user.uid().map(str::to_string);
    let posts = state.feed().subscribe(Some(limit)).into_stream();
    sse(posts.map(move |posts| PostCard::list(&posts, viewer.as_deref())))
}

async fn live_saved(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let viewer = user.uid().to_string();
    let posts = state.feed().subscribe_saved(&viewer).into_stream();
    sse(posts.map(move |posts| PostCard::list(&posts, Some(&viewer))))
}

async fn live_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let inbox = state.notifications().subscribe(user.uid()).into_stream();
    sse(inbox.map(|notifications| NotificationView::list(&notifications)))
}

async fn live_comments(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(post_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Fail fast on unknown posts instead of streaming empty snapshots
    state.feed().post(&post_id).await?;
    let viewer = user.uid().map(str::to_string);
    let comments = state.comments().subscribe(&post_id).into_stream();
    Ok(sse(comments.map(move |comments| {
        CommentView::list(&comments, viewer.as_deref())
    })))
}

async fn live_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let profiles = state.accounts().subscribe_profile(user.uid()).into_stream();
    sse(profiles.map(|mut users| users.pop()))
}
