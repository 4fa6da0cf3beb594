//! Notification fan-out and the per-user inbox.

mod common;

use common::{sign_up, test_app, wait_for, with_store, FlakyQueries};
use safewalk::error::AppError;
use safewalk::feed::post_path;
use safewalk::notifications::{notifications_collection, NewPostNotice, NotificationCenter};
use safewalk::posts::PostDraft;
use safewalk::store::{Query, Writes};

fn notice(from: &str, post_id: &str) -> NewPostNotice {
    NewPostNotice {
        from_user_id: from.to_string(),
        from_username: "alice".to_string(),
        post_title: "Broken streetlight".to_string(),
        post_id: post_id.to_string(),
    }
}

#[tokio::test]
async fn fan_out_reaches_everyone_but_the_author() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;
    let bob = sign_up(state, "bob").await;
    let carol = sign_up(state, "carol").await;

    let sent = state
        .notifications()
        .notify_all_except(&alice.session.uid, &notice(&alice.session.uid, "p1"))
        .await
        .unwrap();
    assert_eq!(sent, 2);

    assert!(state
        .notifications()
        .list(&alice.session.uid)
        .await
        .unwrap()
        .is_empty());
    for user in [&bob, &carol] {
        let inbox = state.notifications().list(&user.session.uid).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].from_user_id, alice.session.uid);
        assert_eq!(inbox[0].post_id.as_deref(), Some("p1"));
        assert!(!inbox[0].read);
    }
}

#[tokio::test]
async fn failed_fan_out_batch_leaves_no_notifications() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;
    let bob = sign_up(state, "bob").await;
    let _carol = sign_up(state, "carol").await;

    let recipients = [bob.session.uid.as_str(), "someone-else"];
    let mut batch =
        NotificationCenter::fanout_batch(recipients, &notice(&alice.session.uid, "p1"));
    // Injected failure: updating a document that does not exist
    batch.update(post_path("missing"), Writes::new().set("x", 1));

    assert!(state.store.commit(batch).await.is_err());

    let all = state
        .store
        .query(&Query::collection(notifications_collection()))
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn publishing_notifies_with_anonymous_name() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;
    let bob = sign_up(state, "bob").await;

    let published = state
        .posts()
        .create(
            &alice.session,
            &PostDraft {
                title: "Suspicious car".to_string(),
                location: "Oak Ave".to_string(),
                description: "Circling the block".to_string(),
                anonymous: true,
                image: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(published.notified, Some(1));

    let inbox = state.notifications().list(&bob.session.uid).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].from_username, "Anonymous");
    assert_eq!(inbox[0].post_title, "Suspicious car");
    assert_eq!(inbox[0].post_id.as_deref(), Some(published.post.id.as_str()));
}

#[tokio::test]
async fn inbox_subscription_tracks_new_and_cleared_notifications() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;
    let bob = sign_up(state, "bob").await;
    let center = state.notifications();

    let mut inbox = center.subscribe(&bob.session.uid);
    assert!(wait_for(&mut inbox, |_| true).await.is_empty());

    center
        .notify_all_except(&alice.session.uid, &notice(&alice.session.uid, "p1"))
        .await
        .unwrap();
    wait_for(&mut inbox, |items| items.len() == 1).await;
    assert_eq!(center.unread_count(&bob.session.uid).await.unwrap(), 1);

    assert_eq!(center.mark_all_read(&bob.session).await.unwrap(), 1);
    assert_eq!(center.unread_count(&bob.session.uid).await.unwrap(), 0);
    wait_for(&mut inbox, |items| items.iter().all(|n| n.read)).await;

    assert_eq!(center.clear(&bob.session).await.unwrap(), 1);
    assert!(wait_for(&mut inbox, |items| items.is_empty()).await.is_empty());
}

#[tokio::test]
async fn only_the_recipient_can_delete_a_notification() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;
    let bob = sign_up(state, "bob").await;
    let center = state.notifications();

    center
        .notify_all_except(&alice.session.uid, &notice(&alice.session.uid, "p1"))
        .await
        .unwrap();
    let id = center.list(&bob.session.uid).await.unwrap()[0].id.clone();

    let err = center.delete(&alice.session, &id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    center.delete(&bob.session, &id).await.unwrap();
    assert!(center.list(&bob.session.uid).await.unwrap().is_empty());
}

#[tokio::test]
async fn post_stays_when_fan_out_fails() {
    let app = test_app();
    let alice = sign_up(&app.state, "alice").await;
    let bob = sign_up(&app.state, "bob").await;
    let flaky = FlakyQueries::new(app.state.store.clone());
    let state = with_store(&app.state, flaky.clone());

    flaky.fail_queries(true);
    let published = state
        .posts()
        .create(
            &alice.session,
            &PostDraft {
                title: "Flooded path".to_string(),
                location: "River walk".to_string(),
                description: "Knee deep near the bridge".to_string(),
                anonymous: false,
                image: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(published.notified, None);
    flaky.fail_queries(false);

    let post = app.state.feed().post(&published.post.id).await.unwrap();
    assert_eq!(post.title, "Flooded path");
    assert!(app
        .state
        .notifications()
        .list(&bob.session.uid)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn malformed_notifications_are_skipped() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;
    let bob = sign_up(state, "bob").await;
    let center = state.notifications();

    center
        .notify_all_except(&alice.session.uid, &notice(&alice.session.uid, "p1"))
        .await
        .unwrap();
    // Missing every field but the recipient and timestamp
    state
        .store
        .set(
            &notifications_collection().doc("broken"),
            Writes::new()
                .set("toUserId", bob.session.uid.as_str())
                .set("read", false)
                .server_timestamp("createdAt"),
        )
        .await
        .unwrap();

    let inbox = center.list(&bob.session.uid).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].post_id.as_deref(), Some("p1"));
}
