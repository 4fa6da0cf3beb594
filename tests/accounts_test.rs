//! Signup with username reservation, login roles, and profile edits.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{sign_up, signup_form, test_app, ADMIN_EMAIL, PASSWORD};
use safewalk::accounts::{users_collection, usernames_collection, Accounts, USERNAMES};
use safewalk::db::models::{Role, UsernameClaim};
use safewalk::error::AppError;
use safewalk::state::AppState;
use safewalk::store::{
    CollectionPath, DocPath, Document, DocumentStore, Query, SharedStore, StoreError, WriteBatch,
};
use tokio::sync::broadcast;

async fn user_count(state: &AppState) -> usize {
    state
        .store
        .query(&Query::collection(users_collection()))
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn signup_creates_profile_and_reservation_with_same_uid() {
    let app = test_app();
    let state = &app.state;

    let signed_in = sign_up(state, "alice").await;
    let uid = signed_in.session.uid.clone();
    assert_eq!(signed_in.user.uid, uid);
    assert_eq!(signed_in.user.username, "alice");
    assert_eq!(signed_in.user.role, Role::User);
    assert!(signed_in.user.created_at.is_some());

    let claim: UsernameClaim = state
        .store
        .get(&usernames_collection().doc("alice"))
        .await
        .unwrap()
        .expect("reservation written")
        .decode()
        .unwrap();
    assert_eq!(claim.uid, uid);

    let session = state
        .identity
        .authenticate(&signed_in.session.token)
        .unwrap();
    assert_eq!(session.map(|s| s.uid), Some(uid));
}

#[tokio::test]
async fn taken_username_is_rejected_before_any_write() {
    let app = test_app();
    let state = &app.state;
    sign_up(state, "alice").await;
    assert_eq!(user_count(state).await, 1);

    let err = state
        .accounts()
        .sign_up(&signup_form("alice", "other@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref m) if m == "Username is already taken."));
    assert_eq!(user_count(state).await, 1);

    // The email was never registered, so it can still sign up under a free name
    let ok = state
        .accounts()
        .sign_up(&signup_form("alice2", "other@example.com"))
        .await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn validation_errors_come_before_any_write() {
    let app = test_app();
    let state = &app.state;

    let mut form = signup_form("alice", "a@example.com");
    form.confirm_password = "different".to_string();
    let err = state.accounts().sign_up(&form).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "Passwords do not match."));
    assert_eq!(user_count(state).await, 0);
    assert!(state.accounts().check_username("alice").await.unwrap());
}

/// Reports every username as free, so the reservation write is the only
/// thing standing between two signups for the same name.
struct StaleUsernameReads(SharedStore);

#[async_trait]
impl DocumentStore for StaleUsernameReads {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        if path.collection().as_str() == USERNAMES {
            return Ok(None);
        }
        self.0.get(path).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.0.query(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.0.commit(batch).await
    }

    fn changes(&self) -> broadcast::Receiver<CollectionPath> {
        self.0.changes()
    }
}

#[tokio::test]
async fn losing_the_reservation_race_rolls_back_the_signup() {
    let app = test_app();
    let state = &app.state;
    let winner = sign_up(state, "alice").await;

    let racing = Accounts::new(
        Arc::new(StaleUsernameReads(state.store.clone())),
        state.identity.clone(),
        state.blobs.clone(),
        state.config.clone(),
    );
    let err = racing
        .sign_up(&signup_form("alice", "late@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Only the winner's profile remains and the reservation still points at it
    assert_eq!(user_count(state).await, 1);
    let claim: UsernameClaim = state
        .store
        .get(&usernames_collection().doc("alice"))
        .await
        .unwrap()
        .unwrap()
        .decode()
        .unwrap();
    assert_eq!(claim.uid, winner.session.uid);

    // The loser's account was removed too
    let err = state
        .accounts()
        .sign_in("late@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));
}

#[tokio::test]
async fn sign_in_returns_role_and_admin_login_rejects_users() {
    let app = test_app();
    let state = &app.state;
    sign_up(state, "alice").await;
    state
        .accounts()
        .sign_up(&signup_form("boss", ADMIN_EMAIL))
        .await
        .unwrap();

    let alice = state
        .accounts()
        .sign_in("Alice@Example.com", PASSWORD)
        .await
        .unwrap();
    assert_eq!(alice.user.role, Role::User);

    let err = state
        .accounts()
        .sign_in_admin("alice@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let admin = state
        .accounts()
        .sign_in_admin(ADMIN_EMAIL, PASSWORD)
        .await
        .unwrap();
    assert_eq!(admin.user.role, Role::Admin);

    let err = state
        .accounts()
        .sign_in("alice@example.com", "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));
}

#[tokio::test]
async fn account_without_profile_cannot_sign_in() {
    let app = test_app();
    let state = &app.state;
    state
        .identity
        .create_account("ghost@example.com", PASSWORD)
        .unwrap();

    let err = state
        .accounts()
        .sign_in("ghost@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "User data not found."));
}

#[tokio::test]
async fn profile_edits_and_photo_upload() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;
    let accounts = state.accounts();

    let updated = accounts
        .update_profile(&alice.session, "  Alice Smith ", "Night shift nurse")
        .await
        .unwrap();
    assert_eq!(updated.name, "Alice Smith");
    assert_eq!(updated.bio, "Night shift nurse");

    let url = accounts
        .upload_photo(&alice.session, Bytes::from_static(b"jpeg bytes"))
        .await
        .unwrap();
    assert!(url.ends_with(&format!("profilePictures/{}.jpg", alice.session.uid)));
    assert_eq!(
        accounts.profile(&alice.session.uid).await.unwrap().photo_url,
        Some(url)
    );
}

#[tokio::test]
async fn password_reset_revokes_sessions() {
    let app = test_app();
    let state = &app.state;
    let alice = sign_up(state, "alice").await;

    let token = state
        .identity
        .request_password_reset("alice@example.com")
        .unwrap()
        .expect("reset token issued");
    state.identity.reset_password(&token, "new-secret").unwrap();

    assert!(state
        .identity
        .authenticate(&alice.session.token)
        .unwrap()
        .is_none());
    assert!(state
        .accounts()
        .sign_in("alice@example.com", "new-secret")
        .await
        .is_ok());
    assert!(state.identity.reset_password(&token, "again-123").is_err());
}
