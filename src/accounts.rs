// Accounts - signup with username reservation, login, and profile edits.
use bytes::Bytes;
use serde::Deserialize;

use crate::auth::{IdentityProvider, Session};
use crate::blob::BlobStore;
use crate::config::Config;
use crate::db::models::{Role, User};
use crate::error::{ActionContext, AppError, AppResult};
use crate::store::{CollectionPath, Query, SharedStore, StoreError, TypedSubscription, Writes};

pub const USERS: &str = "users";
pub const USERNAMES: &str = "usernames";
pub const MAX_USERNAME_LEN: usize = 30;

pub fn users_collection() -> CollectionPath {
    CollectionPath::new(USERS)
}

pub fn usernames_collection() -> CollectionPath {
    CollectionPath::new(USERNAMES)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUpForm {
    /// Field checks that need no store access.
    pub fn validate(&self, min_password_length: usize) -> AppResult<()> {
        let username = self.username.trim();
        if username.is_empty()
            || self.email.trim().is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(AppError::BadRequest("All fields are required.".into()));
        }
        if self.password != self.confirm_password {
            return Err(AppError::BadRequest("Passwords do not match.".into()));
        }
        if self.password.chars().count() < min_password_length {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters.",
                min_password_length
            )));
        }
        if !valid_username(username) {
            return Err(AppError::BadRequest(
                "Username may only contain letters, numbers, '.', '_' and '-'.".into(),
            ));
        }
        if !self.email.contains('@') {
            return Err(AppError::BadRequest("Enter a valid email address.".into()));
        }
        Ok(())
    }
}

/// Usernames double as document ids under `usernames/`.
fn valid_username(name: &str) -> bool {
    name.chars().count() <= MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && name != "."
        && name != ".."
}

/// A signed-in user with their profile.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: Session,
    pub user: User,
}

#[derive(Clone)]
pub struct Accounts {
    store: SharedStore,
    identity: IdentityProvider,
    blobs: BlobStore,
    config: Config,
}

impl Accounts {
    pub fn new(
        store: SharedStore,
        identity: IdentityProvider,
        blobs: BlobStore,
        config: Config,
    ) -> Self {
        Self {
            store,
            identity,
            blobs,
            config,
        }
    }

    /// Availability pre-check. Not a guarantee: the reservation write during
    /// signup is what actually claims the name.
    pub async fn check_username(&self, name: &str) -> AppResult<bool> {
        let name = name.trim();
        if !valid_username(name) || name.is_empty() {
            return Ok(false);
        }
        let claim = self.store.get(&usernames_collection().doc(name)).await?;
        Ok(claim.is_none())
    }

    pub async fn sign_up(&self, form: &SignUpForm) -> AppResult<SignedIn> {
        form.validate(self.config.auth.min_password_length)?;
        let username = form.username.trim();

        if !self.check_username(username).await.or_failed("Failed to create account.")? {
            return Err(username_taken());
        }

        let uid = self.identity.create_account(&form.email, &form.password)?;
        let email = crate::auth::identity::normalize_email(&form.email);
        let role = if self.config.is_admin_email(&email) {
            Role::Admin
        } else {
            Role::User
        };

        let profile = Writes::new()
            .set("uid", uid.as_str())
            .set("username", username)
            .set("name", "")
            .set("bio", "")
            .set("email", email.as_str())
            .set("photoURL", serde_json::Value::Null)
            .set("role", role.as_str())
            .server_timestamp("createdAt");
        let user_doc = users_collection().doc(&uid);
        if let Err(e) = self.store.set(&user_doc, profile).await {
            self.discard_account(&uid);
            return Err(e).or_failed("Failed to create account.");
        }

        let claim = Writes::new()
            .set("uid", uid.as_str())
            .server_timestamp("createdAt");
        match self
            .store
            .create(&usernames_collection().doc(username), claim)
            .await
        {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                tracing::info!(%username, "Lost username race, rolling back signup");
                self.rollback_signup(&uid).await;
                return Err(username_taken());
            }
            Err(e) => {
                self.rollback_signup(&uid).await;
                return Err(e).or_failed("Failed to create account.");
            }
        }

        tracing::info!(%uid, %username, role = role.as_str(), "User signed up");
        let session = self.identity.open_session(&uid)?;
        let user = self.profile(&uid).await?;
        Ok(SignedIn { session, user })
    }

    /// Email + password login. An account without a profile document is
    /// signed straight back out.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<SignedIn> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::BadRequest("All fields are required.".into()));
        }
        let session = self.identity.sign_in(email, password)?;
        match self.find_user(&session.uid).await {
            Ok(Some(user)) => Ok(SignedIn { session, user }),
            Ok(None) => {
                self.identity.sign_out(&session.token)?;
                Err(AppError::BadRequest("User data not found.".into()))
            }
            Err(e) => {
                self.identity.sign_out(&session.token)?;
                Err(e).or_failed("Failed to load user data.")
            }
        }
    }

    /// Login for the admin dashboard. Non-admins are signed out again.
    pub async fn sign_in_admin(&self, email: &str, password: &str) -> AppResult<SignedIn> {
        let signed_in = self.sign_in(email, password).await?;
        if signed_in.user.role != Role::Admin {
            self.identity.sign_out(&signed_in.session.token)?;
            tracing::warn!(uid = %signed_in.session.uid, "Non-admin attempted admin login");
            return Err(AppError::Forbidden);
        }
        Ok(signed_in)
    }

    pub async fn profile(&self, uid: &str) -> AppResult<User> {
        self.find_user(uid).await?.ok_or(AppError::NotFound)
    }

    pub async fn role_of(&self, uid: &str) -> AppResult<Role> {
        Ok(self
            .find_user(uid)
            .await?
            .map(|user| user.role)
            .unwrap_or_default())
    }

    pub fn subscribe_profile(&self, uid: &str) -> TypedSubscription<User> {
        let query = Query::collection(users_collection()).where_eq("uid", uid);
        TypedSubscription::open(self.store.clone(), query)
    }

    pub async fn update_profile(&self, session: &Session, name: &str, bio: &str) -> AppResult<User> {
        let writes = Writes::new().set("name", name.trim()).set("bio", bio.trim());
        self.store
            .update(&users_collection().doc(&session.uid), writes)
            .await
            .or_failed("Failed to update profile.")?;
        self.profile(&session.uid).await
    }

    /// Store a new profile picture and point the profile at it. Existing
    /// posts keep the avatar they were published with.
    pub async fn upload_photo(&self, session: &Session, image: Bytes) -> AppResult<String> {
        if image.is_empty() {
            return Err(AppError::BadRequest("No image provided.".into()));
        }
        let path = format!("profilePictures/{}.jpg", session.uid);
        let url = self
            .blobs
            .upload(&path, image)
            .await
            .or_failed("Failed to upload photo.")?;
        self.store
            .update(
                &users_collection().doc(&session.uid),
                Writes::new().set("photoURL", url.as_str()),
            )
            .await
            .or_failed("Failed to upload photo.")?;
        Ok(url)
    }

    async fn find_user(&self, uid: &str) -> AppResult<Option<User>> {
        match self.store.get(&users_collection().doc(uid)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    async fn rollback_signup(&self, uid: &str) {
        if let Err(e) = self.store.delete(&users_collection().doc(uid)).await {
            tracing::error!(%uid, "Failed to remove user document during rollback: {}", e);
        }
        self.discard_account(uid);
    }

    fn discard_account(&self, uid: &str) {
        if let Err(e) = self.identity.delete_account(uid) {
            tracing::error!(%uid, "Failed to remove account during rollback: {}", e);
        }
    }
}

fn username_taken() -> AppError {
    AppError::Conflict("Username is already taken.".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(username: &str, password: &str, confirm: &str) -> SignUpForm {
        SignUpForm {
            username: username.into(),
            email: "a@example.com".into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    fn message(err: AppError) -> String {
        match err {
            AppError::BadRequest(msg) => msg,
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    #[test]
    fn missing_fields_are_rejected() {
        let err = form("", "secret1", "secret1").validate(6).unwrap_err();
        assert_eq!(message(err), "All fields are required.");
    }

    #[test]
    fn mismatched_passwords_are_rejected() {
        let err = form("alice", "secret1", "secret2").validate(6).unwrap_err();
        assert_eq!(message(err), "Passwords do not match.");
    }

    #[test]
    fn short_password_is_rejected() {
        let err = form("alice", "abc", "abc").validate(6).unwrap_err();
        assert_eq!(message(err), "Password must be at least 6 characters.");
    }

    #[test]
    fn usernames_must_be_path_safe() {
        assert!(valid_username("alice_01"));
        assert!(valid_username("j.doe"));
        assert!(!valid_username("a/b"));
        assert!(!valid_username("has space"));
        assert!(!valid_username(".."));
        assert!(form("a/b", "secret1", "secret1").validate(6).is_err());
    }

    #[test]
    fn valid_form_passes() {
        assert!(form("alice", "secret1", "secret1").validate(6).is_ok());
    }
}
