// Identity provider - email + password accounts and their sessions.
use rusqlite::{params, OptionalExtension};

use super::session;
use super::IdentityError;
use crate::state::DbPool;

/// An authenticated session. Passed explicitly to every operation that acts
/// on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: String,
    pub token: String,
}

#[derive(Clone)]
pub struct IdentityProvider {
    pool: DbPool,
    session_hours: u64,
    bcrypt_cost: u32,
}

const RESET_TOKEN_MINUTES: i64 = 60;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IdentityProvider {
    pub fn new(pool: DbPool, session_hours: u64, bcrypt_cost: u32) -> Self {
        Self {
            pool,
            session_hours,
            bcrypt_cost,
        }
    }

    /// Register an account and return its uid. Does not sign in.
    pub fn create_account(&self, email: &str, password: &str) -> Result<String, IdentityError> {
        let email = normalize_email(email);
        let hash = bcrypt::hash(password, self.bcrypt_cost)?;
        let uid = uuid::Uuid::now_v7().simple().to_string();

        let conn = self.pool.get()?;
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM accounts WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        if taken {
            return Err(IdentityError::EmailInUse);
        }

        conn.execute(
            "INSERT INTO accounts (uid, email, password_hash) VALUES (?1, ?2, ?3)",
            params![uid, email, hash],
        )?;

        tracing::info!(%uid, "Account created");
        Ok(uid)
    }

    /// Remove an account and everything hanging off it.
    pub fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        session::delete_sessions_for(&self.pool, uid)?;
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM password_resets WHERE uid = ?1", params![uid])?;
        conn.execute("DELETE FROM accounts WHERE uid = ?1", params![uid])?;
        Ok(())
    }

    pub fn open_session(&self, uid: &str) -> Result<Session, IdentityError> {
        let conn = self.pool.get()?;
        let email: String = conn
            .query_row(
                "SELECT email FROM accounts WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(IdentityError::InvalidCredentials)?;
        drop(conn);

        let token = session::create_session(&self.pool, uid, self.session_hours)?;
        Ok(Session {
            uid: uid.to_string(),
            email,
            token,
        })
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let email = normalize_email(email);
        let conn = self.pool.get()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT uid, password_hash FROM accounts WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        drop(conn);

        let (uid, hash) = row.ok_or(IdentityError::InvalidCredentials)?;
        if !bcrypt::verify(password, &hash).unwrap_or(false) {
            return Err(IdentityError::InvalidCredentials);
        }

        let token = session::create_session(&self.pool, &uid, self.session_hours)?;
        tracing::info!(%uid, "Signed in");
        Ok(Session { uid, email, token })
    }

    pub fn sign_out(&self, token: &str) -> Result<(), IdentityError> {
        session::delete_session(&self.pool, token)
    }

    /// Resolve a bearer or cookie token.
    pub fn authenticate(&self, token: &str) -> Result<Option<Session>, IdentityError> {
        Ok(session::lookup_session(&self.pool, token)?.map(|(uid, email)| Session {
            uid,
            email,
            token: token.to_string(),
        }))
    }

    /// Issue a password reset token. Unknown emails yield `None` so callers
    /// can answer identically either way.
    pub fn request_password_reset(&self, email: &str) -> Result<Option<String>, IdentityError> {
        let email = normalize_email(email);
        let conn = self.pool.get()?;
        let uid: Option<String> = conn
            .query_row(
                "SELECT uid FROM accounts WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;

        let Some(uid) = uid else {
            return Ok(None);
        };

        let token = session::generate_token();
        conn.execute(
            "INSERT INTO password_resets (token, uid, expires_at) VALUES (?1, ?2, datetime('now', ?3))",
            params![token, uid, format!("+{} minutes", RESET_TOKEN_MINUTES)],
        )?;
        Ok(Some(token))
    }

    /// Set a new password with a reset token. Every existing session of the
    /// account is revoked.
    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<(), IdentityError> {
        let conn = self.pool.get()?;
        let uid: String = conn
            .query_row(
                "SELECT uid FROM password_resets WHERE token = ?1 AND expires_at > datetime('now')",
                params![token],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(IdentityError::InvalidResetToken)?;

        let hash = bcrypt::hash(new_password, self.bcrypt_cost)?;
        conn.execute(
            "UPDATE accounts SET password_hash = ?1 WHERE uid = ?2",
            params![hash, uid],
        )?;
        conn.execute("DELETE FROM password_resets WHERE uid = ?1", params![uid])?;
        drop(conn);

        let revoked = session::delete_sessions_for(&self.pool, &uid)?;
        tracing::info!(%uid, revoked, "Password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn provider() -> IdentityProvider {
        IdentityProvider::new(db::memory_pool().unwrap(), 1, 4)
    }

    #[test]
    fn sign_up_then_sign_in() {
        let identity = provider();
        let uid = identity
            .create_account(" Alice@Example.com ", "secret1")
            .unwrap();

        let session = identity.sign_in("alice@example.com", "secret1").unwrap();
        assert_eq!(session.uid, uid);
        assert_eq!(session.email, "alice@example.com");

        let resolved = identity.authenticate(&session.token).unwrap().unwrap();
        assert_eq!(resolved, session);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let identity = provider();
        identity.create_account("a@example.com", "secret1").unwrap();
        assert!(matches!(
            identity.create_account("A@example.com", "other12"),
            Err(IdentityError::EmailInUse)
        ));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let identity = provider();
        identity.create_account("a@example.com", "secret1").unwrap();
        assert!(matches!(
            identity.sign_in("a@example.com", "nope"),
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.sign_in("b@example.com", "secret1"),
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[test]
    fn sign_out_invalidates_token() {
        let identity = provider();
        identity.create_account("a@example.com", "secret1").unwrap();
        let session = identity.sign_in("a@example.com", "secret1").unwrap();
        identity.sign_out(&session.token).unwrap();
        assert!(identity.authenticate(&session.token).unwrap().is_none());
    }

    #[test]
    fn password_reset_swaps_password_and_revokes_sessions() {
        let identity = provider();
        identity.create_account("a@example.com", "secret1").unwrap();
        let old = identity.sign_in("a@example.com", "secret1").unwrap();

        let token = identity
            .request_password_reset("a@example.com")
            .unwrap()
            .unwrap();
        identity.reset_password(&token, "brandnew").unwrap();

        assert!(identity.authenticate(&old.token).unwrap().is_none());
        assert!(identity.sign_in("a@example.com", "secret1").is_err());
        assert!(identity.sign_in("a@example.com", "brandnew").is_ok());

        // Tokens are single use
        assert!(matches!(
            identity.reset_password(&token, "again123"),
            Err(IdentityError::InvalidResetToken)
        ));
    }

    #[test]
    fn reset_for_unknown_email_is_silent() {
        let identity = provider();
        assert!(identity
            .request_password_reset("ghost@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_account_removes_sessions() {
        let identity = provider();
        let uid = identity.create_account("a@example.com", "secret1").unwrap();
        let session = identity.open_session(&uid).unwrap();
        identity.delete_account(&uid).unwrap();
        assert!(identity.authenticate(&session.token).unwrap().is_none());
        assert!(identity.sign_in("a@example.com", "secret1").is_err());
    }
}
