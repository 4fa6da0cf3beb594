use rand::Rng;
use rusqlite::{params, OptionalExtension};

use super::IdentityError;
use crate::state::DbPool;

/// Create a new session for an account. Returns the session token.
pub fn create_session(pool: &DbPool, uid: &str, hours: u64) -> Result<String, IdentityError> {
    let conn = pool.get()?;
    let token = generate_token();

    conn.execute(
        "INSERT INTO sessions (token, uid, expires_at) VALUES (?1, ?2, datetime('now', ?3))",
        params![token, uid, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Resolve a live session token to `(uid, email)`.
pub fn lookup_session(
    pool: &DbPool,
    token: &str,
) -> Result<Option<(String, String)>, IdentityError> {
    let conn = pool.get()?;
    let found = conn
        .query_row(
            "SELECT a.uid, a.email FROM sessions s \
             JOIN accounts a ON a.uid = s.uid \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(found)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), IdentityError> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Delete every session of an account. Returns how many were removed.
pub fn delete_sessions_for(pool: &DbPool, uid: &str) -> Result<usize, IdentityError> {
    let conn = pool.get()?;
    Ok(conn.execute("DELETE FROM sessions WHERE uid = ?1", params![uid])?)
}

/// Generate a cryptographically random 32-byte hex token.
pub(crate) fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn pool_with_account(uid: &str) -> DbPool {
        let pool = db::memory_pool().unwrap();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO accounts (uid, email, password_hash) VALUES (?1, ?2, 'x')",
                params![uid, format!("{}@example.com", uid)],
            )
            .unwrap();
        pool
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn session_lifecycle() {
        let pool = pool_with_account("u1");
        let token = create_session(&pool, "u1", 1).unwrap();

        let found = lookup_session(&pool, &token).unwrap();
        assert_eq!(found, Some(("u1".to_string(), "u1@example.com".to_string())));

        delete_session(&pool, &token).unwrap();
        assert!(lookup_session(&pool, &token).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_are_ignored() {
        let pool = pool_with_account("u1");
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO sessions (token, uid, expires_at) VALUES ('old', 'u1', datetime('now', '-1 hours'))",
                [],
            )
            .unwrap();
        assert!(lookup_session(&pool, "old").unwrap().is_none());
    }

    #[test]
    fn delete_sessions_for_revokes_all() {
        let pool = pool_with_account("u1");
        create_session(&pool, "u1", 1).unwrap();
        create_session(&pool, "u1", 1).unwrap();
        assert_eq!(delete_sessions_for(&pool, "u1").unwrap(), 2);
    }
}
