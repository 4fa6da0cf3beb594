pub mod identity;
pub mod session;

use thiserror::Error;

pub use identity::{IdentityProvider, Session};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Email is already registered")]
    EmailInUse,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,
}
