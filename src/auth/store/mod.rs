//! Persistence seams for accounts and bearer tokens.
//!
//! Tokens are stored by digest only. Every trait method is a single atomic
//! unit against the backing store, so callers never coordinate across calls.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::auth::{AuthError, AuthResult};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Revoked pairs are kept this long before the sweeper drops them.
pub const REVOKED_RETENTION_DAYS: i64 = 30;

#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Expiry and revocation state of a persisted token, as read back from a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredToken {
    pub id: i64,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// A token is usable strictly before its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn ensure_usable(&self, now: DateTime<Utc>) -> AuthResult<()> {
        if self.revoked_at.is_some() {
            return Err(AuthError::TokenRevoked);
        }
        if self.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }
        Ok(())
    }
}

/// Digests and expiries of a freshly minted pair, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTokenPair {
    pub access_digest: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_digest: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `DuplicateAccount` when the email is already taken.
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Account>;

    async fn find_account_by_email(&self, email: &str) -> AuthResult<Option<Account>>;

    async fn find_account(&self, account_id: i64) -> AuthResult<Option<Account>>;
}

#[rocket::async_trait]
pub trait TokenStore: Send + Sync {
    /// Persists both halves of a pair or neither.
    async fn insert_pair(
        &self,
        account_id: i64,
        pair: &NewTokenPair,
        now: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Looks up an access token and joins its owning account.
    async fn find_access_token(
        &self,
        access_digest: &str,
    ) -> AuthResult<Option<(StoredToken, Account)>>;

    /// Looks up a refresh token and the account of the access token it was
    /// minted with.
    async fn find_refresh_token(
        &self,
        refresh_digest: &str,
    ) -> AuthResult<Option<(StoredToken, i64)>>;

    /// Consumes a refresh token and persists its replacement in one step.
    ///
    /// Fails with `TokenNotFound`, `TokenExpired`, or `TokenReuse` when the
    /// presented token was already consumed or revoked. On failure nothing
    /// is written.
    async fn rotate_pair(
        &self,
        refresh_digest: &str,
        replacement: &NewTokenPair,
        now: DateTime<Utc>,
    ) -> AuthResult<i64>;

    /// Revokes a refresh token and its paired access token. Returns the owning
    /// account when the token was known.
    async fn revoke_pair(
        &self,
        refresh_digest: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<i64>>;

    async fn revoke_all_for_account(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> AuthResult<u64>;

    /// Deletes pairs whose refresh token has expired, plus pairs revoked more
    /// than [`REVOKED_RETENTION_DAYS`] ago. Returns the number of pairs removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}
