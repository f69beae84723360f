use std::ops::DerefMut;

use chrono::{DateTime, Duration, Utc};
use rocket_db_pools::sqlx::postgres::PgRow;
use rocket_db_pools::sqlx::{self, PgPool, Postgres, Row, Transaction};

use crate::auth::store::{
    Account, CredentialStore, NewTokenPair, REVOKED_RETENTION_DAYS, StoredToken, TokenStore,
};
use crate::auth::{AuthError, AuthResult};

const UNIQUE_VIOLATION: &str = "23505";
const ACCOUNTS_EMAIL_KEY: &str = "accounts_email_key";

/// Postgres-backed store. Each trait call runs in its own transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_pair_tx(
        tx: &mut Transaction<'_, Postgres>,
        account_id: i64,
        pair: &NewTokenPair,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let refresh_id: i64 = sqlx::query_scalar(
            "INSERT INTO refresh_tokens (token_hash, expires_at, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&pair.refresh_digest)
        .bind(pair.refresh_expires_at)
        .bind(now)
        .fetch_one(tx.deref_mut())
        .await?;

        sqlx::query(
            "INSERT INTO access_tokens (token_hash, expires_at, account_id, refresh_token_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&pair.access_digest)
        .bind(pair.access_expires_at)
        .bind(account_id)
        .bind(refresh_id)
        .bind(now)
        .execute(tx.deref_mut())
        .await?;

        Ok(())
    }

    async fn revoke_pair_tx(
        tx: &mut Transaction<'_, Postgres>,
        refresh_id: i64,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let refresh = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(refresh_id)
        .execute(tx.deref_mut())
        .await?;

        sqlx::query(
            "UPDATE access_tokens SET revoked_at = $1 WHERE refresh_token_id = $2 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(refresh_id)
        .execute(tx.deref_mut())
        .await?;

        Ok(refresh.rows_affected())
    }
}

#[rocket::async_trait]
impl CredentialStore for PgStore {
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Account> {
        let row = sqlx::query(
            "INSERT INTO accounts (email, password_hash, created_at) VALUES ($1, $2, $3) RETURNING id, email, password_hash, created_at",
        )
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok(row) => account_from_row(&row),
            Err(err) if is_duplicate_email(&err) => Err(AuthError::DuplicateAccount),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    async fn find_account_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account(&self, account_id: i64) -> AuthResult<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at FROM accounts WHERE id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }
}

#[rocket::async_trait]
impl TokenStore for PgStore {
    async fn insert_pair(
        &self,
        account_id: i64,
        pair: &NewTokenPair,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_pair_tx(&mut tx, account_id, pair, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_access_token(
        &self,
        access_digest: &str,
    ) -> AuthResult<Option<(StoredToken, Account)>> {
        let row = sqlx::query(
            r#"
            SELECT t.id AS token_id, t.expires_at, t.revoked_at,
                   a.id, a.email, a.password_hash, a.created_at
            FROM access_tokens t
            JOIN accounts a ON a.id = t.account_id
            WHERE t.token_hash = $1
            "#,
        )
        .bind(access_digest)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let token = StoredToken {
            id: row.try_get("token_id")?,
            expires_at: row.try_get("expires_at")?,
            revoked_at: row.try_get("revoked_at")?,
        };
        Ok(Some((token, account_from_row(&row)?)))
    }

    async fn find_refresh_token(
        &self,
        refresh_digest: &str,
    ) -> AuthResult<Option<(StoredToken, i64)>> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.expires_at, r.revoked_at, t.account_id
            FROM refresh_tokens r
            JOIN access_tokens t ON t.refresh_token_id = r.id
            WHERE r.token_hash = $1
            "#,
        )
        .bind(refresh_digest)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let token = stored_token_from_row(&row)?;
        let account_id: i64 = row.try_get("account_id")?;
        Ok(Some((token, account_id)))
    }

    async fn rotate_pair(
        &self,
        refresh_digest: &str,
        replacement: &NewTokenPair,
        now: DateTime<Utc>,
    ) -> AuthResult<i64> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT r.id, r.expires_at, r.revoked_at, t.account_id
            FROM refresh_tokens r
            JOIN access_tokens t ON t.refresh_token_id = r.id
            WHERE r.token_hash = $1
            FOR UPDATE OF r
            "#,
        )
        .bind(refresh_digest)
        .fetch_optional(tx.deref_mut())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Err(AuthError::TokenNotFound),
        };

        let token = stored_token_from_row(&row)?;
        let account_id: i64 = row.try_get("account_id")?;

        if token.revoked_at.is_some() {
            return Err(AuthError::TokenReuse { account_id });
        }
        if token.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        Self::revoke_pair_tx(&mut tx, token.id, now).await?;
        Self::insert_pair_tx(&mut tx, account_id, replacement, now).await?;

        tx.commit().await?;
        Ok(account_id)
    }

    async fn revoke_pair(
        &self,
        refresh_digest: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT r.id, t.account_id
            FROM refresh_tokens r
            JOIN access_tokens t ON t.refresh_token_id = r.id
            WHERE r.token_hash = $1
            FOR UPDATE OF r
            "#,
        )
        .bind(refresh_digest)
        .fetch_optional(tx.deref_mut())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let refresh_id: i64 = row.try_get("id")?;
        let account_id: i64 = row.try_get("account_id")?;
        Self::revoke_pair_tx(&mut tx, refresh_id, now).await?;

        tx.commit().await?;
        Ok(Some(account_id))
    }

    async fn revoke_all_for_account(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = $1
            WHERE revoked_at IS NULL
              AND id IN (SELECT refresh_token_id FROM access_tokens WHERE account_id = $2)
            "#,
        )
        .bind(now)
        .bind(account_id)
        .execute(tx.deref_mut())
        .await?;

        sqlx::query(
            "UPDATE access_tokens SET revoked_at = $1 WHERE account_id = $2 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(account_id)
        .execute(tx.deref_mut())
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let mut conn = self.pool.acquire().await?;
        // access_tokens rows go with their refresh token via ON DELETE CASCADE.
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at <= $1 OR (revoked_at IS NOT NULL AND revoked_at <= $2)",
        )
        .bind(now)
        .bind(now - Duration::days(REVOKED_RETENTION_DAYS))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

fn account_from_row(row: &PgRow) -> AuthResult<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn stored_token_from_row(row: &PgRow) -> AuthResult<StoredToken> {
    Ok(StoredToken {
        id: row.try_get("id")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}

fn is_duplicate_email(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.code().map(|code| code == UNIQUE_VIOLATION).unwrap_or(false)
                && db_err.constraint() == Some(ACCOUNTS_EMAIL_KEY)
    )
}
