use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::auth::store::{
    Account, CredentialStore, NewTokenPair, REVOKED_RETENTION_DAYS, StoredToken, TokenStore,
};
use crate::auth::{AuthError, AuthResult};

/// In-process store used by tests and local development.
///
/// Lookups share a read lock; each mutation holds the write lock for the whole
/// operation, which gives the same all-or-nothing behaviour as a transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    next_account_id: i64,
    next_token_id: i64,
    accounts: HashMap<i64, Account>,
    account_ids_by_email: HashMap<String, i64>,
    access: HashMap<String, AccessRow>,
    refresh: HashMap<String, RefreshRow>,
}

#[derive(Debug, Clone)]
struct AccessRow {
    token: StoredToken,
    account_id: i64,
    refresh_digest: String,
}

#[derive(Debug, Clone)]
struct RefreshRow {
    token: StoredToken,
    access_digest: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn next_token_id(&mut self) -> i64 {
        self.next_token_id += 1;
        self.next_token_id
    }

    fn insert_pair(&mut self, account_id: i64, pair: &NewTokenPair) -> AuthResult<()> {
        if !self.accounts.contains_key(&account_id) {
            return Err(AuthError::Persistence(format!(
                "account {account_id} does not exist"
            )));
        }
        if self.access.contains_key(&pair.access_digest)
            || self.refresh.contains_key(&pair.refresh_digest)
        {
            return Err(AuthError::Persistence("token digest collision".into()));
        }

        let refresh_id = self.next_token_id();
        let access_id = self.next_token_id();
        self.refresh.insert(
            pair.refresh_digest.clone(),
            RefreshRow {
                token: StoredToken {
                    id: refresh_id,
                    expires_at: pair.refresh_expires_at,
                    revoked_at: None,
                },
                access_digest: pair.access_digest.clone(),
            },
        );
        self.access.insert(
            pair.access_digest.clone(),
            AccessRow {
                token: StoredToken {
                    id: access_id,
                    expires_at: pair.access_expires_at,
                    revoked_at: None,
                },
                account_id,
                refresh_digest: pair.refresh_digest.clone(),
            },
        );
        Ok(())
    }

    /// Marks a refresh token and its paired access token revoked. Returns the
    /// owning account and whether anything changed.
    fn revoke_pair(&mut self, refresh_digest: &str, now: DateTime<Utc>) -> Option<(i64, bool)> {
        let refresh = self.refresh.get_mut(refresh_digest)?;
        let mut changed = false;
        if refresh.token.revoked_at.is_none() {
            refresh.token.revoked_at = Some(now);
            changed = true;
        }
        let access = self.access.get_mut(&refresh.access_digest)?;
        if access.token.revoked_at.is_none() {
            access.token.revoked_at = Some(now);
            changed = true;
        }
        Some((access.account_id, changed))
    }
}

#[rocket::async_trait]
impl CredentialStore for MemoryStore {
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Account> {
        let mut tables = self.tables.write();
        if tables.account_ids_by_email.contains_key(email) {
            return Err(AuthError::DuplicateAccount);
        }

        tables.next_account_id += 1;
        let account = Account {
            id: tables.next_account_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        };
        tables
            .account_ids_by_email
            .insert(account.email.clone(), account.id);
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let tables = self.tables.read();
        Ok(tables
            .account_ids_by_email
            .get(email)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn find_account(&self, account_id: i64) -> AuthResult<Option<Account>> {
        Ok(self.tables.read().accounts.get(&account_id).cloned())
    }
}

#[rocket::async_trait]
impl TokenStore for MemoryStore {
    async fn insert_pair(
        &self,
        account_id: i64,
        pair: &NewTokenPair,
        _now: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.tables.write().insert_pair(account_id, pair)
    }

    async fn find_access_token(
        &self,
        access_digest: &str,
    ) -> AuthResult<Option<(StoredToken, Account)>> {
        let tables = self.tables.read();
        Ok(tables.access.get(access_digest).and_then(|row| {
            tables
                .accounts
                .get(&row.account_id)
                .map(|account| (row.token, account.clone()))
        }))
    }

    async fn find_refresh_token(
        &self,
        refresh_digest: &str,
    ) -> AuthResult<Option<(StoredToken, i64)>> {
        let tables = self.tables.read();
        Ok(tables.refresh.get(refresh_digest).and_then(|row| {
            tables
                .access
                .get(&row.access_digest)
                .map(|access| (row.token, access.account_id))
        }))
    }

    async fn rotate_pair(
        &self,
        refresh_digest: &str,
        replacement: &NewTokenPair,
        now: DateTime<Utc>,
    ) -> AuthResult<i64> {
        let mut tables = self.tables.write();

        let (token, access_digest) = match tables.refresh.get(refresh_digest) {
            Some(row) => (row.token, row.access_digest.clone()),
            None => return Err(AuthError::TokenNotFound),
        };
        let account_id = tables
            .access
            .get(&access_digest)
            .map(|row| row.account_id)
            .ok_or(AuthError::TokenNotFound)?;

        if token.revoked_at.is_some() {
            return Err(AuthError::TokenReuse { account_id });
        }
        if token.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        // Validate the insert before consuming anything so a failure leaves
        // the old pair untouched.
        if tables.access.contains_key(&replacement.access_digest)
            || tables.refresh.contains_key(&replacement.refresh_digest)
        {
            return Err(AuthError::Persistence("token digest collision".into()));
        }

        tables.revoke_pair(refresh_digest, now);
        tables.insert_pair(account_id, replacement)?;
        Ok(account_id)
    }

    async fn revoke_pair(
        &self,
        refresh_digest: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<i64>> {
        Ok(self
            .tables
            .write()
            .revoke_pair(refresh_digest, now)
            .map(|(account_id, _)| account_id))
    }

    async fn revoke_all_for_account(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let mut tables = self.tables.write();
        let digests: Vec<String> = tables
            .access
            .values()
            .filter(|row| row.account_id == account_id)
            .map(|row| row.refresh_digest.clone())
            .collect();

        let mut revoked = 0;
        for digest in digests {
            if let Some((_, true)) = tables.revoke_pair(&digest, now) {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let cutoff = now - Duration::days(REVOKED_RETENTION_DAYS);
        let mut tables = self.tables.write();

        let stale: Vec<(String, String)> = tables
            .refresh
            .iter()
            .filter(|(_, row)| {
                row.token.is_expired(now)
                    || row.token.revoked_at.is_some_and(|revoked| revoked <= cutoff)
            })
            .map(|(digest, row)| (digest.clone(), row.access_digest.clone()))
            .collect();

        for (refresh_digest, access_digest) in &stale {
            tables.refresh.remove(refresh_digest);
            tables.access.remove(access_digest);
        }
        Ok(stale.len() as u64)
    }
}
