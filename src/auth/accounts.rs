use std::sync::Arc;

use crate::auth::clock::Clock;
use crate::auth::passwords::PasswordService;
use crate::auth::store::{Account, CredentialStore};
use crate::auth::{AuthError, AuthResult};

/// Registers accounts and checks email/password pairs against stored hashes.
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    passwords: PasswordService,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        passwords: PasswordService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            passwords,
            clock,
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> AuthResult<Account> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }

        if self.store.find_account_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateAccount);
        }

        let password_hash = self.hash_off_thread(password.to_string()).await?;
        // The store enforces uniqueness again in case a concurrent registration won.
        let account = self
            .store
            .create_account(&email, &password_hash, self.clock.now())
            .await?;

        log::info!("registered account {}", account.id);
        Ok(account)
    }

    pub async fn verify(&self, email: &str, password: &str) -> AuthResult<Account> {
        let email = match normalize_email(email) {
            Ok(email) => email,
            Err(_) => return Err(AuthError::AccountNotFound),
        };

        let account = match self.store.find_account_by_email(&email).await? {
            Some(account) => account,
            None => {
                let passwords = self.passwords.clone();
                let password = password.to_string();
                let _ = tokio::task::spawn_blocking(move || passwords.verify_decoy(&password))
                    .await;
                log::debug!("login rejected: unknown account");
                return Err(AuthError::AccountNotFound);
            }
        };

        let passwords = self.passwords.clone();
        let password = password.to_string();
        let encoded = account.password_hash.clone();
        let verified =
            tokio::task::spawn_blocking(move || passwords.verify_password(&password, &encoded))
                .await
                .map_err(|err| AuthError::PasswordHash(err.to_string()))??;

        if !verified {
            log::debug!("login rejected: password mismatch for account {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        Ok(account)
    }

    async fn hash_off_thread(&self, password: String) -> AuthResult<String> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.hash_password(&password))
            .await
            .map_err(|err| AuthError::PasswordHash(err.to_string()))?
    }
}

/// Canonical form used for storage and lookup: trimmed and lower-cased.
pub fn normalize_email(raw: &str) -> AuthResult<String> {
    let email = raw.trim().to_lowercase();
    if email.chars().any(char::is_whitespace) {
        return Err(AuthError::Validation("a valid email address is required".into()));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(AuthError::Validation("a valid email address is required".into())),
    }
}
