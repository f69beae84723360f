//! Token Issuer: mints, rotates, and revokes access/refresh pairs.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::auth::clock::Clock;
use crate::auth::store::{Account, NewTokenPair, TokenStore};
use crate::auth::{AuthConfig, AuthError, AuthResult};

/// 256 bits of entropy per token.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Bearer values handed to the transport layer. Only this struct ever holds the
/// raw token text; stores see digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub account_id: i64,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        }
    }

    pub async fn issue(&self, account: &Account) -> AuthResult<TokenPair> {
        let now = self.clock.now();
        let (pair, record) = self.mint(account.id, now)?;
        self.store.insert_pair(account.id, &record, now).await?;

        log::info!("issued token pair for account {}", account.id);
        Ok(pair)
    }

    /// Exchanges a live refresh token for a brand-new pair.
    ///
    /// The presented token and its paired access token are revoked in the same
    /// store operation that persists the replacement. Presenting a token that
    /// was already consumed revokes every live token of the account.
    pub async fn rotate(&self, presented_refresh: &str) -> AuthResult<TokenPair> {
        if presented_refresh.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let now = self.clock.now();
        let digest = digest_token(presented_refresh);

        // Mint before touching the store so a randomness failure changes nothing.
        // The account id is filled in from the store's answer below.
        let (mut pair, record) = self.mint(0, now)?;

        match self.store.rotate_pair(&digest, &record, now).await {
            Ok(account_id) => {
                pair.account_id = account_id;
                log::info!("rotated token pair for account {}", account_id);
                Ok(pair)
            }
            Err(AuthError::TokenReuse { account_id }) => {
                let revoked = self.store.revoke_all_for_account(account_id, now).await?;
                log::warn!(
                    "refresh token reuse for account {}; revoked {} live pair(s)",
                    account_id,
                    revoked
                );
                Err(AuthError::TokenRevoked)
            }
            Err(err) => Err(err),
        }
    }

    /// Revokes the pair a refresh token belongs to. Unknown tokens are ignored.
    pub async fn revoke(&self, presented_refresh: &str) -> AuthResult<Option<i64>> {
        if presented_refresh.is_empty() {
            return Ok(None);
        }
        let now = self.clock.now();
        let account_id = self
            .store
            .revoke_pair(&digest_token(presented_refresh), now)
            .await?;
        if let Some(account_id) = account_id {
            log::info!("revoked token pair for account {}", account_id);
        }
        Ok(account_id)
    }

    pub async fn purge_expired(&self) -> AuthResult<u64> {
        self.store.purge_expired(self.clock.now()).await
    }

    fn mint(&self, account_id: i64, now: DateTime<Utc>) -> AuthResult<(TokenPair, NewTokenPair)> {
        let access = IssuedToken {
            token: generate_token()?,
            expires_at: now + self.access_ttl,
        };
        let refresh = IssuedToken {
            token: generate_token()?,
            expires_at: now + self.refresh_ttl,
        };
        let record = NewTokenPair {
            access_digest: digest_token(&access.token),
            access_expires_at: access.expires_at,
            refresh_digest: digest_token(&refresh.token),
            refresh_expires_at: refresh.expires_at,
        };
        Ok((
            TokenPair {
                account_id,
                access,
                refresh,
            },
            record,
        ))
    }
}

/// Draws a fresh URL-safe token from the operating system's CSPRNG.
///
/// A failing random source is an error, never a fallback to a weaker generator.
pub fn generate_token() -> AuthResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Storage key for a bearer value.
pub fn digest_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::store::{CredentialStore, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        issuer: TokenIssuer,
        account: Account,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let issuer = TokenIssuer::new(&AuthConfig::default(), store.clone(), clock.clone());
        let account = store
            .create_account("a@x.com", "hash", clock.now())
            .await
            .expect("account");
        Fixture {
            store,
            clock,
            issuer,
            account,
        }
    }

    #[test]
    fn generated_tokens_are_url_safe_and_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let token = generate_token().expect("token");
            assert_eq!(token.len(), 43);
            assert!(
                token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
            assert!(seen.insert(token));
        }
    }

    #[test]
    fn digest_is_stable_and_hides_token() {
        let token = generate_token().expect("token");
        assert_eq!(digest_token(&token), digest_token(&token));
        assert_ne!(digest_token(&token), token);
    }

    #[tokio::test]
    async fn issues_pair_with_configured_lifetimes() {
        let fx = fixture().await;
        let now = fx.clock.now();
        let pair = fx.issuer.issue(&fx.account).await.expect("issue");

        assert_eq!(pair.account_id, fx.account.id);
        assert_ne!(pair.access.token, pair.refresh.token);
        assert_eq!(pair.access.expires_at, now + Duration::minutes(10));
        assert_eq!(pair.refresh.expires_at, now + Duration::days(7));

        let (_, owner) = fx
            .store
            .find_refresh_token(&digest_token(&pair.refresh.token))
            .await
            .expect("lookup")
            .expect("refresh persisted");
        assert_eq!(owner, fx.account.id);
    }

    #[tokio::test]
    async fn rotation_returns_new_pair_for_same_account() {
        let fx = fixture().await;
        let first = fx.issuer.issue(&fx.account).await.expect("issue");

        fx.clock.advance(Duration::minutes(30));
        let second = fx.issuer.rotate(&first.refresh.token).await.expect("rotate");

        assert_eq!(second.account_id, fx.account.id);
        assert_ne!(second.access.token, first.access.token);
        assert_ne!(second.refresh.token, first.refresh.token);
    }

    #[tokio::test]
    async fn rotation_is_single_use() {
        let fx = fixture().await;
        let first = fx.issuer.issue(&fx.account).await.expect("issue");
        let second = fx.issuer.rotate(&first.refresh.token).await.expect("rotate");

        let err = fx
            .issuer
            .rotate(&first.refresh.token)
            .await
            .expect_err("replayed refresh token");
        assert!(matches!(err, AuthError::TokenRevoked));

        // Replay burns the legitimate successor too.
        let err = fx
            .issuer
            .rotate(&second.refresh.token)
            .await
            .expect_err("successor revoked");
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn rotation_rejects_expired_refresh_token() {
        let fx = fixture().await;
        let pair = fx.issuer.issue(&fx.account).await.expect("issue");

        fx.clock.set(pair.refresh.expires_at);
        let err = fx
            .issuer
            .rotate(&pair.refresh.token)
            .await
            .expect_err("expired");
        assert!(matches!(err, AuthError::TokenExpired));

        // Nothing was consumed or written.
        let (token, _) = fx
            .store
            .find_refresh_token(&digest_token(&pair.refresh.token))
            .await
            .expect("lookup")
            .expect("still stored");
        assert!(token.revoked_at.is_none());
    }

    #[tokio::test]
    async fn rotation_rejects_unknown_and_empty_tokens() {
        let fx = fixture().await;
        let err = fx.issuer.rotate("not-a-token").await.expect_err("unknown");
        assert!(matches!(err, AuthError::TokenNotFound));

        let err = fx.issuer.rotate("").await.expect_err("empty");
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn revoke_marks_pair_and_ignores_unknown() {
        let fx = fixture().await;
        let pair = fx.issuer.issue(&fx.account).await.expect("issue");

        let owner = fx.issuer.revoke(&pair.refresh.token).await.expect("revoke");
        assert_eq!(owner, Some(fx.account.id));

        let (access, _) = fx
            .store
            .find_access_token(&digest_token(&pair.access.token))
            .await
            .expect("lookup")
            .expect("row kept");
        assert!(access.revoked_at.is_some());

        assert_eq!(fx.issuer.revoke("unknown").await.expect("no-op"), None);
    }
}
