use std::sync::Arc;

use auth_gate::auth::{
    AuthError, AuthState, Clock, CredentialStore, ManualClock, PgStore, TokenStore,
};
use auth_gate::test_support::{TestDatabase, test_config};
use chrono::{DateTime, Duration};

async fn provision() -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(err) => {
            eprintln!("skipping postgres store test: {err}");
            None
        }
    }
}

fn fixed_clock() -> Arc<ManualClock> {
    let start = DateTime::from_timestamp(1_760_000_000, 0).expect("valid timestamp");
    Arc::new(ManualClock::new(start))
}

#[tokio::test]
async fn accounts_are_unique_by_normalised_email() {
    let Some(test_db) = provision().await else {
        return;
    };
    let store = Arc::new(PgStore::new(test_db.pool_clone()));
    let state = AuthState::new(test_config(), store.clone(), fixed_clock()).expect("state");

    let account = state
        .accounts
        .register(" Someone@Example.com", "pw")
        .await
        .expect("registered");
    assert_eq!(account.email, "someone@example.com");

    let err = state
        .accounts
        .register("someone@example.COM", "other")
        .await
        .expect_err("duplicate");
    assert!(matches!(err, AuthError::DuplicateAccount));

    // The unique constraint backs the pre-check.
    let err = store
        .create_account("someone@example.com", "hash", account.created_at)
        .await
        .expect_err("constraint");
    assert!(matches!(err, AuthError::DuplicateAccount));

    let found = store
        .find_account(account.id)
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(found.email, account.email);

    let verified = state
        .accounts
        .verify("SOMEONE@example.com", "pw")
        .await
        .expect("verified");
    assert_eq!(verified.id, account.id);
    assert!(matches!(
        state.accounts.verify("someone@example.com", "nope").await,
        Err(AuthError::InvalidCredentials)
    ));

    test_db.close().await;
}

#[tokio::test]
async fn rotation_is_single_use_and_replay_revokes_everything() {
    let Some(test_db) = provision().await else {
        return;
    };
    let clock = fixed_clock();
    let store = Arc::new(PgStore::new(test_db.pool_clone()));
    let state = AuthState::new(test_config(), store.clone(), clock.clone()).expect("state");

    let account = state
        .accounts
        .register("rotate@example.com", "pw")
        .await
        .expect("registered");
    let first = state.tokens.issue(&account).await.expect("issue");
    let other_device = state.tokens.issue(&account).await.expect("issue");

    let second = state.tokens.rotate(&first.refresh.token).await.expect("rotate");
    assert_eq!(second.account_id, account.id);
    assert!(matches!(
        state.sessions.authenticate(Some(&first.access.token)).await,
        Err(AuthError::TokenRevoked)
    ));
    let resolved = state
        .sessions
        .authenticate(Some(&second.access.token))
        .await
        .expect("new access token");
    assert_eq!(resolved.id, account.id);

    let err = state
        .tokens
        .rotate(&first.refresh.token)
        .await
        .expect_err("replay");
    assert!(matches!(err, AuthError::TokenRevoked));

    for token in [&second.access.token, &other_device.access.token] {
        assert!(matches!(
            state.sessions.authenticate(Some(token)).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    test_db.close().await;
}

#[tokio::test]
async fn expiry_boundary_and_purge() {
    let Some(test_db) = provision().await else {
        return;
    };
    let clock = fixed_clock();
    let store = Arc::new(PgStore::new(test_db.pool_clone()));
    let state = AuthState::new(test_config(), store.clone(), clock.clone()).expect("state");

    let account = state
        .accounts
        .register("expiry@example.com", "pw")
        .await
        .expect("registered");
    let pair = state.tokens.issue(&account).await.expect("issue");

    clock.set(pair.access.expires_at - Duration::seconds(1));
    assert!(state.sessions.authenticate(Some(&pair.access.token)).await.is_ok());

    clock.set(pair.access.expires_at);
    assert!(matches!(
        state.sessions.authenticate(Some(&pair.access.token)).await,
        Err(AuthError::TokenExpired)
    ));

    clock.set(pair.refresh.expires_at);
    assert!(matches!(
        state.tokens.rotate(&pair.refresh.token).await,
        Err(AuthError::TokenExpired)
    ));

    let purged = store.purge_expired(clock.now()).await.expect("purge");
    assert_eq!(purged, 1);
    assert!(
        store
            .find_access_token(&auth_gate::auth::tokens::digest_token(&pair.access.token))
            .await
            .expect("lookup")
            .is_none()
    );

    test_db.close().await;
}
