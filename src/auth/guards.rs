use std::sync::Arc;

use rocket::State;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::clock::Clock;
use crate::auth::store::{Account, TokenStore};
use crate::auth::tokens::digest_token;
use crate::auth::{AuthError, AuthResult, AuthState};

/// Resolves a presented access token to the account that owns it.
pub struct SessionResolver {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn authenticate(&self, presented: Option<&str>) -> AuthResult<Account> {
        let token = match presented {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::Unauthenticated),
        };

        let (stored, account) = self
            .store
            .find_access_token(&digest_token(token))
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        stored.ensure_usable(self.clock.now())?;
        Ok(account)
    }
}

/// An account whose access token was checked for this request.
///
/// Only the gate builds this value, so a handler that takes an `AuthUser`
/// cannot run for an unauthenticated request.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser(pub Account);

impl AuthUser {
    pub fn account(&self) -> &Account {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match admit(request).await {
            Ok(account) => Outcome::Success(AuthUser(account)),
            Err(err) => {
                if err.is_server_error() {
                    log::error!("session resolution failed: {}", err);
                } else {
                    log::debug!("request rejected by gate: {}", err);
                }
                Outcome::Error((err.status(), err))
            }
        }
    }
}

async fn admit(request: &Request<'_>) -> AuthResult<Account> {
    let state = request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let presented = presented_access_token(request, &state.config.access_cookie_name);
    state.sessions.authenticate(presented.as_deref()).await
}

/// The access cookie wins; `Authorization: Bearer` is the fallback for
/// clients that do not keep cookies.
fn presented_access_token(request: &Request<'_>, cookie_name: &str) -> Option<String> {
    if let Some(cookie) = request.cookies().get(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    let header = request.headers().get_one("Authorization")?;
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}
