//! Authentication module: configuration, credential verification, token
//! issuance and rotation, the request gate, and HTTP route handlers.

use std::sync::Arc;

pub mod accounts;
pub mod clock;
pub mod config;
pub mod cookies;
pub mod error;
pub mod guards;
pub mod passwords;
pub mod responses;
pub mod routes;
pub mod store;
pub mod tokens;

pub use accounts::AccountService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, PasswordCost};
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, SessionResolver};
pub use passwords::PasswordService;
pub use store::{Account, CredentialStore, MemoryStore, PgStore, TokenStore};
pub use tokens::{IssuedToken, TokenIssuer, TokenPair};

/// Everything the routes and the gate need, wired once at startup.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub accounts: Arc<AccountService>,
    pub tokens: Arc<TokenIssuer>,
    pub sessions: Arc<SessionResolver>,
    pub clock: Arc<dyn Clock>,
}

impl AuthState {
    pub fn new<S>(config: AuthConfig, store: Arc<S>, clock: Arc<dyn Clock>) -> AuthResult<Self>
    where
        S: CredentialStore + TokenStore + 'static,
    {
        config.validate()?;
        let passwords = PasswordService::new(config.password_cost)?;

        let accounts = AccountService::new(store.clone(), passwords, clock.clone());
        let tokens = TokenIssuer::new(&config, store.clone(), clock.clone());
        let sessions = SessionResolver::new(store, clock.clone());

        Ok(Self {
            config,
            accounts: Arc::new(accounts),
            tokens: Arc::new(tokens),
            sessions: Arc::new(sessions),
            clock,
        })
    }
}
