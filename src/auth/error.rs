use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("account already exists")]
    DuplicateAccount,
    #[error("account not found")]
    AccountNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token not found")]
    TokenNotFound,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("refresh token reuse detected")]
    TokenReuse { account_id: i64 },
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("secure random source unavailable: {0}")]
    RandomSource(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::AccountNotFound
            | AuthError::InvalidCredentials
            | AuthError::TokenNotFound
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::TokenReuse { .. }
            | AuthError::Unauthenticated => Status::Unauthorized,
            AuthError::DuplicateAccount => Status::Conflict,
            AuthError::Validation(_) => Status::BadRequest,
            AuthError::Persistence(_)
            | AuthError::RandomSource(_)
            | AuthError::PasswordHash(_)
            | AuthError::Config(_) => Status::InternalServerError,
        }
    }

    /// Text that is safe to hand to a client.
    ///
    /// Unknown email and wrong password collapse into one message so a caller
    /// cannot probe which accounts exist.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::AccountNotFound | AuthError::InvalidCredentials => {
                "invalid credentials".into()
            }
            AuthError::TokenNotFound
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::TokenReuse { .. }
            | AuthError::Unauthenticated => "unauthorized".into(),
            AuthError::DuplicateAccount => "an account with this email already exists".into(),
            AuthError::Validation(msg) => msg.clone(),
            AuthError::Persistence(_)
            | AuthError::RandomSource(_)
            | AuthError::PasswordHash(_)
            | AuthError::Config(_) => "internal server error".into(),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().code >= 500
    }
}

impl From<rocket_db_pools::sqlx::Error> for AuthError {
    fn from(err: rocket_db_pools::sqlx::Error) -> Self {
        log::error!("database error: {}", err);
        AuthError::Persistence(err.to_string())
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

impl From<rand::Error> for AuthError {
    fn from(err: rand::Error) -> Self {
        log::error!("secure random source failed: {}", err);
        AuthError::RandomSource(err.to_string())
    }
}
