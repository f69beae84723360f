use crate::auth::{AuthError, AuthResult};

/// Argon2id cost parameters. Raise these for production hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Authentication configuration loaded from environment variables.
///
/// Built once at startup and handed to every component by value; nothing reads
/// the environment after construction.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub password_cost: PasswordCost,
    pub purge_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: 10 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            access_cookie_name: "auth_token".into(),
            refresh_cookie_name: "refresh_token".into(),
            cookie_domain: None,
            cookie_secure: true,
            password_cost: PasswordCost::default(),
            purge_interval_secs: 60 * 60,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let defaults = Self::default();

        let access_token_ttl_secs =
            env_parse("AUTH_GATE_ACCESS_TOKEN_TTL_SECS")?.unwrap_or(defaults.access_token_ttl_secs);
        let refresh_token_ttl_secs = env_parse("AUTH_GATE_REFRESH_TOKEN_TTL_SECS")?
            .unwrap_or(defaults.refresh_token_ttl_secs);
        let access_cookie_name = std::env::var("AUTH_GATE_ACCESS_COOKIE_NAME")
            .unwrap_or(defaults.access_cookie_name);
        let refresh_cookie_name = std::env::var("AUTH_GATE_REFRESH_COOKIE_NAME")
            .unwrap_or(defaults.refresh_cookie_name);
        let cookie_domain = std::env::var("AUTH_GATE_COOKIE_DOMAIN").ok();
        let cookie_secure = std::env::var("AUTH_GATE_COOKIE_SECURE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(defaults.cookie_secure);
        let password_cost = PasswordCost {
            memory_kib: env_parse("AUTH_GATE_ARGON2_MEMORY_KIB")?
                .unwrap_or(defaults.password_cost.memory_kib),
            iterations: env_parse("AUTH_GATE_ARGON2_ITERATIONS")?
                .unwrap_or(defaults.password_cost.iterations),
            parallelism: env_parse("AUTH_GATE_ARGON2_PARALLELISM")?
                .unwrap_or(defaults.password_cost.parallelism),
        };
        let purge_interval_secs =
            env_parse("AUTH_GATE_PURGE_INTERVAL_SECS")?.unwrap_or(defaults.purge_interval_secs);

        let config = Self {
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            access_cookie_name,
            refresh_cookie_name,
            cookie_domain,
            cookie_secure,
            password_cost,
            purge_interval_secs,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AuthResult<()> {
        if self.access_token_ttl_secs <= 0 {
            return Err(AuthError::Config(
                "AUTH_GATE_ACCESS_TOKEN_TTL_SECS must be positive".into(),
            ));
        }
        if self.refresh_token_ttl_secs <= self.access_token_ttl_secs {
            return Err(AuthError::Config(
                "AUTH_GATE_REFRESH_TOKEN_TTL_SECS must exceed the access token TTL".into(),
            ));
        }
        if self.access_cookie_name == self.refresh_cookie_name {
            return Err(AuthError::Config(
                "access and refresh cookies need distinct names".into(),
            ));
        }
        if self.purge_interval_secs == 0 {
            return Err(AuthError::Config(
                "AUTH_GATE_PURGE_INTERVAL_SECS must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> AuthResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AuthError::Config(format!("{key} has an invalid value"))),
        Err(_) => Ok(None),
    }
}
