use chrono::{DateTime, Utc};
use rocket::http::{Cookie, CookieJar, SameSite};
use time::Duration as TimeDuration;

use crate::auth::AuthConfig;
use crate::auth::tokens::{IssuedToken, TokenPair};

pub fn set_session_cookies(
    cookies: &CookieJar<'_>,
    config: &AuthConfig,
    pair: &TokenPair,
    now: DateTime<Utc>,
) {
    cookies.add(session_cookie(
        config,
        config.access_cookie_name.clone(),
        &pair.access,
        now,
    ));
    cookies.add(session_cookie(
        config,
        config.refresh_cookie_name.clone(),
        &pair.refresh,
        now,
    ));
}

pub fn clear_session_cookies(cookies: &CookieJar<'_>, config: &AuthConfig) {
    for name in [&config.access_cookie_name, &config.refresh_cookie_name] {
        let mut cookie = Cookie::build((name.clone(), String::new()))
            .path("/")
            .removal()
            .build();

        if let Some(domain) = &config.cookie_domain {
            cookie.set_domain(domain.clone());
        }
        cookies.add(cookie);
    }
}

/// HTTP-only, whole-site cookie whose `Max-Age` is the whole seconds left
/// before the token expires.
pub fn session_cookie(
    config: &AuthConfig,
    name: String,
    token: &IssuedToken,
    now: DateTime<Utc>,
) -> Cookie<'static> {
    let max_age_secs = (token.expires_at - now).num_seconds().max(0);
    let mut cookie = Cookie::build((name, token.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(TimeDuration::seconds(max_age_secs))
        .build();

    if let Some(domain) = &config.cookie_domain {
        cookie.set_domain(domain.clone());
    }

    cookie
}
