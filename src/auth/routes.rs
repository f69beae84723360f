use rocket::http::{CookieJar, Status};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Request, State, catch, post};
use rocket_okapi::openapi;

use crate::auth::cookies::{clear_session_cookies, set_session_cookies};
use crate::auth::responses::{
    AuthErrorResponse, LoginRequest, RefreshResponse, RegisterRequest, SessionResponse,
};
use crate::auth::{AuthError, AuthState};

type ErrorReply = status::Custom<Json<AuthErrorResponse>>;
type AuthRouteResult<T> = Result<Json<T>, ErrorReply>;

/// Create an account and start a session for it.
#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<payload>")]
pub async fn register(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    payload: Json<RegisterRequest>,
) -> Result<status::Custom<Json<SessionResponse>>, ErrorReply> {
    if payload.email.trim().is_empty()
        || payload.password.is_empty()
        || payload.password_repeated.is_empty()
    {
        return Err(respond_message(
            Status::BadRequest,
            "email, password and password_repeated are required",
        ));
    }
    if payload.password != payload.password_repeated {
        return Err(respond_message(Status::BadRequest, "passwords do not match"));
    }

    let account = state
        .accounts
        .register(&payload.email, &payload.password)
        .await
        .map_err(respond_error)?;

    let pair = state.tokens.issue(&account).await.map_err(respond_error)?;
    set_session_cookies(cookies, &state.config, &pair, state.clock.now());

    Ok(status::Custom(
        Status::Created,
        Json(SessionResponse::new(&account, &pair)),
    ))
}

/// Exchange email and password for a fresh token pair.
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    payload: Json<LoginRequest>,
) -> AuthRouteResult<SessionResponse> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(respond_message(
            Status::BadRequest,
            "email and password are required",
        ));
    }

    let account = state
        .accounts
        .verify(&payload.email, &payload.password)
        .await
        .map_err(respond_error)?;

    let pair = state.tokens.issue(&account).await.map_err(respond_error)?;
    set_session_cookies(cookies, &state.config, &pair, state.clock.now());

    Ok(Json(SessionResponse::new(&account, &pair)))
}

/// Rotate the refresh cookie into a new pair.
#[openapi(tag = "Auth")]
#[post("/auth/refresh-token")]
pub async fn refresh_token(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
) -> AuthRouteResult<RefreshResponse> {
    let presented = match cookies.get(&state.config.refresh_cookie_name) {
        Some(cookie) => cookie.value().to_string(),
        None => return Err(respond_error(AuthError::Unauthenticated)),
    };

    let pair = match state.tokens.rotate(&presented).await {
        Ok(pair) => pair,
        Err(err) => {
            if !err.is_server_error() {
                clear_session_cookies(cookies, &state.config);
            }
            return Err(respond_error(err));
        }
    };

    set_session_cookies(cookies, &state.config, &pair, state.clock.now());
    Ok(Json(RefreshResponse::from(&pair)))
}

/// End the session that owns the refresh cookie.
#[openapi(tag = "Auth")]
#[post("/auth/logout")]
pub async fn logout(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
) -> Result<Status, ErrorReply> {
    if let Some(cookie) = cookies.get(&state.config.refresh_cookie_name) {
        let presented = cookie.value().to_string();
        state
            .tokens
            .revoke(&presented)
            .await
            .map_err(respond_error)?;
    }

    clear_session_cookies(cookies, &state.config);
    Ok(Status::NoContent)
}

/// JSON body for every error status, including gate rejections.
#[catch(default)]
pub fn default_catcher(status: Status, _request: &Request<'_>) -> ErrorReply {
    let message = match status.code {
        401 => "unauthorized",
        500..=599 => "internal server error",
        _ => status.reason_lossy(),
    };
    respond_message(status, message)
}

fn respond_error(err: AuthError) -> ErrorReply {
    respond_message(err.status(), err.public_message())
}

fn respond_message(status: Status, message: impl Into<String>) -> ErrorReply {
    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            message: message.into(),
        }),
    )
}
