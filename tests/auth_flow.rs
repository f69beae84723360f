use std::sync::Arc;

use auth_gate::api_routes;
use auth_gate::auth::responses::{
    AccountSummary, AuthErrorResponse, LoginRequest, RegisterRequest, SessionResponse,
};
use auth_gate::auth::{AuthState, ManualClock};
use auth_gate::test_support::{TestRocketBuilder, memory_auth_state};
use chrono::Duration;
use rocket::http::{Cookie, Header, Status};
use rocket::local::asynchronous::{Client, LocalResponse};

const EMAIL: &str = "user@example.com";
const PASSWORD: &str = "correct horse battery staple";

async fn client_for(state: AuthState) -> Client {
    TestRocketBuilder::new()
        .mount_api_routes(api_routes())
        .manage_auth_state(state)
        .async_client()
        .await
}

async fn setup() -> (Client, AuthState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let (state, _store) = memory_auth_state(clock.clone());
    let client = client_for(state.clone()).await;
    (client, state, clock)
}

fn register_body(email: &str, password: &str, repeated: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: password.to_string(),
        password_repeated: repeated.to_string(),
    }
}

fn login_body(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

fn cookie_value(response: &LocalResponse<'_>, name: &str) -> Option<String> {
    response.cookies().get(name).map(|c| c.value().to_string())
}

async fn error_body(response: LocalResponse<'_>) -> AuthErrorResponse {
    response
        .into_json::<AuthErrorResponse>()
        .await
        .expect("JSON error body")
}

#[rocket::async_test]
async fn full_session_lifecycle() {
    let (client, _state, clock) = setup().await;

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body("  User@Example.com ", PASSWORD, PASSWORD))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    assert!(cookie_value(&response, "auth_token").is_some());
    assert!(cookie_value(&response, "refresh_token").is_some());
    let session: SessionResponse = response.into_json().await.expect("session body");
    assert_eq!(session.account.email, EMAIL);

    let response = client.get("/api/v1/user").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let me: AccountSummary = response.into_json().await.expect("account body");
    assert_eq!(me, session.account);

    clock.advance(Duration::seconds(600));
    let response = client.get("/api/v1/user").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    let body = error_body(response).await;
    assert_eq!(body.status, 401);
    assert_eq!(body.message, "unauthorized");

    let response = client.post("/api/v1/auth/refresh-token").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert!(cookie_value(&response, "auth_token").is_some());

    let response = client.get("/api/v1/user").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.post("/api/v1/auth/logout").dispatch().await;
    assert_eq!(response.status(), Status::NoContent);

    let response = client.get("/api/v1/user").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = client.post("/api/v1/auth/refresh-token").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn register_rejects_bad_input_and_duplicates() {
    let (client, _state, _clock) = setup().await;

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body(EMAIL, PASSWORD, "something else"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    assert!(cookie_value(&response, "auth_token").is_none());

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body("no-at-sign", PASSWORD, PASSWORD))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body(EMAIL, PASSWORD, PASSWORD))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body("USER@example.com", PASSWORD, PASSWORD))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
}

#[rocket::async_test]
async fn login_failures_look_identical() {
    let (client, state, _clock) = setup().await;
    state
        .accounts
        .register(EMAIL, PASSWORD)
        .await
        .expect("account registered");

    let wrong_password = client
        .post("/api/v1/auth/login")
        .json(&login_body(EMAIL, "not the password"))
        .dispatch()
        .await;
    assert_eq!(wrong_password.status(), Status::Unauthorized);
    assert!(cookie_value(&wrong_password, "auth_token").is_none());
    assert!(cookie_value(&wrong_password, "refresh_token").is_none());
    let wrong_password = error_body(wrong_password).await;

    let unknown = client
        .post("/api/v1/auth/login")
        .json(&login_body("nobody@example.com", PASSWORD))
        .dispatch()
        .await;
    assert_eq!(unknown.status(), Status::Unauthorized);
    let unknown = error_body(unknown).await;

    assert_eq!(wrong_password.message, "invalid credentials");
    assert_eq!(wrong_password.message, unknown.message);

    let response = client
        .post("/api/v1/auth/login")
        .json(&login_body("User@Example.com", PASSWORD))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert!(cookie_value(&response, "refresh_token").is_some());
}

#[rocket::async_test]
async fn bearer_header_is_accepted_without_cookies() {
    let (client, state, _clock) = setup().await;

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body(EMAIL, PASSWORD, PASSWORD))
        .dispatch()
        .await;
    let access = cookie_value(&response, "auth_token").expect("access cookie");

    let cookieless = client_for(state).await;
    let response = cookieless.get("/api/v1/user").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = cookieless
        .get("/api/v1/user")
        .header(Header::new("Authorization", format!("Bearer {access}")))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = cookieless
        .get("/api/v1/user")
        .header(Header::new("Authorization", "Bearer forged-token"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn replayed_refresh_token_ends_every_session() {
    let (client, state, _clock) = setup().await;

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body(EMAIL, PASSWORD, PASSWORD))
        .dispatch()
        .await;
    let first_refresh = cookie_value(&response, "refresh_token").expect("refresh cookie");

    let response = client.post("/api/v1/auth/refresh-token").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let attacker = client_for(state).await;
    let response = attacker
        .post("/api/v1/auth/refresh-token")
        .cookie(Cookie::new("refresh_token", first_refresh))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);

    // The legitimate holder's rotated pair is gone as well.
    let response = client.get("/api/v1/user").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    let response = client.post("/api/v1/auth/refresh-token").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn unknown_routes_get_json_errors() {
    let (client, _state, _clock) = setup().await;

    let response = client.get("/api/v1/does-not-exist").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    let body = error_body(response).await;
    assert_eq!(body.status, 404);
}

#[rocket::async_test]
async fn login_requires_both_fields() {
    let (client, _state, _clock) = setup().await;

    let response = client
        .post("/api/v1/auth/login")
        .json(&login_body(EMAIL, ""))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body = error_body(response).await;
    assert_eq!(body.message, "email and password are required");
}

#[rocket::async_test]
async fn empty_access_cookie_falls_back_to_bearer() {
    let (client, state, _clock) = setup().await;

    let response = client
        .post("/api/v1/auth/register")
        .json(&register_body(EMAIL, PASSWORD, PASSWORD))
        .dispatch()
        .await;
    let access = cookie_value(&response, "auth_token").expect("access cookie");

    let other = client_for(state).await;
    let response = other
        .get("/api/v1/user")
        .cookie(Cookie::new("auth_token", ""))
        .header(Header::new("Authorization", format!("Bearer {access}")))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
}
