//! Account endpoints that sit behind the session gate.

use rocket::get;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::auth::AuthUser;
use crate::auth::responses::AccountSummary;

/// The account that owns the presented access token.
#[openapi(tag = "Users")]
#[get("/user")]
pub async fn current_user(user: AuthUser) -> Json<AccountSummary> {
    Json(AccountSummary::from(user.account()))
}
