//! Gateway-local authentication routes
//!
//! - POST /auth/request-login-email - email a 6-digit login token
//! - POST /auth/login               - redeem the token for a session cookie
//! - POST /auth/logout              - end this session
//! - POST /auth/logout-all          - end every session of the user

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{HeaderValue, ORIGIN, SET_COOKIE};
use hyper::{Method, Request, Response};
use serde::Deserialize;
use tracing::info;

use platform_core::events::publish_json;
use platform_core::events::topics::{self, LoginEmailRequest};
use platform_core::response::{self, read_json};
use platform_core::AuthInfo;

use crate::auth::cookies::{self, get_cookie, SESSION_COOKIE};
use crate::error::{error_response, GatewayError};
use crate::server::AppState;

/// Auth request bodies are tiny
const MAX_BODY: usize = 10 * 1024;

#[derive(Debug, Deserialize)]
pub struct RequestLoginEmail {
    pub email: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub login_token: String,
}

pub async fn handle_auth_request<B>(
    state: &AppState,
    req: Request<B>,
    auth: &AuthInfo,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let path = req.uri().path().to_string();
    let result = match (req.method().clone(), path.as_str()) {
        (Method::POST, "/auth/request-login-email") => request_login_email(state, req).await,
        (Method::POST, "/auth/login") => login(state, req).await,
        (Method::POST, "/auth/logout") => logout(state, &req).await,
        (Method::POST, "/auth/logout-all") => logout_all(state, auth).await,
        (_, "/auth/request-login-email" | "/auth/login" | "/auth/logout" | "/auth/logout-all") => {
            return response::method_not_allowed();
        }
        _ => return response::not_found("Not found"),
    };
    result.unwrap_or_else(error_response)
}

async fn request_login_email<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, GatewayError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body: RequestLoginEmail = read_json(req.into_body(), MAX_BODY).await?;

    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(GatewayError::BadRequest("Invalid email address".into()));
    }

    let site = state.sites.site_for(origin.as_deref()).await;
    let login_token = state
        .sessions
        .create_login_token(&email, &site, &body.language)
        .await?;

    publish_json(
        state.bus.as_ref(),
        topics::LOGIN_EMAIL_REQUEST,
        &LoginEmailRequest {
            email,
            site: site.clone(),
            language: body.language,
            login_token,
        },
    )
    .await?;

    info!(site = %site, "Login email requested");
    Ok(response::no_content())
}

async fn login<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>, GatewayError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body: LoginBody = read_json(req.into_body(), MAX_BODY).await?;
    let request = state
        .sessions
        .check_login_token(body.login_token.trim())
        .await?;

    let user = state
        .users
        .login(&request.email, &request.site, &request.language)
        .await?;
    let token = state
        .sessions
        .create_session(&user.id, &user.email, user.is_admin)
        .await?;
    info!(user_id = %user.id, site = %request.site, "User logged in");

    let mut response = response::ok(&user);
    set_cookie(&mut response, &cookies::session_cookie(&token, state.secure_cookies()))?;
    Ok(response)
}

async fn logout<B>(state: &AppState, req: &Request<B>) -> Result<Response<Full<Bytes>>, GatewayError> {
    if let Some(token) = get_cookie(req.headers(), SESSION_COOKIE) {
        state.sessions.delete_session(&token).await?;
    }
    let mut response = response::no_content();
    set_cookie(&mut response, &cookies::clear_session_cookie(state.secure_cookies()))?;
    Ok(response)
}

async fn logout_all(state: &AppState, auth: &AuthInfo) -> Result<Response<Full<Bytes>>, GatewayError> {
    if !auth.is_user() {
        return Err(GatewayError::Unauthorized);
    }
    let n = state.sessions.delete_user_sessions(&auth.user_id).await?;
    info!(user_id = %auth.user_id, sessions = n, "Logged out everywhere");

    let mut response = response::no_content();
    set_cookie(&mut response, &cookies::clear_session_cookie(state.secure_cookies()))?;
    Ok(response)
}

pub fn set_cookie(response: &mut Response<Full<Bytes>>, cookie: &str) -> Result<(), GatewayError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid cookie: {}", e)))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(())
}
