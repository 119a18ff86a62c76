use crate::db::Role;
use crate::error::FornadaResult;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn get_jwt_secret() -> Vec<u8> {
    std::env::var("SESSION_SECRET")
        .unwrap_or_else(|_| {
            tracing::warn!("SESSION_SECRET not set, using insecure default!");
            "insecure-development-secret-key-replace-me-immediately".to_string()
        })
        .into_bytes()
}

pub fn create_session_token(user_id: Uuid, role: Role) -> FornadaResult<String> {
    let exp = (Utc::now() + chrono::Duration::seconds(SESSION_TTL_SECS)).timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        role,
        exp,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&get_jwt_secret()),
    )?)
}

pub fn decode_session_token(token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&get_jwt_secret()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Decodes the session cookie, when present and valid, into request
/// extensions. Handlers and route guards decide what to do without one.
pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(claims) = decode_session_token(cookie.value()) {
            request.extensions_mut().insert(claims);
        }
    }
    next.run(request).await
}

/// Route guard for the staff-only area: unauthenticated requests go back to
/// the login page, authenticated non-admins back to the storefront.
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<Claims>() {
        Some(claims) if claims.is_admin() => next.run(request).await,
        Some(_) => Redirect::to("/").into_response(),
        None => Redirect::to("/login").into_response(),
    }
}
