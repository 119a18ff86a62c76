use crate::db::{Role, User};
use crate::error::FornadaResult;
use crate::middleware::auth::{create_session_token, Claims, SESSION_COOKIE};
use crate::state::AppState;
use axum::{extract::State, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use bcrypt::verify;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct CheckRoleRequest {
    pub phone: String,
}

/// Pre-login role lookup: the frontend only shows the password field when the
/// phone belongs to an admin.
pub async fn check_user_role(
    State(state): State<AppState>,
    Json(payload): Json<CheckRoleRequest>,
) -> FornadaResult<Json<Value>> {
    let row: Option<(uuid::Uuid, Role)> =
        sqlx::query_as("SELECT id, role FROM users WHERE phone = $1")
            .bind(payload.phone.trim())
            .fetch_optional(&state.pool)
            .await?;

    match row {
        Some((user_id, role)) => Ok(Json(json!({
            "success": true,
            "role": role,
            "userId": user_id,
        }))),
        None => Ok(Json(json!({
            "success": false,
            "error": "Phone not registered.",
        }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub role: Option<Role>,
}

/// Phone-only login for clients; admins additionally need their password
/// checked against the stored hash. Success sets the session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> FornadaResult<(CookieJar, Json<LoginResponse>)> {
    let phone = payload.phone.trim();

    if phone.is_empty() {
        return Ok((
            jar,
            Json(LoginResponse {
                success: false,
                message: "Please enter a phone number.".to_string(),
                role: None,
            }),
        ));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = $1")
        .bind(phone)
        .fetch_optional(&state.pool)
        .await?;

    let Some(user) = user else {
        return Ok((
            jar,
            Json(LoginResponse {
                success: false,
                message: "User not found.".to_string(),
                role: None,
            }),
        ));
    };

    if user.role == Role::Admin {
        let Some(password) = payload.password.as_deref().filter(|p| !p.trim().is_empty()) else {
            return Ok((
                jar,
                Json(LoginResponse {
                    success: false,
                    message: "Password required for administrators.".to_string(),
                    role: None,
                }),
            ));
        };

        let hash = user.password_hash.as_deref().unwrap_or_default();
        if !verify(password, hash).unwrap_or(false) {
            return Ok((
                jar,
                Json(LoginResponse {
                    success: false,
                    message: "Incorrect password.".to_string(),
                    role: None,
                }),
            ));
        }
    }

    let token = create_session_token(user.id, user.role)?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    tracing::info!("Session opened for {:?} user {}", user.role, user.id);

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            success: true,
            message: "Logged in.".to_string(),
            role: Some(user.role),
        }),
    ))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    (jar.remove(cookie), Json(json!({ "success": true })))
}

pub async fn check_auth_status(claims: Option<Extension<Claims>>) -> Json<Value> {
    match claims {
        Some(Extension(claims)) => Json(json!({
            "loggedIn": true,
            "userId": claims.sub,
            "role": claims.role,
        })),
        None => Json(json!({ "loggedIn": false })),
    }
}
