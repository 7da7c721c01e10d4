use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::Json;
use intelwatch_common::types::{LoginRequest, LoginResponse, RegisterRequest, UserRecord};
use intelwatch_storage::auth::verify_password;
use intelwatch_storage::StorageError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::{error_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;

pub const ROLES: [&str; 3] = ["admin", "analyst", "viewer"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub iat: u64,
    pub exp: u64,
}

pub fn create_token(
    secret: &str,
    user_id: &str,
    username: &str,
    role: &str,
    expire_secs: u64,
) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + expire_secs,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// JWT auth middleware for protected routes.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => token,
        _ => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "missing or invalid authorization header",
            );
        }
    };

    match validate_token(&state.jwt_secret, token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            if matches!(
                e.kind(),
                jsonwebtoken::errors::ErrorKind::ExpiredSignature
            ) {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "token_expired",
                    "token expired",
                )
            } else {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "unauthorized",
                    "invalid token",
                )
            }
        }
    }
}

/// Log in with username and password.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = LoginResponse),
        (status = 400, description = "Missing credentials", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError)
    )
)]
pub async fn login(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    if req.username.is_empty() || req.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "username and password are required",
        );
    }

    let user = match state.store.get_user_by_username(&req.username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "invalid credentials",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to query user");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            );
        }
    };

    if !user.is_active || !verify_password(&req.password, &user.password_hash) {
        return error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "invalid credentials",
        );
    }

    if let Err(e) = state.store.touch_last_login(&user.id).await {
        tracing::warn!(error = %e, "Failed to stamp last login");
    }

    match create_token(
        &state.jwt_secret,
        &user.id,
        &user.username,
        &user.role,
        state.token_expire_secs,
    ) {
        Ok(token) => success_response(
            StatusCode::OK,
            &trace_id,
            LoginResponse {
                access_token: token,
                expires_in: state.token_expire_secs,
            },
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create token");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
        }
    }
}

fn validate_registration(req: &RegisterRequest) -> Result<(), &'static str> {
    let username_ok = (3..=50).contains(&req.username.len())
        && req.username.chars().all(|c| c.is_ascii_alphanumeric());
    if !username_ok {
        return Err("username must be 3-50 alphanumeric characters");
    }
    let email_ok = req.email.len() <= 255
        && req.email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        });
    if !email_ok {
        return Err("email address is invalid");
    }
    if req.password.len() < 8 {
        return Err("password must be at least 8 characters");
    }
    if let Some(ref role) = req.role {
        if !ROLES.contains(&role.as_str()) {
            return Err("role must be admin, analyst, or viewer");
        }
    }
    Ok(())
}

/// Register a new account. Role defaults to "viewer".
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserRecord),
        (status = 400, description = "Invalid registration data", body = ApiError),
        (status = 409, description = "Username or email already taken", body = ApiError)
    )
)]
pub async fn register(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if let Err(msg) = validate_registration(&req) {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", msg);
    }

    let password_hash = match intelwatch_storage::auth::hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "Failed to hash password");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            );
        }
    };
    let role = req.role.as_deref().unwrap_or("viewer");

    match state
        .store
        .create_user(&req.username, &req.email, &password_hash, role)
        .await
    {
        Ok(user) => success_response(StatusCode::CREATED, &trace_id, user),
        Err(StorageError::Conflict { .. }) => error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "conflict",
            "username or email already taken",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create user");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
        }
    }
}

/// Current authenticated account.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Account details", body = UserRecord),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
pub async fn me(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.store.get_user_by_id(&claims.sub).await {
        Ok(Some(user)) => success_response(StatusCode::OK, &trace_id, user),
        Ok(None) => error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "account no longer exists",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load account");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = create_token("secret", "u-1", "admin", "admin", 3600).unwrap();
        let claims = validate_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_token("secret", "u-1", "admin", "admin", 3600).unwrap();
        assert!(validate_token("other", &token).is_err());
    }

    #[test]
    fn registration_validation() {
        let ok = RegisterRequest {
            username: "analyst1".to_string(),
            email: "analyst@example.com".to_string(),
            password: "s3cret-pass".to_string(),
            role: Some("analyst".to_string()),
        };
        assert!(validate_registration(&ok).is_ok());

        let mut bad = ok.clone();
        bad.username = "x".to_string();
        assert!(validate_registration(&bad).is_err());

        let mut bad = ok.clone();
        bad.email = "not-an-email".to_string();
        assert!(validate_registration(&bad).is_err());

        let mut bad = ok.clone();
        bad.password = "short".to_string();
        assert!(validate_registration(&bad).is_err());

        let mut bad = ok;
        bad.role = Some("superuser".to_string());
        assert!(validate_registration(&bad).is_err());
    }
}
