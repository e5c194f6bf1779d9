use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::auth::{
        ForgotPasswordRequest, LoginRequest, LoginResponse, LoyaltySummary, OAuthLoginRequest,
        RegisterRequest, ResetPasswordRequest, VerifyEmailRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
    routes::params::Pagination,
    services::{auth_service, oauth::OAuthProvider},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-email", post(verify_email))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/oauth/{provider}", post(oauth_login))
        .route("/me", get(me))
        .route("/me/loyalty", get(loyalty_history))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register user", body = ApiResponse<User>),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already taken")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let resp = auth_service::register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login user", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let resp = auth_service::login_user(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = ApiResponse<User>),
        (status = 400, description = "Invalid token")
    ),
    tag = "Auth"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    Ok(Json(auth_service::verify_email(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Reset mail sent if the address exists")),
    tag = "Auth"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(auth_service::forgot_password(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "Auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(auth_service::reset_password(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/oauth/{provider}",
    params(("provider" = String, Path, description = "google or facebook")),
    request_body = OAuthLoginRequest,
    responses(
        (status = 200, description = "Login with a provider token", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Token rejected by the provider")
    ),
    tag = "Auth"
)]
pub async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(payload): Json<OAuthLoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let provider = provider.parse::<OAuthProvider>()?;
    Ok(Json(auth_service::oauth_login(&state, provider, payload).await?))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    Ok(Json(auth_service::me(&state, &user).await?))
}

#[utoipa::path(
    get,
    path = "/api/auth/me/loyalty",
    params(Pagination),
    responses(
        (status = 200, description = "Loyalty balance and ledger", body = ApiResponse<LoyaltySummary>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn loyalty_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<LoyaltySummary>>> {
    Ok(Json(
        auth_service::loyalty_history(&state, &user, pagination).await?,
    ))
}
