use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::{OsRng, RngCore};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{
        Claims, ForgotPasswordRequest, LoginRequest, LoginResponse, LoyaltySummary,
        OAuthLoginRequest, RegisterRequest, ResetPasswordRequest, VerifyEmailRequest,
    },
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Role},
    models::User,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::{
        loyalty_service,
        oauth::{self, OAuthProfile, OAuthProvider},
    },
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;
const RESET_TOKEN_TTL_MINUTES: i64 = 60;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> AppResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(AppError::BadRequest("email is invalid".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn verify_password(password: &str, stored: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(stored)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Random single-use token and the SHA-256 hex digest that gets stored.
fn new_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let digest = token_digest(&token);
    (token, digest)
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}

pub fn issue_token(config: &AppConfig, user_id: Uuid, role: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.jwt_expiry_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password(&payload.password)?;
    if payload.full_name.trim().is_empty() {
        return Err(AppError::BadRequest("full_name is required".into()));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.clone()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let (token, token_hash) = new_token();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.clone()),
        password_hash: Set(Some(hash_password(&payload.password)?)),
        full_name: Set(payload.full_name.trim().to_string()),
        phone: Set(payload.phone.filter(|p| !p.trim().is_empty())),
        role: Set(Role::Customer.as_str().into()),
        loyalty_points: Set(0),
        email_verified: Set(false),
        verification_token_hash: Set(Some(token_hash)),
        reset_token_hash: Set(None),
        reset_token_expires_at: Set(None),
        google_id: Set(None),
        facebook_id: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::on_unique_violation(e, "Email is already taken"))?;

    tracing::info!(user_id = %user.id, "user registered");
    tracing::debug!(email = %user.email, token = %token, "email verification token issued");

    audit::record(
        state,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("User created", user.into(), None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = normalize_email(&payload.email);
    let user = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    let valid = match &user.password_hash {
        Some(stored) => verify_password(&payload.password, stored)?,
        None => false,
    };
    if !valid {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let token = issue_token(&state.config, user.id, &user.role)?;

    audit::record(
        state,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token,
            user: user.into(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn verify_email(
    state: &AppState,
    payload: VerifyEmailRequest,
) -> AppResult<ApiResponse<User>> {
    let user = Users::find()
        .filter(UserCol::VerificationTokenHash.eq(token_digest(&payload.token)))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid verification token".into()))?;

    let mut active: UserActive = user.into();
    active.email_verified = Set(true);
    active.verification_token_hash = Set(None);
    active.updated_at = Set(Utc::now().into());
    let user = active.update(&state.orm).await?;

    tracing::info!(user_id = %user.id, "email verified");
    Ok(ApiResponse::success("Email verified", user.into(), None))
}

/// Always answers the same way whether or not the address is registered.
pub async fn forgot_password(
    state: &AppState,
    payload: ForgotPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let email = normalize_email(&payload.email);
    if let Some(user) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(&state.orm)
        .await?
    {
        let (token, token_hash) = new_token();
        let user_id = user.id;
        let mut active: UserActive = user.into();
        active.reset_token_hash = Set(Some(token_hash));
        active.reset_token_expires_at =
            Set(Some((Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES)).into()));
        active.updated_at = Set(Utc::now().into());
        let user = active.update(&state.orm).await?;

        tracing::info!(%user_id, "password reset requested");
        tracing::debug!(email = %user.email, token = %token, "password reset token issued");
    }

    Ok(ApiResponse::success(
        "If the address is registered, a reset link has been sent",
        serde_json::json!({}),
        None,
    ))
}

pub async fn reset_password(
    state: &AppState,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_password(&payload.new_password)?;

    let user = Users::find()
        .filter(UserCol::ResetTokenHash.eq(token_digest(&payload.token)))
        .filter(UserCol::ResetTokenExpiresAt.gt(Utc::now()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".into()))?;

    let user_id = user.id;
    let mut active: UserActive = user.into();
    active.password_hash = Set(Some(hash_password(&payload.new_password)?));
    active.reset_token_hash = Set(None);
    active.reset_token_expires_at = Set(None);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user_id),
        "password_reset",
        "users",
        serde_json::json!({ "user_id": user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({}),
        None,
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(ApiResponse::success("OK", model.into(), None))
}

pub async fn loyalty_history(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<LoyaltySummary>> {
    let (page, limit, offset) = pagination.normalize();
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let entries =
        loyalty_service::history(&state.orm, user.user_id, limit as u64, offset as u64).await?;
    let count = entries.len() as i64;

    Ok(ApiResponse::success(
        "OK",
        LoyaltySummary {
            balance: model.loyalty_points,
            entries,
        },
        Some(Meta::new(page, limit, count)),
    ))
}

pub async fn oauth_login(
    state: &AppState,
    provider: OAuthProvider,
    payload: OAuthLoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let profile =
        oauth::fetch_profile(&state.http, &state.config.oauth, provider, &payload.access_token)
            .await?;
    let user = upsert_oauth_user(state, provider, profile).await?;
    let token = issue_token(&state.config, user.id, &user.role)?;

    audit::record(
        state,
        Some(user.id),
        "user_oauth_login",
        "users",
        serde_json::json!({ "user_id": user.id, "provider": provider.as_str() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token,
            user: user.into(),
        },
        Some(Meta::empty()),
    ))
}

/// Finds the user by provider id, then by e-mail (linking the provider),
/// otherwise creates a password-less account.
async fn upsert_oauth_user(
    state: &AppState,
    provider: OAuthProvider,
    profile: OAuthProfile,
) -> AppResult<UserModel> {
    let id_col = match provider {
        OAuthProvider::Google => UserCol::GoogleId,
        OAuthProvider::Facebook => UserCol::FacebookId,
    };

    let txn = state.orm.begin().await?;

    if let Some(user) = Users::find()
        .filter(id_col.eq(profile.provider_id.clone()))
        .one(&txn)
        .await?
    {
        txn.commit().await?;
        return Ok(user);
    }

    let email = profile.email.clone().ok_or_else(|| {
        AppError::Unauthorized(format!("{provider} account has no e-mail address"))
    })?;

    let user = match Users::find()
        .filter(UserCol::Email.eq(email.clone()))
        .one(&txn)
        .await?
    {
        Some(existing) => {
            if !profile.email_verified {
                return Err(AppError::Unauthorized(format!(
                    "{provider} has not verified this e-mail address"
                )));
            }
            let mut active: UserActive = existing.into();
            match provider {
                OAuthProvider::Google => active.google_id = Set(Some(profile.provider_id.clone())),
                OAuthProvider::Facebook => {
                    active.facebook_id = Set(Some(profile.provider_id.clone()))
                }
            }
            active.email_verified = Set(true);
            active.updated_at = Set(Utc::now().into());
            let user = active.update(&txn).await?;
            tracing::info!(user_id = %user.id, provider = %provider, "oauth identity linked");
            user
        }
        None => {
            let full_name = profile
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            let (google_id, facebook_id) = match provider {
                OAuthProvider::Google => (Some(profile.provider_id.clone()), None),
                OAuthProvider::Facebook => (None, Some(profile.provider_id.clone())),
            };
            let user = UserActive {
                id: Set(Uuid::new_v4()),
                email: Set(email),
                password_hash: Set(None),
                full_name: Set(full_name),
                phone: Set(None),
                role: Set(Role::Customer.as_str().into()),
                loyalty_points: Set(0),
                email_verified: Set(profile.email_verified),
                verification_token_hash: Set(None),
                reset_token_hash: Set(None),
                reset_token_expires_at: Set(None),
                google_id: Set(google_id),
                facebook_id: Set(facebook_id),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(&txn)
            .await?;
            tracing::info!(user_id = %user.id, provider = %provider, "user registered via oauth");
            user
        }
    };

    txn.commit().await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized_and_checked() {
        assert_eq!(normalize_email("  Mai@Example.COM "), "mai@example.com");
        assert!(validate_email("mai@example.com").is_ok());
        assert!(validate_email("mai@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("m ai@example.com").is_err());
    }

    #[test]
    fn short_passwords_rejected() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn tokens_are_stored_as_digests() {
        let (token, digest) = new_token();
        assert_eq!(token.len(), 64);
        assert_eq!(digest, token_digest(&token));
        assert_ne!(digest, token);
    }
}
