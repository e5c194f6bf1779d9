use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{LoyaltyEntry, User};

#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Access token (Facebook) or ID token (Google) obtained by the client SDK.
#[derive(Deserialize, Debug, ToSchema)]
pub struct OAuthLoginRequest {
    pub access_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoyaltySummary {
    pub balance: i64,
    pub entries: Vec<LoyaltyEntry>,
}
