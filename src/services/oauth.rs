use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{config::OAuthConfig, domain::str_enum, error::{AppError, AppResult}};

str_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
    #[serde(rename_all = "lowercase")]
    pub enum OAuthProvider {
        Google => "google",
        Facebook => "facebook",
    }
}

/// What a provider tells us about the token's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct GoogleTokenInfo {
    pub sub: String,
    pub aud: Option<String>,
    pub email: Option<String>,
    /// Google sends either a JSON bool or the string "true".
    pub email_verified: Option<serde_json::Value>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FacebookMe {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FacebookDebugToken {
    pub data: FacebookTokenData,
}

#[derive(Debug, Deserialize)]
pub struct FacebookTokenData {
    pub app_id: Option<String>,
    #[serde(default)]
    pub is_valid: bool,
    pub user_id: Option<String>,
}

fn not_configured(provider: OAuthProvider) -> AppError {
    AppError::BadRequest(format!("{provider} login is not configured"))
}

pub fn google_profile(info: GoogleTokenInfo, client_id: &str) -> AppResult<OAuthProfile> {
    if info.aud.as_deref() != Some(client_id) {
        return Err(AppError::Unauthorized(
            "Google token was issued for another application".into(),
        ));
    }
    let email_verified = match info.email_verified {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    Ok(OAuthProfile {
        provider_id: info.sub,
        email: info.email.map(|e| e.trim().to_lowercase()),
        name: info.name,
        email_verified,
    })
}

/// Returns the Facebook user id the token was issued to, provided it is a
/// live token of our app.
pub fn facebook_token_owner(debug: FacebookDebugToken, app_id: &str) -> AppResult<String> {
    let data = debug.data;
    if !data.is_valid {
        return Err(AppError::Unauthorized("Invalid facebook token".into()));
    }
    if data.app_id.as_deref() != Some(app_id) {
        return Err(AppError::Unauthorized(
            "Facebook token was issued for another application".into(),
        ));
    }
    data.user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Facebook token has no user".into()))
}

/// Facebook only returns e-mails it has confirmed.
pub fn facebook_profile(me: FacebookMe) -> OAuthProfile {
    let email = me.email.map(|e| e.trim().to_lowercase());
    OAuthProfile {
        provider_id: me.id,
        email_verified: email.is_some(),
        email,
        name: me.name,
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    provider: OAuthProvider,
    request: reqwest::RequestBuilder,
) -> AppResult<T> {
    let response = request.send().await.map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "oauth provider unreachable");
        AppError::internal(format!("{provider} token check failed: {e}"))
    })?;

    if !response.status().is_success() {
        tracing::debug!(provider = %provider, status = %response.status(), "oauth token rejected");
        return Err(AppError::Unauthorized(format!("Invalid {provider} token")));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::internal(format!("{provider} response: {e}")))
}

pub async fn fetch_profile(
    http: &reqwest::Client,
    config: &OAuthConfig,
    provider: OAuthProvider,
    token: &str,
) -> AppResult<OAuthProfile> {
    if token.trim().is_empty() {
        return Err(AppError::BadRequest("access_token is required".into()));
    }

    match provider {
        OAuthProvider::Google => {
            let client_id = config
                .google_client_id
                .as_deref()
                .ok_or_else(|| not_configured(provider))?;
            let info: GoogleTokenInfo = get_json(
                provider,
                http.get(&config.google_tokeninfo_url)
                    .query(&[("id_token", token)]),
            )
            .await?;
            google_profile(info, client_id)
        }
        OAuthProvider::Facebook => {
            let (Some(app_id), Some(app_secret)) = (
                config.facebook_app_id.as_deref(),
                config.facebook_app_secret.as_deref(),
            ) else {
                return Err(not_configured(provider));
            };
            let graph = config.facebook_graph_url.trim_end_matches('/');
            let app_token = format!("{app_id}|{app_secret}");

            let debug: FacebookDebugToken = get_json(
                provider,
                http.get(format!("{graph}/debug_token"))
                    .query(&[("input_token", token), ("access_token", app_token.as_str())]),
            )
            .await?;
            let owner = facebook_token_owner(debug, app_id)?;

            let me: FacebookMe = get_json(
                provider,
                http.get(format!("{graph}/me"))
                    .query(&[("fields", "id,name,email"), ("access_token", token)]),
            )
            .await?;
            if me.id != owner {
                return Err(AppError::Unauthorized("Invalid facebook token".into()));
            }
            Ok(facebook_profile(me))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aud: &str, verified: serde_json::Value) -> GoogleTokenInfo {
        GoogleTokenInfo {
            sub: "1057".into(),
            aud: Some(aud.into()),
            email: Some(" Lan@Example.com ".into()),
            email_verified: Some(verified),
            name: Some("Lan".into()),
        }
    }

    fn debug_token(app_id: &str, is_valid: bool) -> FacebookDebugToken {
        serde_json::from_value(serde_json::json!({
            "data": { "app_id": app_id, "is_valid": is_valid, "user_id": "42" }
        }))
        .unwrap()
    }

    #[test]
    fn google_checks_audience_and_reads_string_flags() {
        let profile = google_profile(info("web-client", "true".into()), "web-client").unwrap();
        assert_eq!(profile.email.as_deref(), Some("lan@example.com"));
        assert!(profile.email_verified);

        assert!(matches!(
            google_profile(info("other", true.into()), "web-client"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn facebook_token_must_belong_to_our_app() {
        assert_eq!(facebook_token_owner(debug_token("1234", true), "1234").unwrap(), "42");
        assert!(matches!(
            facebook_token_owner(debug_token("9999", true), "1234"),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            facebook_token_owner(debug_token("1234", false), "1234"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_providers_are_refused() {
        let config = OAuthConfig {
            google_tokeninfo_url: "http://127.0.0.1:1/tokeninfo".into(),
            google_client_id: None,
            facebook_graph_url: "http://127.0.0.1:1".into(),
            facebook_app_id: Some("1234".into()),
            facebook_app_secret: None,
        };
        let http = reqwest::Client::new();
        for provider in OAuthProvider::ALL {
            let err = fetch_profile(&http, &config, *provider, "token").await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{provider}: {err:?}");
        }
    }

    #[test]
    fn facebook_email_counts_as_verified() {
        let profile = facebook_profile(FacebookMe {
            id: "42".into(),
            name: None,
            email: None,
        });
        assert!(!profile.email_verified);
        assert_eq!(profile.provider_id, "42");
    }

    #[test]
    fn provider_names_parse() {
        assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert!("github".parse::<OAuthProvider>().is_err());
    }
}
