use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;

use crate::domain::pricing::PricingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn is_production(self) -> bool {
        self == AppEnv::Production
    }
}

impl FromStr for AppEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(AppEnv::Production),
            "development" | "dev" | "test" => Ok(AppEnv::Development),
            other => anyhow::bail!("unknown APP_ENV {other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub payment_url: String,
    pub return_url: String,
    /// Accept `SIMULATED_HASH_` signatures. Ignored in production.
    pub allow_simulated: bool,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub google_tokeninfo_url: String,
    /// Expected `aud` of Google ID tokens. Google login is refused without it.
    pub google_client_id: Option<String>,
    pub facebook_graph_url: String,
    /// Facebook tokens must belong to this app. Facebook login is refused
    /// unless both id and secret are set.
    pub facebook_app_id: Option<String>,
    pub facebook_app_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub env: AppEnv,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub vnpay: VnpayConfig,
    pub oauth: OAuthConfig,
    pub pricing: PricingPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup so tests don't touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET is not set")?;
        let env = parse_or(&lookup, "APP_ENV", AppEnv::Development)?;

        let defaults = PricingPolicy::default();
        let pricing = PricingPolicy {
            tax_rate_bps: parse_or(&lookup, "TAX_RATE_BPS", defaults.tax_rate_bps)?,
            free_shipping_threshold: parse_or(
                &lookup,
                "FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )?,
            shipping_fee: parse_or(&lookup, "SHIPPING_FEE", defaults.shipping_fee)?,
            vnd_per_earned_point: parse_or(
                &lookup,
                "VND_PER_EARNED_POINT",
                defaults.vnd_per_earned_point,
            )?,
            point_value_vnd: parse_or(&lookup, "POINT_VALUE_VND", defaults.point_value_vnd)?,
            max_redeem_percent: parse_or(
                &lookup,
                "MAX_REDEEM_PERCENT",
                defaults.max_redeem_percent,
            )?,
        };
        pricing.validate()?;

        let vnpay = VnpayConfig {
            tmn_code: lookup("VNPAY_TMN_CODE").unwrap_or_default(),
            hash_secret: lookup("VNPAY_HASH_SECRET").unwrap_or_default(),
            payment_url: lookup("VNPAY_URL")
                .unwrap_or_else(|| "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into()),
            return_url: lookup("VNPAY_RETURN_URL")
                .unwrap_or_else(|| "http://localhost:3000/api/payment/vnpay/return".into()),
            allow_simulated: parse_or(&lookup, "VNPAY_ALLOW_SIMULATED", false)?,
        };

        let oauth = OAuthConfig {
            google_tokeninfo_url: lookup("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|| "https://oauth2.googleapis.com/tokeninfo".into()),
            google_client_id: lookup("GOOGLE_CLIENT_ID").filter(|v| !v.is_empty()),
            facebook_graph_url: lookup("FACEBOOK_GRAPH_URL")
                .unwrap_or_else(|| "https://graph.facebook.com".into()),
            facebook_app_id: lookup("FACEBOOK_APP_ID").filter(|v| !v.is_empty()),
            facebook_app_secret: lookup("FACEBOOK_APP_SECRET").filter(|v| !v.is_empty()),
        };

        Ok(Self {
            database_url,
            host: lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "APP_PORT", 3000)?,
            env,
            jwt_secret,
            jwt_expiry_hours: parse_or(&lookup, "JWT_EXPIRY_HOURS", 24)?,
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            public_base_url: lookup("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".into()),
            vnpay,
            oauth,
            pricing,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_keys_missing() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.env, AppEnv::Development);
        assert_eq!(config.pricing, PricingPolicy::default());
        assert!(!config.vnpay.allow_simulated);
        assert_eq!(config.jwt_expiry_hours, 24);
        assert!(config.oauth.google_client_id.is_none());
        assert!(config.oauth.facebook_app_id.is_none());
    }

    #[test]
    fn missing_jwt_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[(
            "DATABASE_URL",
            "postgres://localhost/shop",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", "secret"),
            ("APP_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }

    #[test]
    fn production_env_and_overrides_parse() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", "secret"),
            ("APP_ENV", "production"),
            ("SHIPPING_FEE", "25000"),
            ("VNPAY_ALLOW_SIMULATED", "true"),
        ]))
        .unwrap();
        assert!(config.env.is_production());
        assert_eq!(config.pricing.shipping_fee, 25_000);
        assert!(config.vnpay.allow_simulated);
    }
}
