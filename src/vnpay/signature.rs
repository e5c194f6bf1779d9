use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::{AppError, AppResult};

type HmacSha512 = Hmac<Sha512>;

pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
/// Hashes with this prefix come from the local payment simulator.
pub const SIMULATED_PREFIX: &str = "SIMULATED_HASH_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Simulated,
    Invalid,
    Missing,
}

impl SignatureCheck {
    pub fn is_trusted(self) -> bool {
        matches!(self, SignatureCheck::Valid | SignatureCheck::Simulated)
    }
}

/// `key=value&...` over every parameter except the hash fields, keys in
/// ascending order, values left unencoded.
pub fn hash_data(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(key, _)| key.as_str() != SECURE_HASH && key.as_str() != SECURE_HASH_TYPE)
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lower-case hex HMAC-SHA512 of `data`.
pub fn sign(secret: &str, data: &str) -> AppResult<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(format!("invalid VNPay secret: {e}")))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn sign_params(secret: &str, params: &BTreeMap<String, String>) -> AppResult<String> {
    sign(secret, &hash_data(params))
}

/// Recomputes the hash over `params` and compares it with `vnp_SecureHash`,
/// ignoring hex case.
pub fn verify(
    secret: &str,
    params: &BTreeMap<String, String>,
    allow_simulated: bool,
) -> SignatureCheck {
    let Some(received) = params
        .get(SECURE_HASH)
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
    else {
        return SignatureCheck::Missing;
    };

    if received.starts_with(SIMULATED_PREFIX) {
        return if allow_simulated {
            SignatureCheck::Simulated
        } else {
            SignatureCheck::Invalid
        };
    }

    let Ok(received) = hex::decode(received) else {
        return SignatureCheck::Invalid;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return SignatureCheck::Invalid;
    };
    mac.update(hash_data(params).as_bytes());

    if mac.verify_slice(&received).is_ok() {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "TESTSECRET";

    fn params() -> BTreeMap<String, String> {
        [
            ("vnp_Version", "2.1.0"),
            ("vnp_TxnRef", "ORD-20261019-1A2B3C4D"),
            ("vnp_Command", "pay"),
            ("vnp_Amount", "15960000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn hash_data_is_sorted_and_skips_hash_fields() {
        let mut p = params();
        p.insert(SECURE_HASH.into(), "abc".into());
        p.insert(SECURE_HASH_TYPE.into(), "HmacSHA512".into());
        assert_eq!(
            hash_data(&p),
            "vnp_Amount=15960000&vnp_Command=pay&vnp_TxnRef=ORD-20261019-1A2B3C4D&vnp_Version=2.1.0"
        );
    }

    #[test]
    fn matches_reference_vector() {
        assert_eq!(
            sign_params(SECRET, &params()).unwrap(),
            "6bbd0114879b2d6d5c38f8f451a00ee512c95926703692780e9990684995691854e1db5a10dd8234bbaabf598086f4ecf5d299fa89383f559015d20511544405"
        );
    }

    #[test]
    fn verifies_recomputed_hash_in_any_case() {
        let mut p = params();
        let hash = sign_params(SECRET, &p).unwrap();
        p.insert(SECURE_HASH.into(), hash.to_uppercase());
        p.insert(SECURE_HASH_TYPE.into(), "HmacSHA512".into());
        assert_eq!(verify(SECRET, &p, false), SignatureCheck::Valid);
    }

    #[test]
    fn rejects_tampered_parameters() {
        let mut p = params();
        let hash = sign_params(SECRET, &p).unwrap();
        p.insert(SECURE_HASH.into(), hash);
        p.insert("vnp_Amount".into(), "100".into());
        assert_eq!(verify(SECRET, &p, false), SignatureCheck::Invalid);
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let mut p = params();
        p.insert(SECURE_HASH.into(), sign_params("OTHER", &p).unwrap());
        assert_eq!(verify(SECRET, &p, false), SignatureCheck::Invalid);

        p.insert(SECURE_HASH.into(), "not-hex".into());
        assert_eq!(verify(SECRET, &p, false), SignatureCheck::Invalid);

        p.remove(SECURE_HASH);
        assert_eq!(verify(SECRET, &p, false), SignatureCheck::Missing);
    }

    #[test]
    fn simulated_hash_needs_opt_in() {
        let mut p = params();
        p.insert(SECURE_HASH.into(), format!("{SIMULATED_PREFIX}42"));
        assert_eq!(verify(SECRET, &p, false), SignatureCheck::Invalid);
        assert_eq!(verify(SECRET, &p, true), SignatureCheck::Simulated);
        assert!(SignatureCheck::Simulated.is_trusted());
    }
}
