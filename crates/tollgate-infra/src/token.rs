//! Signed access tokens (HS256 JWT).
//!
//! Verification checks signature, algorithm and structure before it looks
//! at expiry, so a tampered token is always reported as invalid, never as
//! expired. Expiry is evaluated here against an injectable clock rather
//! than by the JWT library.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tollgate_types::error::TokenError;
use tollgate_types::token::{AccessToken, TokenIdentity};

/// Default token lifetime: one hour.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: i64,
    exp: i64,
    jti: String,
    user_id: u64,
    metrics_id: String,
    github_user_login: String,
    account_created_at: i64,
    is_staff: bool,
    has_llm_subscription: bool,
    max_monthly_spend_in_cents: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_llm_monthly_allowance_in_cents: Option<u32>,
}

pub fn issue_token(identity: &TokenIdentity, secret: &SecretString) -> Result<String, TokenError> {
    issue_token_at(identity, secret, Utc::now(), TOKEN_LIFETIME)
}

/// Sign a token for `identity`, issued at `now` and valid for `lifetime`.
pub fn issue_token_at(
    identity: &TokenIdentity,
    secret: &SecretString,
    now: DateTime<Utc>,
    lifetime: Duration,
) -> Result<String, TokenError> {
    let lifetime = i64::try_from(lifetime.as_secs())
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| TokenError::Signing("token lifetime must be positive".to_string()))?;

    let iat = now.timestamp();
    let claims = Claims {
        iat,
        exp: iat + lifetime,
        jti: Uuid::new_v4().to_string(),
        user_id: identity.user_id,
        metrics_id: identity.metrics_id.clone(),
        github_user_login: identity.github_user_login.clone(),
        account_created_at: identity.account_created_at.timestamp(),
        is_staff: identity.is_staff,
        has_llm_subscription: identity.has_llm_subscription,
        max_monthly_spend_in_cents: identity.max_monthly_spend_in_cents,
        custom_llm_monthly_allowance_in_cents: identity.custom_llm_monthly_allowance_in_cents,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| TokenError::Signing(e.to_string()))
}

pub fn verify_token(token: &str, secret: &SecretString) -> Result<AccessToken, TokenError> {
    verify_token_at(token, secret, Utc::now())
}

/// Verify `token` and return its claims as an [`AccessToken`].
///
/// Expiry is inclusive: at the `exp` second the token is already expired.
pub fn verify_token_at(
    token: &str,
    secret: &SecretString,
    now: DateTime<Utc>,
) -> Result<AccessToken, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map_err(|e| TokenError::Invalid(e.to_string()))?;
    let claims = data.claims;

    if claims.exp <= claims.iat {
        return Err(TokenError::Invalid("exp is not after iat".to_string()));
    }
    let account_created_at = Utc
        .timestamp_opt(claims.account_created_at, 0)
        .single()
        .ok_or_else(|| TokenError::Invalid("account_created_at out of range".to_string()))?;

    let access = AccessToken {
        jti: claims.jti,
        issued_at: claims.iat,
        expires_at: claims.exp,
        identity: TokenIdentity {
            user_id: claims.user_id,
            github_user_login: claims.github_user_login,
            metrics_id: claims.metrics_id,
            account_created_at,
            is_staff: claims.is_staff,
            has_llm_subscription: claims.has_llm_subscription,
            max_monthly_spend_in_cents: claims.max_monthly_spend_in_cents,
            custom_llm_monthly_allowance_in_cents: claims.custom_llm_monthly_allowance_in_cents,
        },
    };

    if access.is_expired_at(now) {
        return Err(TokenError::Expired);
    }
    Ok(access)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("test-signing-secret".to_string())
    }

    fn identity() -> TokenIdentity {
        TokenIdentity {
            user_id: 4242,
            github_user_login: "octocat".to_string(),
            metrics_id: "metrics-4242".to_string(),
            account_created_at: Utc.with_ymd_and_hms(2019, 5, 4, 3, 2, 1).unwrap(),
            is_staff: false,
            has_llm_subscription: true,
            max_monthly_spend_in_cents: 2_500,
            custom_llm_monthly_allowance_in_cents: Some(1_500),
        }
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_and_verify_preserves_identity() {
        let token = issue_token_at(&identity(), &secret(), issued_at(), TOKEN_LIFETIME).unwrap();
        let access = verify_token_at(&token, &secret(), issued_at()).unwrap();

        assert_eq!(access.identity, identity());
        assert_eq!(access.issued_at, issued_at().timestamp());
        assert_eq!(access.expires_at, issued_at().timestamp() + 3600);
        assert!(Uuid::parse_str(&access.jti).is_ok());
    }

    #[test]
    fn test_each_token_gets_unique_jti() {
        let a = issue_token_at(&identity(), &secret(), issued_at(), TOKEN_LIFETIME).unwrap();
        let b = issue_token_at(&identity(), &secret(), issued_at(), TOKEN_LIFETIME).unwrap();
        let a = verify_token_at(&a, &secret(), issued_at()).unwrap();
        let b = verify_token_at(&b, &secret(), issued_at()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expiry_boundary() {
        let token = issue_token_at(&identity(), &secret(), issued_at(), TOKEN_LIFETIME).unwrap();
        let exp = issued_at() + chrono::Duration::seconds(3600);

        assert!(verify_token_at(&token, &secret(), exp - chrono::Duration::seconds(1)).is_ok());
        assert_eq!(
            verify_token_at(&token, &secret(), exp),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_wrong_secret_is_invalid_even_when_expired() {
        let token = issue_token_at(&identity(), &secret(), issued_at(), TOKEN_LIFETIME).unwrap();
        let other = SecretString::from("another-secret".to_string());
        let long_after = issued_at() + chrono::Duration::days(30);

        assert!(matches!(
            verify_token_at(&token, &other, long_after),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let token = issue_token_at(&identity(), &secret(), issued_at(), TOKEN_LIFETIME).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = {
            let mut claims = identity();
            claims.is_staff = true;
            issue_token_at(&claims, &secret(), issued_at(), TOKEN_LIFETIME).unwrap()
        };
        let forged_payload = forged.split('.').nth(1).unwrap().to_string();
        parts[1] = &forged_payload;
        let tampered = parts.join(".");

        // Same payload from a validly signed token, wrong signature for it.
        assert!(matches!(
            verify_token_at(&tampered, &secret(), issued_at()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_and_other_algorithms_rejected() {
        assert!(matches!(
            verify_token_at("not-a-jwt", &secret(), issued_at()),
            Err(TokenError::Invalid(_))
        ));

        let claims = Claims {
            iat: issued_at().timestamp(),
            exp: issued_at().timestamp() + 60,
            jti: "x".to_string(),
            user_id: 1,
            metrics_id: String::new(),
            github_user_login: String::new(),
            account_created_at: 0,
            is_staff: true,
            has_llm_subscription: false,
            max_monthly_spend_in_cents: 0,
            custom_llm_monthly_allowance_in_cents: None,
        };
        let hs512 = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-signing-secret"),
        )
        .unwrap();
        assert!(matches!(
            verify_token_at(&hs512, &secret(), issued_at()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_exp_not_after_iat_is_invalid() {
        let claims = Claims {
            iat: issued_at().timestamp(),
            exp: issued_at().timestamp(),
            jti: "x".to_string(),
            user_id: 1,
            metrics_id: String::new(),
            github_user_login: String::new(),
            account_created_at: 0,
            is_staff: false,
            has_llm_subscription: false,
            max_monthly_spend_in_cents: 0,
            custom_llm_monthly_allowance_in_cents: None,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-signing-secret"),
        )
        .unwrap();
        assert!(matches!(
            verify_token_at(&token, &secret(), issued_at() - chrono::Duration::hours(1)),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_optional_allowance_omitted_from_claims() {
        let mut id = identity();
        id.custom_llm_monthly_allowance_in_cents = None;
        let token = issue_token_at(&id, &secret(), issued_at(), TOKEN_LIFETIME).unwrap();
        let access = verify_token_at(&token, &secret(), issued_at()).unwrap();
        assert_eq!(access.identity.custom_llm_monthly_allowance_in_cents, None);
    }
}
