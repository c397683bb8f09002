//! Caller identity verification (HS256 bearer tokens).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid identity token: {0}")]
    Invalid(String),

    #[error("identity tokens are not configured")]
    NotConfigured,
}

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub issuer: Option<String>,
    pub expires_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
}

pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match issuer {
            Some(iss) => {
                validation.set_required_spec_claims(&["exp", "sub", "iss"]);
                validation.set_issuer(&[iss]);
            }
            None => validation.set_required_spec_claims(&["exp", "sub"]),
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| IdentityError::Invalid(e.to_string()))?;
        Ok(Identity {
            subject: data.claims.sub,
            issuer: data.claims.iss,
            expires_at: data.claims.exp,
        })
    }
}

/// Mint a token the [`JwtVerifier`] for the same secret accepts.
pub fn issue_token(
    secret: &str,
    subject: &str,
    issuer: Option<&str>,
    ttl: Duration,
) -> Result<String, IdentityError> {
    let claims = Claims {
        sub: subject.to_string(),
        exp: Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| IdentityError::Invalid("token lifetime out of range".into()))?
            .timestamp(),
        iss: issuer.map(str::to_string),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| IdentityError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "kitchen-secret";

    #[test]
    fn issued_token_verifies() {
        let token = issue_token(SECRET, "user-42", None, Duration::minutes(5)).unwrap();
        let identity = JwtVerifier::new(SECRET, None).verify(&token).unwrap();
        assert_eq!(identity.subject, "user-42");
        assert!(identity.issuer.is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(SECRET, "user-42", None, Duration::minutes(5)).unwrap();
        let err = JwtVerifier::new("other", None).verify(&token).unwrap_err();
        assert!(matches!(err, IdentityError::Invalid(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(SECRET, "user-42", None, Duration::hours(-2)).unwrap();
        assert!(JwtVerifier::new(SECRET, None).verify(&token).is_err());
    }

    #[test]
    fn issuer_is_checked_when_configured() {
        let verifier = JwtVerifier::new(SECRET, Some("https://auth.recipes.local"));

        let good = issue_token(SECRET, "u", Some("https://auth.recipes.local"), Duration::minutes(5)).unwrap();
        assert_eq!(
            verifier.verify(&good).unwrap().issuer.as_deref(),
            Some("https://auth.recipes.local")
        );

        let bad = issue_token(SECRET, "u", Some("https://elsewhere"), Duration::minutes(5)).unwrap();
        assert!(verifier.verify(&bad).is_err());

        let none = issue_token(SECRET, "u", None, Duration::minutes(5)).unwrap();
        assert!(verifier.verify(&none).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(JwtVerifier::new(SECRET, None).verify("not.a.jwt").is_err());
    }
}
