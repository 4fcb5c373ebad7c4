//! Identity-provider token handling
//!
//! Tokens are HS256 JWTs issued by the identity provider. The service only
//! verifies them; `create_token` exists for tooling and tests.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::SecuritySettings;
use crate::domain::account::Identity;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Shared signing secret
    pub secret: String,
    /// Token expiration time in hours (minting only)
    pub expiration_hours: i64,
    /// Expected issuer claim
    pub issuer: String,
    /// Role claim value granting admin rights
    pub admin_role: String,
}

impl From<&SecuritySettings> for JwtConfig {
    fn from(settings: &SecuritySettings) -> Self {
        Self {
            secret: settings.jwt_secret.clone(),
            expiration_hours: 24,
            issuer: settings.jwt_issuer.clone(),
            admin_role: settings.admin_role.clone(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&SecuritySettings::default())
    }
}

/// Claims carried by an identity-provider token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    /// Subject (opaque user ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
}

impl TokenClaims {
    pub fn new(user_id: &str, name: Option<&str>, role: Option<&str>, config: &JwtConfig) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(config.expiration_hours);

        Self {
            sub: user_id.to_string(),
            name: name.map(str::to_string),
            email: None,
            role: role.map(str::to_string),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: config.issuer.clone(),
        }
    }

    pub fn is_admin(&self, config: &JwtConfig) -> bool {
        self.role.as_deref() == Some(config.admin_role.as_str())
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub.clone(),
            display_name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Sign a token for a user
pub fn create_token(
    user_id: &str,
    name: Option<&str>,
    role: Option<&str>,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = TokenClaims::new(user_id, name, role, config);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Verify and decode a token
pub fn verify_token(token: &str, config: &JwtConfig) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.set_issuer(&[&config.issuer]);

    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".into(),
            expiration_hours: 1,
            issuer: "smart-parking".into(),
            admin_role: "admin".into(),
        }
    }

    #[test]
    fn round_trip_preserves_identity() {
        let cfg = config();
        let token = create_token("user-42", Some("Asha"), None, &cfg).unwrap();
        let claims = verify_token(&token, &cfg).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert!(!claims.is_admin(&cfg));

        let identity = claims.identity();
        assert_eq!(identity.user_id, "user-42");
        assert_eq!(identity.display_name.as_deref(), Some("Asha"));
    }

    #[test]
    fn admin_role_is_configurable() {
        let mut cfg = config();
        let token = create_token("ops", None, Some("operator"), &cfg).unwrap();
        assert!(!verify_token(&token, &cfg).unwrap().is_admin(&cfg));

        cfg.admin_role = "operator".into();
        assert!(verify_token(&token, &cfg).unwrap().is_admin(&cfg));
    }

    #[test]
    fn wrong_secret_or_issuer_is_rejected() {
        let cfg = config();
        let token = create_token("u", None, None, &cfg).unwrap();

        let mut other = config();
        other.secret = "other".into();
        assert!(verify_token(&token, &other).is_err());

        let mut other = config();
        other.issuer = "someone-else".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut cfg = config();
        cfg.expiration_hours = -2;
        let token = create_token("u", None, None, &cfg).unwrap();
        assert!(verify_token(&token, &config()).is_err());
    }
}
