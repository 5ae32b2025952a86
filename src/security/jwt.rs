use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::user::{User, UserId};
use crate::security::config::JwtSettings;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: UserId,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
}

/// Mints and checks HS256 session tokens. The key never leaves the process.
#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtManager {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ttl: Duration::hours(settings.ttl_hours),
        }
    }

    #[cfg(test)]
    pub fn issue(&self, user: &User, roles: Vec<String>) -> Result<IssuedToken, JwtError> {
        self.issue_at(user, roles, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        user: &User,
        roles: Vec<String>,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, JwtError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id,
            name: user.username.clone(),
            email: user.email.clone(),
            roles,
            jti: Uuid::new_v4().to_string(),
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| JwtError::Sign(e.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Signature, issuer and audience come from `jsonwebtoken`; expiry is
    /// checked here against `now` with no leeway.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| JwtError::Invalid(e.to_string()))?;
        if now.unix_timestamp() >= data.claims.exp {
            return Err(JwtError::Expired);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::config::test_config;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            full_name: None,
            address: None,
            birth_date: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        }
    }

    fn manager() -> JwtManager {
        JwtManager::new(&test_config().jwt)
    }

    #[test]
    fn claims_carry_identity_and_roles() {
        let jwt = manager();
        let user = user();
        let issued = jwt.issue(&user, vec!["Admin".into(), "User".into()]).unwrap();
        let claims = jwt.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.name, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert!(claims.has_role("Admin"));
        assert!(!claims.has_role("admin"));
        assert_eq!(claims.exp, issued.expires_at.unix_timestamp());
    }

    #[test]
    fn each_token_gets_a_fresh_id() {
        let jwt = manager();
        let user = user();
        let a = jwt.verify(&jwt.issue(&user, vec![]).unwrap().token).unwrap();
        let b = jwt.verify(&jwt.issue(&user, vec![]).unwrap().token).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn one_hour_token_expires_between_59_and_61_minutes() {
        let jwt = manager();
        let issued_at = OffsetDateTime::now_utc();
        let issued = jwt.issue_at(&user(), vec![], issued_at).unwrap();

        assert!(jwt
            .verify_at(&issued.token, issued_at + Duration::minutes(59))
            .is_ok());
        assert!(matches!(
            jwt.verify_at(&issued.token, issued_at + Duration::minutes(61)),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn altering_any_character_invalidates_the_token() {
        let jwt = manager();
        let now = OffsetDateTime::now_utc();
        let token = jwt.issue_at(&user(), vec!["User".into()], now).unwrap().token;

        for (idx, ch) in token.char_indices() {
            if ch == '.' {
                continue;
            }
            let replacement = if ch == 'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(idx..idx + 1, &replacement.to_string());
            assert!(
                jwt.verify_at(&tampered, now).is_err(),
                "tampered token accepted at position {idx}"
            );
        }
    }

    #[test]
    fn foreign_key_issuer_or_audience_is_rejected() {
        let settings = test_config().jwt;
        let token = manager().issue(&user(), vec![]).unwrap().token;

        let other_key = JwtManager::new(&JwtSettings {
            secret: "another-secret-another-secret-another".into(),
            ..settings.clone()
        });
        assert!(matches!(other_key.verify(&token), Err(JwtError::Invalid(_))));

        let other_issuer = JwtManager::new(&JwtSettings {
            issuer: "someone-else".into(),
            ..settings.clone()
        });
        assert!(other_issuer.verify(&token).is_err());

        let other_audience = JwtManager::new(&JwtSettings {
            audience: "another-app".into(),
            ..settings
        });
        assert!(other_audience.verify(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(manager().verify("not.a.jwt").is_err());
        assert!(manager().verify("").is_err());
    }
}
