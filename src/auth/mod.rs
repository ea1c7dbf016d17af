//! Bearer-token validation against the external identity provider.
//!
//! Two verification modes: HS256 against a configured shared secret, or
//! RS256 against the provider's JWKS document, fetched once and cached
//! behind a lock; an unknown `kid` triggers one refresh. The validator is
//! safe to call concurrently.

mod error;

pub use error::AuthError;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::protocol::UserId;

/// Claims extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

enum KeySource {
    /// HS256 with a locally configured secret.
    SharedSecret(DecodingKey),
    /// RS256 keys fetched from the identity provider's JWKS endpoint.
    Jwks {
        url: String,
        client: reqwest::Client,
        keys: RwLock<HashMap<String, DecodingKey>>,
    },
}

pub struct TokenValidator {
    source: KeySource,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenValidator {
    pub fn shared_secret(secret: &str) -> Self {
        Self {
            source: KeySource::SharedSecret(DecodingKey::from_secret(secret.as_bytes())),
            issuer: None,
            audience: None,
        }
    }

    /// Validate against JWKS published by the identity provider at
    /// `{base_url}/auth/v1/.well-known/jwks.json`.
    pub fn jwks(identity_url: &str) -> Self {
        let url = format!(
            "{}/auth/v1/.well-known/jwks.json",
            identity_url.trim_end_matches('/')
        );
        Self {
            source: KeySource::Jwks {
                url,
                client: reqwest::Client::new(),
                keys: RwLock::new(HashMap::new()),
            },
            issuer: None,
            audience: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Build from the identity section of the config. A configured secret
    /// wins over JWKS; with neither, startup fails.
    pub fn from_config(identity: &IdentityConfig) -> anyhow::Result<Self> {
        let mut validator = if let Some(secret) =
            identity.jwt_secret.as_deref().or(identity.anon_key.as_deref())
        {
            Self::shared_secret(secret)
        } else if let Some(url) = identity.url.as_deref() {
            Self::jwks(url)
        } else {
            anyhow::bail!("identity configuration needs a jwt secret, anon key or provider URL");
        };
        if let Some(issuer) = &identity.issuer {
            validator = validator.with_issuer(issuer.clone());
        }
        if let Some(audience) = &identity.audience {
            validator = validator.with_audience(audience.clone());
        }
        Ok(validator)
    }

    /// Verify signature, issuer, audience and expiry; on success return
    /// the token's subject and expiry.
    pub async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = match &self.source {
            KeySource::SharedSecret(key) => {
                self.decode_with(token, key, Algorithm::HS256)?
            }
            KeySource::Jwks { .. } => {
                let header =
                    decode_header(token).map_err(|e| AuthError::invalid(e.to_string()))?;
                let kid = header
                    .kid
                    .ok_or_else(|| AuthError::invalid("token header has no key id"))?;
                let key = self.lookup_jwks_key(&kid).await?;
                self.decode_with(token, &key, Algorithm::RS256)?
            }
        };

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::invalid("token subject is not a user id"))?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AuthError::invalid("token expiry is out of range"))?;

        Ok(AuthenticatedUser {
            user_id,
            display_name: claims.name.or(claims.email),
            expires_at,
        })
    }

    fn decode_with(
        &self,
        token: &str,
        key: &DecodingKey,
        algorithm: Algorithm,
    ) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(algorithm);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::invalid(err.to_string()),
            })
    }

    async fn lookup_jwks_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let KeySource::Jwks { url, client, keys } = &self.source else {
            return Err(AuthError::invalid("validator has no JWKS source"));
        };

        if let Some(key) = keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        // Unknown kid: refresh the cached set once, then look again.
        let fetched: JwkSet = client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::invalid(format!("failed to fetch signing keys: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::invalid(format!("malformed JWKS document: {e}")))?;

        let mut cache = keys.write().await;
        for jwk in fetched.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };
            match DecodingKey::from_rsa_components(&n, &e) {
                Ok(key) => {
                    cache.insert(kid, key);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unusable JWKS entry");
                }
            }
        }

        cache
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::invalid(format!("no signing key for kid {kid}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        iss: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    }

    const SECRET: &str = "super-secret-signing-key";

    fn mint(claims: &TestClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_subject_and_expiry() {
        let validator = TokenValidator::shared_secret(SECRET);
        let user = Uuid::new_v4();
        let exp = Utc::now().timestamp() + 600;
        let token = mint(&TestClaims {
            sub: user.to_string(),
            exp,
            iss: None,
            email: Some("player@example.com".to_string()),
        });

        let verified = validator.validate(&token).await.unwrap();
        assert_eq!(verified.user_id, user);
        assert_eq!(
            verified.display_name,
            Some("player@example.com".to_string())
        );
        assert_eq!(verified.expires_at.timestamp(), exp);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_as_expired() {
        let validator = TokenValidator::shared_secret(SECRET);
        let token = mint(&TestClaims {
            sub: Uuid::new_v4().to_string(),
            exp: Utc::now().timestamp() - 600,
            iss: None,
            email: None,
        });
        assert_eq!(validator.validate(&token).await, Err(AuthError::Expired));
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let validator = TokenValidator::shared_secret("a-different-secret");
        let token = mint(&TestClaims {
            sub: Uuid::new_v4().to_string(),
            exp: Utc::now().timestamp() + 600,
            iss: None,
            email: None,
        });
        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn issuer_mismatch_is_invalid() {
        let validator =
            TokenValidator::shared_secret(SECRET).with_issuer("https://id.example.com");
        let token = mint(&TestClaims {
            sub: Uuid::new_v4().to_string(),
            exp: Utc::now().timestamp() + 600,
            iss: Some("https://evil.example.com".to_string()),
            email: None,
        });
        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn non_uuid_subject_is_invalid() {
        let validator = TokenValidator::shared_secret(SECRET);
        let token = mint(&TestClaims {
            sub: "service-account".to_string(),
            exp: Utc::now().timestamp() + 600,
            iss: None,
            email: None,
        });
        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let validator = TokenValidator::shared_secret(SECRET);
        assert!(matches!(
            validator.validate("not-a-jwt").await,
            Err(AuthError::Invalid(_))
        ));
    }
}
