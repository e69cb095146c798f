//! JWT bearer tokens signed with a shared HS256 secret.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{Authenticator, Identity};
use crate::utils::{HubError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, issuer: Option<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
        }
    }

    /// Sign a token for `subject` valid for `ttl`.
    pub fn issue(&self, subject: &str, ttl: chrono::Duration) -> Result<String> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
            iss: self.issuer.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| HubError::Auth(format!("cannot sign token: {e}")))
    }
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn validate(&self, token: Option<&str>) -> Result<Option<Identity>> {
        let token = token.ok_or_else(|| HubError::Auth("missing bearer token".to_string()))?;
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| HubError::Auth(e.to_string()))?;
        Ok(Some(Identity {
            subject: data.claims.sub,
            issuer: data.claims.iss,
        }))
    }
}
