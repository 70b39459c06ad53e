//! Identity Verification
//!
//! Sign-in is handled by the external identity provider. Clients present the
//! provider-issued JWT as a Bearer token; we only check it and pull out the
//! subject, which is the provider's user id (the "external id").

pub mod middleware;

use crate::core::error::{Error, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims we rely on from the provider's session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verified identity extracted from a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

/// Validates HS256 session tokens signed with the shared JWT-template secret.
#[derive(Clone)]
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| Error::AuthFailInvalidToken(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(Error::AuthFailInvalidToken("empty subject".to_string()));
        }

        Ok(Identity {
            subject: data.claims.sub,
        })
    }
}
