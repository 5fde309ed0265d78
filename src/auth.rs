//! Caller identity from the hosted auth service's HS256 access tokens.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Audience stamped on access tokens of signed-in users.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Session {
    Anonymous,
    User { id: Uuid, email: Option<String>, admin: bool },
}

impl Session {
    pub fn user(id: Uuid) -> Self { Self::User { id, email: None, admin: false } }
    pub fn admin(id: Uuid) -> Self { Self::User { id, email: None, admin: true } }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Anonymous => None,
            Self::User { id, .. } => Some(*id),
        }
    }

    pub fn require_user(&self) -> Result<Uuid> { self.user_id().ok_or(Error::Unauthenticated) }

    pub fn require_admin(&self) -> Result<Uuid> {
        match self {
            Self::Anonymous => Err(Error::Unauthenticated),
            Self::User { id, admin: true, .. } => Ok(*id),
            Self::User { .. } => Err(Error::Forbidden),
        }
    }
}

impl From<Claims> for Session {
    fn from(c: Claims) -> Self {
        let admin = c.app_metadata.role.as_deref() == Some("admin");
        Self::User { id: c.sub, email: c.email, admin }
    }
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| Error::Unauthenticated)
    }

    /// Resolves an `Authorization` header value. No header means anonymous;
    /// a header that does not verify is an error.
    pub fn session_from_header(&self, header: Option<&str>) -> Result<Session> {
        let Some(value) = header else { return Ok(Session::Anonymous) };
        let token = value.strip_prefix("Bearer ").ok_or(Error::Unauthenticated)?;
        self.verify(token.trim()).map(Session::from)
    }
}
