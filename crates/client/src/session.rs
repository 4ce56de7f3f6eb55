//! Token storage for one signed-in user.
//!
//! [`AuthSession`] is a cheaply cloneable handle; every clone sees the same
//! tokens. It is passed explicitly to whatever needs it rather than living
//! in a global. Nothing is persisted.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Clone, Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
    access_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    inner: Arc<RwLock<Tokens>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite both tokens.
    pub fn set_tokens(&self, access: impl Into<String>, refresh: impl Into<String>) {
        let access = access.into();
        let expires_at = access_token_expiry(&access);
        let mut tokens = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        tokens.access = Some(access);
        tokens.refresh = Some(refresh.into());
        tokens.access_expires_at = expires_at;
    }

    pub fn clear_tokens(&self) {
        let mut tokens = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *tokens = Tokens::default();
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh.clone()
    }

    /// True iff an access token is held.
    pub fn is_authenticated(&self) -> bool {
        self.read().access.is_some()
    }

    /// Expiry decoded from the access token's `exp` claim, if it had one.
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        self.read().access_expires_at
    }

    /// Whether the access token is known to have expired at `now`.
    ///
    /// Tokens without a readable expiry are never considered expired.
    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at().is_some_and(|exp| exp <= now)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tokens> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    #[serde(default)]
    exp: Option<i64>,
}

/// Read the `exp` claim without verifying the signature.
///
/// The client does not hold the signing key; the expiry is only used to
/// report and anticipate token lifetime. Opaque tokens yield `None`.
fn access_token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp?, 0)
}
