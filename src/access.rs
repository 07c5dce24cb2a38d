//! Bearer credentials: issue, verify, and resolve to an approved identity.
//!
//! Tokens are HS256 JWTs whose subject is the user id. Verification alone is not enough to act:
//! every authenticated request re-reads the user record, so deleting or revoking an account takes
//! effect immediately instead of when the token expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::credential_store::CredentialStore;
use crate::opts::Opts;
use crate::upstream::bounded;
use crate::user::{Role, UserId, UserSummary};
use crate::{Error, Result};

/// JWT claims carried by an issued credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

/// An authenticated, approved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: UserSummary,
}

impl Identity {
    pub fn id(&self) -> UserId {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    /// Gate an operation on the caller holding `role`.
    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.user.role == role {
            Ok(())
        } else {
            Err(Error::forbidden("Access denied. Admin only."))
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Issues and validates bearer credentials against a [`CredentialStore`].
pub struct AccessControl<S: CredentialStore> {
    store: Arc<S>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
    upstream_timeout: Duration,
}

impl<S: CredentialStore> AccessControl<S> {
    /// Create an authority signing with an HMAC `secret`.
    pub fn new(secret: &[u8], store: Arc<S>, opts: &Opts) -> Self {
        // Expiry is exact: no clock leeway past `exp`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            store,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_ttl: opts.token_ttl,
            upstream_timeout: opts.upstream_timeout,
        }
    }

    /// Issue a credential for `user_id`, valid for the configured TTL from now.
    pub fn issue_credential(&self, user_id: UserId) -> Result<String> {
        self.issue_credential_at(user_id, Utc::now())
    }

    /// Issue a credential as if it had been minted at `issued_at`.
    pub fn issue_credential_at(&self, user_id: UserId, issued_at: DateTime<Utc>) -> Result<String> {
        let iat = issued_at.timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: iat + self.token_ttl.as_secs() as i64,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| Error::upstream(format!("token signing failed: {err}")))
    }

    /// Verify signature and expiry without touching the store.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Resolve a bearer token to an approved identity.
    ///
    /// - missing, malformed, expired, or unknown subject → `Unauthorized`
    /// - known but unapproved account → `Forbidden`
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity> {
        let token = token.ok_or_else(|| Error::unauthorized("Not authorized, no token"))?;
        let claims = self.verify(token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| Error::unauthorized("Not authorized, token failed"))?;

        let user = bounded(self.upstream_timeout, "credential lookup", self.store.get(user_id))
            .await?
            .ok_or_else(|| Error::unauthorized("User not found"))?;

        if !user.is_approved {
            debug!(%user_id, "rejecting credential for unapproved account");
            return Err(Error::forbidden("Account not approved"));
        }

        Ok(Identity {
            user: user.summary(),
        })
    }

    /// Authenticate and additionally require the admin role.
    pub async fn authenticate_admin(&self, token: Option<&str>) -> Result<Identity> {
        let identity = self.authenticate(token).await?;
        identity.require_role(Role::Admin)?;
        Ok(identity)
    }
}
