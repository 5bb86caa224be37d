//! Signing and validation of access and refresh tokens.
//!
//! Access and refresh tokens use separate HS256 secrets and carry a `typ` claim; each
//! verifier rejects the other kind even if the secrets happen to match.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, info, warn};

use super::claims::{Claims, TokenType};
use super::principal::Identity;
use super::store::UserStore;
use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};

/// Outcome of a successful refresh: a fresh access token, the rotated refresh token for the
/// cookie, and the identity as currently stored.
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
}

#[derive(Clone)]
pub struct TokenIssuer {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

fn validation() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.leeway = 0;
    v
}

fn gen_jti() -> AppResult<String> {
    use base64::Engine;
    let mut buf = [0u8; 16];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::internal("rng".to_string(), e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl TokenIssuer {
    pub fn new(cfg: &AuthConfig) -> Self {
        Self {
            access_enc: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_dec: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_enc: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_dec: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            access_ttl: cfg.access_ttl,
            refresh_ttl: cfg.refresh_ttl,
        }
    }

    pub fn refresh_ttl(&self) -> chrono::Duration { self.refresh_ttl }

    fn sign(&self, claims: &Claims, key: &EncodingKey) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| AppError::internal("token_sign".to_string(), e.to_string()))
    }

    pub fn issue_access_token(&self, identity: &Identity) -> AppResult<String> {
        self.issue_access_token_at(identity, Utc::now())
    }

    /// Sign an access token as if issued at `issued_at`.
    pub fn issue_access_token_at(&self, identity: &Identity, issued_at: DateTime<Utc>) -> AppResult<String> {
        let claims = Claims::new(&identity.principal(), TokenType::Access, issued_at, self.access_ttl);
        self.sign(&claims, &self.access_enc)
    }

    pub fn issue_refresh_token(&self, identity: &Identity) -> AppResult<String> {
        self.issue_refresh_token_at(identity, Utc::now())
    }

    pub fn issue_refresh_token_at(&self, identity: &Identity, issued_at: DateTime<Utc>) -> AppResult<String> {
        let mut claims = Claims::new(&identity.principal(), TokenType::Refresh, issued_at, self.refresh_ttl);
        claims.jti = Some(gen_jti()?);
        self.sign(&claims, &self.refresh_enc)
    }

    /// Validate an access token. Every failure is `Forbidden`: a credential was presented
    /// but cannot be trusted, so the client should try a refresh.
    pub fn verify_access(&self, token: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(token, &self.access_dec, &validation()).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::forbidden("token_expired", "access token expired"),
            _ => AppError::forbidden("invalid_token", "access token invalid"),
        })?;
        if data.claims.typ != TokenType::Access {
            return Err(AppError::forbidden("wrong_token_type", "not an access token"));
        }
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(token, &self.refresh_dec, &validation()).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::invalid_session("session_expired", "refresh token expired"),
            _ => AppError::invalid_session("invalid_session", "refresh token invalid"),
        })?;
        if data.claims.typ != TokenType::Refresh {
            return Err(AppError::invalid_session("invalid_session", "not a refresh token"));
        }
        Ok(data.claims)
    }

    /// Exchange a refresh cookie for a new access token, rotating the refresh token.
    ///
    /// The role in the new tokens comes from the stored identity, not the old claims, so a
    /// role change takes effect at the next refresh.
    pub fn refresh(&self, cookie: Option<&str>, users: &UserStore) -> AppResult<RefreshGrant> {
        let Some(token) = cookie else {
            return Err(AppError::unauthenticated("missing_refresh", "no refresh cookie"));
        };
        let claims = self.verify_refresh(token).map_err(|e| {
            warn!(target: "auth", code = e.code_str(), "refresh rejected");
            e
        })?;
        let Some(identity) = users.get(&claims.sub) else {
            warn!(target: "auth", subject = %claims.sub, "refresh for unknown subject");
            return Err(AppError::invalid_session("unknown_subject", "account no longer exists"));
        };
        let access_token = self.issue_access_token(&identity)?;
        let refresh_token = self.issue_refresh_token(&identity)?;
        debug!(target: "auth", subject = %identity.phone, "session refreshed");
        Ok(RefreshGrant { access_token, refresh_token, identity })
    }

    /// Logout never fails; an unreadable cookie is simply logged and forgotten.
    pub fn logout(&self, cookie: Option<&str>) {
        match cookie.map(|t| self.verify_refresh(t)) {
            Some(Ok(claims)) => info!(target: "auth", subject = %claims.sub, "logout"),
            Some(Err(_)) => debug!(target: "auth", "logout with stale refresh cookie"),
            None => debug!(target: "auth", "logout without refresh cookie"),
        }
    }

    /// Best-effort subject for audit logs. The signature is NOT checked; never use this
    /// for an authorization decision.
    pub fn subject_hint(token: &str) -> Option<String> {
        let mut v = Validation::new(Algorithm::HS256);
        v.insecure_disable_signature_validation();
        v.validate_exp = false;
        v.required_spec_claims.clear();
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &v).ok().map(|d| d.claims.sub)
    }
}
