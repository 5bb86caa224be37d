//! Bearer-token extraction and verification for protected requests.
//!
//! The 401/403 split is part of the client contract: 401 means no usable credential was
//! sent (go to login), 403 means a credential was sent but is stale or invalid (refresh once).

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::claims::Claims;
use super::issuer::TokenIssuer;
use crate::error::{AppError, AppResult};

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let Some(raw) = headers.get(AUTHORIZATION) else {
        return Err(AppError::unauthenticated("missing_token", "authorization header required"));
    };
    let value = raw
        .to_str()
        .map_err(|_| AppError::unauthenticated("malformed_authorization", "authorization header is not ascii"))?;
    let mut parts = value.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or("");
    let token = parts.next().map(str::trim).unwrap_or("");
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AppError::unauthenticated("malformed_authorization", "expected a bearer token"));
    }
    Ok(token)
}

pub fn verify_bearer(headers: &HeaderMap, issuer: &TokenIssuer) -> AppResult<Claims> {
    let token = bearer_token(headers)?;
    issuer.verify_access(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::identity::{Identity, Role};
    use axum::http::HeaderValue;

    fn headers(v: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_static(v));
        h
    }

    #[test]
    fn missing_or_malformed_header_is_unauthenticated() {
        let iss = TokenIssuer::new(&AuthConfig::with_secrets("a", "r"));
        for h in [HeaderMap::new(), headers("Bearer"), headers("Bearer   "), headers("Basic dXNlcjpwdw==")] {
            assert!(matches!(verify_bearer(&h, &iss), Err(AppError::Unauthenticated { .. })));
        }
    }

    #[test]
    fn present_but_bad_token_is_forbidden() {
        let iss = TokenIssuer::new(&AuthConfig::with_secrets("a", "r"));
        assert!(matches!(verify_bearer(&headers("Bearer abc.def.ghi"), &iss), Err(AppError::Forbidden { .. })));
    }

    #[test]
    fn valid_token_yields_claims_with_any_scheme_case() {
        let iss = TokenIssuer::new(&AuthConfig::with_secrets("a", "r"));
        let token = iss.issue_access_token(&Identity::new("9876543210", Role::User)).unwrap();
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(&format!("bearer {token}")).unwrap());
        let claims = verify_bearer(&h, &iss).unwrap();
        assert_eq!(claims.sub, "9876543210");
        assert_eq!(claims.role, Role::User);
    }
}
