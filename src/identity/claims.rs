use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::principal::{Principal, Role};

/// Distinguishes access from refresh tokens so one can never stand in for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims shared by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (phone number)
    pub sub: String,
    pub role: Role,
    pub typ: TokenType,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    /// Refresh tokens carry a unique id so rotated cookies never collide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    pub fn new(principal: &Principal, typ: TokenType, issued_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            sub: principal.subject.clone(),
            role: principal.role,
            typ,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: None,
        }
    }

    pub fn principal(&self) -> Principal {
        Principal { subject: self.sub.clone(), role: self.role }
    }
}
