use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// The verified subject of a request: who is calling and with which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// A user document. The phone number is the subject identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub phone: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(phone: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self { phone: phone.into(), role, name: None, address: None, created_at: now, updated_at: now }
    }

    /// A profile counts as complete once an address has been saved.
    pub fn is_profile_complete(&self) -> bool {
        self.address.as_deref().map(|a| !a.trim().is_empty()).unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn principal(&self) -> Principal {
        Principal { subject: self.phone.clone(), role: self.role }
    }
}

/// Strip separators from a phone number and check its shape: optional `+`, then 10-15 digits.
pub fn normalize_phone(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(r) => ("+", r),
        None => ("", trimmed),
    };
    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return Err(AppError::user("invalid_phone", "phone number may only contain digits")),
        }
    }
    if !(10..=15).contains(&digits.len()) {
        return Err(AppError::user("invalid_phone", "phone number must have 10 to 15 digits"));
    }
    Ok(format!("{plus}{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_completeness_follows_address() {
        let mut id = Identity::new("9876543210", Role::User);
        assert!(!id.is_profile_complete());
        id.address = Some("   ".into());
        assert!(!id.is_profile_complete());
        id.address = Some("Plot 4, Nashik".into());
        assert!(id.is_profile_complete());
    }

    #[test]
    fn identity_serializes_camel_case_and_skips_empty_fields() {
        let id = Identity::new("9876543210", Role::Admin);
        let v = serde_json::to_value(&id).unwrap();
        assert_eq!(v["phone"], "9876543210");
        assert_eq!(v["role"], "admin");
        assert!(v.get("createdAt").is_some());
        assert!(v.get("address").is_none());
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone(" +91 98765-43210 ").unwrap(), "+919876543210");
        assert_eq!(normalize_phone("(987) 654.3210").unwrap(), "9876543210");
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("98765x43210").is_err());
    }
}
