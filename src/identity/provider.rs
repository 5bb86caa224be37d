use std::sync::Arc;

use tracing::info;

use super::issuer::TokenIssuer;
use super::otp::{OtpSender, OtpStore};
use super::principal::{normalize_phone, Identity, Role};
use super::store::UserStore;
use crate::config::AuthConfig;
use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub phone: String,
    pub otp: String,
}

/// Tokens minted for a successful login. The refresh token belongs in a cookie only.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
    pub created: bool,
}

pub trait AuthProvider: Send + Sync {
    /// Start a login for `phone`. Returns the code only when development echo is enabled.
    fn request_code(&self, phone: &str) -> AppResult<Option<String>>;
    fn login(&self, req: &LoginRequest) -> AppResult<LoginGrant>;
}

pub struct OtpAuthProvider {
    users: UserStore,
    otps: OtpStore,
    issuer: TokenIssuer,
    sender: Arc<dyn OtpSender>,
    admin_phones: Vec<String>,
    expose_dev_otp: bool,
}

impl OtpAuthProvider {
    pub fn new(cfg: &AuthConfig, users: UserStore, issuer: TokenIssuer, sender: Arc<dyn OtpSender>) -> Self {
        let admin_phones = cfg.admin_phones.iter().filter_map(|p| normalize_phone(p).ok()).collect();
        Self {
            users,
            otps: OtpStore::new(cfg.otp_ttl, cfg.otp_max_attempts),
            issuer,
            sender,
            admin_phones,
            expose_dev_otp: cfg.expose_dev_otp,
        }
    }

    pub fn otps(&self) -> &OtpStore { &self.otps }

    fn initial_role(&self, phone: &str) -> Role {
        if self.admin_phones.iter().any(|p| p == phone) { Role::Admin } else { Role::User }
    }
}

impl AuthProvider for OtpAuthProvider {
    fn request_code(&self, phone: &str) -> AppResult<Option<String>> {
        let phone = normalize_phone(phone)?;
        let code = self.otps.issue(&phone)?;
        self.sender.send(&phone, &code)?;
        info!(target: "auth", phone = %phone, "otp requested");
        Ok(self.expose_dev_otp.then_some(code))
    }

    fn login(&self, req: &LoginRequest) -> AppResult<LoginGrant> {
        let phone = normalize_phone(&req.phone)?;
        self.otps.verify(&phone, &req.otp)?;
        let (identity, created) = self.users.get_or_create(&phone, self.initial_role(&phone))?;
        let access_token = self.issuer.issue_access_token(&identity)?;
        let refresh_token = self.issuer.issue_refresh_token(&identity)?;
        info!(target: "auth", subject = %identity.phone, role = identity.role.as_str(), created, "login");
        Ok(LoginGrant { access_token, refresh_token, identity, created })
    }
}
