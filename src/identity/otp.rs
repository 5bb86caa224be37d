//! One-time passcodes for phone login.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use password_hash::{PasswordHash, SaltString};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Delivers a generated code to the phone. SMS delivery is an external service.
pub trait OtpSender: Send + Sync {
    fn send(&self, phone: &str, code: &str) -> AppResult<()>;
}

/// Development sender: the code only goes to the debug log.
pub struct LogOtpSender;

impl OtpSender for LogOtpSender {
    fn send(&self, phone: &str, code: &str) -> AppResult<()> {
        debug!(target: "auth", phone = %phone, code = %code, "otp generated");
        Ok(())
    }
}

#[derive(Debug)]
struct OtpEntry {
    hash: String,
    expires_at: DateTime<Utc>,
    attempts_left: u32,
}

#[derive(Clone)]
pub struct OtpStore {
    entries: Arc<Mutex<HashMap<String, OtpEntry>>>,
    ttl: chrono::Duration,
    max_attempts: u32,
}

fn hash_code(code: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AppError::internal("rng".to_string(), e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::internal("otp_salt".to_string(), e.to_string()))?;
    Argon2::default()
        .hash_password(code.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal("otp_hash".to_string(), e.to_string()))
}

fn verify_code(hash: &str, code: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(code.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

// Largest multiple of 1_000_000 that fits in a u32; draws at or above it are rejected.
const CODE_ZONE: u32 = 4_294_000_000;

fn code_from(draw: u32) -> Option<String> {
    (draw < CODE_ZONE).then(|| format!("{:06}", draw % 1_000_000))
}

fn gen_code() -> AppResult<String> {
    loop {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf).map_err(|e| AppError::internal("rng".to_string(), e.to_string()))?;
        if let Some(code) = code_from(u32::from_le_bytes(buf)) {
            return Ok(code);
        }
    }
}

impl OtpStore {
    pub fn new(ttl: chrono::Duration, max_attempts: u32) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), ttl, max_attempts: max_attempts.max(1) }
    }

    /// Generate a code for `phone`, replacing any outstanding one.
    pub fn issue(&self, phone: &str) -> AppResult<String> {
        let code = gen_code()?;
        let entry = OtpEntry { hash: hash_code(&code)?, expires_at: Utc::now() + self.ttl, attempts_left: self.max_attempts };
        self.entries.lock().insert(phone.to_string(), entry);
        Ok(code)
    }

    /// Check a code. A match consumes the entry; a miss consumes one attempt.
    ///
    /// The Argon2 comparison runs outside the lock.
    pub fn verify(&self, phone: &str, code: &str) -> AppResult<()> {
        let hash = self.checkout(phone)?;
        let matched = verify_code(&hash, code.trim());
        self.settle(phone, &hash, matched)
    }

    /// Hash of the live entry for `phone`; expired or exhausted entries are dropped.
    fn checkout(&self, phone: &str) -> AppResult<String> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(phone) else {
            return Err(AppError::unauthenticated("otp_expired", "no active code for this number"));
        };
        if entry.expires_at <= Utc::now() || entry.attempts_left == 0 {
            entries.remove(phone);
            return Err(AppError::unauthenticated("otp_expired", "code expired; request a new one"));
        }
        Ok(entry.hash.clone())
    }

    /// Apply a comparison made against `hash`. A code that was replaced or consumed in
    /// the meantime counts as expired.
    fn settle(&self, phone: &str, hash: &str, matched: bool) -> AppResult<()> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(phone).filter(|e| e.hash == hash) else {
            return Err(AppError::unauthenticated("otp_expired", "code expired; request a new one"));
        };
        if matched {
            entries.remove(phone);
            return Ok(());
        }
        entry.attempts_left = entry.attempts_left.saturating_sub(1);
        if entry.attempts_left == 0 {
            entries.remove(phone);
        }
        Err(AppError::unauthenticated("invalid_otp", "incorrect code"))
    }

    /// Drop expired entries.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}
