//! Server-side identity: user documents, OTP login, token issuing and verification.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod claims;
mod cookie;
mod store;
mod otp;
mod issuer;
mod verifier;
mod provider;
mod request_context;
mod authorizer;

pub use principal::{normalize_phone, Identity, Principal, Role};
pub use claims::{Claims, TokenType};
pub use cookie::{clear_refresh_cookie, parse_cookie, refresh_cookie, CookieConfig, REFRESH_COOKIE};
pub use store::{ProfileUpdate, UserStore};
pub use otp::{LogOtpSender, OtpSender, OtpStore};
pub use issuer::{RefreshGrant, TokenIssuer};
pub use verifier::{bearer_token, verify_bearer};
pub use provider::{AuthProvider, LoginGrant, LoginRequest, OtpAuthProvider};
pub use request_context::RequestContext;
pub use authorizer::require_role;
