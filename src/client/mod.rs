//! Session client: token lifecycle on the calling side.
//!
//! `SessionClient` owns the in-memory access token, `ApiClient` wraps every authenticated
//! call with one silent refresh, `SessionBoot` verifies the session on first load and
//! `guards` decides what a navigation renders.

pub mod abort;
pub mod boot;
pub mod guards;
pub mod request;
pub mod session;
pub mod storage;
pub mod transport;

pub use abort::{AbortController, AbortSignal};
pub use boot::{BootPhase, SessionBoot};
pub use guards::{post_login_destination, Guard, GuardDecision, Redirect, RouteTable};
pub use request::{ApiClient, Attempt};
pub use session::{SessionClient, SessionSnapshot, SESSION_CHANGED};
pub use storage::{DurableStore, FileStore, MemoryStore, LOGGED_IN_KEY, USER_KEY};
pub use transport::{ApiRequest, ApiResponse, AuthTransport, HttpTransport, Method, TokenBody};
