//! Route guards: pure navigation decisions over boot phase, identity and target path.

use super::boot::BootPhase;
use crate::identity::Identity;

pub const LOGIN_PATH: &str = "/login";
pub const PROFILE_PATH: &str = "/profile";
pub const HOME_PATH: &str = "/home";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Public,
    /// Any signed-in identity.
    Authenticated,
    /// Signed in and an address on file.
    ProfileComplete,
    /// Signed in with the admin role.
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    /// Where to send the user once the redirect target is satisfied.
    pub resume: Option<String>,
}

impl Redirect {
    fn with_resume(to: &str, target: &str) -> Self {
        Self { to: to.to_string(), resume: Some(target.to_string()) }
    }

    /// Browser location, e.g. `/login?redirect=%2Fsettings`.
    pub fn location(&self) -> String {
        match &self.resume {
            Some(r) => format!("{}?redirect={}", self.to, urlencoding::encode(r)),
            None => self.to.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Session verification still running; show a loading indicator only.
    Loading,
    Redirect(Redirect),
}

impl Guard {
    pub fn evaluate(&self, user: Option<&Identity>, target: &str) -> GuardDecision {
        if *self == Guard::Public {
            return GuardDecision::Render;
        }
        let Some(user) = user else {
            return GuardDecision::Redirect(Redirect::with_resume(LOGIN_PATH, target));
        };
        match self {
            Guard::Public | Guard::Authenticated => GuardDecision::Render,
            Guard::ProfileComplete if user.is_profile_complete() => GuardDecision::Render,
            Guard::ProfileComplete => GuardDecision::Redirect(Redirect::with_resume(PROFILE_PATH, target)),
            Guard::Admin if user.is_admin() => GuardDecision::Render,
            // Wrong role goes home, not to login, to avoid an access-denied loop.
            Guard::Admin => GuardDecision::Redirect(Redirect { to: HOME_PATH.to_string(), resume: None }),
        }
    }
}

/// Guard decision that also honours the boot phase.
pub fn evaluate(guard: Guard, phase: BootPhase, user: Option<&Identity>, target: &str) -> GuardDecision {
    if guard != Guard::Public && phase != BootPhase::Ready {
        return GuardDecision::Loading;
    }
    guard.evaluate(user, target)
}

/// Page routes of the web app and the guard on each.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, Guard)>,
}

impl Default for RouteTable {
    fn default() -> Self { Self::agricult() }
}

fn path_only(target: &str) -> &str {
    target.split(['?', '#']).next().unwrap_or(target)
}

impl RouteTable {
    pub fn new(routes: Vec<(String, Guard)>) -> Self { Self { routes } }

    pub fn agricult() -> Self {
        let entries: [(&str, Guard); 13] = [
            ("/", Guard::Public),
            (LOGIN_PATH, Guard::Public),
            (HOME_PATH, Guard::Authenticated),
            ("/settings", Guard::Authenticated),
            (PROFILE_PATH, Guard::Authenticated),
            ("/prices", Guard::Authenticated),
            ("/crop-calendar", Guard::Authenticated),
            ("/insurance", Guard::Authenticated),
            ("/training", Guard::Authenticated),
            ("/marketplace", Guard::ProfileComplete),
            ("/map", Guard::ProfileComplete),
            ("/listings", Guard::ProfileComplete),
            ("/admin", Guard::Admin),
        ];
        Self::new(entries.iter().map(|(p, g)| (p.to_string(), *g)).collect())
    }

    /// Longest registered prefix on a segment boundary; `/` only matches itself.
    pub fn guard_for(&self, target: &str) -> Guard {
        let path = path_only(target);
        let mut best: Option<(&str, Guard)> = None;
        for (route, guard) in &self.routes {
            let matches = if route == "/" {
                path == "/"
            } else {
                path == route || path.strip_prefix(route.as_str()).map(|rest| rest.starts_with('/')).unwrap_or(false)
            };
            if matches && best.map(|(b, _)| route.len() > b.len()).unwrap_or(true) {
                best = Some((route.as_str(), *guard));
            }
        }
        best.map(|(_, g)| g).unwrap_or(Guard::Public)
    }

    pub fn navigate(&self, target: &str, phase: BootPhase, user: Option<&Identity>) -> GuardDecision {
        evaluate(self.guard_for(target), phase, user, target)
    }
}

/// Where to go after login, read from the `redirect` query parameter.
///
/// Only same-site absolute paths are honoured; anything else falls back to `/home`.
pub fn post_login_destination(query: Option<&str>) -> String {
    let Some(query) = query else { return HOME_PATH.to_string() };
    let raw = query
        .trim_start_matches('?')
        .split('&')
        .find_map(|pair| pair.strip_prefix("redirect="));
    let Some(raw) = raw else { return HOME_PATH.to_string() };
    match urlencoding::decode(raw) {
        Ok(dest) if is_local_path(&dest) && !dest.starts_with(LOGIN_PATH) => dest.into_owned(),
        _ => HOME_PATH.to_string(),
    }
}

/// Browsers read `//host` and `/\host` as another origin and drop tabs and newlines
/// before parsing, so only a single leading `/` followed by neither slash kind is local.
fn is_local_path(dest: &str) -> bool {
    let mut chars = dest.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/') | Some('\\'))
        && !dest.chars().any(|c| c.is_control())
}
