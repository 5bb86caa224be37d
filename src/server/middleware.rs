//! Token verifier and role gate for protected routes.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{warn, Instrument};

use super::AppState;
use crate::error::AppError;
use crate::identity::{bearer_token, require_role, verify_bearer, RequestContext, Role, TokenIssuer};

/// Verify the bearer token and attach a [`RequestContext`] for downstream handlers.
///
/// Stateless: nothing is written besides the log line on rejection.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let route = req.uri().path().to_string();
    match verify_bearer(req.headers(), &state.issuer) {
        Ok(claims) => {
            let ctx = RequestContext::new(claims.principal());
            let span = tracing::info_span!(
                "http.request",
                request_id = %ctx.request_id,
                subject = %ctx.principal.subject,
                method = %req.method(),
                route = %route,
            );
            req.extensions_mut().insert(ctx);
            next.run(req).instrument(span).await
        }
        Err(err) => {
            let subject = bearer_token(req.headers()).ok().and_then(TokenIssuer::subject_hint);
            warn!(
                target: "auth",
                route = %route,
                subject = subject.as_deref().unwrap_or("-"),
                code = err.code_str(),
                "request rejected"
            );
            err.into_response()
        }
    }
}

/// Admin gate; must run inside [`require_auth`].
pub async fn require_admin(req: Request, next: Next) -> Response {
    let Some(ctx) = req.extensions().get::<RequestContext>() else {
        return AppError::unauthenticated("missing_token", "authentication required").into_response();
    };
    if let Err(err) = require_role(&ctx.principal, Role::Admin) {
        warn!(
            target: "auth",
            route = %req.uri().path(),
            subject = %ctx.principal.subject,
            role = ctx.principal.role.as_str(),
            "admin route denied"
        );
        return err.into_response();
    }
    next.run(req).await
}
