use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

/// Attaches a [`Ctx`] when the request carries a valid Bearer token.
///
/// Requests without an Authorization header pass through anonymously; the
/// `Ctx` extractor turns that into a 401 for routes that need a caller.
pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    let auth_header = match req.headers().get(header::AUTHORIZATION) {
        Some(h) => h.to_str().map_err(|_| Error::AuthFailTokenWrongFormat)?,
        None => return Ok(next.run(req).await),
    };

    // Format: "Bearer <token>"
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(Error::AuthFailTokenWrongFormat)?;

    let identity = state.identity.verify(token).map_err(|e| {
        warn!("[Auth] Rejected token: {}", e);
        e
    })?;

    req.extensions_mut().insert(Ctx::new(identity.subject));

    Ok(next.run(req).await)
}
