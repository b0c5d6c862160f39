use crate::handlers;
use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// Public Router Module
///
/// Endpoints reachable without a bearer token: the liveness probe and the
/// two credential-exchange flows. Registration is still gated, not by a
/// token but by a valid invite code checked inside the handler.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for deployment monitors. Touches nothing.
        .route("/health", get(handlers::health))
        // POST /api/auth/register
        // Invite-code-gated self-registration. Returns a token on success.
        .route("/api/auth/register", post(handlers::register))
        // POST /api/auth/login
        // Email/password exchange for a 7-day bearer token.
        .route("/api/auth/login", post(handlers::login))
}
