use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Endpoints exclusive to the admin role: account management, invite-code
/// issuance, and schedule writes. Every handler here takes the `AdminUser`
/// guard, which rejects members with 403 after the authentication check.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /api/users
        // Account listing (including deactivated) and direct creation.
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        // PUT/DELETE /api/users/{id}
        // Full-field overwrite / soft deactivation. Accounts are never hard
        // deleted so visit and assignment history stays attributable.
        .route(
            "/api/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        // GET/POST /api/invite-codes, DELETE /api/invite-codes/{id}
        // Single-use registration codes.
        .route(
            "/api/invite-codes",
            get(handlers::list_invites).post(handlers::create_invite),
        )
        .route("/api/invite-codes/{id}", delete(handlers::delete_invite))
        // POST /api/routes/{id}/assign
        // Bind a route to a user for one date; duplicates are rejected by
        // the composite uniqueness constraint.
        .route("/api/routes/{id}/assign", post(handlers::assign_route))
        // POST /api/schedule/batch
        // Same binding across many dates, reporting created/skipped counts.
        .route("/api/schedule/batch", post(handlers::batch_schedule))
}
