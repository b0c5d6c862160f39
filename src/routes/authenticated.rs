use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Client (location) surface, registered once per path prefix.
///
/// The legacy `/api/locations` paths must resolve identically to
/// `/api/clients`, so the handler set is defined once here and mounted under
/// both prefixes instead of duplicating route logic.
fn client_routes(prefix: &str) -> Router<AppState> {
    Router::new()
        // GET/POST {prefix}
        // List all locations / create a new one.
        .route(prefix, get(handlers::list_clients).post(handlers::create_client))
        // GET {prefix}/with-status
        // Listing annotated with last_serviced and the freshness tier.
        .route(
            &format!("{prefix}/with-status"),
            get(handlers::list_clients_with_status),
        )
        // GET/PUT/DELETE {prefix}/{id}
        // Single-location CRUD. PUT is a full-field overwrite.
        .route(
            &format!("{prefix}/{{id}}"),
            get(handlers::get_client)
                .put(handlers::update_client)
                .delete(handlers::delete_client),
        )
        // GET/POST {prefix}/{id}/logs
        // Visit history (searchable) and visit creation. Creation uses the
        // optional guard so unauthenticated field devices still log visits.
        .route(
            &format!("{prefix}/{{id}}/logs"),
            get(handlers::list_visit_logs).post(handlers::create_visit_log),
        )
}

/// Authenticated Router Module
///
/// The core application surface for any logged-in user: locations, visit
/// logs, routes, the personal schedule, templates, and settings reads.
/// Settings writes are registered here too (single path owner) but their
/// handlers demand the admin guard.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/auth/me
        // The requesting user's own profile.
        .route("/api/auth/me", get(handlers::me))
        // --- Locations, twice: canonical prefix and the legacy alias ---
        .merge(client_routes("/api/clients"))
        .merge(client_routes("/api/locations"))
        // DELETE /api/logs/{id}
        // Visit logs are immutable; deletion is the only mutation.
        .route("/api/logs/{id}", delete(handlers::delete_visit_log))
        // --- Routes & ordered membership ---
        .route(
            "/api/routes",
            get(handlers::list_routes).post(handlers::create_route),
        )
        .route(
            "/api/routes/{id}",
            get(handlers::get_route)
                .put(handlers::update_route)
                .delete(handlers::delete_route),
        )
        // POST /api/routes/{id}/save-as-template
        // Snapshot a route's current membership into a reusable template.
        .route(
            "/api/routes/{id}/save-as-template",
            post(handlers::save_route_as_template),
        )
        // --- Scheduling (reads + own-assignment mutations) ---
        .route("/api/my-routes", get(handlers::my_routes))
        .route(
            "/api/route-assignments/{id}/status",
            put(handlers::update_assignment_status),
        )
        .route(
            "/api/route-assignments/{id}",
            delete(handlers::delete_assignment),
        )
        // GET /api/schedule?start_date&end_date&user_id
        // Non-admins are pinned to their own assignments in the handler.
        .route("/api/schedule", get(handlers::get_schedule))
        // --- Route templates ---
        .route(
            "/api/route-templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/api/route-templates/{id}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route(
            "/api/route-templates/{id}/create-route",
            post(handlers::create_route_from_template),
        )
        // --- Settings (reads for members, writes admin-guarded) ---
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route(
            "/api/settings/{key}",
            get(handlers::get_setting).put(handlers::put_setting),
        )
}
