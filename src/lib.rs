use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod status;

// Routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Core state types for the application entry point and tests.
pub use config::AppConfig;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every annotated handler and schema into the OpenAPI document
/// served at `/api-docs/openapi.json` (browsable at `/swagger-ui`). The
/// legacy `/api/locations` alias paths are intentionally undocumented; the
/// canonical `/api/clients` entries describe both.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::login, handlers::me,
        handlers::list_clients, handlers::create_client, handlers::get_client,
        handlers::update_client, handlers::delete_client, handlers::list_clients_with_status,
        handlers::list_visit_logs, handlers::create_visit_log, handlers::delete_visit_log,
        handlers::list_routes, handlers::create_route, handlers::get_route,
        handlers::update_route, handlers::delete_route,
        handlers::list_users, handlers::create_user, handlers::update_user, handlers::delete_user,
        handlers::create_invite, handlers::list_invites, handlers::delete_invite,
        handlers::assign_route, handlers::my_routes, handlers::update_assignment_status,
        handlers::delete_assignment, handlers::get_schedule, handlers::batch_schedule,
        handlers::list_templates, handlers::create_template, handlers::get_template,
        handlers::update_template, handlers::delete_template,
        handlers::create_route_from_template, handlers::save_route_as_template,
        handlers::get_settings, handlers::get_setting, handlers::put_settings,
        handlers::put_setting
    ),
    components(
        schemas(
            models::UserResponse, models::TokenResponse, models::RegisterRequest,
            models::LoginRequest, models::CreateUserRequest, models::UpdateUserRequest,
            models::InviteCode, models::CreateInviteRequest,
            models::Client, models::ClientPayload, models::ClientWithStatus,
            models::VisitLog, models::CreateVisitLogRequest,
            models::Route, models::RouteResponse, models::RoutePayload,
            models::RouteAssignment, models::AssignmentWithRoute, models::AssignRouteRequest,
            models::UpdateAssignmentStatusRequest, models::BatchScheduleRequest,
            models::BatchScheduleResponse,
            models::RouteTemplateResponse, models::TemplatePayload,
            models::MaterializeTemplateRequest, models::SaveAsTemplateRequest,
            crate::status::ServiceStatus,
        )
    ),
    tags(
        (name = "routeview", description = "Vending machine route tracker API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe, immutable container holding the application's
/// shared services and configuration. Cloned per request by Axum.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: database access behind the `Repository` trait.
    pub repo: RepositoryState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Allow the auth guards (and handlers) to pull individual components out of
// the shared AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the full routing structure, applies the observability layers,
/// and registers the shared application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        // Documentation: auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public routes: health, register, login.
        .merge(public::public_routes())
        // Core surface: auth is enforced per-handler by the extractor guards.
        .merge(authenticated::authenticated_routes())
        // Admin surface: every handler requires the AdminUser guard.
        .merge(admin::admin_routes())
        .with_state(state);

    // Observability and correlation layers (outermost).
    base_router
        .layer(
            ServiceBuilder::new()
                // Request ID generation: a unique UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // Request tracing: spans the whole request/response lifecycle
                // with the generated request id attached.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echo the request id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: includes the `x-request-id` header so
/// every log line for one request carries the same correlation id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
