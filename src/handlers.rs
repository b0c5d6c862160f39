use crate::{
    AppState,
    auth::{
        AdminUser, AuthUser, OptionalUser, Role, generate_invite_code, hash_password, issue_token,
        verify_password,
    },
    models::{
        AssignRouteRequest, AssignmentStatus, AssignmentWithRoute, BatchScheduleRequest,
        BatchScheduleResponse, Client, ClientPayload, ClientWithStatus, CreateInviteRequest,
        CreateUserRequest, CreateVisitLogRequest, InviteCode, LoginRequest,
        MaterializeTemplateRequest, RegisterRequest, Route, RouteAssignment, RoutePayload,
        RouteResponse, RouteTemplateResponse, SaveAsTemplateRequest, ScheduleQuery, TemplatePayload,
        TokenResponse,
        UpdateAssignmentStatusRequest, UpdateUserRequest, UserResponse, VisitLog, VisitLogFilter,
    },
    repository::RegisterError,
    status::{ServiceThresholds, compute_service_status},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{Duration, Utc};

// Setting key holding the freshness thresholds consumed by `with-status`.
const THRESHOLDS_KEY: &str = "service_status_thresholds";

fn encode_client_ids(ids: &[i64]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

fn decode_client_ids(raw: &str) -> Vec<i64> {
    serde_json::from_str(raw).unwrap_or_default()
}

// --- Auth ---

/// health
///
/// [Public Route] Liveness probe for deployment checks. No auth, no database.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// register
///
/// [Public Route] Self-registration gated on a valid invite code. The user
/// insert and the invite consumption commit atomically, so a code can never
/// be consumed twice even under concurrent requests.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered", body = TokenResponse),
        (status = 400, description = "Invalid invite code or email taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, StatusCode> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        tracing::error!("password hash error: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user = match state
        .repo
        .register_with_invite(&payload.invite_code, &payload.email, &hash, &payload.name)
        .await
    {
        Ok(user) => user,
        Err(RegisterError::InvalidInvite) | Err(RegisterError::EmailTaken) => {
            return Err(StatusCode::BAD_REQUEST);
        }
        Err(RegisterError::Database(_)) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let token = issue_token(user.id, &state.config.jwt_secret, state.config.token_ttl_days)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: user.into(),
    }))
}

/// login
///
/// [Public Route] Email + password exchange for a 7-day bearer token.
/// Deactivated accounts fail exactly like bad credentials.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, StatusCode> {
    let user = state
        .repo
        .get_user_by_email(&payload.email)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !user.is_active || !verify_password(&payload.password, &user.password_hash) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = issue_token(user.id, &state.config.jwt_secret, state.config.token_ttl_days)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: user.into(),
    }))
}

/// me
///
/// [Authenticated Route] The requesting user's own profile.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses((status = 200, description = "Profile", body = UserResponse))
)]
pub async fn me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, StatusCode> {
    let user = state
        .repo
        .get_user(id)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(user.into()))
}

// --- Clients (aliased at /api/locations) ---

/// list_clients
///
/// [Authenticated Route] All tracked locations, name-ordered.
#[utoipa::path(
    get,
    path = "/api/clients",
    responses((status = 200, description = "Clients", body = [Client]))
)]
pub async fn list_clients(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<Client>> {
    Json(state.repo.list_clients().await)
}

/// create_client
#[utoipa::path(
    post,
    path = "/api/clients",
    request_body = ClientPayload,
    responses((status = 200, description = "Created", body = Client))
)]
pub async fn create_client(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ClientPayload>,
) -> Result<Json<Client>, StatusCode> {
    state
        .repo
        .create_client(&payload)
        .await
        .map(Json)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// get_client
#[utoipa::path(
    get,
    path = "/api/clients/{id}",
    params(("id" = i64, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Found", body = Client),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_client(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Client>, StatusCode> {
    state
        .repo
        .get_client(id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// update_client
///
/// [Authenticated Route] Full-field overwrite: every stored column takes the
/// value from the request body.
#[utoipa::path(
    put,
    path = "/api/clients/{id}",
    params(("id" = i64, Path, description = "Client ID")),
    request_body = ClientPayload,
    responses(
        (status = 200, description = "Updated", body = Client),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_client(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ClientPayload>,
) -> Result<Json<Client>, StatusCode> {
    state
        .repo
        .update_client(id, &payload)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// delete_client
///
/// [Authenticated Route] Hard delete. Visit logs and route memberships go
/// with it; routes themselves remain.
#[utoipa::path(
    delete,
    path = "/api/clients/{id}",
    params(("id" = i64, Path, description = "Client ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_client(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> StatusCode {
    if state.repo.delete_client(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// list_clients_with_status
///
/// [Authenticated Route] Clients annotated with `last_serviced` and the
/// derived freshness tier. Thresholds come from settings at request time;
/// age is measured against wall-clock now, never cached.
#[utoipa::path(
    get,
    path = "/api/clients/with-status",
    responses((status = 200, description = "Clients with status", body = [ClientWithStatus]))
)]
pub async fn list_clients_with_status(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<ClientWithStatus>> {
    let thresholds = ServiceThresholds::from_setting(
        state
            .repo
            .get_setting(THRESHOLDS_KEY)
            .await
            .as_ref()
            .map(|s| s.value.as_str()),
    );
    let now = Utc::now();

    let rows = state.repo.list_clients_with_last_visit().await;
    let clients = rows
        .into_iter()
        .map(|c| {
            let service_status = compute_service_status(c.last_serviced, now, thresholds);
            ClientWithStatus {
                id: c.id,
                name: c.name,
                contact_name: c.contact_name,
                contact_phone: c.contact_phone,
                address: c.address,
                latitude: c.latitude,
                longitude: c.longitude,
                notes: c.notes,
                created_at: c.created_at,
                updated_at: c.updated_at,
                last_serviced: c.last_serviced,
                service_status,
            }
        })
        .collect();
    Json(clients)
}

// --- Visit logs ---

/// list_visit_logs
///
/// [Authenticated Route] A client's visit history, newest first, with an
/// optional substring filter over title and notes.
#[utoipa::path(
    get,
    path = "/api/clients/{id}/logs",
    params(("id" = i64, Path, description = "Client ID"), VisitLogFilter),
    responses(
        (status = 200, description = "Visit logs", body = [VisitLog]),
        (status = 404, description = "Client Not Found")
    )
)]
pub async fn list_visit_logs(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(client_id): Path<i64>,
    Query(filter): Query<VisitLogFilter>,
) -> Result<Json<Vec<VisitLog>>, StatusCode> {
    state
        .repo
        .get_client(client_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(state.repo.list_visit_logs(client_id, filter.search).await))
}

/// create_visit_log
///
/// [Optional-Auth Route] Records a service visit. The title is generated
/// server-side from the current timestamp; when the request carries a valid
/// bearer token the acting user is attributed, otherwise the log is
/// anonymous.
#[utoipa::path(
    post,
    path = "/api/clients/{id}/logs",
    params(("id" = i64, Path, description = "Client ID")),
    request_body = CreateVisitLogRequest,
    responses(
        (status = 200, description = "Logged", body = VisitLog),
        (status = 404, description = "Client Not Found")
    )
)]
pub async fn create_visit_log(
    OptionalUser(user): OptionalUser,
    State(state): State<AppState>,
    Path(client_id): Path<i64>,
    Json(payload): Json<CreateVisitLogRequest>,
) -> Result<Json<VisitLog>, StatusCode> {
    state
        .repo
        .get_client(client_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let title = format!("Visit - {}", Utc::now().format("%Y-%m-%d %H:%M"));
    state
        .repo
        .create_visit_log(client_id, &title, payload.notes, user.map(|u| u.id))
        .await
        .map(Json)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// delete_visit_log
#[utoipa::path(
    delete,
    path = "/api/logs/{id}",
    params(("id" = i64, Path, description = "Visit log ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_visit_log(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> StatusCode {
    if state.repo.delete_visit_log(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// --- Routes ---

async fn route_response(state: &AppState, route: Route) -> RouteResponse {
    let client_ids = state.repo.get_route_client_ids(route.id).await;
    RouteResponse::from_route(route, client_ids)
}

/// list_routes
///
/// [Authenticated Route] All routes with their ordered member client ids.
#[utoipa::path(
    get,
    path = "/api/routes",
    responses((status = 200, description = "Routes", body = [RouteResponse]))
)]
pub async fn list_routes(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<RouteResponse>> {
    let routes = state.repo.list_routes().await;
    let mut out = Vec::with_capacity(routes.len());
    for route in routes {
        out.push(route_response(&state, route).await);
    }
    Json(out)
}

/// create_route
///
/// [Authenticated Route] Creates a route and installs its ordered membership.
/// Unknown client ids are skipped; positions are dense and zero-based over
/// the survivors.
#[utoipa::path(
    post,
    path = "/api/routes",
    request_body = RoutePayload,
    responses((status = 200, description = "Created", body = RouteResponse))
)]
pub async fn create_route(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RoutePayload>,
) -> Result<Json<RouteResponse>, StatusCode> {
    let route = state
        .repo
        .create_route(&payload.name, payload.description.clone())
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let client_ids = state
        .repo
        .set_route_clients(route.id, &payload.client_ids)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(RouteResponse::from_route(route, client_ids)))
}

/// get_route
#[utoipa::path(
    get,
    path = "/api/routes/{id}",
    params(("id" = i64, Path, description = "Route ID")),
    responses(
        (status = 200, description = "Found", body = RouteResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_route(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RouteResponse>, StatusCode> {
    let route = state.repo.get_route(id).await.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(route_response(&state, route).await))
}

/// update_route
///
/// [Authenticated Route] Full overwrite of the route fields plus a complete
/// membership replacement from `client_ids`.
#[utoipa::path(
    put,
    path = "/api/routes/{id}",
    params(("id" = i64, Path, description = "Route ID")),
    request_body = RoutePayload,
    responses(
        (status = 200, description = "Updated", body = RouteResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_route(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<RoutePayload>,
) -> Result<Json<RouteResponse>, StatusCode> {
    let route = state
        .repo
        .update_route(id, &payload.name, payload.description.clone())
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let client_ids = state
        .repo
        .set_route_clients(route.id, &payload.client_ids)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(RouteResponse::from_route(route, client_ids)))
}

/// delete_route
#[utoipa::path(
    delete,
    path = "/api/routes/{id}",
    params(("id" = i64, Path, description = "Route ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_route(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> StatusCode {
    if state.repo.delete_route(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// --- Users (admin) ---

/// list_users
///
/// [Admin Route] Every account, active or deactivated.
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "Users", body = [UserResponse]))
)]
pub async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Json<Vec<UserResponse>> {
    Json(
        state
            .repo
            .list_users()
            .await
            .into_iter()
            .map(UserResponse::from)
            .collect(),
    )
}

/// create_user
///
/// [Admin Route] Direct account creation, bypassing invite codes.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Created", body = UserResponse),
        (status = 400, description = "Duplicate email or unknown role")
    )
)]
pub async fn create_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, StatusCode> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let role = Role::parse(&payload.role).ok_or(StatusCode::BAD_REQUEST)?;

    let hash = hash_password(&payload.password).map_err(|e| {
        tracing::error!("password hash error: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match state
        .repo
        .create_user(&payload.email, &hash, &payload.name, role.as_str())
        .await
    {
        Ok(user) => Ok(Json(user.into())),
        Err(RegisterError::EmailTaken) => Err(StatusCode::BAD_REQUEST),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// update_user
///
/// [Admin Route] Full-field overwrite of an account. The password is the one
/// exception: it is re-hashed only when the request provides one.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 400, description = "Duplicate email or unknown role"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, StatusCode> {
    Role::parse(&payload.role).ok_or(StatusCode::BAD_REQUEST)?;

    let hash = match payload.password.as_deref() {
        Some(plain) if !plain.is_empty() => Some(hash_password(plain).map_err(|e| {
            tracing::error!("password hash error: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?),
        _ => None,
    };

    match state.repo.update_user(id, &payload, hash).await {
        Ok(Some(user)) => Ok(Json(user.into())),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(RegisterError::EmailTaken) => Err(StatusCode::BAD_REQUEST),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// delete_user
///
/// [Admin Route] Soft delete: the account is deactivated, never removed, so
/// its visit logs and assignment history stay attributable.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> StatusCode {
    if state.repo.deactivate_user(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// --- Invite codes (admin) ---

/// create_invite
///
/// [Admin Route] Mints a single-use registration code, expiring after
/// `expires_in_days` (default 7).
#[utoipa::path(
    post,
    path = "/api/invite-codes",
    request_body = CreateInviteRequest,
    responses((status = 200, description = "Created", body = InviteCode))
)]
pub async fn create_invite(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateInviteRequest>,
) -> Result<Json<InviteCode>, StatusCode> {
    let code = generate_invite_code();
    let expires_at = Utc::now() + Duration::days(payload.expires_in_days.unwrap_or(7));
    state
        .repo
        .create_invite(&code, admin.id, expires_at)
        .await
        .map(Json)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// list_invites
#[utoipa::path(
    get,
    path = "/api/invite-codes",
    responses((status = 200, description = "Invite codes", body = [InviteCode]))
)]
pub async fn list_invites(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Json<Vec<InviteCode>> {
    Json(state.repo.list_invites().await)
}

/// delete_invite
#[utoipa::path(
    delete,
    path = "/api/invite-codes/{id}",
    params(("id" = i64, Path, description = "Invite code ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_invite(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> StatusCode {
    if state.repo.delete_invite(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// --- Scheduling ---

/// assign_route
///
/// [Admin Route] Binds a route to a user for one date. The composite
/// uniqueness constraint settles concurrent duplicates; the loser gets 400.
#[utoipa::path(
    post,
    path = "/api/routes/{id}/assign",
    params(("id" = i64, Path, description = "Route ID")),
    request_body = AssignRouteRequest,
    responses(
        (status = 200, description = "Assigned", body = RouteAssignment),
        (status = 400, description = "Duplicate assignment"),
        (status = 404, description = "Route or user not found")
    )
)]
pub async fn assign_route(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(route_id): Path<i64>,
    Json(payload): Json<AssignRouteRequest>,
) -> Result<Json<RouteAssignment>, StatusCode> {
    state
        .repo
        .get_route(route_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    state
        .repo
        .get_user(payload.user_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    match state
        .repo
        .create_assignment(route_id, payload.user_id, payload.date)
        .await
    {
        Ok(Some(assignment)) => Ok(Json(assignment)),
        Ok(None) => Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            tracing::error!("assign_route error: {:?}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// my_routes
///
/// [Authenticated Route] The caller's own assignments, date-ascending.
#[utoipa::path(
    get,
    path = "/api/my-routes",
    responses((status = 200, description = "My assignments", body = [AssignmentWithRoute]))
)]
pub async fn my_routes(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<AssignmentWithRoute>> {
    Json(state.repo.list_user_assignments(id).await)
}

/// update_assignment_status
///
/// [Authenticated Route] Free-form transition within
/// {pending, in_progress, completed}; no ordering is enforced between them.
/// Permitted for the assignment's owner or any admin.
#[utoipa::path(
    put,
    path = "/api/route-assignments/{id}/status",
    params(("id" = i64, Path, description = "Assignment ID")),
    request_body = UpdateAssignmentStatusRequest,
    responses(
        (status = 200, description = "Updated", body = RouteAssignment),
        (status = 400, description = "Unknown status value"),
        (status = 403, description = "Not owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_assignment_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAssignmentStatusRequest>,
) -> Result<Json<RouteAssignment>, StatusCode> {
    let status = AssignmentStatus::parse(&payload.status).ok_or(StatusCode::BAD_REQUEST)?;

    let assignment = state
        .repo
        .get_assignment(id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    if assignment.user_id != auth.id && auth.role != Role::Admin {
        return Err(StatusCode::FORBIDDEN);
    }

    state
        .repo
        .update_assignment_status(id, status.as_str())
        .await
        .map(Json)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// delete_assignment
///
/// [Authenticated Route] Owner or admin only.
#[utoipa::path(
    delete,
    path = "/api/route-assignments/{id}",
    params(("id" = i64, Path, description = "Assignment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_assignment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> StatusCode {
    let Some(assignment) = state.repo.get_assignment(id).await else {
        return StatusCode::NOT_FOUND;
    };
    if assignment.user_id != auth.id && auth.role != Role::Admin {
        return StatusCode::FORBIDDEN;
    }
    if state.repo.delete_assignment(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// get_schedule
///
/// [Authenticated Route] Date-range schedule view. Admins may scope to any
/// user via `user_id`; everyone else is pinned to their own assignments no
/// matter what the parameter says.
#[utoipa::path(
    get,
    path = "/api/schedule",
    params(ScheduleQuery),
    responses((status = 200, description = "Assignments", body = [AssignmentWithRoute]))
)]
pub async fn get_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> Json<Vec<AssignmentWithRoute>> {
    let user_filter = if auth.role == Role::Admin {
        query.user_id
    } else {
        Some(auth.id)
    };
    Json(
        state
            .repo
            .list_schedule(query.start_date, query.end_date, user_filter)
            .await,
    )
}

/// batch_schedule
///
/// [Admin Route] Assigns one route to one user across many dates, counting
/// created vs. skipped duplicates instead of failing the batch.
#[utoipa::path(
    post,
    path = "/api/schedule/batch",
    request_body = BatchScheduleRequest,
    responses(
        (status = 200, description = "Batch result", body = BatchScheduleResponse),
        (status = 404, description = "Route or user not found")
    )
)]
pub async fn batch_schedule(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<BatchScheduleRequest>,
) -> Result<Json<BatchScheduleResponse>, StatusCode> {
    state
        .repo
        .get_route(payload.route_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    state
        .repo
        .get_user(payload.user_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let mut created = 0;
    let mut skipped = 0;
    for date in payload.dates {
        match state
            .repo
            .create_assignment(payload.route_id, payload.user_id, date)
            .await
        {
            Ok(Some(_)) => created += 1,
            Ok(None) => skipped += 1,
            Err(e) => {
                tracing::error!("batch_schedule error: {:?}", e);
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }
    Ok(Json(BatchScheduleResponse { created, skipped }))
}

// --- Route templates ---

/// list_templates
#[utoipa::path(
    get,
    path = "/api/route-templates",
    responses((status = 200, description = "Templates", body = [RouteTemplateResponse]))
)]
pub async fn list_templates(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<RouteTemplateResponse>> {
    Json(
        state
            .repo
            .list_templates()
            .await
            .into_iter()
            .map(RouteTemplateResponse::from)
            .collect(),
    )
}

/// create_template
///
/// [Authenticated Route] Saves an ordered client-id list as an opaque blob.
/// No validation happens here; stale ids simply vanish when the template is
/// expanded into a route.
#[utoipa::path(
    post,
    path = "/api/route-templates",
    request_body = TemplatePayload,
    responses((status = 200, description = "Created", body = RouteTemplateResponse))
)]
pub async fn create_template(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<TemplatePayload>,
) -> Result<Json<RouteTemplateResponse>, StatusCode> {
    let recurrence = payload
        .recurrence_days
        .as_ref()
        .map(|days| serde_json::to_string(days).unwrap_or_else(|_| "[]".to_string()));
    state
        .repo
        .create_template(
            &payload.name,
            payload.description.clone(),
            &encode_client_ids(&payload.client_ids),
            recurrence,
            user_id,
        )
        .await
        .map(|t| Json(t.into()))
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// get_template
#[utoipa::path(
    get,
    path = "/api/route-templates/{id}",
    params(("id" = i64, Path, description = "Template ID")),
    responses(
        (status = 200, description = "Found", body = RouteTemplateResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_template(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RouteTemplateResponse>, StatusCode> {
    state
        .repo
        .get_template(id)
        .await
        .map(|t| Json(t.into()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// update_template
#[utoipa::path(
    put,
    path = "/api/route-templates/{id}",
    params(("id" = i64, Path, description = "Template ID")),
    request_body = TemplatePayload,
    responses(
        (status = 200, description = "Updated", body = RouteTemplateResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_template(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<TemplatePayload>,
) -> Result<Json<RouteTemplateResponse>, StatusCode> {
    let recurrence = payload
        .recurrence_days
        .as_ref()
        .map(|days| serde_json::to_string(days).unwrap_or_else(|_| "[]".to_string()));
    state
        .repo
        .update_template(
            id,
            &payload.name,
            payload.description.clone(),
            &encode_client_ids(&payload.client_ids),
            recurrence,
        )
        .await
        .map(|t| Json(t.into()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// delete_template
#[utoipa::path(
    delete,
    path = "/api/route-templates/{id}",
    params(("id" = i64, Path, description = "Template ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_template(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> StatusCode {
    if state.repo.delete_template(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// create_route_from_template
///
/// [Authenticated Route] Materializes a new route from the template's stored
/// id list. Ids that no longer resolve are skipped, same as direct route
/// membership updates.
#[utoipa::path(
    post,
    path = "/api/route-templates/{id}/create-route",
    params(("id" = i64, Path, description = "Template ID")),
    request_body = MaterializeTemplateRequest,
    responses(
        (status = 200, description = "Route created", body = RouteResponse),
        (status = 404, description = "Template Not Found")
    )
)]
pub async fn create_route_from_template(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<MaterializeTemplateRequest>,
) -> Result<Json<RouteResponse>, StatusCode> {
    let template = state
        .repo
        .get_template(id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let wanted = decode_client_ids(&template.client_ids);
    let name = payload.name.unwrap_or_else(|| template.name.clone());

    let route = state
        .repo
        .create_route(&name, template.description.clone())
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    let client_ids = state
        .repo
        .set_route_clients(route.id, &wanted)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(RouteResponse::from_route(route, client_ids)))
}

/// save_route_as_template
///
/// [Authenticated Route] Snapshots a route's current ordered membership into
/// a new template owned by the caller.
#[utoipa::path(
    post,
    path = "/api/routes/{id}/save-as-template",
    params(("id" = i64, Path, description = "Route ID")),
    request_body = SaveAsTemplateRequest,
    responses(
        (status = 200, description = "Template created", body = RouteTemplateResponse),
        (status = 404, description = "Route Not Found")
    )
)]
pub async fn save_route_as_template(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<SaveAsTemplateRequest>,
) -> Result<Json<RouteTemplateResponse>, StatusCode> {
    let route = state.repo.get_route(id).await.ok_or(StatusCode::NOT_FOUND)?;
    let client_ids = state.repo.get_route_client_ids(id).await;

    let name = payload.name.unwrap_or_else(|| route.name.clone());
    let description = payload.description.or_else(|| route.description.clone());

    state
        .repo
        .create_template(&name, description, &encode_client_ids(&client_ids), None, user_id)
        .await
        .map(|t| Json(t.into()))
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// --- Settings ---

fn parse_setting_value(raw: &str) -> serde_json::Value {
    // Pre-JSON rows degrade to plain strings rather than erroring.
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// get_settings
///
/// [Authenticated Route] The whole key-value store with values decoded from
/// their stored JSON encoding.
#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "All settings"))
)]
pub async fn get_settings(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for setting in state.repo.list_settings().await {
        map.insert(setting.key, parse_setting_value(&setting.value));
    }
    Json(serde_json::Value::Object(map))
}

/// get_setting
#[utoipa::path(
    get,
    path = "/api/settings/{key}",
    params(("key" = String, Path, description = "Setting key")),
    responses(
        (status = 200, description = "Value"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_setting(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .repo
        .get_setting(&key)
        .await
        .map(|s| Json(parse_setting_value(&s.value)))
        .ok_or(StatusCode::NOT_FOUND)
}

/// put_settings
///
/// [Admin Route] Upserts every key in the request object; values are stored
/// JSON-encoded.
#[utoipa::path(
    put,
    path = "/api/settings",
    responses((status = 200, description = "Updated settings"))
)]
pub async fn put_settings(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut map = serde_json::Map::new();
    for (key, value) in payload {
        let stored = state
            .repo
            .put_setting(&key, &value.to_string())
            .await
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
        map.insert(stored.key, parse_setting_value(&stored.value));
    }
    Ok(Json(serde_json::Value::Object(map)))
}

/// put_setting
#[utoipa::path(
    put,
    path = "/api/settings/{key}",
    params(("key" = String, Path, description = "Setting key")),
    responses((status = 200, description = "Updated value"))
)]
pub async fn put_setting(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .repo
        .put_setting(&key, &value.to_string())
        .await
        .map(|s| Json(parse_setting_value(&s.value)))
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}
