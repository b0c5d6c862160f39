use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::status::ServiceStatus;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Canonical identity record from the `users` table. Carries the bcrypt hash,
/// so this struct is never serialized directly; API responses go through
/// [`UserResponse`].
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    // The RBAC field: 'admin' or 'member'.
    pub role: String,
    // Soft-delete flag: deactivated users keep their audit trail but can no
    // longer authenticate.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// UserResponse
///
/// Public projection of a user, without the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

/// InviteCode
///
/// Single-use, time-limited registration token. `used_by` is set exactly once
/// by the registration transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct InviteCode {
    pub id: i64,
    pub code: String,
    pub created_by: Option<i64>,
    pub used_by: Option<i64>,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Client
///
/// A business location hosting a vending machine. "Location" in the legacy
/// API paths refers to the same record.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// ClientWithLastVisit
///
/// Internal repository row: a client joined with the timestamp of its most
/// recent visit log. The freshness tier is computed at request time on top
/// of this.
#[derive(Debug, Clone, FromRow, Default)]
pub struct ClientWithLastVisit {
    pub id: i64,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_serviced: Option<DateTime<Utc>>,
}

/// ClientWithStatus
///
/// API shape for `GET /api/clients/with-status`: the client plus
/// `last_serviced` and the derived `service_status` tier.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ClientWithStatus {
    pub id: i64,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub last_serviced: Option<DateTime<Utc>>,
    pub service_status: ServiceStatus,
}

/// VisitLog
///
/// A timestamped service-visit record for a client. Immutable once created
/// except by deletion. `user_name` is loaded via a JOIN for display.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct VisitLog {
    pub id: i64,
    pub client_id: i64,
    // Auto-generated at creation: "Visit - <timestamp>".
    pub title: String,
    pub notes: Option<String>,
    // The acting user, when the request carried a token.
    pub user_id: Option<i64>,
    #[sqlx(default)]
    pub user_name: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Route
///
/// Named ordered sequence of clients. The ordering itself lives in the
/// `route_clients` junction table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Route {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// RouteResponse
///
/// API shape for routes: the route row plus its ordered member client ids.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RouteResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub client_ids: Vec<i64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl RouteResponse {
    pub fn from_route(route: Route, client_ids: Vec<i64>) -> Self {
        Self {
            id: route.id,
            name: route.name,
            description: route.description,
            client_ids,
            created_at: route.created_at,
            updated_at: route.updated_at,
        }
    }
}

/// RouteAssignment
///
/// Binding of a route to a user for a specific calendar date. Unique per
/// (route, user, date).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct RouteAssignment {
    pub id: i64,
    pub route_id: i64,
    pub user_id: i64,
    #[ts(type = "string")]
    pub assigned_date: NaiveDate,
    pub status: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// AssignmentWithRoute
///
/// Schedule row enriched with the route and user names (a join), ready for
/// the calendar UI.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AssignmentWithRoute {
    pub id: i64,
    pub route_id: i64,
    pub route_name: String,
    pub user_id: i64,
    pub user_name: String,
    #[ts(type = "string")]
    pub assigned_date: NaiveDate,
    pub status: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// AssignmentStatus
///
/// Allowed status values for a route assignment. Transitions are free-form
/// within the set; the enum exists to reject unknown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
}

impl AssignmentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// RouteTemplate
///
/// Database row for a reusable ordered client list. `client_ids` and
/// `recurrence_days` are stored as opaque JSON-encoded text, decoded only at
/// the API boundary.
#[derive(Debug, Clone, FromRow, Default)]
pub struct RouteTemplate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub client_ids: String,
    pub recurrence_days: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// RouteTemplateResponse
///
/// API shape for templates with the stored blobs decoded. A corrupt stored
/// list degrades to empty rather than failing the request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RouteTemplateResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub client_ids: Vec<i64>,
    // ISO weekday numbers (1 = Monday .. 7 = Sunday).
    pub recurrence_days: Option<Vec<i32>>,
    pub created_by: Option<i64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<RouteTemplate> for RouteTemplateResponse {
    fn from(t: RouteTemplate) -> Self {
        Self {
            id: t.id,
            name: t.name,
            description: t.description,
            client_ids: serde_json::from_str(&t.client_ids).unwrap_or_default(),
            recurrence_days: t
                .recurrence_days
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            created_by: t.created_by,
            created_at: t.created_at,
        }
    }
}

/// Setting
///
/// One key-value row; `value` is a JSON-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Setting {
    pub key: String,
    pub value: String,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Self-registration payload. Requires a valid, unused, unexpired invite code.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    pub invite_code: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// TokenResponse
///
/// Successful login/registration result: a 7-day bearer token plus the user.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

/// CreateUserRequest
///
/// Admin-side account creation (bypasses invite codes).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "member".to_string()
}

/// UpdateUserRequest
///
/// Full-field overwrite of a user; the password is the one exception and is
/// re-hashed only when provided.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub password: Option<String>,
}

/// CreateInviteRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateInviteRequest {
    // Days until expiry; defaults to 7.
    pub expires_in_days: Option<i64>,
}

/// ClientPayload
///
/// Create and update share one shape: PUT replaces every stored field with
/// the request body, it is not a partial patch.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ClientPayload {
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
}

/// CreateVisitLogRequest
///
/// The title is generated server-side; callers only supply optional notes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateVisitLogRequest {
    pub notes: Option<String>,
}

/// VisitLogFilter
///
/// Query parameters for listing a client's visit logs.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct VisitLogFilter {
    /// Case-insensitive substring match over title and notes.
    pub search: Option<String>,
}

/// RoutePayload
///
/// Create and update share one shape; `client_ids` fully replaces the
/// route's ordered membership.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RoutePayload {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub client_ids: Vec<i64>,
}

/// AssignRouteRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignRouteRequest {
    pub user_id: i64,
    #[ts(type = "string")]
    pub date: NaiveDate,
}

/// UpdateAssignmentStatusRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAssignmentStatusRequest {
    pub status: String,
}

/// ScheduleQuery
///
/// Date-range query for the schedule view. `user_id` is honored only for
/// admins; everyone else is scoped to themselves.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct ScheduleQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub user_id: Option<i64>,
}

/// BatchScheduleRequest
///
/// Assign one route to one user on many dates at once. Duplicates are
/// skipped, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BatchScheduleRequest {
    pub route_id: i64,
    pub user_id: i64,
    #[ts(type = "string[]")]
    pub dates: Vec<NaiveDate>,
}

/// BatchScheduleResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BatchScheduleResponse {
    pub created: i64,
    pub skipped: i64,
}

/// TemplatePayload
///
/// Create and update share one shape; the id list is serialized verbatim at
/// save time and validated only when a route is materialized from it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TemplatePayload {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub client_ids: Vec<i64>,
    pub recurrence_days: Option<Vec<i32>>,
}

/// MaterializeTemplateRequest
///
/// Optional overrides when stamping a route out of a template.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MaterializeTemplateRequest {
    pub name: Option<String>,
}

/// SaveAsTemplateRequest
///
/// Optional overrides when snapshotting a route into a template.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SaveAsTemplateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}
