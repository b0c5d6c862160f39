use crate::models::{
    AssignmentWithRoute, Client, ClientPayload, ClientWithLastVisit, InviteCode, Route,
    RouteAssignment, RouteTemplate, Setting, UpdateUserRequest, User, VisitLog,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// RegisterError
///
/// Outcome detail for the account-creating operations, where the handler must
/// distinguish a constraint conflict (400) from a genuine database failure
/// (500).
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("invalid or expired invite code")]
    InvalidInvite,
    #[error("email already registered")]
    EmailTaken,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Repository Trait
///
/// Abstract contract for all persistence operations, letting handlers work
/// against the data layer without knowing the implementation (Postgres in
/// production, an in-memory mock in tests).
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn Repository>`) shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> Option<User>;
    async fn get_user_by_email(&self, email: &str) -> Option<User>;
    async fn list_users(&self) -> Vec<User>;
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: &str,
    ) -> Result<User, RegisterError>;
    // Full-field overwrite; the hash is replaced only when Some.
    async fn update_user(
        &self,
        id: i64,
        req: &UpdateUserRequest,
        password_hash: Option<String>,
    ) -> Result<Option<User>, RegisterError>;
    // Soft delete: flips is_active, preserving the audit trail.
    async fn deactivate_user(&self, id: i64) -> bool;
    // Atomic invite consumption + user creation; see the Postgres impl for
    // the race guard.
    async fn register_with_invite(
        &self,
        code: &str,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RegisterError>;

    // --- Invite codes ---
    async fn create_invite(
        &self,
        code: &str,
        created_by: i64,
        expires_at: DateTime<Utc>,
    ) -> Option<InviteCode>;
    async fn list_invites(&self) -> Vec<InviteCode>;
    async fn delete_invite(&self, id: i64) -> bool;

    // --- Clients (locations) ---
    async fn list_clients(&self) -> Vec<Client>;
    async fn get_client(&self, id: i64) -> Option<Client>;
    async fn create_client(&self, payload: &ClientPayload) -> Option<Client>;
    async fn update_client(&self, id: i64, payload: &ClientPayload) -> Option<Client>;
    async fn delete_client(&self, id: i64) -> bool;
    async fn list_clients_with_last_visit(&self) -> Vec<ClientWithLastVisit>;

    // --- Visit logs ---
    async fn list_visit_logs(&self, client_id: i64, search: Option<String>) -> Vec<VisitLog>;
    async fn create_visit_log(
        &self,
        client_id: i64,
        title: &str,
        notes: Option<String>,
        user_id: Option<i64>,
    ) -> Option<VisitLog>;
    async fn delete_visit_log(&self, id: i64) -> bool;

    // --- Routes & ordered membership ---
    async fn list_routes(&self) -> Vec<Route>;
    async fn get_route(&self, id: i64) -> Option<Route>;
    async fn create_route(&self, name: &str, description: Option<String>) -> Option<Route>;
    async fn update_route(
        &self,
        id: i64,
        name: &str,
        description: Option<String>,
    ) -> Option<Route>;
    async fn delete_route(&self, id: i64) -> bool;
    // Ordered by position.
    async fn get_route_client_ids(&self, route_id: i64) -> Vec<i64>;
    // Full membership replacement; returns the surviving ordered ids.
    async fn set_route_clients(&self, route_id: i64, client_ids: &[i64]) -> Option<Vec<i64>>;

    // --- Route assignments ---
    // Ok(None) means the (route, user, date) triple already exists.
    async fn create_assignment(
        &self,
        route_id: i64,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<RouteAssignment>, sqlx::Error>;
    async fn get_assignment(&self, id: i64) -> Option<RouteAssignment>;
    async fn update_assignment_status(&self, id: i64, status: &str) -> Option<RouteAssignment>;
    async fn delete_assignment(&self, id: i64) -> bool;
    async fn list_user_assignments(&self, user_id: i64) -> Vec<AssignmentWithRoute>;
    async fn list_schedule(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        user_id: Option<i64>,
    ) -> Vec<AssignmentWithRoute>;

    // --- Route templates ---
    async fn list_templates(&self) -> Vec<RouteTemplate>;
    async fn get_template(&self, id: i64) -> Option<RouteTemplate>;
    async fn create_template(
        &self,
        name: &str,
        description: Option<String>,
        client_ids_json: &str,
        recurrence_json: Option<String>,
        created_by: i64,
    ) -> Option<RouteTemplate>;
    async fn update_template(
        &self,
        id: i64,
        name: &str,
        description: Option<String>,
        client_ids_json: &str,
        recurrence_json: Option<String>,
    ) -> Option<RouteTemplate>;
    async fn delete_template(&self, id: i64) -> bool;

    // --- Settings ---
    async fn get_setting(&self, key: &str) -> Option<Setting>;
    async fn list_settings(&self) -> Vec<Setting>;
    async fn put_setting(&self, key: &str, value: &str) -> Option<Setting>;

    // --- Startup seeding ---
    // Idempotent: inserts default settings if absent and a seed admin when
    // the users table is empty. Run once before serving traffic.
    async fn seed_defaults(&self, admin_email: &str, admin_password_hash: &str);
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, email, password_hash, name, role, is_active, created_at, updated_at";
const CLIENT_COLUMNS: &str =
    "id, name, contact_name, contact_phone, address, latitude, longitude, notes, created_at, updated_at";
const ROUTE_COLUMNS: &str = "id, name, description, created_at, updated_at";
const ASSIGNMENT_COLUMNS: &str = "id, route_id, user_id, assigned_date, status, created_at";
const TEMPLATE_COLUMNS: &str =
    "id, name, description, client_ids, recurrence_days, created_by, created_at";
const INVITE_COLUMNS: &str = "id, code, created_by, used_by, expires_at, created_at";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the
/// PostgreSQL connection pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> Option<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    async fn get_user_by_email(&self, email: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user_by_email error: {:?}", e);
                None
            })
    }

    async fn list_users(&self) -> Vec<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_users error: {:?}", e);
                vec![]
            })
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: &str,
    ) -> Result<User, RegisterError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegisterError::EmailTaken
            } else {
                tracing::error!("create_user error: {:?}", e);
                RegisterError::from(e)
            }
        })
    }

    async fn update_user(
        &self,
        id: i64,
        req: &UpdateUserRequest,
        password_hash: Option<String>,
    ) -> Result<Option<User>, RegisterError> {
        let result = match password_hash {
            Some(hash) => {
                sqlx::query_as::<_, User>(&format!(
                    "UPDATE users SET email = $2, name = $3, role = $4, is_active = $5, password_hash = $6, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
                ))
                .bind(id)
                .bind(&req.email)
                .bind(&req.name)
                .bind(&req.role)
                .bind(req.is_active)
                .bind(hash)
                .fetch_optional(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, User>(&format!(
                    "UPDATE users SET email = $2, name = $3, role = $4, is_active = $5, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
                ))
                .bind(id)
                .bind(&req.email)
                .bind(&req.name)
                .bind(&req.role)
                .bind(req.is_active)
                .fetch_optional(&self.pool)
                .await
            }
        };
        result.map_err(|e| {
            if is_unique_violation(&e) {
                RegisterError::EmailTaken
            } else {
                tracing::error!("update_user error: {:?}", e);
                RegisterError::from(e)
            }
        })
    }

    async fn deactivate_user(&self, id: i64) -> bool {
        match sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("deactivate_user error: {:?}", e);
                false
            }
        }
    }

    /// register_with_invite
    ///
    /// Creates the user and consumes the invite in one transaction. The
    /// conditional UPDATE is the race guard: two concurrent registrations for
    /// the same code serialize on the row lock, and the loser's re-evaluated
    /// predicate (`used_by IS NULL`) claims zero rows, rolling its user
    /// insert back.
    async fn register_with_invite(
        &self,
        code: &str,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RegisterError> {
        let mut tx = self.pool.begin().await.map_err(RegisterError::from)?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, 'member') RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegisterError::EmailTaken
            } else {
                tracing::error!("register insert error: {:?}", e);
                RegisterError::from(e)
            }
        })?;

        let claimed = sqlx::query(
            "UPDATE invite_codes SET used_by = $1 WHERE code = $2 AND used_by IS NULL AND expires_at > NOW()",
        )
        .bind(user.id)
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_err(RegisterError::from)?;

        if claimed.rows_affected() == 0 {
            // Dropping the transaction rolls the user insert back.
            return Err(RegisterError::InvalidInvite);
        }

        tx.commit().await.map_err(RegisterError::from)?;
        Ok(user)
    }

    async fn create_invite(
        &self,
        code: &str,
        created_by: i64,
        expires_at: DateTime<Utc>,
    ) -> Option<InviteCode> {
        sqlx::query_as::<_, InviteCode>(&format!(
            "INSERT INTO invite_codes (code, created_by, expires_at) VALUES ($1, $2, $3) RETURNING {INVITE_COLUMNS}"
        ))
        .bind(code)
        .bind(created_by)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_invite error: {:?}", e);
            None
        })
    }

    async fn list_invites(&self) -> Vec<InviteCode> {
        sqlx::query_as::<_, InviteCode>(&format!(
            "SELECT {INVITE_COLUMNS} FROM invite_codes ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_invites error: {:?}", e);
            vec![]
        })
    }

    async fn delete_invite(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM invite_codes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_invite error: {:?}", e);
                false
            }
        }
    }

    async fn list_clients(&self) -> Vec<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_clients error: {:?}", e);
            vec![]
        })
    }

    async fn get_client(&self, id: i64) -> Option<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_client error: {:?}", e);
            None
        })
    }

    async fn create_client(&self, payload: &ClientPayload) -> Option<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "INSERT INTO clients (name, contact_name, contact_phone, address, latitude, longitude, notes) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(&payload.name)
        .bind(&payload.contact_name)
        .bind(&payload.contact_phone)
        .bind(&payload.address)
        .bind(payload.latitude)
        .bind(payload.longitude)
        .bind(&payload.notes)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_client error: {:?}", e);
            None
        })
    }

    /// Every stored field is replaced by the request body; PUT is not a
    /// partial patch.
    async fn update_client(&self, id: i64, payload: &ClientPayload) -> Option<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "UPDATE clients SET name = $2, contact_name = $3, contact_phone = $4, address = $5, latitude = $6, longitude = $7, notes = $8, updated_at = NOW() WHERE id = $1 RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(id)
        .bind(&payload.name)
        .bind(&payload.contact_name)
        .bind(&payload.contact_phone)
        .bind(&payload.address)
        .bind(payload.latitude)
        .bind(payload.longitude)
        .bind(&payload.notes)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_client error: {:?}", e);
            None
        })
    }

    /// Cascades (declared on the schema) remove the client's visit logs and
    /// route memberships; routes themselves survive.
    async fn delete_client(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_client error: {:?}", e);
                false
            }
        }
    }

    async fn list_clients_with_last_visit(&self) -> Vec<ClientWithLastVisit> {
        sqlx::query_as::<_, ClientWithLastVisit>(
            r#"
            SELECT c.id, c.name, c.contact_name, c.contact_phone, c.address,
                   c.latitude, c.longitude, c.notes, c.created_at, c.updated_at,
                   MAX(v.created_at) AS last_serviced
            FROM clients c
            LEFT JOIN visit_logs v ON v.client_id = c.id
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_clients_with_last_visit error: {:?}", e);
            vec![]
        })
    }

    /// list_visit_logs
    ///
    /// Newest-first listing with an optional case-insensitive substring
    /// filter over title and notes, built with QueryBuilder for safe
    /// parameterization.
    async fn list_visit_logs(&self, client_id: i64, search: Option<String>) -> Vec<VisitLog> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT v.id, v.client_id, v.title, v.notes, v.user_id, u.name AS user_name, v.created_at
            FROM visit_logs v
            LEFT JOIN users u ON v.user_id = u.id
            WHERE v.client_id =
            "#,
        );
        builder.push_bind(client_id);

        if let Some(s) = search {
            let pattern = format!("%{}%", s);
            builder.push(" AND (v.title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR v.notes ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY v.created_at DESC");

        match builder.build_query_as::<VisitLog>().fetch_all(&self.pool).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::error!("list_visit_logs error: {:?}", e);
                vec![]
            }
        }
    }

    /// Inserts the log and joins the acting user's name in one statement.
    async fn create_visit_log(
        &self,
        client_id: i64,
        title: &str,
        notes: Option<String>,
        user_id: Option<i64>,
    ) -> Option<VisitLog> {
        sqlx::query_as::<_, VisitLog>(
            r#"
            WITH inserted AS (
                INSERT INTO visit_logs (client_id, title, notes, user_id)
                VALUES ($1, $2, $3, $4)
                RETURNING id, client_id, title, notes, user_id, created_at
            )
            SELECT i.id, i.client_id, i.title, i.notes, i.user_id, u.name AS user_name, i.created_at
            FROM inserted i
            LEFT JOIN users u ON i.user_id = u.id
            "#,
        )
        .bind(client_id)
        .bind(title)
        .bind(notes)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_visit_log error: {:?}", e);
            None
        })
    }

    async fn delete_visit_log(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM visit_logs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_visit_log error: {:?}", e);
                false
            }
        }
    }

    async fn list_routes(&self) -> Vec<Route> {
        sqlx::query_as::<_, Route>(&format!("SELECT {ROUTE_COLUMNS} FROM routes ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_routes error: {:?}", e);
                vec![]
            })
    }

    async fn get_route(&self, id: i64) -> Option<Route> {
        sqlx::query_as::<_, Route>(&format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_route error: {:?}", e);
                None
            })
    }

    async fn create_route(&self, name: &str, description: Option<String>) -> Option<Route> {
        sqlx::query_as::<_, Route>(&format!(
            "INSERT INTO routes (name, description) VALUES ($1, $2) RETURNING {ROUTE_COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_route error: {:?}", e);
            None
        })
    }

    async fn update_route(
        &self,
        id: i64,
        name: &str,
        description: Option<String>,
    ) -> Option<Route> {
        sqlx::query_as::<_, Route>(&format!(
            "UPDATE routes SET name = $2, description = $3, updated_at = NOW() WHERE id = $1 RETURNING {ROUTE_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_route error: {:?}", e);
            None
        })
    }

    async fn delete_route(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_route error: {:?}", e);
                false
            }
        }
    }

    async fn get_route_client_ids(&self, route_id: i64) -> Vec<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT client_id FROM route_clients WHERE route_id = $1 ORDER BY position",
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_route_client_ids error: {:?}", e);
            vec![]
        })
    }

    /// set_route_clients
    ///
    /// Replaces the route's membership with the provided ordered list:
    /// delete-all then re-insert with position = index. Ids that do not
    /// resolve to a client are skipped and positions re-densified over the
    /// survivors; duplicates keep their first occurrence.
    async fn set_route_clients(&self, route_id: i64, client_ids: &[i64]) -> Option<Vec<i64>> {
        let result: Result<Vec<i64>, sqlx::Error> = async {
            let known: HashSet<i64> =
                sqlx::query_scalar::<_, i64>("SELECT id FROM clients WHERE id = ANY($1)")
                    .bind(client_ids)
                    .fetch_all(&self.pool)
                    .await?
                    .into_iter()
                    .collect();

            let mut seen = HashSet::new();
            let keep: Vec<i64> = client_ids
                .iter()
                .copied()
                .filter(|id| known.contains(id) && seen.insert(*id))
                .collect();

            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM route_clients WHERE route_id = $1")
                .bind(route_id)
                .execute(&mut *tx)
                .await?;
            for (position, client_id) in keep.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO route_clients (route_id, client_id, position) VALUES ($1, $2, $3)",
                )
                .bind(route_id)
                .bind(client_id)
                .bind(position as i32)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(keep)
        }
        .await;

        match result {
            Ok(ids) => Some(ids),
            Err(e) => {
                tracing::error!("set_route_clients error: {:?}", e);
                None
            }
        }
    }

    /// create_assignment
    ///
    /// `ON CONFLICT DO NOTHING` makes the composite uniqueness constraint the
    /// arbiter: a duplicate (route, user, date) triple inserts nothing and
    /// surfaces as `Ok(None)`.
    async fn create_assignment(
        &self,
        route_id: i64,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<RouteAssignment>, sqlx::Error> {
        sqlx::query_as::<_, RouteAssignment>(&format!(
            "INSERT INTO route_assignments (route_id, user_id, assigned_date) VALUES ($1, $2, $3) ON CONFLICT (route_id, user_id, assigned_date) DO NOTHING RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(route_id)
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_assignment(&self, id: i64) -> Option<RouteAssignment> {
        sqlx::query_as::<_, RouteAssignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM route_assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_assignment error: {:?}", e);
            None
        })
    }

    async fn update_assignment_status(&self, id: i64, status: &str) -> Option<RouteAssignment> {
        sqlx::query_as::<_, RouteAssignment>(&format!(
            "UPDATE route_assignments SET status = $2 WHERE id = $1 RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_assignment_status error: {:?}", e);
            None
        })
    }

    async fn delete_assignment(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM route_assignments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_assignment error: {:?}", e);
                false
            }
        }
    }

    async fn list_user_assignments(&self, user_id: i64) -> Vec<AssignmentWithRoute> {
        sqlx::query_as::<_, AssignmentWithRoute>(
            r#"
            SELECT a.id, a.route_id, r.name AS route_name, a.user_id, u.name AS user_name,
                   a.assigned_date, a.status, a.created_at
            FROM route_assignments a
            JOIN routes r ON a.route_id = r.id
            JOIN users u ON a.user_id = u.id
            WHERE a.user_id = $1
            ORDER BY a.assigned_date, a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_user_assignments error: {:?}", e);
            vec![]
        })
    }

    async fn list_schedule(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        user_id: Option<i64>,
    ) -> Vec<AssignmentWithRoute> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT a.id, a.route_id, r.name AS route_name, a.user_id, u.name AS user_name,
                   a.assigned_date, a.status, a.created_at
            FROM route_assignments a
            JOIN routes r ON a.route_id = r.id
            JOIN users u ON a.user_id = u.id
            WHERE a.assigned_date >=
            "#,
        );
        builder.push_bind(start);
        builder.push(" AND a.assigned_date <= ");
        builder.push_bind(end);
        if let Some(uid) = user_id {
            builder.push(" AND a.user_id = ");
            builder.push_bind(uid);
        }
        builder.push(" ORDER BY a.assigned_date, a.id");

        match builder
            .build_query_as::<AssignmentWithRoute>()
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("list_schedule error: {:?}", e);
                vec![]
            }
        }
    }

    async fn list_templates(&self) -> Vec<RouteTemplate> {
        sqlx::query_as::<_, RouteTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM route_templates ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_templates error: {:?}", e);
            vec![]
        })
    }

    async fn get_template(&self, id: i64) -> Option<RouteTemplate> {
        sqlx::query_as::<_, RouteTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM route_templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_template error: {:?}", e);
            None
        })
    }

    async fn create_template(
        &self,
        name: &str,
        description: Option<String>,
        client_ids_json: &str,
        recurrence_json: Option<String>,
        created_by: i64,
    ) -> Option<RouteTemplate> {
        sqlx::query_as::<_, RouteTemplate>(&format!(
            "INSERT INTO route_templates (name, description, client_ids, recurrence_days, created_by) VALUES ($1, $2, $3, $4, $5) RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .bind(client_ids_json)
        .bind(recurrence_json)
        .bind(created_by)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_template error: {:?}", e);
            None
        })
    }

    async fn update_template(
        &self,
        id: i64,
        name: &str,
        description: Option<String>,
        client_ids_json: &str,
        recurrence_json: Option<String>,
    ) -> Option<RouteTemplate> {
        sqlx::query_as::<_, RouteTemplate>(&format!(
            "UPDATE route_templates SET name = $2, description = $3, client_ids = $4, recurrence_days = $5 WHERE id = $1 RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(client_ids_json)
        .bind(recurrence_json)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_template error: {:?}", e);
            None
        })
    }

    async fn delete_template(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM route_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_template error: {:?}", e);
                false
            }
        }
    }

    async fn get_setting(&self, key: &str) -> Option<Setting> {
        sqlx::query_as::<_, Setting>("SELECT key, value, updated_at FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_setting error: {:?}", e);
                None
            })
    }

    async fn list_settings(&self) -> Vec<Setting> {
        sqlx::query_as::<_, Setting>("SELECT key, value, updated_at FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_settings error: {:?}", e);
                vec![]
            })
    }

    async fn put_setting(&self, key: &str, value: &str) -> Option<Setting> {
        sqlx::query_as::<_, Setting>(
            r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING key, value, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("put_setting error: {:?}", e);
            None
        })
    }

    /// seed_defaults
    ///
    /// Idempotent startup initialization: default settings are inserted only
    /// when absent, and a seed administrator only when the users table is
    /// empty. Safe to run on every boot.
    async fn seed_defaults(&self, admin_email: &str, admin_password_hash: &str) {
        let defaults: [(&str, &str); 2] = [
            (
                "service_status_thresholds",
                r#"{"green_days":7,"orange_days":14}"#,
            ),
            ("map_style", r#""streets""#),
        ];
        for (key, value) in defaults {
            if let Err(e) =
                sqlx::query("INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING")
                    .bind(key)
                    .bind(value)
                    .execute(&self.pool)
                    .await
            {
                tracing::error!("seed setting {} error: {:?}", key, e);
            }
        }

        let user_count: i64 = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("seed user count error: {:?}", e);
                // Non-zero skips the admin insert; a broken database should
                // not end up seeding duplicate admins on recovery.
                1
            });

        if user_count == 0 {
            match self
                .create_user(admin_email, admin_password_hash, "Administrator", "admin")
                .await
            {
                Ok(user) => tracing::info!("Seeded administrator account {}", user.email),
                Err(e) => tracing::error!("seed admin error: {:?}", e),
            }
        }
    }
}
