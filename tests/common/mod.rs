#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use routeview::{
    AppConfig, AppState,
    auth::Claims,
    config::Env,
    models::{
        AssignmentWithRoute, Client, ClientPayload, ClientWithLastVisit, InviteCode, Route,
        RouteAssignment, RouteTemplate, Setting, UpdateUserRequest, User, VisitLog,
    },
    repository::{RegisterError, Repository, RepositoryState},
};
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

// --- In-memory mock repository ---

// Handlers depend on the Repository trait, so tests drive them against this
// in-memory implementation. Semantics mirror the Postgres layer: invite
// consumption is single-shot, assignment triples are unique, client deletion
// cascades to logs and memberships.
#[derive(Default)]
pub struct MockRepo {
    pub users: Mutex<Vec<User>>,
    pub invites: Mutex<Vec<InviteCode>>,
    pub clients: Mutex<Vec<Client>>,
    pub visit_logs: Mutex<Vec<VisitLog>>,
    pub routes: Mutex<Vec<Route>>,
    // route_id -> ordered client ids (positions are the indexes)
    pub memberships: Mutex<HashMap<i64, Vec<i64>>>,
    pub assignments: Mutex<Vec<RouteAssignment>>,
    pub templates: Mutex<Vec<RouteTemplate>>,
    pub settings: Mutex<HashMap<String, String>>,
    next_id: AtomicI64,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn seed_user(&self, email: &str, role: &str, is_active: bool) -> User {
        let user = User {
            id: self.next_id(),
            email: email.to_string(),
            // Real bcrypt hash of "password123" (minimum cost 4 keeps the
            // suite fast), so login tests exercise actual verification.
            password_hash: bcrypt::hash("password123", 4).unwrap(),
            name: email.split('@').next().unwrap_or("user").to_string(),
            role: role.to_string(),
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.users.lock().unwrap().push(user.clone());
        user
    }

    pub fn seed_client(&self, name: &str) -> Client {
        let client = Client {
            id: self.next_id(),
            name: name.to_string(),
            latitude: 52.66,
            longitude: -8.62,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..Default::default()
        };
        self.clients.lock().unwrap().push(client.clone());
        client
    }

    pub fn seed_route(&self, name: &str) -> Route {
        let route = Route {
            id: self.next_id(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.routes.lock().unwrap().push(route.clone());
        route
    }

    pub fn seed_invite(&self, code: &str, expires_at: DateTime<Utc>) -> InviteCode {
        let invite = InviteCode {
            id: self.next_id(),
            code: code.to_string(),
            created_by: None,
            used_by: None,
            expires_at,
            created_at: Utc::now(),
        };
        self.invites.lock().unwrap().push(invite.clone());
        invite
    }

    pub fn seed_visit(&self, client_id: i64, days_ago: i64) -> VisitLog {
        let created_at = Utc::now() - Duration::days(days_ago);
        let log = VisitLog {
            id: self.next_id(),
            client_id,
            title: format!("Visit - {}", created_at.format("%Y-%m-%d %H:%M")),
            notes: None,
            user_id: None,
            user_name: None,
            created_at,
        };
        self.visit_logs.lock().unwrap().push(log.clone());
        log
    }

    fn enrich(&self, a: &RouteAssignment) -> AssignmentWithRoute {
        let route_name = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == a.route_id)
            .map(|r| r.name.clone())
            .unwrap_or_default();
        let user_name = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == a.user_id)
            .map(|u| u.name.clone())
            .unwrap_or_default();
        AssignmentWithRoute {
            id: a.id,
            route_id: a.route_id,
            route_name,
            user_id: a.user_id,
            user_name,
            assigned_date: a.assigned_date,
            status: a.status.clone(),
            created_at: a.created_at,
        }
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn get_user(&self, id: i64) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    async fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
    }

    async fn list_users(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: &str,
    ) -> Result<User, RegisterError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(RegisterError::EmailTaken);
        }
        let user = User {
            id: self.next_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: i64,
        req: &UpdateUserRequest,
        password_hash: Option<String>,
    ) -> Result<Option<User>, RegisterError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.id != id && u.email == req.email) {
            return Err(RegisterError::EmailTaken);
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.email = req.email.clone();
        user.name = req.name.clone();
        user.role = req.role.clone();
        user.is_active = req.is_active;
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn deactivate_user(&self, id: i64) -> bool {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.is_active = false;
                true
            }
            None => false,
        }
    }

    async fn register_with_invite(
        &self,
        code: &str,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RegisterError> {
        let mut invites = self.invites.lock().unwrap();
        let invite = invites
            .iter_mut()
            .find(|i| i.code == code && i.used_by.is_none() && i.expires_at > Utc::now())
            .ok_or(RegisterError::InvalidInvite)?;

        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(RegisterError::EmailTaken);
        }
        let user = User {
            id: self.next_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            role: "member".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        users.push(user.clone());
        invite.used_by = Some(user.id);
        Ok(user)
    }

    async fn create_invite(
        &self,
        code: &str,
        created_by: i64,
        expires_at: DateTime<Utc>,
    ) -> Option<InviteCode> {
        let invite = InviteCode {
            id: self.next_id(),
            code: code.to_string(),
            created_by: Some(created_by),
            used_by: None,
            expires_at,
            created_at: Utc::now(),
        };
        self.invites.lock().unwrap().push(invite.clone());
        Some(invite)
    }

    async fn list_invites(&self) -> Vec<InviteCode> {
        self.invites.lock().unwrap().clone()
    }

    async fn delete_invite(&self, id: i64) -> bool {
        let mut invites = self.invites.lock().unwrap();
        let before = invites.len();
        invites.retain(|i| i.id != id);
        invites.len() != before
    }

    async fn list_clients(&self) -> Vec<Client> {
        self.clients.lock().unwrap().clone()
    }

    async fn get_client(&self, id: i64) -> Option<Client> {
        self.clients
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    async fn create_client(&self, payload: &ClientPayload) -> Option<Client> {
        let client = Client {
            id: self.next_id(),
            name: payload.name.clone(),
            contact_name: payload.contact_name.clone(),
            contact_phone: payload.contact_phone.clone(),
            address: payload.address.clone(),
            latitude: payload.latitude,
            longitude: payload.longitude,
            notes: payload.notes.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.clients.lock().unwrap().push(client.clone());
        Some(client)
    }

    async fn update_client(&self, id: i64, payload: &ClientPayload) -> Option<Client> {
        let mut clients = self.clients.lock().unwrap();
        let client = clients.iter_mut().find(|c| c.id == id)?;
        client.name = payload.name.clone();
        client.contact_name = payload.contact_name.clone();
        client.contact_phone = payload.contact_phone.clone();
        client.address = payload.address.clone();
        client.latitude = payload.latitude;
        client.longitude = payload.longitude;
        client.notes = payload.notes.clone();
        client.updated_at = Utc::now();
        Some(client.clone())
    }

    async fn delete_client(&self, id: i64) -> bool {
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain(|c| c.id != id);
        if clients.len() == before {
            return false;
        }
        // Cascades: visit logs and route memberships go with the client.
        self.visit_logs.lock().unwrap().retain(|v| v.client_id != id);
        for ids in self.memberships.lock().unwrap().values_mut() {
            ids.retain(|cid| *cid != id);
        }
        true
    }

    async fn list_clients_with_last_visit(&self) -> Vec<ClientWithLastVisit> {
        let logs = self.visit_logs.lock().unwrap();
        self.clients
            .lock()
            .unwrap()
            .iter()
            .map(|c| ClientWithLastVisit {
                id: c.id,
                name: c.name.clone(),
                contact_name: c.contact_name.clone(),
                contact_phone: c.contact_phone.clone(),
                address: c.address.clone(),
                latitude: c.latitude,
                longitude: c.longitude,
                notes: c.notes.clone(),
                created_at: c.created_at,
                updated_at: c.updated_at,
                last_serviced: logs
                    .iter()
                    .filter(|v| v.client_id == c.id)
                    .map(|v| v.created_at)
                    .max(),
            })
            .collect()
    }

    async fn list_visit_logs(&self, client_id: i64, search: Option<String>) -> Vec<VisitLog> {
        let needle = search.map(|s| s.to_lowercase());
        let mut logs: Vec<VisitLog> = self
            .visit_logs
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.client_id == client_id)
            .filter(|v| match &needle {
                Some(n) => {
                    v.title.to_lowercase().contains(n)
                        || v.notes
                            .as_deref()
                            .map(|notes| notes.to_lowercase().contains(n))
                            .unwrap_or(false)
                }
                None => true,
            })
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs
    }

    async fn create_visit_log(
        &self,
        client_id: i64,
        title: &str,
        notes: Option<String>,
        user_id: Option<i64>,
    ) -> Option<VisitLog> {
        let user_name = user_id.and_then(|uid| {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == uid)
                .map(|u| u.name.clone())
        });
        let log = VisitLog {
            id: self.next_id(),
            client_id,
            title: title.to_string(),
            notes,
            user_id,
            user_name,
            created_at: Utc::now(),
        };
        self.visit_logs.lock().unwrap().push(log.clone());
        Some(log)
    }

    async fn delete_visit_log(&self, id: i64) -> bool {
        let mut logs = self.visit_logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|v| v.id != id);
        logs.len() != before
    }

    async fn list_routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }

    async fn get_route(&self, id: i64) -> Option<Route> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    async fn create_route(&self, name: &str, description: Option<String>) -> Option<Route> {
        let route = Route {
            id: self.next_id(),
            name: name.to_string(),
            description,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.routes.lock().unwrap().push(route.clone());
        Some(route)
    }

    async fn update_route(
        &self,
        id: i64,
        name: &str,
        description: Option<String>,
    ) -> Option<Route> {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.iter_mut().find(|r| r.id == id)?;
        route.name = name.to_string();
        route.description = description;
        route.updated_at = Utc::now();
        Some(route.clone())
    }

    async fn delete_route(&self, id: i64) -> bool {
        let mut routes = self.routes.lock().unwrap();
        let before = routes.len();
        routes.retain(|r| r.id != id);
        if routes.len() == before {
            return false;
        }
        self.memberships.lock().unwrap().remove(&id);
        self.assignments.lock().unwrap().retain(|a| a.route_id != id);
        true
    }

    async fn get_route_client_ids(&self, route_id: i64) -> Vec<i64> {
        self.memberships
            .lock()
            .unwrap()
            .get(&route_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn set_route_clients(&self, route_id: i64, client_ids: &[i64]) -> Option<Vec<i64>> {
        let known: Vec<i64> = self.clients.lock().unwrap().iter().map(|c| c.id).collect();
        let mut keep = Vec::new();
        for id in client_ids {
            if known.contains(id) && !keep.contains(id) {
                keep.push(*id);
            }
        }
        self.memberships
            .lock()
            .unwrap()
            .insert(route_id, keep.clone());
        Some(keep)
    }

    async fn create_assignment(
        &self,
        route_id: i64,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<RouteAssignment>, sqlx::Error> {
        let mut assignments = self.assignments.lock().unwrap();
        if assignments
            .iter()
            .any(|a| a.route_id == route_id && a.user_id == user_id && a.assigned_date == date)
        {
            return Ok(None);
        }
        let assignment = RouteAssignment {
            id: self.next_id(),
            route_id,
            user_id,
            assigned_date: date,
            status: "pending".to_string(),
            created_at: Utc::now(),
        };
        assignments.push(assignment.clone());
        Ok(Some(assignment))
    }

    async fn get_assignment(&self, id: i64) -> Option<RouteAssignment> {
        self.assignments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    async fn update_assignment_status(&self, id: i64, status: &str) -> Option<RouteAssignment> {
        let mut assignments = self.assignments.lock().unwrap();
        let assignment = assignments.iter_mut().find(|a| a.id == id)?;
        assignment.status = status.to_string();
        Some(assignment.clone())
    }

    async fn delete_assignment(&self, id: i64) -> bool {
        let mut assignments = self.assignments.lock().unwrap();
        let before = assignments.len();
        assignments.retain(|a| a.id != id);
        assignments.len() != before
    }

    async fn list_user_assignments(&self, user_id: i64) -> Vec<AssignmentWithRoute> {
        let mut rows: Vec<AssignmentWithRoute> = self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| self.enrich(a))
            .collect();
        rows.sort_by_key(|a| a.assigned_date);
        rows
    }

    async fn list_schedule(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        user_id: Option<i64>,
    ) -> Vec<AssignmentWithRoute> {
        let mut rows: Vec<AssignmentWithRoute> = self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.assigned_date >= start && a.assigned_date <= end)
            .filter(|a| user_id.map(|uid| a.user_id == uid).unwrap_or(true))
            .map(|a| self.enrich(a))
            .collect();
        rows.sort_by_key(|a| a.assigned_date);
        rows
    }

    async fn list_templates(&self) -> Vec<RouteTemplate> {
        self.templates.lock().unwrap().clone()
    }

    async fn get_template(&self, id: i64) -> Option<RouteTemplate> {
        self.templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    async fn create_template(
        &self,
        name: &str,
        description: Option<String>,
        client_ids_json: &str,
        recurrence_json: Option<String>,
        created_by: i64,
    ) -> Option<RouteTemplate> {
        let template = RouteTemplate {
            id: self.next_id(),
            name: name.to_string(),
            description,
            client_ids: client_ids_json.to_string(),
            recurrence_days: recurrence_json,
            created_by: Some(created_by),
            created_at: Utc::now(),
        };
        self.templates.lock().unwrap().push(template.clone());
        Some(template)
    }

    async fn update_template(
        &self,
        id: i64,
        name: &str,
        description: Option<String>,
        client_ids_json: &str,
        recurrence_json: Option<String>,
    ) -> Option<RouteTemplate> {
        let mut templates = self.templates.lock().unwrap();
        let template = templates.iter_mut().find(|t| t.id == id)?;
        template.name = name.to_string();
        template.description = description;
        template.client_ids = client_ids_json.to_string();
        template.recurrence_days = recurrence_json;
        Some(template.clone())
    }

    async fn delete_template(&self, id: i64) -> bool {
        let mut templates = self.templates.lock().unwrap();
        let before = templates.len();
        templates.retain(|t| t.id != id);
        templates.len() != before
    }

    async fn get_setting(&self, key: &str) -> Option<Setting> {
        self.settings.lock().unwrap().get(key).map(|value| Setting {
            key: key.to_string(),
            value: value.clone(),
            updated_at: Utc::now(),
        })
    }

    async fn list_settings(&self) -> Vec<Setting> {
        self.settings
            .lock()
            .unwrap()
            .iter()
            .map(|(key, value)| Setting {
                key: key.clone(),
                value: value.clone(),
                updated_at: Utc::now(),
            })
            .collect()
    }

    async fn put_setting(&self, key: &str, value: &str) -> Option<Setting> {
        self.settings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Some(Setting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: Utc::now(),
        })
    }

    async fn seed_defaults(&self, admin_email: &str, admin_password_hash: &str) {
        {
            let mut settings = self.settings.lock().unwrap();
            settings
                .entry("service_status_thresholds".to_string())
                .or_insert_with(|| r#"{"green_days":7,"orange_days":14}"#.to_string());
            settings
                .entry("map_style".to_string())
                .or_insert_with(|| r#""streets""#.to_string());
        }

        let users_empty = self.users.lock().unwrap().is_empty();
        if users_empty {
            let _ = self
                .create_user(admin_email, admin_password_hash, "Administrator", "admin")
                .await;
        }
    }
}

// --- Shared test helpers ---

/// App state wired to the mock repository, in Production mode so the local
/// dev bypass stays out of the way and JWT validation is the only path.
pub fn test_state(repo: Arc<MockRepo>) -> AppState {
    let mut config = AppConfig::default();
    config.env = Env::Production;
    config.jwt_secret = TEST_JWT_SECRET.to_string();
    AppState {
        repo: repo as RepositoryState,
        config,
    }
}

/// Signs a token for the given user with the shared test secret.
pub fn make_token(user_id: i64, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + ttl_secs) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}
