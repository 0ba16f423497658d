//! In-memory stand-in for the admin backend.
//!
//! [`FakeBackend`] serves searches over seeded rows the way the real search
//! endpoints do (status, text and key filters, then pagination), applies
//! status changes and deletes, and records every call so tests can count
//! network round trips. Refresh responses are scripted, searches can be
//! held open and released in any order, and any operation can be made to
//! fail once.

use async_trait::async_trait;
use client::Backend;
use client::resource::Resource;
use payloads::requests::LoginCredentials;
use payloads::responses::{SignedIn, TokenPair};
use payloads::{ClientError, EntityId, FilterQuery};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "password123";

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Logout,
    Search,
    FetchById,
    Dropdown,
    UpdateStatusMany,
    DeleteMany,
    UpdateStatus,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Login { email: String },
    Logout,
    Refresh { refresh_token: String },
    Search { resource: String, filter: FilterQuery },
    FetchById { resource: String, id: EntityId },
    Dropdown { resource: String },
    UpdateStatusMany { resource: String, ids: Vec<EntityId>, status: i32 },
    DeleteMany { resource: String, ids: Vec<EntityId> },
    UpdateStatus { resource: String, id: EntityId, status: i32 },
    Delete { resource: String, id: EntityId },
}

/// A search held open by [`FakeBackend::pause_searches`].
pub struct HeldSearch {
    pub filter: FilterQuery,
    release: oneshot::Sender<()>,
}

#[derive(Default)]
struct FakeState {
    rows: BTreeMap<String, Vec<Value>>,
    calls: Vec<Call>,
    login_pair: Option<TokenPair>,
    refresh_responses: VecDeque<Result<TokenPair, ClientError>>,
    refresh_delay: Option<Duration>,
    failures: HashMap<Operation, ClientError>,
    searches_paused: bool,
    held: Vec<HeldSearch>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    search_arrived: Notify,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend seeded with the standard dataset.
    pub fn seeded() -> Self {
        let backend = Self::new();
        backend.seed("room", rooms());
        backend.seed("booking_list", bookings());
        backend.seed("user", users());
        backend
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn seed(&self, resource: &str, rows: Vec<Value>) {
        tracing::info!(resource, rows = rows.len(), "Seeding fake backend");
        self.lock().rows.insert(resource.to_string(), rows);
    }

    pub fn rows(&self, resource: &str) -> Vec<Value> {
        self.lock().rows.get(resource).cloned().unwrap_or_default()
    }

    /// Tokens returned by the next successful login.
    pub fn set_login_pair(&self, pair: TokenPair) {
        self.lock().login_pair = Some(pair);
    }

    /// Queue the result of a future refresh call. Once the queue is empty,
    /// refreshes are rejected with 401.
    pub fn push_refresh(&self, response: Result<TokenPair, ClientError>) {
        self.lock().refresh_responses.push_back(response);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.lock().refresh_delay = Some(delay);
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: ClientError) {
        self.lock().failures.insert(operation, error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn refresh_calls(&self) -> usize {
        self.count(|call| matches!(call, Call::Refresh { .. }))
    }

    pub fn search_calls(&self) -> usize {
        self.count(|call| matches!(call, Call::Search { .. }))
    }

    pub fn network_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// Hold every following search open until released.
    pub fn pause_searches(&self) {
        self.lock().searches_paused = true;
    }

    /// Stop holding new searches. Already held ones stay held.
    pub fn resume_searches(&self) {
        self.lock().searches_paused = false;
    }

    /// Filters of the searches currently held, in arrival order.
    pub fn held_searches(&self) -> Vec<FilterQuery> {
        self.lock().held.iter().map(|h| h.filter.clone()).collect()
    }

    /// Let the held search at `index` complete.
    pub fn release_search(&self, index: usize) {
        let held = self.lock().held.remove(index);
        let _ = held.release.send(());
    }

    pub fn release_all(&self) {
        let held: Vec<_> = self.lock().held.drain(..).collect();
        for held in held {
            let _ = held.release.send(());
        }
    }

    /// Wait until at least `n` searches are held.
    pub async fn wait_for_held(&self, n: usize) {
        loop {
            let arrived = self.search_arrived.notified();
            if self.lock().held.len() >= n {
                return;
            }
            arrived.await;
        }
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    fn take_failure(&self, operation: Operation) -> Result<(), ClientError> {
        match self.lock().failures.remove(&operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn update_rows(
        &self,
        resource: &str,
        ids: &[EntityId],
        status: i32,
    ) -> Result<(), ClientError> {
        let mut state = self.lock();
        let rows = state.rows.entry(resource.to_string()).or_default();
        let mut found = 0;
        for row in rows.iter_mut().filter(|row| ids.contains(&row_id(row))) {
            row["status"] = json!(status);
            found += 1;
        }
        if found == 0 {
            return Err(ClientError::NotFound(format!("{resource} not found")));
        }
        Ok(())
    }

    fn delete_rows(
        &self,
        resource: &str,
        ids: &[EntityId],
    ) -> Result<(), ClientError> {
        let mut state = self.lock();
        let rows = state.rows.entry(resource.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| !ids.contains(&row_id(row)));
        if rows.len() == before {
            return Err(ClientError::NotFound(format!("{resource} not found")));
        }
        Ok(())
    }
}

fn row_id(row: &Value) -> EntityId {
    EntityId(row["id"].as_i64().unwrap_or_default())
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// What the real search endpoints do with a filter.
pub fn search_rows(rows: &[Value], filter: &FilterQuery) -> Value {
    let matching: Vec<&Value> = rows
        .iter()
        .filter(|row| {
            filter
                .status
                .as_ref()
                .is_none_or(|status| field_text(&row["status"]) == *status)
        })
        .filter(|row| {
            filter.text_search.as_ref().is_none_or(|text| {
                let field = filter.search_field.as_deref().unwrap_or("name");
                field_text(&row[field])
                    .to_lowercase()
                    .contains(&text.to_lowercase())
            })
        })
        .filter(|row| {
            filter
                .extra
                .iter()
                .all(|(key, value)| field_text(&row[key.as_str()]) == *value)
        })
        .collect();

    let total = matching.len() as u64;
    let page_size = u64::from(filter.page_size.max(1));
    let page_count = total.div_ceil(page_size);
    let skip = (u64::from(filter.page.max(1)) - 1) * page_size;
    let data: Vec<&Value> = matching
        .into_iter()
        .skip(skip as usize)
        .take(page_size as usize)
        .collect();
    json!({
        "data": data,
        "meta": { "total": total, "pageCount": page_count, "page": filter.page }
    })
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<SignedIn, ClientError> {
        self.record(Call::Login {
            email: credentials.email.clone(),
        });
        self.take_failure(Operation::Login)?;
        if credentials.email != ADMIN_EMAIL
            || credentials.password != ADMIN_PASSWORD
        {
            return Err(ClientError::ValidationRejected(vec![
                "email or password is incorrect".into(),
            ]));
        }
        let pair = self.lock().login_pair.clone().ok_or_else(|| {
            ClientError::ServerError(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                "no login pair configured".into(),
            )
        })?;
        serde_json::from_value(json!({
            "accessToken": pair.access_token,
            "refreshToken": pair.refresh_token,
            "name": "Admin",
            "email": ADMIN_EMAIL,
        }))
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.record(Call::Logout);
        self.take_failure(Operation::Logout)
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, ClientError> {
        self.record(Call::Refresh {
            refresh_token: refresh_token.to_string(),
        });
        let delay = self.lock().refresh_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lock()
            .refresh_responses
            .pop_front()
            .unwrap_or(Err(ClientError::AuthExpired))
    }

    async fn search(
        &self,
        resource: &Resource,
        filter: &FilterQuery,
    ) -> Result<Value, ClientError> {
        self.record(Call::Search {
            resource: resource.name().to_string(),
            filter: filter.clone(),
        });

        let released = {
            let mut state = self.lock();
            state.searches_paused.then(|| {
                let (release, released) = oneshot::channel();
                state.held.push(HeldSearch {
                    filter: filter.clone(),
                    release,
                });
                released
            })
        };
        if let Some(released) = released {
            self.search_arrived.notify_waiters();
            let _ = released.await;
        }

        self.take_failure(Operation::Search)?;
        Ok(search_rows(&self.rows(resource.name()), filter))
    }

    async fn fetch_by_id(
        &self,
        resource: &Resource,
        id: EntityId,
    ) -> Result<Value, ClientError> {
        self.record(Call::FetchById {
            resource: resource.name().to_string(),
            id,
        });
        self.take_failure(Operation::FetchById)?;
        self.rows(resource.name())
            .into_iter()
            .find(|row| row_id(row) == id)
            .ok_or_else(|| {
                let name = resource.name();
                ClientError::NotFound(format!("{name} {id} not found"))
            })
    }

    async fn dropdown(
        &self,
        resource: &Resource,
    ) -> Result<Value, ClientError> {
        self.record(Call::Dropdown {
            resource: resource.name().to_string(),
        });
        self.take_failure(Operation::Dropdown)?;
        let options: Vec<Value> = self
            .rows(resource.name())
            .iter()
            .map(|row| json!({ "id": row["id"], "name": row["name"] }))
            .collect();
        Ok(json!(options))
    }

    async fn update_status_many(
        &self,
        resource: &Resource,
        ids: &[EntityId],
        status: i32,
    ) -> Result<(), ClientError> {
        self.record(Call::UpdateStatusMany {
            resource: resource.name().to_string(),
            ids: ids.to_vec(),
            status,
        });
        self.take_failure(Operation::UpdateStatusMany)?;
        self.update_rows(resource.name(), ids, status)
    }

    async fn delete_many(
        &self,
        resource: &Resource,
        ids: &[EntityId],
    ) -> Result<(), ClientError> {
        self.record(Call::DeleteMany {
            resource: resource.name().to_string(),
            ids: ids.to_vec(),
        });
        self.take_failure(Operation::DeleteMany)?;
        self.delete_rows(resource.name(), ids)
    }

    async fn update_status(
        &self,
        resource: &Resource,
        id: EntityId,
        status: i32,
    ) -> Result<(), ClientError> {
        self.record(Call::UpdateStatus {
            resource: resource.name().to_string(),
            id,
            status,
        });
        self.take_failure(Operation::UpdateStatus)?;
        self.update_rows(resource.name(), &[id], status)
    }

    async fn delete(
        &self,
        resource: &Resource,
        id: EntityId,
    ) -> Result<(), ClientError> {
        self.record(Call::Delete {
            resource: resource.name().to_string(),
            id,
        });
        self.take_failure(Operation::Delete)?;
        self.delete_rows(resource.name(), &[id])
    }
}

/// Twelve rooms; odd ids are active (status 1), even ids inactive (0).
pub fn rooms() -> Vec<Value> {
    (1..=12)
        .map(|id| {
            json!({
                "id": id,
                "name": format!("Room {id}"),
                "capacity": 4 + id % 3 * 4,
                "status": id % 2,
                "department_id": 1 + id % 2,
            })
        })
        .collect()
}

/// Bookings spread over rooms 1 to 3, all pending approval (status 2).
pub fn bookings() -> Vec<Value> {
    (1..=9)
        .map(|id| {
            json!({
                "id": id,
                "name": format!("Standup {id}"),
                "room_id": 1 + (id - 1) % 3,
                "status": 2,
                "book_start": format!("2025-01-0{id}T09:00:00Z"),
            })
        })
        .collect()
}

pub fn users() -> Vec<Value> {
    ["Alice", "Bob", "Carol"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "id": i + 1,
                "name": name,
                "email": format!("{}@example.com", name.to_lowercase()),
                "status": 1,
            })
        })
        .collect()
}
