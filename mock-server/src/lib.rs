//! In-memory stand-in for the Keywhiz admin API.
//!
//! Every route except `/admin/login` sits behind a session-cookie check.
//! Status codes follow the real server closely enough for client tests:
//! 401 without a session, 404 for unknown ids or names, 409 on duplicate
//! names, 422 for semantically invalid payloads, and axum's own 400/415
//! rejections for broken JSON or a wrong content type.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const ADMIN_USER: &str = "keywhizAdmin";
pub const ADMIN_PASSWORD: &str = "adminPass";
pub const SESSION_COOKIE: &str = "session";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub enabled: bool,
    pub automation_allowed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_by: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedSecret {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub created_by: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub secrets: Vec<SanitizedSecret>,
    pub clients: Vec<Client>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub groups: Vec<Group>,
    pub secrets: Vec<SanitizedSecret>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub metadata: BTreeMap<String, String>,
    pub groups: Vec<Group>,
    pub clients: Vec<Client>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CreateGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct CreateClient {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecret {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub with_version: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Parameters for the `templated` generator.
#[derive(Deserialize)]
pub struct TemplatedParams {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Deserialize)]
pub struct SecretQuery {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Store {
    last_id: i64,
    sessions: HashMap<String, String>,
    clients: BTreeMap<i64, Client>,
    groups: BTreeMap<i64, Group>,
    secrets: BTreeMap<i64, SanitizedSecret>,
    client_groups: BTreeSet<(i64, i64)>,
    secret_groups: BTreeSet<(i64, i64)>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn groups_of_client(&self, client_id: i64) -> Vec<Group> {
        self.client_groups
            .iter()
            .filter(|(c, _)| *c == client_id)
            .filter_map(|(_, g)| self.groups.get(g).cloned())
            .collect()
    }

    fn groups_of_secret(&self, secret_id: i64) -> Vec<Group> {
        self.secret_groups
            .iter()
            .filter(|(s, _)| *s == secret_id)
            .filter_map(|(_, g)| self.groups.get(g).cloned())
            .collect()
    }

    fn clients_in_group(&self, group_id: i64) -> Vec<Client> {
        self.client_groups
            .iter()
            .filter(|(_, g)| *g == group_id)
            .filter_map(|(c, _)| self.clients.get(c).cloned())
            .collect()
    }

    fn secrets_in_group(&self, group_id: i64) -> Vec<SanitizedSecret> {
        self.secret_groups
            .iter()
            .filter(|(_, g)| *g == group_id)
            .filter_map(|(s, _)| self.secrets.get(s).cloned())
            .collect()
    }

    fn insert_secret(&mut self, input: CreateSecret, created_by: &str) -> Result<SanitizedSecret, StatusCode> {
        let taken = self.secrets.values().any(|s| s.name == input.name);
        if taken && !input.with_version {
            return Err(StatusCode::CONFLICT);
        }
        let id = self.next_id();
        let summary = SanitizedSecret {
            id,
            name: input.name,
            description: input.description,
            version: input.with_version.then(|| format!("{id:016x}")),
            created_by: created_by.to_string(),
            metadata: input.metadata,
        };
        self.secrets.insert(id, summary.clone());
        Ok(summary)
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Username of the session that made the request.
#[derive(Clone)]
pub struct Admin(pub String);

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));

    let protected = Router::new()
        .route("/admin/me", get(me))
        .route("/admin/groups/", get(list_groups))
        .route("/admin/groups", get(group_by_name).post(create_group))
        .route("/admin/groups/{id}", get(group_detail).delete(delete_group))
        .route("/admin/secrets", get(list_or_find_secrets).post(create_secret))
        .route("/admin/secrets/versions", get(secret_versions))
        .route("/admin/secrets/{id}", get(secret_detail).delete(delete_secret))
        .route("/admin/secrets/generators/{name}", post(generate))
        .route("/admin/secrets/generators/{name}/batch", post(batch_generate))
        .route("/admin/clients/", get(list_clients))
        .route("/admin/clients", get(client_by_name).post(create_client))
        .route("/admin/clients/{id}", get(client_detail).delete(delete_client))
        .route(
            "/admin/memberships/clients/{client_id}/groups/{group_id}",
            put(enroll_client).delete(evict_client),
        )
        .route(
            "/admin/memberships/secrets/{secret_id}/groups/{group_id}",
            put(grant_secret).delete(revoke_secret),
        )
        .route_layer(middleware::from_fn_with_state(db.clone(), require_session));

    Router::new()
        .route("/admin/login", post(login))
        .merge(protected)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
}

async fn require_session(
    State(db): State<Db>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = session_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let user = db
        .read()
        .await
        .sessions
        .get(&token)
        .cloned()
        .ok_or(StatusCode::UNAUTHORIZED)?;
    tracing::debug!(%user, path = %request.uri().path(), "authenticated request");
    request.extensions_mut().insert(Admin(user));
    Ok(next.run(request).await)
}

async fn login(State(db): State<Db>, Json(input): Json<LoginRequest>) -> Result<Response, StatusCode> {
    if input.username != ADMIN_USER || input.password != ADMIN_PASSWORD {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let token = Uuid::new_v4().simple().to_string();
    db.write().await.sessions.insert(token.clone(), input.username);
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly");
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]).into_response())
}

async fn me(Extension(Admin(user)): Extension<Admin>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "username": user }))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

async fn list_groups(State(db): State<Db>) -> Json<Vec<Group>> {
    Json(db.read().await.groups.values().cloned().collect())
}

async fn group_by_name(State(db): State<Db>, Query(query): Query<NameQuery>) -> Result<Json<Group>, StatusCode> {
    let store = db.read().await;
    store
        .groups
        .values()
        .find(|g| g.name == query.name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_group(
    State(db): State<Db>,
    Extension(Admin(user)): Extension<Admin>,
    Json(input): Json<CreateGroup>,
) -> Result<(StatusCode, Json<GroupDetail>), StatusCode> {
    if input.name.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let mut store = db.write().await;
    if store.groups.values().any(|g| g.name == input.name) {
        return Err(StatusCode::CONFLICT);
    }
    let group = Group {
        id: store.next_id(),
        name: input.name,
        description: input.description,
        created_by: user,
    };
    store.groups.insert(group.id, group.clone());
    Ok((StatusCode::CREATED, Json(group_detail_of(&store, group))))
}

async fn group_detail(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<GroupDetail>, StatusCode> {
    let store = db.read().await;
    let group = store.groups.get(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(group_detail_of(&store, group)))
}

fn group_detail_of(store: &Store, group: Group) -> GroupDetail {
    GroupDetail {
        secrets: store.secrets_in_group(group.id),
        clients: store.clients_in_group(group.id),
        id: group.id,
        name: group.name,
        description: group.description,
        created_by: group.created_by,
    }
}

async fn delete_group(State(db): State<Db>, Path(id): Path<i64>) -> StatusCode {
    let mut store = db.write().await;
    if store.groups.remove(&id).is_none() {
        return StatusCode::NOT_FOUND;
    }
    store.client_groups.retain(|(_, g)| *g != id);
    store.secret_groups.retain(|(_, g)| *g != id);
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

async fn list_or_find_secrets(State(db): State<Db>, Query(query): Query<SecretQuery>) -> Response {
    let store = db.read().await;
    let Some(name) = query.name else {
        let all: Vec<SanitizedSecret> = store.secrets.values().cloned().collect();
        return Json(all).into_response();
    };
    let version = query.version.unwrap_or_default();
    store
        .secrets
        .values()
        .find(|s| s.name == name && s.version.as_deref().unwrap_or("") == version)
        .cloned()
        .map(|s| Json(s).into_response())
        .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

async fn secret_versions(State(db): State<Db>, Query(query): Query<NameQuery>) -> Result<Json<Vec<String>>, StatusCode> {
    let store = db.read().await;
    let named: Vec<&SanitizedSecret> = store
        .secrets
        .values()
        .filter(|s| s.name == query.name)
        .collect();
    if named.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(named.iter().filter_map(|s| s.version.clone()).collect()))
}

async fn create_secret(
    State(db): State<Db>,
    Extension(Admin(user)): Extension<Admin>,
    Json(input): Json<CreateSecret>,
) -> Result<(StatusCode, Json<SecretDetail>), StatusCode> {
    if input.name.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let content = STANDARD
        .decode(&input.content)
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    if content.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let mut store = db.write().await;
    let summary = store.insert_secret(input, &user)?;
    Ok((StatusCode::CREATED, Json(secret_detail_of(&store, summary))))
}

async fn secret_detail(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<SecretDetail>, StatusCode> {
    let store = db.read().await;
    let summary = store.secrets.get(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(secret_detail_of(&store, summary)))
}

fn secret_detail_of(store: &Store, summary: SanitizedSecret) -> SecretDetail {
    let groups = store.groups_of_secret(summary.id);
    let clients = groups
        .iter()
        .flat_map(|g| store.clients_in_group(g.id))
        .collect();
    SecretDetail {
        id: summary.id,
        name: summary.name,
        description: summary.description,
        created_by: summary.created_by,
        metadata: summary.metadata,
        groups,
        clients,
    }
}

async fn delete_secret(State(db): State<Db>, Path(id): Path<i64>) -> StatusCode {
    let mut store = db.write().await;
    if store.secrets.remove(&id).is_none() {
        return StatusCode::NOT_FOUND;
    }
    store.secret_groups.retain(|(s, _)| *s != id);
    StatusCode::NO_CONTENT
}

async fn generate(
    State(db): State<Db>,
    Extension(Admin(user)): Extension<Admin>,
    Path(generator): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<Vec<SanitizedSecret>>, StatusCode> {
    let mut store = db.write().await;
    run_generator(&mut store, &generator, vec![params], &user).map(Json)
}

async fn batch_generate(
    State(db): State<Db>,
    Extension(Admin(user)): Extension<Admin>,
    Path(generator): Path<String>,
    Json(params): Json<Vec<serde_json::Value>>,
) -> Result<Json<Vec<SanitizedSecret>>, StatusCode> {
    let mut store = db.write().await;
    run_generator(&mut store, &generator, params, &user).map(Json)
}

fn run_generator(
    store: &mut Store,
    generator: &str,
    params: Vec<serde_json::Value>,
    user: &str,
) -> Result<Vec<SanitizedSecret>, StatusCode> {
    if generator != "templated" {
        return Err(StatusCode::NOT_FOUND);
    }
    let params: Vec<TemplatedParams> = params
        .into_iter()
        .map(serde_json::from_value::<TemplatedParams>)
        .collect::<Result<_, _>>()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let mut generated = Vec::with_capacity(params.len());
    for p in params {
        if p.name.is_empty() {
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
        let content = p
            .template
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let input = CreateSecret {
            name: p.name,
            description: p.description,
            content: STANDARD.encode(content),
            with_version: false,
            metadata: BTreeMap::new(),
        };
        generated.push(store.insert_secret(input, user)?);
    }
    Ok(generated)
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

async fn list_clients(State(db): State<Db>) -> Json<Vec<Client>> {
    Json(db.read().await.clients.values().cloned().collect())
}

async fn client_by_name(State(db): State<Db>, Query(query): Query<NameQuery>) -> Result<Json<Client>, StatusCode> {
    let store = db.read().await;
    store
        .clients
        .values()
        .find(|c| c.name == query.name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_client(
    State(db): State<Db>,
    Extension(Admin(user)): Extension<Admin>,
    Json(input): Json<CreateClient>,
) -> Result<(StatusCode, Json<ClientDetail>), StatusCode> {
    if input.name.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let mut store = db.write().await;
    if store.clients.values().any(|c| c.name == input.name) {
        return Err(StatusCode::CONFLICT);
    }
    let client = Client {
        id: store.next_id(),
        name: input.name,
        description: String::new(),
        created_by: user,
        enabled: true,
        automation_allowed: false,
    };
    store.clients.insert(client.id, client.clone());
    Ok((StatusCode::CREATED, Json(client_detail_of(&store, client))))
}

async fn client_detail(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<ClientDetail>, StatusCode> {
    let store = db.read().await;
    let client = store.clients.get(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(client_detail_of(&store, client)))
}

fn client_detail_of(store: &Store, client: Client) -> ClientDetail {
    let groups = store.groups_of_client(client.id);
    let secrets = groups
        .iter()
        .flat_map(|g| store.secrets_in_group(g.id))
        .collect();
    ClientDetail {
        id: client.id,
        name: client.name,
        description: client.description,
        created_by: client.created_by,
        groups,
        secrets,
    }
}

async fn delete_client(State(db): State<Db>, Path(id): Path<i64>) -> StatusCode {
    let mut store = db.write().await;
    if store.clients.remove(&id).is_none() {
        return StatusCode::NOT_FOUND;
    }
    store.client_groups.retain(|(c, _)| *c != id);
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

async fn enroll_client(State(db): State<Db>, Path((client_id, group_id)): Path<(i64, i64)>) -> StatusCode {
    let mut store = db.write().await;
    if !store.clients.contains_key(&client_id) || !store.groups.contains_key(&group_id) {
        return StatusCode::NOT_FOUND;
    }
    store.client_groups.insert((client_id, group_id));
    StatusCode::OK
}

async fn evict_client(State(db): State<Db>, Path((client_id, group_id)): Path<(i64, i64)>) -> StatusCode {
    let mut store = db.write().await;
    if !store.clients.contains_key(&client_id) || !store.groups.contains_key(&group_id) {
        return StatusCode::NOT_FOUND;
    }
    store.client_groups.remove(&(client_id, group_id));
    StatusCode::OK
}

async fn grant_secret(State(db): State<Db>, Path((secret_id, group_id)): Path<(i64, i64)>) -> StatusCode {
    let mut store = db.write().await;
    if !store.secrets.contains_key(&secret_id) || !store.groups.contains_key(&group_id) {
        return StatusCode::NOT_FOUND;
    }
    store.secret_groups.insert((secret_id, group_id));
    StatusCode::OK
}

async fn revoke_secret(State(db): State<Db>, Path((secret_id, group_id)): Path<(i64, i64)>) -> StatusCode {
    let mut store = db.write().await;
    if !store.secrets.contains_key(&secret_id) || !store.groups.contains_key(&group_id) {
        return StatusCode::NOT_FOUND;
    }
    store.secret_groups.remove(&(secret_id, group_id));
    StatusCode::OK
}
