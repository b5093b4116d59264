#![cfg(not(tarpaulin_include))]

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::{AdminApi, EntityStore, RestClient, mutate_then_refresh};
use crate::config::Config;
use crate::entity::{
    EmployeeDraft, EmployeeRow, EntityKind, Institute, InstituteDraft, Kafedra, KafedraDraft,
    Student, StudentDraft, join_kafedra_names,
};
use crate::error::ConsoleError;
use crate::gate::{self, AccessPolicy};
use crate::listview::{Column, ListPage, ListView, SortDirection, ViewState};
use crate::login::{self, Visitor};
use crate::record::Record;
use crate::session::UserIdentity;
use crate::validation::{
    FieldErrors, current_year, validate_employee, validate_institute, validate_kafedra,
    validate_student,
};

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub policy: Arc<AccessPolicy>,

    /// Backend client for visitors without a session
    pub public_client: RestClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ConsoleError> {
        let public_client = RestClient::new(&config.api_url)?;
        Ok(AppState {
            config: Arc::new(config),
            policy: Arc::new(AccessPolicy::console()),
            public_client,
        })
    }
}

/// Table parameters carried in the query string
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    search: Option<String>,
    category: Option<String>,
    sort: Option<String>,
    dir: Option<SortDirection>,
    page: Option<usize>,
    size: Option<usize>,

    /// Column header that was clicked
    toggle: Option<String>,
}

impl ListQuery {
    /// Rebuild the table state the browser is showing
    ///
    /// The page is applied last so that search and category changes made in
    /// the same request do not reset it.
    pub fn state<R: Record>(&self, view: &ListView<R>, default_size: usize) -> ViewState {
        let mut state = view.initial_state(self.size.unwrap_or(default_size));
        if let Some(search) = &self.search {
            state.set_search(search.as_str());
        }
        state.set_category(self.category.clone());
        if let Some(sort) = &self.sort {
            state.set_sort(sort.as_str(), self.dir.unwrap_or_default());
        }
        if let Some(page) = self.page {
            state.set_page(page);
        }
        if let Some(field) = &self.toggle {
            state.toggle_sort(field.as_str());
        }
        state
    }
}

#[derive(Serialize)]
struct Table<'a, R> {
    title: &'static str,
    columns: &'a [Column],
    state: ViewState,
    page: ListPage<R>,
}

fn table<R>(
    kind: EntityKind,
    view: ListView<R>,
    records: &[R],
    query: &ListQuery,
    default_size: usize,
    clamp: bool,
) -> Response
where
    R: Record + Clone + Serialize,
{
    let mut state = query.state(&view, default_size);
    if clamp {
        let total = view.filter(records, &state).len();
        state.clamp_to(total);
    }
    let page = view.run(records, &state);

    Json(Table {
        title: kind.title(),
        columns: view.columns(),
        state,
        page,
    })
    .into_response()
}

fn parse_kind(segment: &str) -> Result<EntityKind, ConsoleError> {
    segment.parse().map_err(|_| ConsoleError::NotFound)
}

fn parse_draft<D: DeserializeOwned>(body: serde_json::Value) -> Result<D, ConsoleError> {
    serde_json::from_value(body).map_err(|e| ConsoleError::Rejected {
        status: 400,
        message: Some(e.to_string()),
    })
}

fn to_json<T: Serialize>(
    result: Result<T, ConsoleError>,
) -> Result<Json<serde_json::Value>, ConsoleError> {
    Ok(Json(serde_json::to_value(result?)?))
}

async fn employee_rows(client: &RestClient) -> Result<Vec<EmployeeRow>, ConsoleError> {
    let employees = client.employees().list().await?;
    let kafedras = client.kafedras().list().await?;
    Ok(join_kafedra_names(employees, &kafedras))
}

/// Load, filter, sort and page one entity table
async fn render_list(
    state: &AppState,
    client: &RestClient,
    kind: EntityKind,
    query: &ListQuery,
    clamp: bool,
) -> Result<Response, ConsoleError> {
    let size = state.config.page_size;
    Ok(match kind {
        EntityKind::Institute => {
            let rows = client.institutes().list().await?;
            table(kind, Institute::view(), &rows, query, size, clamp)
        }
        EntityKind::Kafedra => {
            let rows = client.kafedras().list().await?;
            table(kind, Kafedra::view(), &rows, query, size, clamp)
        }
        EntityKind::Student => {
            let rows = client.students().list().await?;
            table(kind, Student::view(), &rows, query, size, clamp)
        }
        EntityKind::Employee => {
            let rows = employee_rows(client).await?;
            table(kind, EmployeeRow::view(), &rows, query, size, clamp)
        }
    })
}

async fn list_entities(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ConsoleError> {
    let kind = parse_kind(&kind)?;
    let client = visitor.client(&state.public_client);
    visitor.observe(render_list(&state, client, kind, &query, false).await)
}

async fn get_entity(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<serde_json::Value>, ConsoleError> {
    let client = visitor.client(&state.public_client);
    let found = match parse_kind(&kind)? {
        EntityKind::Institute => to_json(client.institutes().get(id).await),
        EntityKind::Kafedra => to_json(client.kafedras().get(id).await),
        EntityKind::Student => to_json(client.students().get(id).await),
        EntityKind::Employee => to_json(client.employees().get(id).await),
    };
    visitor.observe(found)
}

#[derive(Serialize)]
struct Saved<T> {
    record: T,
    total: usize,
}

/// Validate a form against the loaded records, send it, then reload
///
/// Nothing reaches the backend when validation fails.
async fn save_record<T, D, S>(
    store: &S,
    editing: Option<i64>,
    draft: D,
    check: impl FnOnce(&D, &[T]) -> FieldErrors,
) -> Result<Saved<T>, ConsoleError>
where
    S: EntityStore<T, D>,
    D: Sync,
{
    let loaded = store.list().await?;
    check(&draft, loaded.as_slice()).into_result()?;

    let mutation = async {
        match editing {
            Some(id) => store.update(id, &draft).await,
            None => store.create(&draft).await,
        }
    };
    let (record, refreshed) = mutate_then_refresh::<T, D, S, _, _>(store, mutation).await?;
    log::info!("Saved record {editing:?}, {} now loaded", refreshed.len());

    Ok(Saved {
        record,
        total: refreshed.len(),
    })
}

async fn save_entity(
    state: &AppState,
    visitor: &Visitor,
    kind: &str,
    editing: Option<i64>,
    body: serde_json::Value,
) -> Result<Json<serde_json::Value>, ConsoleError> {
    let client = visitor.client(&state.public_client);
    let saved = match parse_kind(kind)? {
        EntityKind::Institute => {
            let draft: InstituteDraft = parse_draft(body)?;
            to_json(
                save_record(&client.institutes(), editing, draft, |d, loaded| {
                    validate_institute(d, editing, loaded)
                })
                .await,
            )
        }
        EntityKind::Kafedra => {
            let draft: KafedraDraft = parse_draft(body)?;
            to_json(
                save_record(&client.kafedras(), editing, draft, |d, loaded| {
                    validate_kafedra(d, editing, loaded)
                })
                .await,
            )
        }
        EntityKind::Student => {
            let draft: StudentDraft = parse_draft(body)?;
            let this_year = current_year();
            to_json(
                save_record(&client.students(), editing, draft, |d, loaded| {
                    validate_student(d, editing, loaded, this_year)
                })
                .await,
            )
        }
        EntityKind::Employee => {
            let draft: EmployeeDraft = parse_draft(body)?;
            to_json(
                save_record(&client.employees(), editing, draft, |d, _| {
                    validate_employee(d)
                })
                .await,
            )
        }
    };
    visitor.observe(saved)
}

async fn create_entity(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Path(kind): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ConsoleError> {
    save_entity(&state, &visitor, &kind, None, body).await
}

async fn update_entity(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Path((kind, id)): Path<(String, i64)>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ConsoleError> {
    save_entity(&state, &visitor, &kind, Some(id), body).await
}

/// Delete a record and answer with the refreshed table
///
/// The table state is clamped so a now-empty last page falls back to the
/// previous one.
async fn delete_entity(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Path((kind, id)): Path<(String, i64)>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ConsoleError> {
    let kind = parse_kind(&kind)?;
    let client = visitor.client(&state.public_client);

    let deleted = match kind {
        EntityKind::Institute => client.institutes().delete(id).await,
        EntityKind::Kafedra => client.kafedras().delete(id).await,
        EntityKind::Student => client.students().delete(id).await,
        EntityKind::Employee => client.employees().delete(id).await,
    };
    visitor.observe(deleted)?;
    log::info!("Deleted {kind} #{id}");

    visitor.observe(render_list(&state, client, kind, &query, true).await)
}

async fn job_titles(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
) -> Result<Json<serde_json::Value>, ConsoleError> {
    let client = visitor.client(&state.public_client);
    visitor.observe(to_json(client.job_titles().await))
}

#[derive(Serialize)]
struct SessionInfo {
    identity: Option<UserIdentity>,
    nav: Vec<gate::NavItem>,
}

async fn session_info(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
) -> Json<SessionInfo> {
    let nav = gate::visible_nav(&gate::console_nav(), &state.policy, &visitor.session);
    Json(SessionInfo {
        identity: visitor.session.identity,
        nav,
    })
}

#[derive(Deserialize)]
struct RoleForm {
    email: String,
    role: String,
}

async fn list_users(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
) -> Result<Json<Vec<UserIdentity>>, ConsoleError> {
    let client = visitor.client(&state.public_client);
    visitor.observe(client.list_users().await).map(Json)
}

async fn list_roles(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
) -> Result<Json<Vec<String>>, ConsoleError> {
    let client = visitor.client(&state.public_client);
    visitor.observe(client.list_roles().await).map(Json)
}

/// Grant or revoke a role, then answer with the refreshed user list
async fn change_role(
    state: &AppState,
    visitor: &Visitor,
    form: RoleForm,
    grant: bool,
) -> Result<Json<Vec<UserIdentity>>, ConsoleError> {
    let client = visitor.client(&state.public_client);
    let changed = if grant {
        client.add_role(&form.email, &form.role).await
    } else {
        client.remove_role(&form.email, &form.role).await
    };
    visitor.observe(changed)?;
    log::info!(
        "{} role {} for {}",
        if grant { "Granted" } else { "Revoked" },
        form.role,
        form.email
    );

    visitor.observe(client.list_users().await).map(Json)
}

async fn add_role(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Json(form): Json<RoleForm>,
) -> Result<Json<Vec<UserIdentity>>, ConsoleError> {
    change_role(&state, &visitor, form, true).await
}

async fn remove_role(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Json(form): Json<RoleForm>,
) -> Result<Json<Vec<UserIdentity>>, ConsoleError> {
    change_role(&state, &visitor, form, false).await
}

async fn serve_landing() -> Html<&'static str> {
    Html(include_str!("./static/landing.html"))
}

async fn serve_auth() -> Html<&'static str> {
    Html(include_str!("./static/auth.html"))
}

async fn serve_console() -> Html<&'static str> {
    Html(include_str!("./static/console.html"))
}

/// Build the console router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(serve_landing))
        .route("/auth", get(serve_auth))
        .route("/auth/login", post(login::handle_login))
        .route("/auth/register", post(login::handle_register))
        .route("/auth/logout", post(login::handle_logout))
        .route("/admin", get(serve_console))
        .route("/api/session", get(session_info))
        .route("/api/job-titles", get(job_titles))
        .route(
            "/api/entities/:kind",
            get(list_entities).post(create_entity),
        )
        .route(
            "/api/entities/:kind/:id",
            get(get_entity).put(update_entity).delete(delete_entity),
        )
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/roles", get(list_roles))
        .route("/api/admin/roles/add", post(add_role))
        .route("/api/admin/roles/remove", post(remove_role));

    for kind in EntityKind::ALL {
        app = app
            .route(&format!("/{}", kind.segment()), get(serve_console))
            .route(&format!("/{}/*rest", kind.segment()), get(serve_console));
    }

    app.nest_service("/static", ServeDir::new("static"))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_access,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let address = config.address();
    let state = AppState::new(config)?;
    log::info!("Backend API at {}", state.config.api_url);

    let listener = TcpListener::bind(&address).await?;
    log::info!("Listening on http://{address}");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
