//! Backend collaborators.
//!
//! The console owns no data. Entities, users and roles live behind the
//! dekanat REST backend; this module describes what the console needs from it
//! ([`EntityStore`], [`AuthApi`], [`AdminApi`]) and implements those traits
//! over HTTP with [`RestClient`].
//!
//! Requests are never retried. A failed request surfaces as a
//! [`ConsoleError`] carrying the backend's message.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use crate::entity::{
    Employee, EmployeeDraft, EntityKind, Institute, InstituteDraft, Kafedra, KafedraDraft,
    Student, StudentDraft,
};
use crate::error::ConsoleError;
use crate::session::UserIdentity;

/// CRUD surface of one entity kind
#[async_trait]
pub trait EntityStore<T, D>: Send + Sync {
    async fn list(&self) -> Result<Vec<T>, ConsoleError>;

    async fn get(&self, id: i64) -> Result<T, ConsoleError>;

    async fn create(&self, draft: &D) -> Result<T, ConsoleError>;

    async fn update(&self, id: i64, draft: &D) -> Result<T, ConsoleError>;

    async fn delete(&self, id: i64) -> Result<(), ConsoleError>;
}

/// Result of a successful login or registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub identity: UserIdentity,
    pub token: Option<String>,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ConsoleError>;

    async fn register(&self, email: &str, password: &str) -> Result<LoginOutcome, ConsoleError>;

    async fn logout(&self) -> Result<(), ConsoleError>;

    /// Roles of whoever the backend thinks is logged in
    async fn current_roles(&self) -> Result<BTreeSet<String>, ConsoleError>;
}

#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserIdentity>, ConsoleError>;

    async fn list_roles(&self) -> Result<Vec<String>, ConsoleError>;

    async fn add_role(&self, email: &str, role: &str) -> Result<(), ConsoleError>;

    async fn remove_role(&self, email: &str, role: &str) -> Result<(), ConsoleError>;
}

/// Run a mutation and, only once it has succeeded, reload the list
///
/// The refresh is issued inside the mutation's success path so the reloaded
/// list always reflects the change.
///
/// # Returns
/// * `Result<(O, Vec<T>), ConsoleError>` - Mutation result and the fresh list
pub async fn mutate_then_refresh<T, D, S, O, F>(
    store: &S,
    mutation: F,
) -> Result<(O, Vec<T>), ConsoleError>
where
    S: EntityStore<T, D> + ?Sized,
    F: Future<Output = Result<O, ConsoleError>>,
{
    let outcome = mutation.await?;
    let refreshed = store.list().await?;
    Ok((outcome, refreshed))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTitle {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RoleChange<'a> {
    email: &'a str,
    role: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    email: String,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    user: AuthUser,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Authority {
    authority: String,
}

#[derive(Serialize)]
struct WithId<'a, D> {
    id: i64,
    #[serde(flatten)]
    draft: &'a D,
}

/// HTTP client for the dekanat backend
///
/// Keeps the backend's session cookie and bearer token, so one client
/// corresponds to one logged-in console user. Cloning shares both.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl RestClient {
    /// Create a client for the backend at `base_url`
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `http://localhost:8080/api/v1/`
    pub fn new(base_url: &str) -> Result<Self, ConsoleError> {
        let http = Client::builder().cookie_store(true).build()?;
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(RestClient {
            http,
            base_url,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        log::debug!("{method} {url}");

        let builder = self.http.request(method, url);
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ConsoleError> {
        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(rejection(response).await)
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ConsoleError> {
        let response = self.send(builder).await?;
        Ok(response.json().await?)
    }

    pub fn institutes(&self) -> Resource<Institute, InstituteDraft> {
        Resource::new(self.clone(), EntityKind::Institute)
    }

    pub fn kafedras(&self) -> Resource<Kafedra, KafedraDraft> {
        Resource::new(self.clone(), EntityKind::Kafedra)
    }

    pub fn students(&self) -> Resource<Student, StudentDraft> {
        Resource::new(self.clone(), EntityKind::Student)
    }

    pub fn employees(&self) -> Resource<Employee, EmployeeDraft> {
        Resource::new(self.clone(), EntityKind::Employee)
    }

    /// Job titles offered by the employee form
    pub async fn job_titles(&self) -> Result<Vec<JobTitle>, ConsoleError> {
        self.fetch(self.request(Method::GET, "job-titles/getAll")).await
    }

    async fn authenticate(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, ConsoleError> {
        let body = Credentials { email, password };
        let response: AuthResponse = self
            .fetch(self.request(Method::POST, path).json(&body))
            .await?;
        self.set_token(response.token.clone());

        // The login payload does not carry roles reliably; `auth/me` does.
        let roles = match self.current_roles().await {
            Ok(roles) => roles,
            Err(err) => {
                log::warn!("Could not load roles for {}: {err}", response.user.email);
                response.user.roles.into_iter().collect()
            }
        };

        Ok(LoginOutcome {
            identity: UserIdentity {
                email: response.user.email,
                roles,
            },
            token: response.token,
        })
    }
}

/// Turn an error response into a [`ConsoleError`]
///
/// The backend answers either with a bare string or with `{"message": ...}`.
async fn rejection(response: Response) -> ConsoleError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => return ConsoleError::Unauthorized,
        StatusCode::FORBIDDEN => return ConsoleError::Forbidden,
        StatusCode::NOT_FOUND => return ConsoleError::NotFound,
        _ => {}
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Object(map)) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => Some(body).filter(|b| !b.trim().is_empty()),
    };

    ConsoleError::Rejected {
        status: status.as_u16(),
        message,
    }
}

/// One entity kind's endpoints on a [`RestClient`]
pub struct Resource<T, D> {
    client: RestClient,
    kind: EntityKind,
    _types: PhantomData<fn() -> (T, D)>,
}

impl<T, D> Resource<T, D> {
    fn new(client: RestClient, kind: EntityKind) -> Self {
        Resource {
            client,
            kind,
            _types: PhantomData,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn path(&self, tail: impl std::fmt::Display) -> String {
        format!("{}/{}", self.kind.segment(), tail)
    }
}

#[async_trait]
impl<T, D> EntityStore<T, D> for Resource<T, D>
where
    T: DeserializeOwned + Send + 'static,
    D: Serialize + Sync,
{
    async fn list(&self) -> Result<Vec<T>, ConsoleError> {
        let request = self.client.request(Method::GET, &self.path("getAll"));
        self.client.fetch(request).await
    }

    async fn get(&self, id: i64) -> Result<T, ConsoleError> {
        let request = self.client.request(Method::GET, &self.path(id));
        self.client.fetch(request).await
    }

    async fn create(&self, draft: &D) -> Result<T, ConsoleError> {
        let request = self
            .client
            .request(Method::POST, &self.path("create"))
            .json(draft);
        self.client.fetch(request).await
    }

    async fn update(&self, id: i64, draft: &D) -> Result<T, ConsoleError> {
        let request = self
            .client
            .request(Method::PUT, &self.path(id))
            .json(&WithId { id, draft });
        self.client.fetch(request).await
    }

    async fn delete(&self, id: i64) -> Result<(), ConsoleError> {
        let request = self.client.request(Method::DELETE, &self.path(id));
        self.client.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthApi for RestClient {
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ConsoleError> {
        self.authenticate("auth/login", email, password).await
    }

    async fn register(&self, email: &str, password: &str) -> Result<LoginOutcome, ConsoleError> {
        self.authenticate("auth/register", email, password).await
    }

    async fn logout(&self) -> Result<(), ConsoleError> {
        let result = self
            .send(
                self.request(Method::POST, "auth/logout")
                    .json(&serde_json::json!({})),
            )
            .await;
        self.set_token(None);
        result.map(|_| ())
    }

    async fn current_roles(&self) -> Result<BTreeSet<String>, ConsoleError> {
        let authorities: Vec<Authority> = self.fetch(self.request(Method::GET, "auth/me")).await?;
        Ok(authorities.into_iter().map(|a| a.authority).collect())
    }
}

#[async_trait]
impl AdminApi for RestClient {
    async fn list_users(&self) -> Result<Vec<UserIdentity>, ConsoleError> {
        self.fetch(self.request(Method::GET, "auth/users")).await
    }

    async fn list_roles(&self) -> Result<Vec<String>, ConsoleError> {
        self.fetch(self.request(Method::GET, "auth/roles")).await
    }

    async fn add_role(&self, email: &str, role: &str) -> Result<(), ConsoleError> {
        let body = RoleChange { email, role };
        self.send(self.request(Method::POST, "auth/add_role").json(&body))
            .await?;
        Ok(())
    }

    async fn remove_role(&self, email: &str, role: &str) -> Result<(), ConsoleError> {
        let body = RoleChange { email, role };
        self.send(self.request(Method::POST, "auth/remove_role").json(&body))
            .await?;
        Ok(())
    }
}
