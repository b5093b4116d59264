#![cfg(not(tarpaulin_include))]

//! Console sessions, login handlers and the access middleware.
//!
//! Each browser that logs in gets a `session` cookie naming an entry in the
//! global [`SESSIONS`] registry. The entry owns the user's [`SessionHub`] and
//! the [`RestClient`] that carries their backend credentials.

use axum::{
    Form,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::api::{AuthApi, RestClient};
use crate::app::AppState;
use crate::error::ConsoleError;
use crate::gate::{self, DenyReason};
use crate::session::{Session, SessionEvent, SessionHub, UserIdentity};

/// Name of the cookie holding the session id
pub const SESSION_COOKIE: &str = "session";

/// Session lifetime in seconds (24 hours)
const SESSION_DURATION: u64 = 86400;

/// One logged-in browser
pub struct ConsoleSession {
    /// Single writer of this browser's login state
    pub hub: SessionHub,

    /// Backend client carrying this user's cookie and token
    pub client: RestClient,

    pub expires_at: SystemTime,
}

impl ConsoleSession {
    /// Expire the session when the backend stopped recognising it
    pub fn note_failure(&self, err: &ConsoleError) {
        if matches!(err, ConsoleError::Unauthorized) {
            self.hub.expire();
        }
    }
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Arc<ConsoleSession>>> =
        RwLock::new(HashMap::new());
}

/// Register a freshly authenticated user
///
/// Sessions that expired or were logged out without their cookie coming
/// back are swept here.
///
/// # Arguments
/// * `client` - Client that performed the login
/// * `identity` - Identity reported by the backend
///
/// # Returns
/// * `String` - A unique session id for the cookie
pub fn create_session(client: RestClient, identity: UserIdentity) -> String {
    let session_id = Uuid::new_v4().to_string();
    let hub = SessionHub::new();
    hub.subscribe(|event, session| {
        if event == SessionEvent::Expired {
            log::info!("Console session for {:?} expired", session.email());
        }
    });
    hub.login(identity);

    let entry = ConsoleSession {
        hub,
        client,
        expires_at: SystemTime::now() + Duration::from_secs(SESSION_DURATION),
    };

    let mut sessions = SESSIONS.write().unwrap_or_else(PoisonError::into_inner);
    let now = SystemTime::now();
    let before = sessions.len();
    sessions.retain(|_, s| s.expires_at > now && s.hub.current().is_authenticated());
    if sessions.len() < before {
        log::debug!("Swept {} stale console sessions", before - sessions.len());
    }
    sessions.insert(session_id.clone(), Arc::new(entry));

    session_id
}

/// Look up a live session
///
/// Entries past their lifetime, or whose hub went anonymous, are removed.
pub fn validate_session(session_id: &str) -> Option<Arc<ConsoleSession>> {
    let entry = SESSIONS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(session_id)
        .cloned()?;

    if entry.expires_at <= SystemTime::now() {
        entry.hub.expire();
    }
    if entry.hub.current().is_authenticated() {
        return Some(entry);
    }

    drop_session(session_id);
    None
}

pub fn drop_session(session_id: &str) -> Option<Arc<ConsoleSession>> {
    SESSIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(session_id)
}

/// Who is making the current request
///
/// Inserted into request extensions by [`require_access`].
#[derive(Clone)]
pub struct Visitor {
    pub session: Session,
    pub console: Option<Arc<ConsoleSession>>,
}

impl Visitor {
    fn from_cookies(jar: &CookieJar) -> Self {
        let console = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| validate_session(cookie.value()));
        let session = console
            .as_ref()
            .map(|c| c.hub.current())
            .unwrap_or_default();
        Visitor { session, console }
    }

    /// Backend client for this visitor
    ///
    /// Anonymous visitors share the public client.
    pub fn client<'a>(&'a self, public: &'a RestClient) -> &'a RestClient {
        self.console.as_ref().map_or(public, |c| &c.client)
    }

    /// Pass a backend result through, expiring the session on 401
    pub fn observe<T>(&self, result: Result<T, ConsoleError>) -> Result<T, ConsoleError> {
        if let (Err(err), Some(console)) = (&result, &self.console) {
            console.note_failure(err);
        }
        result
    }
}

/// Login and registration form
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,

    /// Location the user was bounced from, if any
    #[serde(default)]
    pub from: Option<String>,
}

fn session_cookie(value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie
}

fn login_error(err: &ConsoleError, from: Option<&str>) -> Redirect {
    let mut location = format!(
        "/auth?error={}",
        urlencoding::encode(&err.user_message())
    );
    if let Some(from) = from {
        location.push_str("&from=");
        location.push_str(&urlencoding::encode(from));
    }
    Redirect::to(&location)
}

async fn authenticate(
    state: &AppState,
    jar: CookieJar,
    credentials: Credentials,
    register: bool,
) -> Response {
    let from = credentials.from.as_deref();
    let client = match RestClient::new(&state.config.api_url) {
        Ok(client) => client,
        Err(err) => return login_error(&err, from).into_response(),
    };

    let outcome = if register {
        client.register(&credentials.email, &credentials.password).await
    } else {
        client.login(&credentials.email, &credentials.password).await
    };

    match outcome {
        Ok(outcome) => {
            let location = gate::return_location(from);
            let session_id = create_session(client, outcome.identity);
            (jar.add(session_cookie(session_id)), Redirect::to(location)).into_response()
        }
        Err(err) => {
            log::warn!("Authentication failed for {}: {err}", credentials.email);
            login_error(&err, from).into_response()
        }
    }
}

/// Handle the login form
///
/// On success the user returns to where they were bounced from.
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Response {
    authenticate(&state, jar, credentials, false).await
}

/// Handle the registration form; a new account is logged in immediately
pub async fn handle_register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Response {
    authenticate(&state, jar, credentials, true).await
}

/// Clear the session and go back to the landing page
///
/// The local session is always cleared, even when the backend logout fails.
pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(console) = drop_session(cookie.value()) {
            if let Err(err) = console.client.logout().await {
                log::warn!("Backend logout failed: {err}");
            }
            console.hub.logout();
        }
    }

    (
        jar.remove(Cookie::from(SESSION_COOKIE)),
        Redirect::to(gate::LANDING),
    )
}

/// Access middleware
///
/// Resolves the visitor from the session cookie and checks the request
/// against the console's access policy. Denied pages redirect to the landing
/// page with `from` set; denied API calls get a JSON 401 or 403.
pub async fn require_access(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let visitor = Visitor::from_cookies(&jar);
    let path = request.uri().path().to_string();
    let read_only = matches!(*request.method(), Method::GET | Method::HEAD);

    if path.starts_with("/api/") {
        if let gate::Decision::Deny(reason) =
            state.policy.authorize(&visitor.session, &path, read_only)
        {
            let err = match reason {
                DenyReason::Anonymous => ConsoleError::Unauthorized,
                DenyReason::MissingRole { .. } => ConsoleError::Forbidden,
            };
            return err.into_response();
        }
    } else if let Err(redirect) = gate::guard(&state.policy, &visitor.session, &path) {
        let from = match request.uri().query() {
            Some(query) => format!("{}?{query}", redirect.from),
            None => redirect.from,
        };
        log::debug!("Redirecting {from} to {}: {:?}", redirect.to, redirect.reason);
        let location = format!("{}?from={}", redirect.to, urlencoding::encode(&from));
        return Redirect::to(&location).into_response();
    } else if !read_only
        && !state
            .policy
            .authorize(&visitor.session, &path, false)
            .is_allowed()
    {
        return StatusCode::FORBIDDEN.into_response();
    }

    request.extensions_mut().insert(visitor);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ROLE_ADMIN;

    #[test]
    fn sessions_register_and_drop() {
        let client = RestClient::new("http://127.0.0.1:9/api/v1").unwrap();
        let id = create_session(client, UserIdentity::new("a@x.com", [ROLE_ADMIN]));

        let console = validate_session(&id).expect("session is live");
        assert!(console.hub.current().is_admin());

        console.note_failure(&ConsoleError::Unauthorized);
        assert!(validate_session(&id).is_none());
        assert!(drop_session(&id).is_none());
    }

    #[test]
    fn expired_sessions_are_swept_on_login() {
        let client = RestClient::new("http://127.0.0.1:9/api/v1").unwrap();
        let stale = create_session(client.clone(), UserIdentity::new("old@x.com", [ROLE_ADMIN]));
        let expired = Arc::new(ConsoleSession {
            hub: SessionHub::new(),
            client: client.clone(),
            expires_at: SystemTime::now() - Duration::from_secs(1),
        });
        SESSIONS.write().unwrap().insert(stale.clone(), expired);

        let fresh = create_session(client, UserIdentity::new("new@x.com", [ROLE_ADMIN]));
        assert!(!SESSIONS.read().unwrap().contains_key(&stale));
        assert!(SESSIONS.read().unwrap().contains_key(&fresh));
        drop_session(&fresh);
    }

    #[test]
    fn other_failures_keep_the_session() {
        let client = RestClient::new("http://127.0.0.1:9/api/v1").unwrap();
        let id = create_session(client, UserIdentity::new("a@x.com", [ROLE_ADMIN]));
        let console = validate_session(&id).unwrap();

        console.note_failure(&ConsoleError::Forbidden);
        assert!(validate_session(&id).is_some());
        drop_session(&id);
    }
}
