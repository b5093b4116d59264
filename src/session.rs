//! Logged-in identity and its lifecycle.
//!
//! A [`SessionHub`] is the only writer of a [`Session`]. Everything else
//! (navigation, tables, the route gate) reads snapshots or subscribes to
//! transitions:
//!
//! `Anonymous → login → Authenticated(identity) → logout | expiry → Anonymous`
//!
//! Nothing is persisted; a new hub starts anonymous.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_STUDENT: &str = "STUDENT";
pub const ROLE_EMPLOYEE: &str = "EMPLOYEE";
pub const ROLE_TUTOR: &str = "TUTOR";
pub const ROLE_TEACHER: &str = "TEACHER";
pub const ROLE_REGISTERED: &str = "REGISTERED";

/// An authenticated user as reported by the auth backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl UserIdentity {
    pub fn new<I, S>(email: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UserIdentity {
            email: email.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Current login state, as seen by readers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Session {
    pub identity: Option<UserIdentity>,
}

impl Session {
    pub fn anonymous() -> Self {
        Session { identity: None }
    }

    pub fn authenticated(identity: UserIdentity) -> Self {
        Session {
            identity: Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.email.as_str())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.identity.as_ref().is_some_and(|i| i.has_role(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}

/// What moved the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    Expired,
}

/// Handle returned by [`SessionHub::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Subscription(u64);

type Listener = Arc<dyn Fn(SessionEvent, &Session) + Send + Sync>;

/// Single-writer holder of a [`Session`] with change notification
#[derive(Default)]
pub struct SessionHub {
    session: RwLock<Session>,
    listeners: RwLock<BTreeMap<Subscription, Listener>>,
    next_id: AtomicU64,
}

impl SessionHub {
    pub fn new() -> Self {
        SessionHub::default()
    }

    /// Snapshot of the current session
    pub fn current(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a listener called after every transition
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(SessionEvent, &Session) + Send + Sync + 'static,
    {
        let id = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription)
            .is_some()
    }

    /// Successful login or registration
    pub fn login(&self, identity: UserIdentity) {
        log::info!("Session authenticated for {}", identity.email);
        self.transition(SessionEvent::LoggedIn, Session::authenticated(identity));
    }

    /// Local logout; always clears the session
    pub fn logout(&self) {
        self.transition(SessionEvent::LoggedOut, Session::anonymous());
    }

    /// The backend no longer recognises the session
    pub fn expire(&self) {
        log::info!("Session expired");
        self.transition(SessionEvent::Expired, Session::anonymous());
    }

    fn transition(&self, event: SessionEvent, next: Session) {
        let snapshot = {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            *session = next;
            session.clone()
        };

        // Listeners may subscribe or unsubscribe, so none of them runs under the lock
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(event, &snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn admin() -> UserIdentity {
        UserIdentity::new("admin@x.com", [ROLE_ADMIN, ROLE_REGISTERED])
    }

    #[test]
    fn starts_anonymous() {
        let hub = SessionHub::new();
        assert_eq!(hub.current(), Session::anonymous());
        assert!(!hub.current().is_admin());
    }

    #[test]
    fn login_then_logout_round_trip() {
        let hub = SessionHub::new();
        hub.login(admin());
        let session = hub.current();
        assert!(session.is_admin());
        assert_eq!(session.email(), Some("admin@x.com"));

        hub.logout();
        assert!(!hub.current().is_authenticated());
    }

    #[test]
    fn listeners_see_every_transition_until_unsubscribed() {
        let hub = SessionHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = hub.subscribe(move |event, session| {
            sink.lock()
                .unwrap()
                .push((event, session.email().map(str::to_string)));
        });

        hub.login(admin());
        hub.expire();
        assert!(hub.unsubscribe(sub));
        hub.login(admin());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (SessionEvent::LoggedIn, Some("admin@x.com".to_string())),
                (SessionEvent::Expired, None),
            ]
        );
        assert!(!hub.unsubscribe(sub));
    }

    #[test]
    fn listeners_may_unsubscribe_from_inside_a_notification() {
        let hub = Arc::new(SessionHub::new());
        let calls = Arc::new(Mutex::new(0));

        let own_id = Arc::new(Mutex::new(None));
        let (inner_hub, inner_id, inner_calls) =
            (Arc::downgrade(&hub), Arc::clone(&own_id), Arc::clone(&calls));
        let sub = hub.subscribe(move |_, _| {
            *inner_calls.lock().unwrap() += 1;
            if let (Some(hub), Some(id)) = (inner_hub.upgrade(), *inner_id.lock().unwrap()) {
                hub.unsubscribe(id);
                hub.subscribe(|_, _| {});
            }
        });
        *own_id.lock().unwrap() = Some(sub);

        hub.login(admin());
        hub.logout();
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn identity_roles_deserialize_as_a_set() {
        let identity: UserIdentity =
            serde_json::from_str(r#"{"email": "s@x.com", "roles": ["STUDENT", "STUDENT"]}"#)
                .unwrap();
        assert_eq!(identity.roles.len(), 1);
        assert!(identity.has_role(ROLE_STUDENT));
    }
}
