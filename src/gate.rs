//! Route and region authorization.
//!
//! [`authorize`] is the single decision function. [`AccessPolicy`] is the one
//! table saying which console locations need which roles; the route guard and
//! the navigation menu both read it, so a link is shown exactly when following
//! it would be allowed.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::session::{ROLE_ADMIN, Session};

/// Where denied page requests are sent
pub const LANDING: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum DenyReason {
    /// Nobody is logged in
    Anonymous,

    /// Logged in without any of the required roles
    MissingRole { required: BTreeSet<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `session` may see a region requiring `required` roles
///
/// # Arguments
/// * `session` - Current session
/// * `required` - Roles of which the user needs at least one; `None` or empty means public
///
/// # Returns
/// * `Decision` - `Allow`, or `Deny` with the reason
pub fn authorize(session: &Session, required: Option<&BTreeSet<String>>) -> Decision {
    let required = match required {
        Some(required) if !required.is_empty() => required,
        _ => return Decision::Allow,
    };

    let Some(identity) = &session.identity else {
        return Decision::Deny(DenyReason::Anonymous);
    };

    if identity.roles.is_disjoint(required) {
        Decision::Deny(DenyReason::MissingRole {
            required: required.clone(),
        })
    } else {
        Decision::Allow
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    Prefix(String),
}

impl Pattern {
    fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::Exact(p) => path == p,
            Pattern::Prefix(p) => {
                path == p
                    || path
                        .strip_prefix(p.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// Exact patterns beat prefixes; longer prefixes beat shorter ones
    fn specificity(&self) -> (bool, usize) {
        match self {
            Pattern::Exact(p) => (true, p.len()),
            Pattern::Prefix(p) => (false, p.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Access {
    /// Open to everyone for every method
    Public,

    /// Open to everyone for reads; writes fall back to the default
    PublicRead,

    /// Needs one of these roles
    Roles(BTreeSet<String>),
}

/// Route table mapping console locations to required roles
///
/// Locations not listed need the default roles.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<(Pattern, Access)>,
    default: BTreeSet<String>,
}

impl AccessPolicy {
    /// Empty policy where every location needs one of `roles`
    pub fn restricted<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AccessPolicy {
            rules: Vec::new(),
            default: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// The console's policy
    ///
    /// Landing, login and static assets are public and the institute showcase
    /// list can be read by anyone. Everything else, including every list,
    /// form and mutation, needs `ADMIN`.
    pub fn console() -> Self {
        AccessPolicy::restricted([ROLE_ADMIN])
            .public_exact("/")
            .public_prefix("/auth")
            .public_prefix("/static")
            .public_exact("/api/session")
            .public_read_exact("/institutes")
            .public_read_exact("/api/entities/institutes")
    }

    pub fn public_exact(mut self, path: &str) -> Self {
        self.rules.push((Pattern::Exact(path.into()), Access::Public));
        self
    }

    pub fn public_prefix(mut self, path: &str) -> Self {
        self.rules.push((Pattern::Prefix(path.into()), Access::Public));
        self
    }

    pub fn public_read_exact(mut self, path: &str) -> Self {
        self.rules.push((Pattern::Exact(path.into()), Access::PublicRead));
        self
    }

    pub fn require_prefix<I, S>(mut self, path: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = roles.into_iter().map(Into::into).collect();
        self.rules.push((Pattern::Prefix(path.into()), Access::Roles(roles)));
        self
    }

    /// Roles needed to reach `path`; `None` means public
    ///
    /// # Arguments
    /// * `path` - Request path without query string
    /// * `read_only` - Whether the request only reads (GET/HEAD)
    pub fn required_roles(&self, path: &str, read_only: bool) -> Option<&BTreeSet<String>> {
        let path = normalize(path);
        let rule = self
            .rules
            .iter()
            .filter(|(pattern, access)| {
                pattern.matches(path) && (read_only || *access != Access::PublicRead)
            })
            .max_by_key(|(pattern, _)| pattern.specificity());

        match rule.map(|(_, access)| access) {
            Some(Access::Public) | Some(Access::PublicRead) => None,
            Some(Access::Roles(roles)) => Some(roles),
            None => Some(&self.default),
        }
    }

    pub fn authorize(&self, session: &Session, path: &str, read_only: bool) -> Decision {
        authorize(session, self.required_roles(path, read_only))
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Redirect produced when a page route is denied
///
/// Carries the requested location so login can send the user back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: &'static str,
    pub from: String,
    pub reason: DenyReason,
}

/// Route-entry guard
///
/// # Returns
/// * `Result<(), Redirect>` - `Ok` when the page may render, else where to go
pub fn guard(policy: &AccessPolicy, session: &Session, path: &str) -> Result<(), Redirect> {
    match policy.authorize(session, path, true) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(Redirect {
            to: LANDING,
            from: path.to_string(),
            reason,
        }),
    }
}

/// Where to go after a successful login
///
/// Only local absolute paths are followed; anything else lands on `/`.
/// Browsers drop tabs and newlines from URLs, so `/\t/host` would turn into
/// `//host`. Only printable ASCII is accepted, which also keeps the value a
/// valid `Location` header.
pub fn return_location(from: Option<&str>) -> &str {
    match from {
        Some(from)
            if from.starts_with('/')
                && from.chars().all(|c| c.is_ascii_graphic())
                && !from.starts_with("//")
                && !from.contains('\\')
                && !from.contains("://") =>
        {
            from
        }
        _ => LANDING,
    }
}

/// Navigation entry; groups have children and no link of their own
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavItem>,
}

impl NavItem {
    pub fn link(label: &'static str, href: &'static str) -> Self {
        NavItem {
            label,
            href: Some(href),
            children: Vec::new(),
        }
    }

    pub fn group(label: &'static str, children: Vec<NavItem>) -> Self {
        NavItem {
            label,
            href: None,
            children,
        }
    }
}

/// Full console menu before filtering
pub fn console_nav() -> Vec<NavItem> {
    vec![
        NavItem::link("Главная", "/"),
        NavItem::group(
            "Студенты",
            vec![NavItem::link("Список студентов", "/students")],
        ),
        NavItem::group(
            "Институты",
            vec![
                NavItem::link("Информация", "/institutes"),
                NavItem::link("Список", "/institutes/panel"),
            ],
        ),
        NavItem::group("Кафедры", vec![NavItem::link("Список кафедр", "/kafedras")]),
        NavItem::group(
            "Сотрудники",
            vec![NavItem::link("Список сотрудников", "/employees")],
        ),
        NavItem::link("Админ-панель", "/admin"),
    ]
}

/// Menu entries `session` may follow
///
/// Links are kept when the policy allows them; groups are kept when at least
/// one child survives.
pub fn visible_nav(items: &[NavItem], policy: &AccessPolicy, session: &Session) -> Vec<NavItem> {
    items
        .iter()
        .filter_map(|item| match item.href {
            Some(href) => policy
                .authorize(session, href, true)
                .is_allowed()
                .then(|| item.clone()),
            None => {
                let children = visible_nav(&item.children, policy, session);
                (!children.is_empty()).then(|| NavItem {
                    children,
                    ..item.clone()
                })
            }
        })
        .collect()
}
