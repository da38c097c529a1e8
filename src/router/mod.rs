//! Route tree, path resolution and guarded navigation.
//!
//! Routes are declared as a tree of [`RouteRecord`]s. Parents act as layouts: they contribute
//! a path prefix and access constraints, and only leaves are matchable. [`Router::navigate`]
//! runs the guards on the matched leaf and follows redirects.

pub mod guards;
mod routes;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info};

use crate::backend::BackendClient;
use crate::error::AppError;
use crate::identity::{Role, SessionStore};
use guards::{check_access, guest_only, GuardDecision, Redirect};

pub use routes::{admin_links, admin_routes, app_routes, public_routes, NavLink};
pub use routes::{ACCESS_DENIED, ADMIN_DASHBOARD, CATEGORY_LIST, HOME, LOGIN, NOT_FOUND, PRODUCT_CREATE, PRODUCT_EDIT, PRODUCT_LIST, PRODUCT_VIEW};

const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMeta {
    pub title: Option<String>,
    pub requires_auth: bool,
    pub allowed_roles: Option<BTreeSet<Role>>,
}

impl RouteMeta {
    pub fn titled(title: impl Into<String>) -> Self { Self { title: Some(title.into()), ..Default::default() } }

    pub fn require_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn allow_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = Some(roles.into_iter().collect());
        self
    }

    // Child constraints narrow the parent's: auth is OR-ed, role sets are intersected.
    fn inherit(&self, parent: &RouteMeta) -> RouteMeta {
        let allowed_roles = match (&parent.allowed_roles, &self.allowed_roles) {
            (Some(p), Some(c)) => Some(p.intersection(c).cloned().collect()),
            (Some(p), None) => Some(p.clone()),
            (None, c) => c.clone(),
        };
        RouteMeta {
            title: self.title.clone().or_else(|| parent.title.clone()),
            requires_auth: parent.requires_auth || self.requires_auth,
            allowed_roles,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteRecord {
    pub path: String,
    pub name: Option<String>,
    pub meta: RouteMeta,
    pub guest_only: bool,
    pub children: Vec<RouteRecord>,
}

impl RouteRecord {
    pub fn new(path: impl Into<String>) -> Self { Self { path: path.into(), ..Default::default() } }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn meta(mut self, meta: RouteMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Attach the login-page guard: signed-in users are redirected away.
    pub fn guest_only(mut self) -> Self {
        self.guest_only = true;
        self
    }

    pub fn children(mut self, children: Vec<RouteRecord>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    CatchAll(String),
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_pattern(path: &str) -> Vec<Segment> {
    split_path(path)
        .into_iter()
        .map(|seg| match seg.strip_prefix(':') {
            Some(p) if p.contains("(.*)") => Segment::CatchAll(p.split('(').next().unwrap_or("").to_string()),
            Some(p) => Segment::Param(p.to_string()),
            None => Segment::Static(seg.to_string()),
        })
        .collect()
}

fn join_path(parent: &str, child: &str) -> String {
    if child.starts_with('/') {
        return child.to_string();
    }
    let parent = parent.trim_end_matches('/');
    if child.is_empty() {
        if parent.is_empty() { "/".to_string() } else { parent.to_string() }
    } else {
        format!("{}/{}", parent, child)
    }
}

#[derive(Debug, Clone)]
struct FlatRoute {
    pattern: Vec<Segment>,
    full_path: String,
    name: Option<String>,
    meta: RouteMeta,
    guest_only: bool,
}

impl FlatRoute {
    fn capture(&self, parts: &[&str]) -> Option<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        for (i, seg) in self.pattern.iter().enumerate() {
            match seg {
                Segment::CatchAll(name) => {
                    params.insert(name.clone(), parts.get(i..).map(|rest| rest.join("/")).unwrap_or_default());
                    return Some(params);
                }
                Segment::Static(s) => {
                    if parts.get(i) != Some(&s.as_str()) { return None; }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), value.to_string());
                }
            }
        }
        if parts.len() == self.pattern.len() { Some(params) } else { None }
    }
}

fn flatten(records: &[RouteRecord], prefix: &str, parent: &RouteMeta, out: &mut Vec<FlatRoute>) {
    for r in records {
        let full_path = join_path(prefix, &r.path);
        let meta = r.meta.inherit(parent);
        if r.children.is_empty() {
            out.push(FlatRoute {
                pattern: parse_pattern(&full_path),
                full_path,
                name: r.name.clone(),
                meta,
                guest_only: r.guest_only,
            });
        } else {
            flatten(&r.children, &full_path, &meta, out);
        }
    }
}

/// Names of the routes guards redirect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTargets {
    pub login: String,
    pub forbidden: String,
    pub home: String,
    pub admin_landing: String,
}

impl Default for RedirectTargets {
    fn default() -> Self {
        Self {
            login: LOGIN.to_string(),
            forbidden: ACCESS_DENIED.to_string(),
            home: HOME.to_string(),
            admin_landing: ADMIN_DASHBOARD.to_string(),
        }
    }
}

impl RedirectTargets {
    fn name_for(&self, r: Redirect) -> &str {
        match r {
            Redirect::Login => &self.login,
            Redirect::Forbidden => &self.forbidden,
            Redirect::Home => &self.home,
            Redirect::AdminLanding => &self.admin_landing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub name: Option<String>,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub meta: RouteMeta,
    pub guest_only: bool,
}

/// Outcome of a committed navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: ResolvedRoute,
    /// Paths that were rejected by a guard on the way, in order.
    pub redirected_from: Vec<String>,
}

impl Navigation {
    pub fn is_redirected(&self) -> bool { !self.redirected_from.is_empty() }

    pub fn name(&self) -> Option<&str> { self.route.name.as_deref() }
}

pub struct Router {
    routes: Vec<FlatRoute>,
    targets: RedirectTargets,
}

impl Router {
    pub fn new(records: Vec<RouteRecord>, targets: RedirectTargets) -> Result<Self, AppError> {
        let mut routes = Vec::new();
        flatten(&records, "", &RouteMeta::default(), &mut routes);

        let mut seen = HashSet::new();
        for name in routes.iter().filter_map(|r| r.name.as_deref()) {
            if !seen.insert(name) {
                return Err(AppError::internal("duplicate_route".to_string(), format!("route name '{}' declared twice", name)));
            }
        }
        for t in [&targets.login, &targets.forbidden, &targets.home, &targets.admin_landing] {
            if !seen.contains(t.as_str()) {
                return Err(AppError::internal("missing_route".to_string(), format!("redirect target '{}' is not declared", t)));
            }
        }
        debug!(target: "storefront::router", "router built with {} route(s)", routes.len());
        Ok(Self { routes, targets })
    }

    /// Router over [`app_routes`] with the default redirect targets.
    pub fn with_app_routes() -> Result<Self, AppError> { Self::new(app_routes(), RedirectTargets::default()) }

    pub fn resolve(&self, path: &str) -> Result<ResolvedRoute, AppError> {
        let bare = path.split(['?', '#']).next().unwrap_or("");
        let parts = split_path(bare);
        for r in &self.routes {
            if let Some(params) = r.capture(&parts) {
                return Ok(ResolvedRoute {
                    name: r.name.clone(),
                    path: format!("/{}", parts.join("/")),
                    params,
                    meta: r.meta.clone(),
                    guest_only: r.guest_only,
                });
            }
        }
        Err(AppError::not_found("route_not_found".to_string(), format!("no route matches '{}'", path)))
    }

    pub fn resolve_named(&self, name: &str) -> Result<ResolvedRoute, AppError> {
        let r = self
            .routes
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .ok_or_else(|| AppError::not_found("route_not_found".to_string(), format!("no route named '{}'", name)))?;
        if r.pattern.iter().any(|s| !matches!(s, Segment::Static(_))) {
            return Err(AppError::user("route_params_required".to_string(), format!("route '{}' needs parameters", name)));
        }
        Ok(ResolvedRoute {
            name: r.name.clone(),
            path: r.full_path.clone(),
            params: BTreeMap::new(),
            meta: r.meta.clone(),
            guest_only: r.guest_only,
        })
    }

    /// Run the guards for `path` against the current session and follow redirects.
    pub async fn navigate<B: BackendClient>(&self, path: &str, store: &SessionStore<B>) -> Result<Navigation, AppError> {
        let mut target = self.resolve(path)?;
        let mut redirected_from = Vec::new();
        for _ in 0..=MAX_REDIRECTS {
            let mut decision = check_access(&target.meta, &store.snapshot());
            if decision == GuardDecision::Allow && target.guest_only {
                decision = guest_only(store).await;
            }
            match decision {
                GuardDecision::Allow => {
                    info!(target: "storefront::router", "navigate {} -> {} (redirects={})", path, target.path, redirected_from.len());
                    return Ok(Navigation { route: target, redirected_from });
                }
                GuardDecision::Redirect(r) => {
                    debug!(target: "storefront::router", "guard redirected {} to {:?}", target.path, r);
                    redirected_from.push(target.path.clone());
                    target = self.resolve_named(self.targets.name_for(r))?;
                }
            }
        }
        Err(AppError::internal("redirect_loop".to_string(), format!("too many redirects navigating to '{}'", path)))
    }
}
