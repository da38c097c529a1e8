//! Navigation guards consulted before a route transition is committed.

use tracing::{debug, warn};

use super::RouteMeta;
use crate::backend::BackendClient;
use crate::identity::{Role, SessionSnapshot, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Redirect {
    Login,
    Forbidden,
    Home,
    AdminLanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(Redirect),
}

/// Access check for a route: authentication first, then role membership.
///
/// A signed-in user whose profile has not loaded counts as `Guest`.
pub fn check_access(meta: &RouteMeta, session: &SessionSnapshot) -> GuardDecision {
    if !meta.requires_auth && meta.allowed_roles.is_none() {
        return GuardDecision::Allow;
    }
    if meta.requires_auth && session.identity.is_none() {
        return GuardDecision::Redirect(Redirect::Login);
    }
    if let Some(allowed) = &meta.allowed_roles {
        if !allowed.contains(&session.effective_role()) {
            return GuardDecision::Redirect(Redirect::Forbidden);
        }
    }
    GuardDecision::Allow
}

/// Guard for the login page: signed-in users are sent to their landing page instead.
///
/// Waits for the profile to load when it is not loaded yet; a failed load counts as `Guest`.
pub async fn guest_only<B: BackendClient>(store: &SessionStore<B>) -> GuardDecision {
    let snap = store.snapshot();
    if snap.identity.is_none() {
        return GuardDecision::Allow;
    }
    if snap.profile.is_none() {
        if let Err(e) = store.load_profile().await {
            warn!(target: "storefront::router", "profile unavailable on login route, treating as guest: {}", e);
        }
    }
    let snap = store.snapshot();
    if snap.identity.is_none() {
        return GuardDecision::Allow;
    }
    let role = snap.effective_role();
    debug!(target: "storefront::router", "login route visited while signed in role={}", role);
    if role == Role::Admin {
        GuardDecision::Redirect(Redirect::AdminLanding)
    } else {
        GuardDecision::Redirect(Redirect::Home)
    }
}
