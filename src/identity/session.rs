use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::principal::{Identity, Profile, Role};
use crate::backend::{AuthChange, AuthChangeHandler, AuthChangeKind, BackendClient, Credentials, Query, Subscription, PROFILES};
use crate::error::AppError;

/// Read-only copy of the session state handed to guards and UI bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Role of the loaded profile; `Guest` while no profile is loaded.
    pub fn effective_role(&self) -> Role {
        self.profile.as_ref().map(|p| p.role.clone()).unwrap_or(Role::Guest)
    }

    pub fn is_authenticated(&self) -> bool { self.identity.is_some() }
}

#[derive(Debug, Default)]
struct SessionState {
    identity: Option<Identity>,
    profile: Option<Profile>,
    loading: bool,
    last_error: Option<String>,
    // Bumped whenever the identity changes or is cleared; profile fetches compare it on resolve.
    epoch: u64,
}

impl SessionState {
    fn set_identity(&mut self, identity: Identity) {
        let same = self.identity.as_ref().map(|i| i.id == identity.id).unwrap_or(false);
        if !same {
            self.epoch += 1;
            self.profile = None;
            self.loading = false;
            self.last_error = None;
        }
        self.identity = Some(identity);
    }

    fn clear(&mut self) {
        self.epoch += 1;
        self.identity = None;
        self.profile = None;
        self.loading = false;
        self.last_error = None;
    }
}

// Clears `loading` when a profile fetch finishes or its future is dropped mid-flight.
struct LoadingGuard<'a> {
    state: &'a RwLock<SessionState>,
    epoch: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut s = self.state.write();
        if s.epoch == self.epoch {
            s.loading = false;
        }
    }
}

/// In-memory authentication/authorization state kept in sync with the backend's identity
/// provider.
///
/// One store owns at most one live change subscription. Create a single instance per
/// application and share it behind an `Arc`; dropping the store cancels its subscription.
pub struct SessionStore<B: BackendClient> {
    backend: Arc<B>,
    state: RwLock<SessionState>,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl<B: BackendClient> SessionStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, state: RwLock::new(SessionState::default()), subscription: Mutex::new(None) }
    }

    pub fn backend(&self) -> &Arc<B> { &self.backend }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = self.state.read();
        SessionSnapshot {
            identity: s.identity.clone(),
            profile: s.profile.clone(),
            loading: s.loading,
            last_error: s.last_error.clone(),
        }
    }

    pub fn effective_role(&self) -> Role {
        self.state.read().profile.as_ref().map(|p| p.role.clone()).unwrap_or(Role::Guest)
    }

    pub fn has_subscription(&self) -> bool { self.subscription.lock().is_some() }

    /// Fetch the profile of the current identity.
    ///
    /// Returns `Ok(None)` when there is no identity, or when the identity changed while the
    /// fetch was in flight and the result was discarded. Failures of a fetch that is still
    /// current are recorded in `last_error` and returned; a profile loaded earlier is kept.
    pub async fn load_profile(&self) -> Result<Option<Profile>, AppError> {
        let (identity, epoch) = {
            let mut s = self.state.write();
            let Some(identity) = s.identity.clone() else { return Ok(None) };
            s.loading = true;
            (identity, s.epoch)
        };
        // Declared before any state guard below so it drops after them.
        let _loading = LoadingGuard { state: &self.state, epoch };

        let fetched = self.backend.query_row(PROFILES, &Query::new().eq("id", identity.id.clone())).await;
        let result = fetched
            .map_err(AppError::from_profile_fetch)
            .and_then(|row| Profile::from_row(&row, &identity));

        let mut s = self.state.write();
        if s.epoch != epoch {
            debug!(target: "storefront::session", "discarding stale profile fetch for user={} epoch={} current={}", identity.id, epoch, s.epoch);
            return result.map(|_| None);
        }
        s.loading = false;
        match result {
            Ok(profile) => {
                debug!(target: "storefront::session", "profile loaded user={} role={}", identity.id, profile.role);
                s.profile = Some(profile.clone());
                s.last_error = None;
                Ok(Some(profile))
            }
            Err(e) => {
                s.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Sign in through the backend, then load the profile. On a failed sign-in the state
    /// is left untouched.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AppError> {
        let session = self.backend.sign_in(credentials).await?;
        let identity = session.user;
        self.state.write().set_identity(identity.clone());
        info!(target: "storefront::session", "signed in user={}", identity.id);
        self.load_profile().await?;
        Ok(identity)
    }

    /// Sign out through the backend. Local state is cleared even when the backend call fails;
    /// the backend error is still returned.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        let outcome = self.backend.sign_out().await;
        self.state.write().clear();
        info!(target: "storefront::session", "signed out");
        outcome.map_err(AppError::from)
    }

    fn apply_signed_out(&self) {
        self.state.write().clear();
    }
}

impl<B: BackendClient + 'static> SessionStore<B> {
    /// Subscribe to identity changes, then pick up any existing session.
    ///
    /// Safe to call repeatedly: every call replaces the previous subscription.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), AppError> {
        self.subscribe_to_changes();
        match self.backend.get_current_session().await? {
            Some(session) => {
                debug!(target: "storefront::session", "existing session user={}", session.user.id);
                self.state.write().set_identity(session.user);
                self.load_profile().await?;
            }
            None => debug!(target: "storefront::session", "no existing session"),
        }
        Ok(())
    }

    /// Register the change handler, cancelling any subscription this store already holds.
    pub fn subscribe_to_changes(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handler: AuthChangeHandler = Arc::new(move |change: AuthChange| {
            if let Some(store) = weak.upgrade() {
                store.handle_auth_change(change);
            }
        });
        let mut slot = self.subscription.lock();
        if let Some(prev) = slot.take() {
            prev.unsubscribe();
            debug!(target: "storefront::session", "previous auth subscription cancelled");
        }
        *slot = Some(self.backend.on_auth_state_change(handler));
    }

    fn handle_auth_change(self: &Arc<Self>, change: AuthChange) {
        match change.kind {
            AuthChangeKind::SignedIn => {
                let Some(session) = change.session else {
                    let err = AppError::subscription("missing_session", "signed_in notification without a session");
                    warn!(target: "storefront::session", "auth change discarded: {}", err);
                    return;
                };
                let user_id = session.user.id.clone();
                let Ok(rt) = tokio::runtime::Handle::try_current() else {
                    let err = AppError::subscription("no_runtime", "cannot load profile outside a tokio runtime");
                    warn!(target: "storefront::session", "auth change discarded for user={}: {}", user_id, err);
                    return;
                };
                self.state.write().set_identity(session.user);
                let store = Arc::clone(self);
                rt.spawn(async move {
                    if let Err(e) = store.load_profile().await {
                        warn!(target: "storefront::session", "profile load after sign-in notification failed user={}: {}", user_id, e);
                    }
                });
            }
            AuthChangeKind::SignedOut => {
                self.apply_signed_out();
                debug!(target: "storefront::session", "signed out by notification");
            }
            AuthChangeKind::UserUpdated => {
                let Some(session) = change.session else { return };
                let mut s = self.state.write();
                if s.identity.as_ref().map(|i| i.id == session.user.id).unwrap_or(false) {
                    s.set_identity(session.user);
                }
            }
            AuthChangeKind::TokenRefreshed => {}
        }
    }
}

impl<B: BackendClient> Drop for SessionStore<B> {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.get_mut().take() {
            sub.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity { Identity::new(id, None).unwrap() }

    #[test]
    fn changing_identity_drops_profile_and_bumps_epoch() {
        let mut s = SessionState::default();
        s.set_identity(identity("u1"));
        s.profile = Some(Profile { id: "u1".into(), display_name: None, role: Role::Admin });
        let e1 = s.epoch;

        s.set_identity(identity("u1"));
        assert_eq!(s.epoch, e1);
        assert!(s.profile.is_some());

        s.set_identity(identity("u2"));
        assert!(s.epoch > e1);
        assert!(s.profile.is_none());
    }

    #[test]
    fn clear_removes_profile_with_identity() {
        let mut s = SessionState::default();
        s.set_identity(identity("u1"));
        s.profile = Some(Profile { id: "u1".into(), display_name: None, role: Role::Admin });
        let e = s.epoch;
        s.clear();
        assert!(s.identity.is_none());
        assert!(s.profile.is_none());
        assert!(s.epoch > e);
    }

    #[test]
    fn signed_in_outside_a_runtime_is_discarded_whole() {
        let backend = Arc::new(crate::backend::MemoryBackend::default());
        let store = Arc::new(SessionStore::new(backend));
        store.subscribe_to_changes();
        let session = crate::backend::AuthSession { access_token: "t".into(), user: identity("u1") };
        store.handle_auth_change(AuthChange::signed_in(session));
        assert_eq!(store.snapshot(), SessionSnapshot::default());
    }

    #[test]
    fn pending_profile_is_guest() {
        let snap = SessionSnapshot { identity: Some(identity("u1")), ..Default::default() };
        assert_eq!(snap.effective_role(), Role::Guest);
        assert!(snap.is_authenticated());
    }
}
