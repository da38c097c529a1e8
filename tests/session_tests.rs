//! Session store integration tests against the in-process backend: initialization,
//! sign-in/out, change notifications and stale profile fetches.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use storefront::backend::{AuthChange, AuthChangeKind, AuthSession, BackendClient, Credentials, MemoryBackend, PROFILES};
use storefront::identity::{Identity, Role, SessionSnapshot, SessionStore};

// Users share the password "x"; an empty role seeds no profile row.
fn backend_with(users: &[(&str, &str)]) -> (Arc<MemoryBackend>, Vec<Identity>) {
    let backend = Arc::new(MemoryBackend::default());
    let mut ids = Vec::new();
    for &(email, role) in users {
        let id = backend.add_user(email, "x").expect("add user");
        if !role.is_empty() {
            backend.seed(PROFILES, [json!({ "id": id.id, "full_name": email, "role": role })]);
        }
        ids.push(id);
    }
    (backend, ids)
}

fn creds(email: &str) -> Credentials { Credentials::new(email, "x") }

async fn wait_for<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> Result<(), String> {
    let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if cond() { return Ok(()); }
        if std::time::Instant::now() >= deadline { return Err("condition not reached before timeout".into()); }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn initialize_without_session_stays_empty() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    let _gate_never_hit = backend.pause(PROFILES);
    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    store.initialize().await?;
    assert_eq!(store.snapshot(), SessionSnapshot::default());
    assert_eq!(backend.pending_queries(), 0);
    assert_eq!(store.effective_role(), Role::Guest);
    Ok(())
}

#[tokio::test]
async fn initialize_picks_up_existing_session() -> Result<()> {
    let (backend, ids) = backend_with(&[("a@b.com", "admin")]);
    backend.sign_in(&creds("a@b.com")).await?;
    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    store.initialize().await?;
    let snap = store.snapshot();
    assert_eq!(snap.identity.as_ref(), Some(&ids[0]));
    assert_eq!(snap.effective_role(), Role::Admin);
    Ok(())
}

#[tokio::test]
async fn sign_in_loads_admin_profile() -> Result<()> {
    let (backend, ids) = backend_with(&[("a@b.com", "admin")]);
    let store = SessionStore::new(backend);
    let who = store.sign_in(&creds("a@b.com")).await?;
    assert_eq!(who.id, ids[0].id);
    assert_eq!(store.effective_role(), Role::Admin);
    let snap = store.snapshot();
    assert_eq!(snap.profile.unwrap().display_name.as_deref(), Some("a@b.com"));
    assert!(!snap.loading);
    Ok(())
}

#[tokio::test]
async fn failed_profile_load_leaves_guest_and_propagates() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    backend.fail_collection(PROFILES, true);
    let store = SessionStore::new(Arc::clone(&backend));
    let err = store.sign_in(&creds("a@b.com")).await.unwrap_err();
    assert_eq!(err.code_str(), "profile_fetch_failed");
    let snap = store.snapshot();
    assert!(snap.identity.is_some());
    assert!(snap.profile.is_none());
    assert!(snap.last_error.is_some());
    assert_eq!(snap.effective_role(), Role::Guest);

    // no automatic retry; an explicit reload succeeds once the backend recovers
    backend.fail_collection(PROFILES, false);
    assert_eq!(store.load_profile().await?.map(|p| p.role), Some(Role::Admin));
    assert!(store.snapshot().last_error.is_none());
    Ok(())
}

#[tokio::test]
async fn missing_profile_row_is_not_found() -> Result<()> {
    let (backend, _) = backend_with(&[("nobody@b.com", "")]);
    let store = SessionStore::new(backend);
    let err = store.sign_in(&creds("nobody@b.com")).await.unwrap_err();
    assert_eq!(err.code_str(), "profile_not_found");
    assert_eq!(store.effective_role(), Role::Guest);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_leave_state_untouched() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    let store = SessionStore::new(backend);
    let err = store.sign_in(&Credentials::new("a@b.com", "wrong")).await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(store.snapshot(), SessionSnapshot::default());
    Ok(())
}

#[tokio::test]
async fn load_profile_without_identity_is_a_no_op() -> Result<()> {
    let (backend, _) = backend_with(&[]);
    let _gate = backend.pause(PROFILES);
    let store = SessionStore::new(Arc::clone(&backend));
    assert_eq!(store.load_profile().await?, None);
    assert_eq!(backend.pending_queries(), 0);
    Ok(())
}

#[tokio::test]
async fn sign_out_twice_is_idempotent() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    let store = SessionStore::new(backend);
    store.sign_in(&creds("a@b.com")).await?;
    store.sign_out().await?;
    let first = store.snapshot();
    store.sign_out().await?;
    assert_eq!(store.snapshot(), first);
    assert_eq!(first, SessionSnapshot::default());
    Ok(())
}

#[tokio::test]
async fn sign_out_clears_state_even_when_backend_fails() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    let store = SessionStore::new(Arc::clone(&backend));
    store.sign_in(&creds("a@b.com")).await?;
    backend.set_offline(true);
    let err = store.sign_out().await.unwrap_err();
    assert_eq!(err.code_str(), "network_error");
    assert_eq!(store.snapshot(), SessionSnapshot::default());
    Ok(())
}

#[tokio::test]
async fn repeated_initialize_keeps_one_subscription() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    for _ in 0..5 {
        store.initialize().await?;
        assert_eq!(backend.live_subscriptions(), 1);
    }
    let concurrent: Vec<_> = (0..4).map(|_| store.initialize()).collect();
    for r in futures::future::join_all(concurrent).await {
        r?;
    }
    assert_eq!(backend.live_subscriptions(), 1);
    assert!(store.has_subscription());

    drop(store);
    assert_eq!(backend.live_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn signed_in_notification_loads_profile_in_background() -> Result<()> {
    let (backend, ids) = backend_with(&[("a@b.com", "admin")]);
    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    store.initialize().await?;

    backend.sign_in(&creds("a@b.com")).await?;
    assert_eq!(store.snapshot().identity.as_ref(), Some(&ids[0]));
    let s = Arc::clone(&store);
    wait_for(move || s.effective_role() == Role::Admin, 2_000).await.map_err(anyhow::Error::msg)?;

    backend.sign_out().await?;
    assert_eq!(store.snapshot(), SessionSnapshot::default());
    Ok(())
}

#[tokio::test]
async fn signed_in_notification_without_session_changes_nothing() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    store.initialize().await?;
    store.sign_in(&creds("a@b.com")).await?;
    let before = store.snapshot();

    backend.emit(AuthChange { kind: AuthChangeKind::SignedIn, session: None });
    backend.emit(AuthChange { kind: AuthChangeKind::TokenRefreshed, session: None });
    assert_eq!(store.snapshot(), before);
    Ok(())
}

#[tokio::test]
async fn stale_profile_fetch_is_discarded_after_sign_out() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    backend.sign_in(&creds("a@b.com")).await?;
    let gate = backend.pause(PROFILES);

    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    let init = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.initialize().await })
    };
    let b = Arc::clone(&backend);
    wait_for(move || b.pending_queries() == 1, 2_000).await.map_err(anyhow::Error::msg)?;
    assert!(store.snapshot().identity.is_some());

    backend.sign_out().await?;
    gate.release();
    init.await??;

    assert_eq!(store.snapshot(), SessionSnapshot::default());
    Ok(())
}

#[tokio::test]
async fn stale_profile_never_overwrites_a_newer_identity() -> Result<()> {
    let (backend, ids) = backend_with(&[("admin@b.com", "admin"), ("guest@b.com", "guest")]);
    backend.sign_in(&creds("admin@b.com")).await?;
    let gate = backend.pause(PROFILES);

    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    let init = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.initialize().await })
    };
    let b = Arc::clone(&backend);
    wait_for(move || b.pending_queries() == 1, 2_000).await.map_err(anyhow::Error::msg)?;

    // a different user signs in while the admin's profile is still in flight
    backend.sign_out().await?;
    backend.sign_in(&creds("guest@b.com")).await?;
    let b = Arc::clone(&backend);
    wait_for(move || b.pending_queries() == 2, 2_000).await.map_err(anyhow::Error::msg)?;
    gate.release();
    init.await??;

    let s = Arc::clone(&store);
    wait_for(move || s.snapshot().profile.is_some(), 2_000).await.map_err(anyhow::Error::msg)?;
    let snap = store.snapshot();
    assert_eq!(snap.identity.as_ref(), Some(&ids[1]));
    assert_eq!(snap.profile.as_ref().map(|p| p.id.as_str()), Some(ids[1].id.as_str()));
    assert_eq!(snap.effective_role(), Role::Guest);
    Ok(())
}

#[tokio::test]
async fn failed_reload_keeps_the_loaded_profile() -> Result<()> {
    let (backend, _) = backend_with(&[("a@b.com", "admin")]);
    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    store.initialize().await?;
    store.sign_in(&creds("a@b.com")).await?;
    assert_eq!(store.effective_role(), Role::Admin);

    // same user re-asserted while the profile table is unreachable
    backend.fail_collection(PROFILES, true);
    let session = backend.get_current_session().await?.expect("current session");
    backend.emit(AuthChange::signed_in(session));
    let s = Arc::clone(&store);
    wait_for(move || s.snapshot().last_error.is_some(), 2_000).await.map_err(anyhow::Error::msg)?;

    let snap = store.snapshot();
    assert_eq!(snap.effective_role(), Role::Admin);
    assert!(snap.profile.is_some());
    Ok(())
}

#[tokio::test]
async fn user_updated_refreshes_only_the_current_identity() -> Result<()> {
    let (backend, ids) = backend_with(&[("a@b.com", "admin")]);
    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    store.initialize().await?;
    store.sign_in(&creds("a@b.com")).await?;

    let renamed = Identity::new(ids[0].id.clone(), Some("new@b.com".into()))?;
    backend.emit(AuthChange {
        kind: AuthChangeKind::UserUpdated,
        session: Some(AuthSession { access_token: "t1".into(), user: renamed.clone() }),
    });
    let snap = store.snapshot();
    assert_eq!(snap.identity.as_ref(), Some(&renamed));
    assert_eq!(snap.effective_role(), Role::Admin);

    let stranger = Identity::new("someone-else", Some("x@b.com".into()))?;
    backend.emit(AuthChange {
        kind: AuthChangeKind::UserUpdated,
        session: Some(AuthSession { access_token: "t2".into(), user: stranger }),
    });
    assert_eq!(store.snapshot(), snap);
    Ok(())
}

#[tokio::test]
async fn abandoned_profile_fetch_does_not_leave_loading_set() -> Result<()> {
    let (backend, ids) = backend_with(&[("a@b.com", "admin")]);
    backend.sign_in(&creds("a@b.com")).await?;
    let _gate = backend.pause(PROFILES);

    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    let outcome = tokio::time::timeout(Duration::from_millis(50), store.initialize()).await;
    assert!(outcome.is_err());

    let snap = store.snapshot();
    assert_eq!(snap.identity.as_ref(), Some(&ids[0]));
    assert!(!snap.loading);
    Ok(())
}
