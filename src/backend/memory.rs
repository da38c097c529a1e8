use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use base64::Engine;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use super::{AuthChange, AuthChangeHandler, AuthSession, BackendClient, BackendError, Credentials, Query, Row, Subscription};
use crate::identity::Identity;

type Listeners = Arc<RwLock<BTreeMap<u64, AuthChangeHandler>>>;

#[derive(Debug, Clone)]
struct UserEntry {
    identity: Identity,
    password_hash: String,
}

/// In-process backend: users, rows and blobs held in memory.
///
/// Besides the [`BackendClient`] surface it exposes a few controls used by tests: emitting
/// notifications, holding queries in flight, and failing collections or the whole backend.
pub struct MemoryBackend {
    base_url: String,
    users: RwLock<HashMap<String, UserEntry>>,
    current: RwLock<Option<AuthSession>>,
    tables: RwLock<HashMap<String, Vec<Row>>>,
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
    listeners: Listeners,
    next_listener: AtomicU64,
    gates: RwLock<HashMap<String, watch::Receiver<bool>>>,
    pending: AtomicUsize,
    failing: RwLock<HashSet<String>>,
    offline: AtomicBool,
}

/// Holds every query against one collection until released (or dropped).
pub struct QueryGate {
    tx: watch::Sender<bool>,
}

impl QueryGate {
    pub fn release(self) {}
}

impl Drop for QueryGate {
    fn drop(&mut self) {
        let _ = self.tx.send(false);
    }
}

struct MemorySubscription {
    id: u64,
    listeners: Listeners,
}

impl Subscription for MemorySubscription {
    fn unsubscribe(&self) {
        if self.listeners.write().remove(&self.id).is_some() {
            debug!(target: "storefront::backend", "listener {} removed", self.id);
        }
    }
}

fn gen_token() -> String {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

fn hash_password(password: &str) -> Result<String, BackendError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| BackendError::Auth(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| BackendError::Auth(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BackendError::Auth(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

impl Default for MemoryBackend {
    fn default() -> Self { Self::new("http://localhost:54321") }
}

impl MemoryBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            users: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            tables: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
            listeners: Arc::new(RwLock::new(BTreeMap::new())),
            next_listener: AtomicU64::new(1),
            gates: RwLock::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            failing: RwLock::new(HashSet::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Register a user with an argon2-hashed password. Emails are matched case-insensitively.
    pub fn add_user(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let key = email.trim().to_lowercase();
        if key.is_empty() {
            return Err(BackendError::Auth("email is empty".into()));
        }
        let identity = Identity { id: uuid::Uuid::new_v4().to_string(), email: Some(key.clone()) };
        let entry = UserEntry { identity: identity.clone(), password_hash: hash_password(password)? };
        self.users.write().insert(key, entry);
        Ok(identity)
    }

    /// Insert rows directly, bypassing failure and gate controls.
    pub fn seed(&self, collection: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables.write().entry(collection.to_string()).or_default().extend(rows);
    }

    /// Deliver a notification to every registered listener.
    pub fn emit(&self, change: AuthChange) {
        let handlers: Vec<AuthChangeHandler> = self.listeners.read().values().cloned().collect();
        debug!(target: "storefront::backend", "emit {:?} to {} listener(s)", change.kind, handlers.len());
        for h in handlers {
            h(change.clone());
        }
    }

    pub fn live_subscriptions(&self) -> usize { self.listeners.read().len() }

    /// Hold queries against `collection` until the returned gate is released or dropped.
    pub fn pause(&self, collection: &str) -> QueryGate {
        let (tx, rx) = watch::channel(true);
        self.gates.write().insert(collection.to_string(), rx);
        QueryGate { tx }
    }

    /// Number of queries currently held by a gate.
    pub fn pending_queries(&self) -> usize { self.pending.load(Ordering::SeqCst) }

    pub fn fail_collection(&self, collection: &str, failing: bool) {
        let mut f = self.failing.write();
        if failing { f.insert(collection.to_string()); } else { f.remove(collection); }
    }

    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }

    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.tables.read().get(collection).cloned().unwrap_or_default()
    }

    pub fn blob(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(&(bucket.to_string(), path.to_string())).cloned()
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Network("backend unreachable".into()));
        }
        Ok(())
    }

    async fn enter(&self, collection: &str) -> Result<(), BackendError> {
        let gate = self.gates.read().get(collection).cloned();
        if let Some(mut rx) = gate {
            self.pending.fetch_add(1, Ordering::SeqCst);
            let released = rx.wait_for(|paused| !*paused).await.is_ok();
            self.pending.fetch_sub(1, Ordering::SeqCst);
            if !released {
                debug!(target: "storefront::backend", "gate on '{}' dropped without release", collection);
            }
            let mut gates = self.gates.write();
            if gates.get(collection).map(|g| g.same_channel(&rx)).unwrap_or(false) {
                gates.remove(collection);
            }
        }
        self.check_online()?;
        if self.failing.read().contains(collection) {
            return Err(BackendError::Network(format!("{} unavailable", collection)));
        }
        Ok(())
    }
}

impl BackendClient for MemoryBackend {
    async fn get_current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        self.check_online()?;
        Ok(self.current.read().clone())
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, BackendError> {
        self.check_online()?;
        let key = credentials.email.trim().to_lowercase();
        let entry = self.users.read().get(&key).cloned();
        let Some(entry) = entry else { return Err(BackendError::Auth("invalid login credentials".into())) };
        if !verify_password(&entry.password_hash, &credentials.password) {
            return Err(BackendError::Auth("invalid login credentials".into()));
        }
        let session = AuthSession { access_token: gen_token(), user: entry.identity };
        *self.current.write() = Some(session.clone());
        debug!(target: "storefront::backend", "session issued user={}", session.user.id);
        self.emit(AuthChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.check_online()?;
        self.current.write().take();
        self.emit(AuthChange::signed_out());
        Ok(())
    }

    fn on_auth_state_change(&self, handler: AuthChangeHandler) -> Box<dyn Subscription> {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().insert(id, handler);
        Box::new(MemorySubscription { id, listeners: Arc::clone(&self.listeners) })
    }

    async fn query_rows(&self, collection: &str, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.enter(collection).await?;
        let mut rows: Vec<Row> = self
            .tables
            .read()
            .get(collection)
            .map(|t| t.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();
        query.sort(&mut rows);
        Ok(rows)
    }

    async fn insert_row(&self, collection: &str, row: Row) -> Result<Row, BackendError> {
        self.enter(collection).await?;
        let Value::Object(mut obj) = row else {
            return Err(BackendError::Storage(format!("{}: row must be an object", collection)));
        };
        obj.entry("id").or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        obj.entry("created_at").or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
        let stored = Value::Object(obj);
        self.tables.write().entry(collection.to_string()).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn update_rows(&self, collection: &str, query: &Query, patch: Row) -> Result<Vec<Row>, BackendError> {
        self.enter(collection).await?;
        let Value::Object(patch) = patch else {
            return Err(BackendError::Storage(format!("{}: patch must be an object", collection)));
        };
        let mut tables = self.tables.write();
        let mut updated = Vec::new();
        for row in tables.entry(collection.to_string()).or_default().iter_mut() {
            if !query.matches(row) { continue; }
            if let Value::Object(obj) = row {
                for (k, v) in patch.iter() {
                    obj.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete_rows(&self, collection: &str, query: &Query) -> Result<usize, BackendError> {
        self.enter(collection).await?;
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(collection) else { return Ok(0) };
        let before = rows.len();
        rows.retain(|r| !query.matches(r));
        Ok(before - rows.len())
    }

    async fn upload_blob(&self, bucket: &str, path: &str, content: Vec<u8>) -> Result<(), BackendError> {
        self.check_online().map_err(|e| BackendError::Storage(e.to_string()))?;
        if bucket.is_empty() || path.is_empty() {
            return Err(BackendError::Storage("bucket and path are required".into()));
        }
        let key = (bucket.to_string(), path.to_string());
        let mut blobs = self.blobs.write();
        if blobs.contains_key(&key) {
            return Err(BackendError::Storage(format!("{}/{} already exists", bucket, path)));
        }
        blobs.insert(key, content);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sign_in_checks_password_and_emits() {
        let backend = MemoryBackend::default();
        let user = backend.add_user("Ana@Shop.test", "secret").unwrap();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = backend.on_auth_state_change(Arc::new(move |c: AuthChange| sink.write().push(c.kind)));

        let err = backend.sign_in(&Credentials::new("ana@shop.test", "nope")).await.unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));

        let session = backend.sign_in(&Credentials::new("ana@shop.test", "secret")).await.unwrap();
        assert_eq!(session.user, user);
        assert!(session.access_token.len() >= 40);
        assert_eq!(backend.get_current_session().await.unwrap(), Some(session));

        backend.sign_out().await.unwrap();
        assert_eq!(backend.get_current_session().await.unwrap(), None);
        assert_eq!(seen.read().len(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let backend = MemoryBackend::default();
        let a = backend.on_auth_state_change(Arc::new(|_: AuthChange| {}));
        let _b = backend.on_auth_state_change(Arc::new(|_: AuthChange| {}));
        assert_eq!(backend.live_subscriptions(), 2);
        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(backend.live_subscriptions(), 1);
    }

    #[tokio::test]
    async fn row_operations() {
        let backend = MemoryBackend::default();
        let row = backend.insert_row("categories", json!({"name": "Shoes"})).await.unwrap();
        assert!(row["id"].is_string());
        assert!(row["created_at"].is_string());

        let q = Query::new().eq("id", row["id"].clone());
        let updated = backend.update_rows("categories", &q, json!({"name": "Boots"})).await.unwrap();
        assert_eq!(updated[0]["name"], "Boots");
        assert_eq!(backend.query_row("categories", &q).await.unwrap()["name"], "Boots");

        assert_eq!(backend.delete_rows("categories", &q).await.unwrap(), 1);
        let err = backend.query_row("categories", &q).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn failing_collection_and_offline() {
        let backend = MemoryBackend::default();
        backend.fail_collection("products", true);
        assert!(matches!(backend.query_rows("products", &Query::new()).await, Err(BackendError::Network(_))));
        backend.fail_collection("products", false);
        assert!(backend.query_rows("products", &Query::new()).await.unwrap().is_empty());

        backend.set_offline(true);
        assert!(backend.sign_out().await.is_err());
        assert!(matches!(backend.upload_blob("b", "p", vec![1]).await, Err(BackendError::Storage(_))));
    }

    #[tokio::test]
    async fn gate_holds_queries_until_released() {
        let backend = Arc::new(MemoryBackend::default());
        backend.seed("profiles", [json!({"id": "u1", "role": "admin"})]);
        let gate = backend.pause("profiles");
        let b = Arc::clone(&backend);
        let task = tokio::spawn(async move { b.query_rows("profiles", &Query::new()).await });
        while backend.pending_queries() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());
        gate.release();
        let rows = task.await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(backend.pending_queries(), 0);
    }

    #[test]
    fn public_url_layout() {
        let backend = MemoryBackend::new("https://example.test/");
        assert_eq!(
            backend.public_url("Products", "/Avatar/a.png"),
            "https://example.test/storage/v1/object/public/Products/Avatar/a.png"
        );
    }
}
