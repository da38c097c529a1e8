//! Backend client capability: identity provider, row API and blob storage.
//!
//! The hosted backend-as-a-service is an external collaborator. Everything in this crate
//! talks to it through [`BackendClient`]; [`MemoryBackend`] is the in-process implementation
//! used by tests and the demo binary.

mod memory;

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::identity::Identity;

pub use memory::{MemoryBackend, QueryGate};

/// Untyped row as returned by the data API. Decode with serde at the boundary.
pub type Row = Value;

pub const PROFILES: &str = "profiles";
pub const PRODUCTS: &str = "products";
pub const CATEGORIES: &str = "categories";
pub const PRODUCT_IMAGES: &str = "product_images";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("auth: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("network: {0}")]
    Network(String),
    #[error("storage: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

/// Live session as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub user: Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthChangeKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub kind: AuthChangeKind,
    pub session: Option<AuthSession>,
}

impl AuthChange {
    pub fn signed_in(session: AuthSession) -> Self { Self { kind: AuthChangeKind::SignedIn, session: Some(session) } }
    pub fn signed_out() -> Self { Self { kind: AuthChangeKind::SignedOut, session: None } }
}

pub type AuthChangeHandler = Arc<dyn Fn(AuthChange) + Send + Sync>;

/// Handle for a registered change handler. `unsubscribe` must be idempotent.
pub trait Subscription: Send + Sync {
    fn unsubscribe(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters plus an optional ordering column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub eq: Vec<(String, Value)>,
    pub order: Option<(String, Direction)>,
}

impl Query {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    /// Numbers and their decimal text compare equal, as with the hosted filter syntax.
    pub fn matches(&self, row: &Row) -> bool {
        self.eq.iter().all(|(col, want)| row.get(col).map(|have| loosely_equal(have, want)).unwrap_or(false))
    }

    /// Sort rows in place by the ordering column, if any. Mixed or missing values compare equal.
    pub fn sort(&self, rows: &mut [Row]) {
        let Some((col, dir)) = &self.order else { return };
        rows.sort_by(|a, b| {
            let ord = compare_values(a.get(col), b.get(col));
            match dir {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => n.to_string() == *s,
        _ => a == b,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => Ordering::Equal,
    }
}

/// Capability interface over the hosted backend.
///
/// Implementations must be thread-safe (`Send + Sync`); all async operations return `Send`
/// futures so callers can spawn them on a multi-threaded runtime.
pub trait BackendClient: Send + Sync {
    fn get_current_session(&self) -> impl Future<Output = Result<Option<AuthSession>, BackendError>> + Send;

    /// # Errors
    ///
    /// Returns `BackendError::Auth` on invalid credentials.
    fn sign_in(&self, credentials: &Credentials) -> impl Future<Output = Result<AuthSession, BackendError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Register a change handler. The handler stays registered until the returned
    /// subscription is cancelled.
    fn on_auth_state_change(&self, handler: AuthChangeHandler) -> Box<dyn Subscription>;

    fn query_rows(&self, collection: &str, query: &Query) -> impl Future<Output = Result<Vec<Row>, BackendError>> + Send;

    /// Fetch exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` unless exactly one row matches.
    fn query_row(&self, collection: &str, query: &Query) -> impl Future<Output = Result<Row, BackendError>> + Send {
        async move {
            let mut rows = self.query_rows(collection, query).await?;
            if rows.len() != 1 {
                return Err(BackendError::NotFound(format!("{}: expected 1 row, got {}", collection, rows.len())));
            }
            Ok(rows.remove(0))
        }
    }

    /// Insert a row and return it as stored (with generated columns filled in).
    fn insert_row(&self, collection: &str, row: Row) -> impl Future<Output = Result<Row, BackendError>> + Send;

    /// Merge `patch` into every matching row; returns the updated rows.
    fn update_rows(&self, collection: &str, query: &Query, patch: Row) -> impl Future<Output = Result<Vec<Row>, BackendError>> + Send;

    /// Returns the number of deleted rows.
    fn delete_rows(&self, collection: &str, query: &Query) -> impl Future<Output = Result<usize, BackendError>> + Send;

    fn upload_blob(&self, bucket: &str, path: &str, content: Vec<u8>) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}
