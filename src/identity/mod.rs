//! Identity, profile and the session state store kept in sync with the backend's
//! identity provider.

mod principal;
mod session;

pub use principal::{Identity, Profile, Role};
pub use session::{SessionSnapshot, SessionStore};
