use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::Row;
use crate::error::AppError;

/// Authenticated principal as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Result<Self, AppError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::auth("invalid_identity", "identity id is empty"));
        }
        Ok(Self { id, email })
    }
}

/// Authorization tag. Membership checks only; there is no hierarchy between roles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Admin,
    Guest,
    Named(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Guest => "guest",
            Role::Named(n) => n.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let well_formed = !s.is_empty()
            && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !well_formed {
            return Err(AppError::profile_load("profile_malformed".to_string(), format!("invalid role '{}'", s)));
        }
        Ok(match s {
            "admin" => Role::Admin,
            "guest" => Role::Guest,
            other => Role::Named(other.to_string()),
        })
    }
}

impl TryFrom<String> for Role {
    type Error = AppError;
    fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<Role> for String {
    fn from(r: Role) -> Self { r.as_str().to_string() }
}

/// Application-level record extending an [`Identity`] with display name and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: Role,
}

// Wire shape of a `profiles` row.
#[derive(Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default)]
    full_name: Option<String>,
    role: String,
}

impl Profile {
    /// Decode and validate a `profiles` row for `owner`.
    pub fn from_row(row: &Row, owner: &Identity) -> Result<Self, AppError> {
        let raw: ProfileRow = serde_json::from_value(row.clone())
            .map_err(|e| AppError::profile_load("profile_malformed".to_string(), e.to_string()))?;
        if raw.id != owner.id {
            return Err(AppError::profile_load(
                "profile_mismatch".to_string(),
                format!("profile row id '{}' does not belong to '{}'", raw.id, owner.id),
            ));
        }
        let role: Role = raw.role.parse()?;
        Ok(Profile { id: raw.id, display_name: raw.full_name, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> Identity { Identity::new("u1", Some("a@b.com".into())).unwrap() }

    #[test]
    fn role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" guest ".parse::<Role>().unwrap(), Role::Guest);
        assert_eq!("editor".parse::<Role>().unwrap(), Role::Named("editor".into()));
        assert!("".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
        assert!("drop table".parse::<Role>().is_err());
    }

    #[test]
    fn role_serde_is_a_plain_string() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), json!("admin"));
        let r: Role = serde_json::from_value(json!("seller")).unwrap();
        assert_eq!(r, Role::Named("seller".into()));
        assert!(serde_json::from_value::<Role>(json!("")).is_err());
    }

    #[test]
    fn profile_from_valid_row() {
        let p = Profile::from_row(&json!({"id": "u1", "full_name": "Ana", "role": "admin"}), &owner()).unwrap();
        assert_eq!(p.role, Role::Admin);
        assert_eq!(p.display_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn profile_without_name_is_accepted() {
        let p = Profile::from_row(&json!({"id": "u1", "full_name": null, "role": "guest"}), &owner()).unwrap();
        assert_eq!(p.display_name, None);
        assert_eq!(p.role, Role::Guest);
    }

    #[test]
    fn profile_rejects_unexpected_shapes() {
        let e = Profile::from_row(&json!({"id": "u1", "full_name": "Ana"}), &owner()).unwrap_err();
        assert_eq!(e.code_str(), "profile_malformed");
        let e = Profile::from_row(&json!({"id": "u1", "role": 7}), &owner()).unwrap_err();
        assert_eq!(e.code_str(), "profile_malformed");
        let e = Profile::from_row(&json!(["u1", "admin"]), &owner()).unwrap_err();
        assert_eq!(e.code_str(), "profile_malformed");
    }

    #[test]
    fn profile_for_another_identity_is_rejected() {
        let e = Profile::from_row(&json!({"id": "u2", "role": "admin"}), &owner()).unwrap_err();
        assert_eq!(e.code_str(), "profile_mismatch");
    }

    #[test]
    fn identity_requires_an_id() {
        assert!(Identity::new("  ", None).is_err());
        assert_eq!(Identity::new("u1", None).unwrap().id, "u1");
    }
}
