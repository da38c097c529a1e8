use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::Category;
use crate::backend::{BackendClient, Direction, Query, Row, CATEGORIES};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Default)]
struct CategoryState {
    categories: Vec<Category>,
    loading: bool,
}

/// Admin-side category list with create/update/delete kept in sync with the backend.
pub struct CategoryStore<B: BackendClient> {
    backend: Arc<B>,
    state: RwLock<CategoryState>,
}

fn decode(row: Row) -> Result<Category, AppError> {
    Ok(serde_json::from_value(row)?)
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::user("invalid_category", "category name is required"));
    }
    Ok(())
}

impl<B: BackendClient> CategoryStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, state: RwLock::new(CategoryState::default()) }
    }

    pub fn categories(&self) -> Vec<Category> { self.state.read().categories.clone() }

    pub fn is_loading(&self) -> bool { self.state.read().loading }

    fn begin(&self) { self.state.write().loading = true; }

    fn finish<T>(&self, action: &str, result: Result<T, AppError>) -> Result<T, AppError> {
        self.state.write().loading = false;
        if let Err(e) = &result {
            error!(target: "storefront::catalog", "{} failed: {}", action, e);
        }
        result
    }

    /// Load all categories ordered by name.
    pub async fn fetch_categories(&self) -> Result<Vec<Category>, AppError> {
        self.begin();
        let result = async {
            let rows = self.backend.query_rows(CATEGORIES, &Query::new().order_by("name", Direction::Ascending)).await?;
            rows.into_iter().map(decode).collect::<Result<Vec<Category>, AppError>>()
        }
        .await;
        if let Ok(list) = &result {
            self.state.write().categories = list.clone();
        }
        self.finish("fetch categories", result)
    }

    pub async fn create_category(&self, new: NewCategory) -> Result<Category, AppError> {
        validate_name(&new.name)?;
        self.begin();
        let result = async {
            let row = self.backend.insert_row(CATEGORIES, serde_json::to_value(&new)?).await?;
            decode(row)
        }
        .await;
        if let Ok(c) = &result {
            self.state.write().categories.push(c.clone());
            info!(target: "storefront::catalog", "category created id={} name={}", c.id, c.name);
        }
        self.finish("create category", result)
    }

    /// Persist `category` and replace the local entry with the stored row.
    pub async fn update_category(&self, category: &Category) -> Result<Category, AppError> {
        validate_name(&category.name)?;
        self.begin();
        let result = async {
            let patch = json!({ "name": category.name, "icon": category.icon });
            let mut rows = self.backend.update_rows(CATEGORIES, &Query::new().eq("id", category.id.clone()), patch).await?;
            if rows.is_empty() {
                return Err(AppError::not_found("category_not_found".to_string(), format!("category '{}' does not exist", category.id)));
            }
            decode(rows.remove(0))
        }
        .await;
        if let Ok(updated) = &result {
            let mut s = self.state.write();
            if let Some(slot) = s.categories.iter_mut().find(|c| c.id == updated.id) {
                *slot = updated.clone();
            }
        }
        self.finish("update category", result)
    }

    pub async fn delete_category(&self, id: &str) -> Result<(), AppError> {
        self.begin();
        let result = async {
            let removed = self.backend.delete_rows(CATEGORIES, &Query::new().eq("id", id)).await?;
            if removed == 0 {
                return Err(AppError::not_found("category_not_found".to_string(), format!("category '{}' does not exist", id)));
            }
            Ok::<(), AppError>(())
        }
        .await;
        if result.is_ok() {
            self.state.write().categories.retain(|c| c.id != id);
        }
        self.finish("delete category", result)
    }
}
