use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::{Category, CategoryRef};
use crate::backend::{BackendClient, Query, Row, CATEGORIES, PRODUCTS};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "super::row_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "super::opt_row_id")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    /// Columns not modelled above, kept as returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default)]
struct ProductState {
    products: Vec<Product>,
    categories: Vec<Category>,
    selected_category: Option<String>,
    loading: bool,
    error: Option<String>,
}

/// Public storefront view of the catalog: products with their category, plus the
/// category filter.
pub struct ProductStore<B: BackendClient> {
    backend: Arc<B>,
    default_avatar_url: String,
    state: RwLock<ProductState>,
}

fn decode_rows<T: for<'de> Deserialize<'de>>(rows: Vec<Row>) -> Result<Vec<T>, AppError> {
    rows.into_iter().map(|r| serde_json::from_value(r).map_err(AppError::from)).collect()
}

impl<B: BackendClient> ProductStore<B> {
    pub fn new(backend: Arc<B>, default_avatar_url: impl Into<String>) -> Self {
        Self { backend, default_avatar_url: default_avatar_url.into(), state: RwLock::new(ProductState::default()) }
    }

    pub fn products(&self) -> Vec<Product> { self.state.read().products.clone() }

    pub fn categories(&self) -> Vec<Category> { self.state.read().categories.clone() }

    pub fn is_loading(&self) -> bool { self.state.read().loading }

    pub fn error(&self) -> Option<String> { self.state.read().error.clone() }

    pub fn selected_category(&self) -> Option<String> { self.state.read().selected_category.clone() }

    fn begin(&self) {
        let mut s = self.state.write();
        s.loading = true;
        s.error = None;
    }

    fn finish<T>(&self, action: &str, result: Result<T, AppError>) -> Result<T, AppError> {
        let mut s = self.state.write();
        s.loading = false;
        if let Err(e) = &result {
            error!(target: "storefront::catalog", "{} failed: {}", action, e);
            s.error = Some(e.message().to_string());
        }
        result
    }

    /// Load every product together with the category list, attach each product's
    /// category and fill in the default avatar where none is set.
    pub async fn fetch_all_products(&self) -> Result<Vec<Product>, AppError> {
        self.begin();
        let result = async {
            let (product_rows, category_rows) = try_join(
                self.backend.query_rows(PRODUCTS, &Query::new()),
                self.backend.query_rows(CATEGORIES, &Query::new()),
            )
            .await?;
            let categories: Vec<Category> = decode_rows(category_rows)?;
            let mut products: Vec<Product> = decode_rows(product_rows)?;
            let by_id: HashMap<&str, &Category> = categories.iter().map(|c| (c.id.as_str(), c)).collect();
            for p in products.iter_mut() {
                if let Some(c) = p.category_id.as_deref().and_then(|id| by_id.get(id)) {
                    p.category = Some(CategoryRef { id: c.id.clone(), name: c.name.clone() });
                }
                if p.avatar_url.as_deref().map(str::is_empty).unwrap_or(true) {
                    p.avatar_url = Some(self.default_avatar_url.clone());
                }
            }
            Ok::<Vec<Product>, AppError>(products)
        }
        .await;
        if let Ok(list) = &result {
            debug!(target: "storefront::catalog", "loaded {} product(s)", list.len());
            self.state.write().products = list.clone();
        }
        self.finish("fetch products", result)
    }

    pub async fn fetch_all_categories(&self) -> Result<Vec<Category>, AppError> {
        self.begin();
        let result = async {
            let rows = self.backend.query_rows(CATEGORIES, &Query::new()).await?;
            decode_rows::<Category>(rows)
        }
        .await;
        if let Ok(list) = &result {
            self.state.write().categories = list.clone();
        }
        self.finish("fetch categories", result)
    }

    /// `None` shows every product.
    pub fn set_selected_category(&self, category_id: Option<String>) {
        self.state.write().selected_category = category_id;
    }

    pub fn filtered_products(&self) -> Vec<Product> {
        let s = self.state.read();
        match &s.selected_category {
            None => s.products.clone(),
            Some(sel) => s
                .products
                .iter()
                .filter(|p| p.category.as_ref().map(|c| &c.id == sel).unwrap_or(false))
                .cloned()
                .collect(),
        }
    }

    pub fn find_product(&self, id: &str) -> Option<Product> {
        self.state.read().products.iter().find(|p| p.id == id).cloned()
    }
}
