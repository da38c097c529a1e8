//! Catalog state loaded through the backend's row API: categories, products and product
//! images.

mod categories;
mod media;
mod products;

use serde::{Deserialize, Deserializer, Serialize};

pub use categories::{CategoryStore, NewCategory};
pub use media::{sanitize_file_name, upload_product_image, ProductImage};
pub use products::{Product, ProductStore};

// Hosted tables key rows by text (uuid) or by int8; both are kept as their text form.
#[derive(Deserialize)]
#[serde(untagged)]
enum RowId {
    Text(String),
    Int(i64),
    UInt(u64),
}

impl RowId {
    fn into_text(self) -> String {
        match self {
            RowId::Text(s) => s,
            RowId::Int(n) => n.to_string(),
            RowId::UInt(n) => n.to_string(),
        }
    }
}

pub(crate) fn row_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RowId::deserialize(d).map(RowId::into_text)
}

pub(crate) fn opt_row_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<RowId>::deserialize(d).map(|id| id.map(RowId::into_text))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(deserialize_with = "row_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Category summary embedded in a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(deserialize_with = "row_id")]
    pub id: String,
    pub name: String,
}
