use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::backend::{BackendClient, PRODUCT_IMAGES};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: String,
    pub product_id: String,
    pub path: String,
    pub url: String,
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`, keeping the extension readable.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Upload an image for a product and record it in `product_images`.
///
/// Objects are stored under `<product_id>/<uuid>-<file name>` so repeated uploads of the
/// same file never collide.
pub async fn upload_product_image<B: BackendClient>(
    backend: &B,
    bucket: &str,
    product_id: &str,
    file_name: &str,
    content: Vec<u8>,
) -> Result<ProductImage, AppError> {
    if product_id.trim().is_empty() {
        return Err(AppError::user("invalid_upload", "product id is required"));
    }
    let clean = sanitize_file_name(file_name);
    if clean.is_empty() {
        return Err(AppError::user("invalid_upload".to_string(), format!("unusable file name '{}'", file_name)));
    }
    if content.is_empty() {
        return Err(AppError::user("invalid_upload", "image content is empty"));
    }

    let path = format!("{}/{}-{}", product_id, uuid::Uuid::new_v4(), clean);
    let size = content.len();
    backend.upload_blob(bucket, &path, content).await?;
    let url = backend.public_url(bucket, &path);
    let row = backend
        .insert_row(PRODUCT_IMAGES, json!({ "product_id": product_id, "path": path, "url": url }))
        .await?;
    let image: ProductImage = serde_json::from_value(row)?;
    info!(target: "storefront::catalog", "image uploaded product={} path={} bytes={}", product_id, image.path, size);
    Ok(image)
}
