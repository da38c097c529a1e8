//! Runtime configuration read from `STOREFRONT_*` environment variables.

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorefrontConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
    pub backend_url: String,
    pub products_bucket: String,
    /// Object path (inside `products_bucket`) of the placeholder product image.
    pub default_avatar: String,
    pub demo_email: String,
    pub demo_password: String,
}

impl Default for StorefrontConfig {
    fn default() -> Self { Self::from_lookup(|_| None) }
}

impl StorefrontConfig {
    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let get = |key: &str, default: &str| {
            lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
        };
        Self {
            log_filter: lookup("STOREFRONT_LOG").or_else(|| lookup("RUST_LOG")).unwrap_or_else(|| "info".to_string()),
            backend_url: get("STOREFRONT_BACKEND_URL", DEFAULT_BACKEND_URL),
            products_bucket: get("STOREFRONT_PRODUCTS_BUCKET", "Products"),
            default_avatar: get("STOREFRONT_DEFAULT_AVATAR", "Avatar/avatar-img-default.png"),
            demo_email: get("STOREFRONT_DEMO_EMAIL", "admin@storefront.test"),
            demo_password: get("STOREFRONT_DEMO_PASSWORD", "storefront"),
        }
    }
}
