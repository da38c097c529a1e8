use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use storefront::backend::{BackendClient, Credentials, MemoryBackend, CATEGORIES, PRODUCTS, PROFILES};
use storefront::catalog::ProductStore;
use storefront::config::StorefrontConfig;
use storefront::identity::SessionStore;
use storefront::router::Router;

fn seed(backend: &MemoryBackend, cfg: &StorefrontConfig) -> anyhow::Result<()> {
    let admin = backend.add_user(&cfg.demo_email, &cfg.demo_password)?;
    backend.seed(PROFILES, [json!({ "id": admin.id, "full_name": "Store admin", "role": "admin" })]);
    backend.seed(CATEGORIES, [
        json!({ "id": "c1", "name": "Coffee", "icon": "coffee" }),
        json!({ "id": "c2", "name": "Tea", "icon": "emoji_food_beverage" }),
    ]);
    backend.seed(PRODUCTS, [
        json!({ "id": "p1", "name": "Espresso beans", "price": 12.5, "category_id": "c1", "avatar_url": "" }),
        json!({ "id": "p2", "name": "Green tea", "price": 6, "category_id": "c2" }),
    ]);
    Ok(())
}

async fn walk(router: &Router, store: &SessionStore<MemoryBackend>, paths: &[String]) {
    for path in paths {
        match router.navigate(path, store).await {
            Ok(nav) => info!(
                target: "storefront",
                "{} -> {} ({}){}",
                path,
                nav.route.path,
                nav.name().unwrap_or("-"),
                if nav.is_redirected() { " [redirected]" } else { "" }
            ),
            Err(e) => warn!(target: "storefront", "{} -> error {}", path, e),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = StorefrontConfig::from_env();
    let filter = EnvFilter::try_new(&cfg.log_filter).or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    info!(
        target: "storefront",
        "storefront starting: backend='{}', bucket='{}', log='{}'",
        cfg.backend_url, cfg.products_bucket, cfg.log_filter
    );

    let backend = Arc::new(MemoryBackend::new(cfg.backend_url.clone()));
    seed(&backend, &cfg)?;

    let store = Arc::new(SessionStore::new(Arc::clone(&backend)));
    store.initialize().await?;
    let router = Router::with_app_routes()?;

    let products = ProductStore::new(Arc::clone(&backend), backend.public_url(&cfg.products_bucket, &cfg.default_avatar));
    for p in products.fetch_all_products().await? {
        info!(target: "storefront", "product {} '{}' category={:?} avatar={:?}", p.id, p.name, p.category.map(|c| c.name), p.avatar_url);
    }

    let mut paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        paths = vec!["/".into(), "/admin".into(), "/login".into(), "/product/p1".into()];
    }

    info!(target: "storefront", "anonymous navigation");
    walk(&router, &store, &paths).await;

    let who = store.sign_in(&Credentials::new(cfg.demo_email.clone(), cfg.demo_password.clone())).await?;
    info!(target: "storefront", "signed in as {} role={}", who.email.as_deref().unwrap_or(&who.id), store.effective_role());
    walk(&router, &store, &paths).await;

    store.sign_out().await?;
    Ok(())
}
