use serde::Serialize;

use super::{RouteMeta, RouteRecord};
use crate::identity::Role;

pub const HOME: &str = "home";
pub const LOGIN: &str = "login";
pub const PRODUCT_VIEW: &str = "product-view";
pub const ACCESS_DENIED: &str = "access-denied";
pub const ADMIN_DASHBOARD: &str = "admin-dashboard";
pub const PRODUCT_LIST: &str = "product-list";
pub const PRODUCT_CREATE: &str = "product-create";
pub const PRODUCT_EDIT: &str = "product-edit";
pub const CATEGORY_LIST: &str = "category-list";
pub const NOT_FOUND: &str = "not-found";

pub fn public_routes() -> RouteRecord {
    RouteRecord::new("/").children(vec![
        RouteRecord::new("").named(HOME),
        RouteRecord::new("login").named(LOGIN).guest_only(),
        RouteRecord::new("product/:id").named(PRODUCT_VIEW).meta(RouteMeta::titled("Product detail")),
        RouteRecord::new("access-denied").named(ACCESS_DENIED).meta(RouteMeta::titled("Access denied")),
    ])
}

/// Children of `/admin`; the admin layout supplies the auth and role constraints.
pub fn admin_routes() -> Vec<RouteRecord> {
    let admin = || RouteMeta::default().require_auth().allow_roles([Role::Admin]);
    vec![
        RouteRecord::new("").named(ADMIN_DASHBOARD).meta(RouteMeta { title: Some("Dashboard".into()), ..admin() }),
        RouteRecord::new("products").named(PRODUCT_LIST).meta(RouteMeta { title: Some("Products".into()), ..admin() }),
        RouteRecord::new("products/create").named(PRODUCT_CREATE).meta(RouteMeta { title: Some("New product".into()), ..admin() }),
        RouteRecord::new("products/:id/edit").named(PRODUCT_EDIT).meta(RouteMeta { title: Some("Edit product".into()), ..admin() }),
        RouteRecord::new("categories").named(CATEGORY_LIST).meta(RouteMeta { title: Some("Categories".into()), ..admin() }),
    ]
}

pub fn app_routes() -> Vec<RouteRecord> {
    vec![
        public_routes(),
        RouteRecord::new("/admin")
            .meta(RouteMeta::default().require_auth().allow_roles([Role::Admin]))
            .children(admin_routes()),
        RouteRecord::new("/:catchAll(.*)*").named(NOT_FOUND),
    ]
}

/// Entry in the admin layout's side navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavLink {
    pub title: &'static str,
    pub caption: &'static str,
    pub icon: &'static str,
    pub route_name: &'static str,
}

pub fn admin_links() -> Vec<NavLink> {
    vec![
        NavLink { title: "Dashboard", caption: "Overview", icon: "dashboard", route_name: ADMIN_DASHBOARD },
        NavLink { title: "Products", caption: "Catalog items", icon: "inventory_2", route_name: PRODUCT_LIST },
        NavLink { title: "Categories", caption: "Product groups", icon: "category", route_name: CATEGORY_LIST },
    ]
}
