use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::{path::PathBuf, sync::Arc};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers,
    middleware::{require_admin_tier, require_super_admin},
    store::Store,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub uploads_dir: PathBuf,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, uploads_dir: PathBuf, secure_cookies: bool) -> Self {
        Self {
            store,
            uploads_dir,
            secure_cookies,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        // Users
        .route("/users", get(handlers::users::list_users).post(handlers::users::create_user))
        .route(
            "/users/:id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        // Roles
        .route("/roles", get(handlers::roles::list_roles).post(handlers::roles::create_role))
        .route(
            "/roles/:id",
            get(handlers::roles::get_role)
                .put(handlers::roles::update_role)
                .delete(handlers::roles::delete_role),
        )
        // Permissions
        .route(
            "/permissions",
            get(handlers::permissions::list_permissions)
                .post(handlers::permissions::create_permission),
        )
        .route(
            "/permissions/:id",
            get(handlers::permissions::get_permission)
                .put(handlers::permissions::update_permission)
                .delete(handlers::permissions::delete_permission),
        )
        // Packages
        .route(
            "/packages",
            get(handlers::packages::admin_list_packages).post(handlers::packages::create_package),
        )
        .route("/packages/:id", delete(handlers::packages::delete_package))
        // Leads
        .route("/leads", get(handlers::leads::list_leads))
        .route("/leads/:id", delete(handlers::leads::delete_lead))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_tier));

    // Reading copy is public, writing it needs superadmin
    let content_routes = get(handlers::content::get_content).merge(
        put(handlers::content::save_content)
            .route_layer(middleware::from_fn_with_state(state.clone(), require_super_admin)),
    );

    let uploads = ServeDir::new(state.uploads_dir.clone());

    Router::new()
        // Public pages
        .route("/", get(handlers::pages::home))
        .route("/packages", get(handlers::packages::list_packages))
        .route("/leads", post(handlers::leads::create_lead))
        .route("/content", content_routes)
        // Auth
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/register", post(handlers::auth::register))
        .nest("/admin", admin_routes)
        // Static files
        .nest_service("/uploads", uploads)
        .nest_service("/static", ServeDir::new("static"))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(25 * 1024 * 1024)),
        )
        .with_state(state)
}
