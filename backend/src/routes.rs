// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{MethodRouter, get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    handlers::{auth, posts},
    state::AppState,
    utils::{security::security_headers, session::session_layer},
};

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .frontend_url
        .parse::<HeaderValue>()
        .into_iter()
        .collect();
    if origins.is_empty() {
        tracing::warn!("FRONTEND_URL '{}' is not a valid origin", config.frontend_url);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Assembles the main application router.
///
/// * Auth routes (Microsoft login, session user, stubs).
/// * Post routes; `/posts` and `/posts/` are both the collection.
/// * Global middleware: Trace, CORS, security headers, cookie sessions.
pub fn create_router(state: AppState) -> Router {
    let auth_routes: Router<AppState> = Router::new()
        .route("/", get(auth::index))
        .route("/login", get(auth::login_page))
        .route("/auth/microsoft", get(auth::microsoft_login))
        .route("/auth/microsoft/callback", get(auth::microsoft_callback))
        .route("/api/user", get(auth::current_user))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout));

    let collection: MethodRouter<AppState> = get(posts::get_posts)
        .post(posts::create_post)
        .put(posts::reject_collection)
        .patch(posts::reject_collection)
        .delete(posts::reject_collection);

    let post_routes: Router<AppState> = Router::new()
        .route("/posts", collection.clone())
        .route("/posts/", collection)
        .route(
            "/posts/{id}",
            get(posts::get_posts)
                .put(posts::update_post)
                .patch(posts::patch_post)
                .delete(posts::delete_post),
        );

    // Outermost first
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .layer(middleware::from_fn(security_headers))
        .layer(session_layer(state.sessions.clone(), &state.config));

    Router::new()
        .merge(auth_routes)
        .merge(post_routes)
        .layer(middleware_stack)
        .with_state(state)
}
