// Application wiring
// Shared state and the router with every page and middleware

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::{
    cache::PageCache,
    config::SiteConfig,
    handlers::{
        self,
        auth::{login, login_form, logout, signup, signup_form},
        posts::{
            add_comment, follow_index, group_posts, index, post_create, post_create_form,
            post_detail, post_edit, post_edit_form, profile, profile_follow, profile_unfollow,
        },
    },
    media::MediaStorage,
    middleware::create_middleware_stack,
    paginator::Paginator,
    store::Store,
};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: PageCache,
    pub media: MediaStorage,
    pub paginator: Paginator,
    pub site: Arc<SiteConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, site: SiteConfig) -> Self {
        AppState {
            store,
            cache: PageCache::new(site.index_cache_ttl),
            media: MediaStorage::new(site.media_root.clone()),
            paginator: Paginator::new(site.posts_per_page),
            site: Arc::new(site),
        }
    }
}

/// Create the Axum router with all pages and middleware
pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(state.media.root());
    let body_limit = state.site.max_upload_bytes;
    let request_timeout = state.site.request_timeout;

    Router::new()
        // Health check endpoint
        .route("/health", get(handlers::health_check))
        // Feeds
        .route("/", get(index))
        .route("/group/:slug/", get(group_posts))
        .route("/profile/:username/", get(profile))
        .route("/follow/", get(follow_index))
        // Posts
        .route("/create/", get(post_create_form).post(post_create))
        .route("/posts/:post_id/", get(post_detail))
        .route("/posts/:post_id/edit/", get(post_edit_form).post(post_edit))
        .route("/posts/:post_id/add_comment/", post(add_comment))
        // Follows
        .route("/profile/:username/follow/", get(profile_follow))
        .route("/profile/:username/unfollow/", get(profile_unfollow))
        // Accounts
        .route("/auth/signup/", get(signup_form).post(signup))
        .route("/auth/login/", get(login_form).post(login))
        .route("/auth/logout/", get(logout))
        // Uploaded images
        .nest_service("/media", media)
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(create_middleware_stack(request_timeout))
}
