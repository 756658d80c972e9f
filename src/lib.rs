// Library root for the Yatube blog

pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod media;
pub mod middleware;
pub mod models;
pub mod paginator;
pub mod store;
pub mod templates;

// Re-export commonly used types
pub use app::{create_router, AppState};
pub use error::{AppError, AppResult};
pub use store::{Database, MemoryStore, PostScope, Store};
