//! Libris library lending server
//!
//! REST JSON API over a PostgreSQL catalog of authors, books and members, with
//! transactional checkout, return and due-date extension, an overdue sweep and
//! e-mail notifications delivered from a Redis work queue.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authors
        .route("/authors", get(api::authors::list_authors).post(api::authors::create_author))
        .route(
            "/authors/:id",
            get(api::authors::get_author)
                .put(api::authors::update_author)
                .delete(api::authors::delete_author),
        )
        // Books
        .route("/books", get(api::books::list_books).post(api::books::create_book))
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        .route("/books/:id/loan", post(api::books::loan_book))
        .route("/books/:id/return", post(api::books::return_book))
        // Members
        .route("/members", get(api::members::list_members).post(api::members::create_member))
        .route("/members/top-active", get(api::members::top_active_members))
        .route(
            "/members/:id",
            get(api::members::get_member)
                .put(api::members::update_member)
                .delete(api::members::delete_member),
        )
        .route("/members/:id/loans", get(api::members::get_member_loans))
        // Loans
        .route("/loans", get(api::loans::list_loans))
        .route("/loans/:id", get(api::loans::get_loan))
        .route("/loans/:id/extend-due-date", post(api::loans::extend_due_date))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    /// Router over a lazy pool and an unconnected queue; no backing services are reached
    fn app() -> Router {
        let config = AppConfig::default();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        let queue = services::redis::RedisNotificationQueue::open(&config.redis.url, &config.redis.queue_prefix)
            .unwrap();
        let repository = repository::Repository::new(pool, config.database.lock_timeout_ms);
        let services = services::Services::new(repository, queue, config.loans.clone());

        create_router(AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }

    #[tokio::test]
    async fn health_is_served_under_api_prefix() {
        let response = app()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn loan_without_member_is_rejected() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/books/1/loan")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = app()
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
