use crate::handlers;
use crate::state::AppState;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_origin([
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://localhost:8080"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::COOKIE,
            axum::http::header::SET_COOKIE,
            axum::http::HeaderName::from_static("x-csrf-token"),
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderName::from_static("x-forwarded-for"),
        ]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/auth/login", post(handlers::login))
        .route("/api/v1/auth/logout", post(handlers::logout))
        .route("/api/v1/auth/me", get(handlers::me))
        .route("/api/v1/profile/name", post(handlers::set_student_name))
        .route("/api/v1/quizzes", get(handlers::list_quizzes))
        .route("/api/v1/session", get(handlers::session_view))
        .route("/api/v1/session/start", post(handlers::start_quiz))
        .route("/api/v1/session/answer", post(handlers::submit_answer))
        .route("/api/v1/session/goto", post(handlers::goto_question))
        .route("/api/v1/session/results", get(handlers::session_results))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
