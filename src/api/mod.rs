mod handlers;

pub use handlers::{ErrorBody, WeekStartResponse, USER_ID_HEADER, USER_ROLE_HEADER};

use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::scheduling::Scheduler;

/// Router with permissive CORS.
pub fn create_router(scheduler: Scheduler) -> Router {
    create_router_with_cors(scheduler, None)
}

/// Router that only admits the given origins, or any origin when `None`.
pub fn create_router_with_cors(scheduler: Scheduler, cors_origins: Option<&[String]>) -> Router {
    let api = Router::new()
        // Templates
        .route(
            "/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/templates/{id}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::archive_template),
        )
        .route(
            "/templates/{id}/schedules/{week}",
            get(handlers::get_schedule),
        )
        // Schedules
        .route(
            "/schedules",
            get(handlers::list_schedules).post(handlers::materialize_week),
        )
        .route("/weeks/{week}/overview", get(handlers::week_overview))
        .route("/calendar/week-start", get(handlers::week_start))
        // Session instances
        .route("/instances/{id}", get(handlers::get_instance))
        .route("/instances/{id}/sheet", get(handlers::session_sheet))
        .route(
            "/instances/{id}/feedback",
            get(handlers::get_feedback).put(handlers::record_feedback),
        )
        .route(
            "/instances/{id}/feedback/from-template",
            post(handlers::apply_feedback_template),
        )
        // Feedback templates
        .route(
            "/feedback-templates",
            get(handlers::list_feedback_templates).post(handlers::create_feedback_template),
        )
        .route(
            "/feedback-templates/{id}",
            delete(handlers::delete_feedback_template),
        )
        // Attendance
        .route(
            "/attendance",
            get(handlers::get_attendance).post(handlers::record_attendance),
        )
        // Athletes
        .route("/athletes/{id}/stats", get(handlers::attendance_stats))
        .route("/athletes/{id}/training-log", get(handlers::training_log))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(scheduler)
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = origins else {
        return CorsLayer::permissive();
    };

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
