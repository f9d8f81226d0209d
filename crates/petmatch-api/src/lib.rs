//! # petmatch-api
//!
//! HTTP surface of petmatch: report submission, photo search, record
//! browsing, the owner mailbox and maintenance endpoints.

pub mod config;
pub mod error;
pub mod form;
pub mod handlers;
pub mod state;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, Method},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

pub use config::{AppConfig, ServerConfig};
pub use error::ApiError;
pub use state::{AppState, Services};

use handlers::{admin, notifications, records, search};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// OPENAPI
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "petmatch API",
        description = "Lost and found pet reports with photo matching"
    ),
    paths(
        records::create_record,
        records::get_record,
        records::list_records,
        records::update_record_status,
        search::search,
        notifications::list_notifications,
        notifications::mark_notification_read,
        admin::backfill_signatures,
    ),
    components(schemas(records::UpdateStatusRequest)),
    tags(
        (name = "Records", description = "Lost and found reports"),
        (name = "Search", description = "Photo matching"),
        (name = "Notifications", description = "Owner mailbox"),
        (name = "Admin", description = "Maintenance"),
    )
)]
pub struct ApiDoc;

// =============================================================================
// ROUTER
// =============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "embedding_model": state.embedding_model,
        "task_mode": state.config.pipeline.task_mode,
    }))
}

/// API routes without the filesystem image route.
pub fn api_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.server.max_upload_bytes;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            state.config.server.allowed_origins.clone(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/api/v1/records",
            get(records::list_records).post(records::create_record),
        )
        .route("/api/v1/records/:id", get(records::get_record))
        .route(
            "/api/v1/records/:id/status",
            patch(records::update_record_status),
        )
        .route("/api/v1/search", post(search::search))
        .route(
            "/api/v1/notifications",
            get(notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications/:id/read",
            post(notifications::mark_notification_read),
        )
        .route(
            "/api/v1/admin/backfill-signatures",
            post(admin::backfill_signatures),
        )
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

/// Full application: API routes plus `/images` served from the image store.
pub fn router(state: AppState) -> Router {
    let images = ServeDir::new(&state.config.server.image_storage_path);
    api_router(state).nest_service("/images", images)
}
