use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Ringside Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::ServerEvent,
            crate::dto::ws::IdentificationPayload,
            crate::dto::projection::RingStateView,
            crate::dto::projection::ControllerRingView,
            crate::dto::projection::JudgeRingView,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "WebSocket operations for controllers and judges"),
    )
)]
pub struct ApiDoc;
