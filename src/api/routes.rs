use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Reconciled catalogue for the calling user
        .route("/tools", get(handlers::list_tools))
        // Per-tool deployment lifecycle
        .route(
            "/tools/:chart_name/deployment",
            get(handlers::get_deployment_status)
                .post(handlers::deploy_tool)
                .delete(handlers::delete_deployment),
        )
        .route(
            "/tools/:chart_name/deployment/restart",
            post(handlers::restart_deployment),
        )
}
