use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;

use crate::api::user_extractor::RequestIdentity;
use crate::error::DeploymentError;
use crate::logic::{DeploymentRecord, InstallClaim, Reconciler};
use crate::model::ToolStatus;

pub type AppState = Arc<Reconciler>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub installs_tracked: usize,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ToolDeploymentResponse {
    pub chart_name: String,
    pub name: String,
    pub description: String,
    pub catalogue_version: String,
    pub deployed_chart_version: Option<String>,
    pub outdated: bool,
    pub app_version: Option<String>,
    pub url: String,
}

impl ToolDeploymentResponse {
    async fn from_record(record: &DeploymentRecord) -> Self {
        Self {
            chart_name: record.tool.chart_name.clone(),
            name: record.tool.name.clone(),
            description: record.tool.description.clone(),
            catalogue_version: record.catalogue_version().to_string(),
            deployed_chart_version: record.deployed_chart_version.clone(),
            outdated: record.outdated(),
            app_version: record.resolved_app_version().await,
            url: record.url(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub status: ToolStatus,
    pub already_running: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: ToolStatus,
    pub app_version: Option<String>,
}

impl IntoResponse for DeploymentError {
    fn into_response(self) -> Response {
        let status = match &self {
            DeploymentError::Authentication(_) => StatusCode::UNAUTHORIZED,
            DeploymentError::NotDeployed { .. } => StatusCode::CONFLICT,
            DeploymentError::UnknownTool(_) => StatusCode::NOT_FOUND,
            DeploymentError::ClusterUnavailable(_) | DeploymentError::IndexUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DeploymentError::Catalogue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        installs_tracked: state.registry().len(),
    })
}

pub async fn list_tools(
    State(state): State<AppState>,
    identity: RequestIdentity,
) -> Result<Json<ListResponse<ToolDeploymentResponse>>, DeploymentError> {
    let records = state
        .list_deployments(&identity.user, identity.credential.as_ref())
        .await?;

    let mut items = Vec::with_capacity(records.len());
    for record in &records {
        items.push(ToolDeploymentResponse::from_record(record).await);
    }

    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}

pub async fn deploy_tool(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(chart_name): Path<String>,
) -> Result<(StatusCode, Json<DeployResponse>), DeploymentError> {
    let record = state
        .get_deployment(&identity.user, identity.credential.as_ref(), &chart_name)
        .await?;
    let claim = record.install().await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeployResponse {
            status: ToolStatus::Deploying,
            already_running: claim == InstallClaim::AlreadyRunning,
        }),
    ))
}

pub async fn get_deployment_status(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(chart_name): Path<String>,
) -> Result<Json<StatusResponse>, DeploymentError> {
    let status = state
        .deployment_status(&identity.user, identity.credential.as_ref(), &chart_name)
        .await?;
    let app_version = if status.is_available() {
        match state
            .get_deployment(&identity.user, identity.credential.as_ref(), &chart_name)
            .await
        {
            Ok(record) => record.resolved_app_version().await,
            Err(e) => {
                log::warn!("Unable to read deployed version of {}: {}", chart_name, e);
                None
            }
        }
    } else {
        None
    };

    Ok(Json(StatusResponse {
        status,
        app_version,
    }))
}

pub async fn restart_deployment(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(chart_name): Path<String>,
) -> Result<StatusCode, DeploymentError> {
    let record = state
        .get_deployment(&identity.user, identity.credential.as_ref(), &chart_name)
        .await?;
    record.restart(identity.credential.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_deployment(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(chart_name): Path<String>,
) -> Result<StatusCode, DeploymentError> {
    let record = state
        .get_deployment(&identity.user, identity.credential.as_ref(), &chart_name)
        .await?;
    record.delete(identity.credential.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
