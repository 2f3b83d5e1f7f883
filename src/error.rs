use thiserror::Error;

/// Failures surfaced by the deployment core.
///
/// Background install failures are not represented here: they are observed as
/// [`crate::model::InstallState::Failed`] when the install handle is polled.
#[derive(Debug, Error)]
pub enum DeploymentError {
    /// Missing, empty or expired credential. Never retried by the core.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The cluster backend could not be reached or rejected the operation.
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),

    /// The operation needs an existing release of the tool.
    #[error("{chart_name} is not deployed for {user}")]
    NotDeployed { user: String, chart_name: String },

    /// The chart repository index could not be fetched at all.
    #[error("chart index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("tool {0} is not in the catalogue")]
    UnknownTool(String),

    #[error("catalogue error: {0}")]
    Catalogue(#[source] anyhow::Error),
}

impl DeploymentError {
    /// Infrastructure failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeploymentError::ClusterUnavailable(_) | DeploymentError::IndexUnavailable(_)
        )
    }
}

pub type Result<T, E = DeploymentError> = std::result::Result<T, E>;
