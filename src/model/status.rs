use serde::{Deserialize, Serialize};

/// User-facing status of a tool, as reported by the cluster or an in-flight install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolStatus {
    #[serde(rename = "NOT DEPLOYED")]
    NotDeployed,
    #[serde(rename = "DEPLOYING")]
    Deploying,
    #[serde(rename = "READY")]
    Running,
    #[serde(rename = "IDLED")]
    Idle,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ToolStatus {
    /// Whether a release exists that can be opened.
    pub fn is_available(&self) -> bool {
        matches!(self, ToolStatus::Running | ToolStatus::Idle)
    }
}

/// Lifecycle of one install attempt.
///
/// `NotStarted -> Deploying -> {Complete, Failed}`; terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    NotStarted,
    Deploying,
    Complete,
    Failed,
}

impl InstallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallState::Complete | InstallState::Failed)
    }

    /// Status reported while the install handle still governs the answer.
    pub fn as_tool_status(&self) -> Option<ToolStatus> {
        match self {
            InstallState::NotStarted | InstallState::Deploying => Some(ToolStatus::Deploying),
            InstallState::Failed => Some(ToolStatus::Failed),
            InstallState::Complete => None,
        }
    }
}
