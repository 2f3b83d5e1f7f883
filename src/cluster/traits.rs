use crate::error::Result;
use crate::model::{Credential, LiveDeployment, ToolDefinition, ToolStatus, User};

/// How a background operation finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
    /// Captured diagnostic output (stderr for CLI installs).
    pub output: String,
}

impl ProcessExit {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            code: Some(0),
            output: String::new(),
        }
    }

    pub fn failed(code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            output: output.into(),
        }
    }
}

/// Handle to a detached operation launched by the gateway.
pub trait BackgroundProcess: Send {
    /// Non-blocking check. `Ok(None)` while the operation is still running.
    fn try_wait(&mut self) -> std::io::Result<Option<ProcessExit>>;
}

/// Operations against the orchestration backend, per user and tool.
#[async_trait::async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn list_deployments(
        &self,
        user: &User,
        credential: &Credential,
    ) -> Result<Vec<LiveDeployment>>;

    /// Launch an install and return without waiting for it.
    async fn install(
        &self,
        user: &User,
        tool: &ToolDefinition,
    ) -> Result<Box<dyn BackgroundProcess>>;

    /// Idempotent: removing a missing release succeeds.
    async fn uninstall(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: &Credential,
    ) -> Result<()>;

    /// Fails with `NotDeployed` when no release exists.
    async fn restart(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: &Credential,
    ) -> Result<()>;

    async fn status(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: &Credential,
    ) -> Result<ToolStatus>;
}
