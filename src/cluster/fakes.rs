//! In-memory gateway and process doubles for unit tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::traits::{BackgroundProcess, ClusterGateway, ProcessExit};
use crate::error::{DeploymentError, Result};
use crate::model::{Credential, LiveDeployment, ToolDefinition, ToolStatus, User};

#[derive(Clone, Default)]
pub struct ProcessControl {
    exit: Arc<Mutex<Option<ProcessExit>>>,
    polls: Arc<AtomicUsize>,
}

impl ProcessControl {
    pub fn finish(&self, exit: ProcessExit) {
        *self.exit.lock() = Some(exit);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

struct ScriptedProcess(ProcessControl);

impl BackgroundProcess for ScriptedProcess {
    fn try_wait(&mut self) -> std::io::Result<Option<ProcessExit>> {
        self.0.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.exit.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    deployments: Mutex<Vec<LiveDeployment>>,
    status: Mutex<Option<ToolStatus>>,
    processes: Mutex<Vec<ProcessControl>>,
    install_delay: Option<Duration>,
    cluster_down: AtomicBool,
    installs: AtomicUsize,
    uninstalls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployments(self, deployments: Vec<LiveDeployment>) -> Self {
        *self.deployments.lock() = deployments;
        self
    }

    pub fn with_install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = Some(delay);
        self
    }

    pub fn set_status(&self, status: ToolStatus) {
        *self.status.lock() = Some(status);
    }

    pub fn set_cluster_down(&self, down: bool) {
        self.cluster_down.store(down, Ordering::SeqCst);
    }

    pub fn last_process(&self) -> Option<ProcessControl> {
        self.processes.lock().last().cloned()
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.uninstalls.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check_up(&self) -> Result<()> {
        if self.cluster_down.load(Ordering::SeqCst) {
            return Err(DeploymentError::ClusterUnavailable("connection refused".into()));
        }
        Ok(())
    }

    fn is_deployed(&self, chart_name: &str) -> bool {
        self.deployments
            .lock()
            .iter()
            .filter_map(LiveDeployment::chart)
            .any(|chart| chart.chart_name == chart_name)
    }
}

#[async_trait::async_trait]
impl ClusterGateway for FakeGateway {
    async fn list_deployments(&self, _user: &User, _credential: &Credential) -> Result<Vec<LiveDeployment>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        Ok(self.deployments.lock().clone())
    }

    async fn install(&self, _user: &User, _tool: &ToolDefinition) -> Result<Box<dyn BackgroundProcess>> {
        if let Some(delay) = self.install_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_up()?;
        self.installs.fetch_add(1, Ordering::SeqCst);
        let control = ProcessControl::default();
        self.processes.lock().push(control.clone());
        Ok(Box::new(ScriptedProcess(control)))
    }

    async fn uninstall(&self, _user: &User, tool: &ToolDefinition, _credential: &Credential) -> Result<()> {
        self.check_up()?;
        self.uninstalls.fetch_add(1, Ordering::SeqCst);
        self.deployments
            .lock()
            .retain(|d| d.chart().map(|c| c.chart_name != tool.chart_name).unwrap_or(true));
        Ok(())
    }

    async fn restart(&self, user: &User, tool: &ToolDefinition, _credential: &Credential) -> Result<()> {
        self.check_up()?;
        if !self.is_deployed(&tool.chart_name) {
            return Err(DeploymentError::NotDeployed {
                user: user.slug.clone(),
                chart_name: tool.chart_name.clone(),
            });
        }
        Ok(())
    }

    async fn status(&self, _user: &User, tool: &ToolDefinition, _credential: &Credential) -> Result<ToolStatus> {
        self.check_up()?;
        if let Some(status) = *self.status.lock() {
            return Ok(status);
        }
        Ok(if self.is_deployed(&tool.chart_name) {
            ToolStatus::Running
        } else {
            ToolStatus::NotDeployed
        })
    }
}
