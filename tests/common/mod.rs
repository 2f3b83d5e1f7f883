use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tool_deployments::error::{DeploymentError, Result};
use tool_deployments::{
    AppVersionResolver, BackgroundProcess, ClusterGateway, Credential, DeploymentHealth,
    InMemoryCatalogue, InstallRegistry, LiveDeployment, ProcessExit, Reconciler, ToolDefinition,
    ToolStatus, User,
};

#[derive(Clone, Default)]
pub struct ProcessSwitch(Arc<Mutex<Option<ProcessExit>>>);

impl ProcessSwitch {
    pub fn finish(&self, exit: ProcessExit) {
        *self.0.lock() = Some(exit);
    }
}

impl BackgroundProcess for ProcessSwitch {
    fn try_wait(&mut self) -> std::io::Result<Option<ProcessExit>> {
        Ok(self.0.lock().clone())
    }
}

/// Cluster double: one namespace holding releases by chart label.
#[derive(Default)]
pub struct ClusterDouble {
    pub releases: Mutex<Vec<LiveDeployment>>,
    pub processes: Mutex<Vec<ProcessSwitch>>,
    pub installs: AtomicUsize,
    pub expected_token: Mutex<Option<String>>,
}

impl ClusterDouble {
    pub fn with_releases(labels: &[&str]) -> Arc<Self> {
        let double = Self::default();
        *double.releases.lock() = labels
            .iter()
            .map(|label| LiveDeployment::new(label, DeploymentHealth::Running))
            .collect();
        Arc::new(double)
    }

    pub fn last_process(&self) -> ProcessSwitch {
        self.processes.lock().last().cloned().expect("no install launched")
    }

    fn authorize(&self, credential: &Credential) -> Result<()> {
        match self.expected_token.lock().as_deref() {
            Some(expected) if expected != credential.token => {
                Err(DeploymentError::Authentication("Unauthorized".into()))
            }
            _ => Ok(()),
        }
    }

    fn has_release(&self, chart_name: &str) -> bool {
        self.releases
            .lock()
            .iter()
            .filter_map(LiveDeployment::chart)
            .any(|chart| chart.chart_name == chart_name)
    }
}

#[async_trait::async_trait]
impl ClusterGateway for ClusterDouble {
    async fn list_deployments(&self, _user: &User, credential: &Credential) -> Result<Vec<LiveDeployment>> {
        self.authorize(credential)?;
        Ok(self.releases.lock().clone())
    }

    async fn install(&self, _user: &User, _tool: &ToolDefinition) -> Result<Box<dyn BackgroundProcess>> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        let process = ProcessSwitch::default();
        self.processes.lock().push(process.clone());
        Ok(Box::new(process))
    }

    async fn uninstall(&self, _user: &User, tool: &ToolDefinition, credential: &Credential) -> Result<()> {
        self.authorize(credential)?;
        self.releases
            .lock()
            .retain(|release| release.chart().map(|c| c.chart_name != tool.chart_name).unwrap_or(true));
        Ok(())
    }

    async fn restart(&self, user: &User, tool: &ToolDefinition, credential: &Credential) -> Result<()> {
        self.authorize(credential)?;
        if !self.has_release(&tool.chart_name) {
            return Err(DeploymentError::NotDeployed {
                user: user.slug.clone(),
                chart_name: tool.chart_name.clone(),
            });
        }
        Ok(())
    }

    async fn status(&self, _user: &User, tool: &ToolDefinition, credential: &Credential) -> Result<ToolStatus> {
        self.authorize(credential)?;
        Ok(if self.has_release(&tool.chart_name) {
            ToolStatus::Running
        } else {
            ToolStatus::NotDeployed
        })
    }
}

pub struct FixedIndex;

#[async_trait::async_trait]
impl AppVersionResolver for FixedIndex {
    async fn resolve_app_version(&self, chart_name: &str, chart_version: &str) -> Result<Option<String>> {
        Ok(match (chart_name, chart_version) {
            ("rstudio", "2.2.5") => Some("RStudio: 1.2.1335+conda, R: 3.5.1".to_string()),
            _ => None,
        })
    }
}

pub fn catalogue() -> InMemoryCatalogue {
    InMemoryCatalogue::new(vec![
        ToolDefinition::new("rstudio", "RStudio", "2.2.5"),
        ToolDefinition::new("jupyter-lab", "JupyterLab", "0.4.2"),
    ])
}

pub fn reconciler(cluster: Arc<ClusterDouble>) -> Reconciler {
    Reconciler::new(
        Arc::new(catalogue()),
        cluster,
        Arc::new(FixedIndex),
        Arc::new(InstallRegistry::default()),
        "tools.example.net",
    )
}
