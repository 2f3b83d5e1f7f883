use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::cluster::ClusterGateway;
use crate::error::{DeploymentError, Result};
use crate::logic::chart_index::AppVersionResolver;
use crate::logic::registry::{InstallClaim, InstallRegistry};
use crate::model::{Credential, DeploymentKey, LiveDeployment, ToolDefinition, ToolStatus, User};
use crate::store::CatalogueStore;

/// Collaborators shared by the reconciler and every record it builds.
struct Backends {
    gateway: Arc<dyn ClusterGateway>,
    resolver: Arc<dyn AppVersionResolver>,
    registry: Arc<InstallRegistry>,
    tools_domain: String,
}

impl Backends {
    /// In-flight install state first, then the cluster's own answer.
    async fn status(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: Option<&Credential>,
    ) -> Result<ToolStatus> {
        let key = DeploymentKey::new(user, &tool.chart_name);
        if let Some(status) = self.registry.poll(&key).and_then(|state| state.as_tool_status()) {
            return Ok(status);
        }
        let credential = Credential::require(credential)?;
        self.gateway.status(user, tool, credential).await
    }
}

/// Joins the catalogue with live cluster state for a user.
pub struct Reconciler {
    catalogue: Arc<dyn CatalogueStore>,
    backends: Arc<Backends>,
}

impl Reconciler {
    pub fn new(
        catalogue: Arc<dyn CatalogueStore>,
        gateway: Arc<dyn ClusterGateway>,
        resolver: Arc<dyn AppVersionResolver>,
        registry: Arc<InstallRegistry>,
        tools_domain: &str,
    ) -> Self {
        Self {
            catalogue,
            backends: Arc::new(Backends {
                gateway,
                resolver,
                registry,
                tools_domain: tools_domain.to_string(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<InstallRegistry> {
        &self.backends.registry
    }

    /// One record per catalogued tool, paired with the user's release of it if any.
    ///
    /// Issues exactly one live-state query and one catalogue query.
    pub async fn list_deployments(
        &self,
        user: &User,
        credential: Option<&Credential>,
    ) -> Result<Vec<DeploymentRecord>> {
        let credential = Credential::require(credential)?;
        let live = self.backends.gateway.list_deployments(user, credential).await?;
        let deployed = deployed_versions(&live);

        let tools = self
            .catalogue
            .list_tool_definitions()
            .await
            .map_err(DeploymentError::Catalogue)?;

        Ok(tools
            .into_iter()
            .map(|tool| {
                let deployed_chart_version = deployed.get(&tool.chart_name).cloned();
                DeploymentRecord::new(Arc::clone(&self.backends), tool, user.clone(), deployed_chart_version)
            })
            .collect())
    }

    pub async fn get_deployment(
        &self,
        user: &User,
        credential: Option<&Credential>,
        chart_name: &str,
    ) -> Result<DeploymentRecord> {
        self.list_deployments(user, credential)
            .await?
            .into_iter()
            .find(|record| record.tool.chart_name == chart_name)
            .ok_or_else(|| DeploymentError::UnknownTool(chart_name.to_string()))
    }

    /// Status of one catalogued tool without listing the user's releases.
    ///
    /// While an install handle governs the answer no credential is needed and
    /// the cluster is not contacted.
    pub async fn deployment_status(
        &self,
        user: &User,
        credential: Option<&Credential>,
        chart_name: &str,
    ) -> Result<ToolStatus> {
        let tool = self
            .catalogue
            .get_tool_definition(chart_name)
            .await
            .map_err(DeploymentError::Catalogue)?
            .ok_or_else(|| DeploymentError::UnknownTool(chart_name.to_string()))?;
        self.backends.status(user, &tool, credential).await
    }
}

/// chart name -> installed chart version, from release labels.
pub fn deployed_versions(live: &[LiveDeployment]) -> HashMap<String, String> {
    let mut versions = HashMap::new();
    for deployment in live {
        let Some(chart) = deployment.chart() else {
            log::warn!("Ignoring release with unreadable chart label {:?}", deployment.chart_label);
            continue;
        };
        if let Some(previous) = versions.insert(chart.chart_name.clone(), chart.chart_version) {
            log::warn!(
                "Multiple releases of {} found, using the last one (replacing {})",
                chart.chart_name,
                previous
            );
        }
    }
    versions
}

/// A catalogued tool paired with zero or one live release for one user.
/// Built per reconciliation and never shared between users.
pub struct DeploymentRecord {
    pub tool: ToolDefinition,
    pub user: User,
    pub deployed_chart_version: Option<String>,
    app_version: OnceCell<Option<String>>,
    backends: Arc<Backends>,
}

impl DeploymentRecord {
    fn new(
        backends: Arc<Backends>,
        tool: ToolDefinition,
        user: User,
        deployed_chart_version: Option<String>,
    ) -> Self {
        Self {
            tool,
            user,
            deployed_chart_version,
            app_version: OnceCell::new(),
            backends,
        }
    }

    pub fn catalogue_version(&self) -> &str {
        &self.tool.version
    }

    pub fn is_deployed(&self) -> bool {
        self.deployed_chart_version.is_some()
    }

    /// True only when a release exists and its chart version differs from the catalogue's.
    pub fn outdated(&self) -> bool {
        matches!(&self.deployed_chart_version, Some(version) if *version != self.tool.version)
    }

    pub fn key(&self) -> DeploymentKey {
        DeploymentKey::new(&self.user, &self.tool.chart_name)
    }

    pub fn host(&self) -> String {
        self.tool.host(&self.user, &self.backends.tools_domain)
    }

    pub fn url(&self) -> String {
        self.tool.url(&self.user, &self.backends.tools_domain)
    }

    /// `appVersion` of the deployed chart release, distinct from the chart version.
    ///
    /// `None` when nothing is deployed, when the index has no entry for the
    /// release, or when the lookup fails. Resolved at most once per record.
    pub async fn resolved_app_version(&self) -> Option<String> {
        let deployed = self.deployed_chart_version.as_deref()?;
        self.app_version
            .get_or_init(|| async {
                match self
                    .backends
                    .resolver
                    .resolve_app_version(&self.tool.chart_name, deployed)
                    .await
                {
                    Ok(version) => version,
                    Err(e) => {
                        log::warn!(
                            "Unable to resolve app version of {} {}: {}",
                            self.tool.chart_name,
                            deployed,
                            e
                        );
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Deploy the tool in the background. Returns as soon as the install is launched.
    pub async fn install(&self) -> Result<InstallClaim> {
        self.backends
            .registry
            .start(&self.user, &self.tool, self.backends.gateway.as_ref())
            .await
    }

    /// In-flight install state first, then the cluster's own answer.
    pub async fn status(&self, credential: Option<&Credential>) -> Result<ToolStatus> {
        self.backends.status(&self.user, &self.tool, credential).await
    }

    /// Remove the release from the cluster. Removing a missing release succeeds.
    pub async fn delete(&self, credential: Option<&Credential>) -> Result<()> {
        let credential = Credential::require(credential)?;
        self.backends
            .gateway
            .uninstall(&self.user, &self.tool, credential)
            .await?;
        self.backends.registry.discard(&self.key());
        Ok(())
    }

    /// Rolling restart of the existing release. The backend decides whether one exists.
    pub async fn restart(&self, credential: Option<&Credential>) -> Result<()> {
        let credential = Credential::require(credential)?;
        self.backends
            .gateway
            .restart(&self.user, &self.tool, credential)
            .await
    }
}

impl std::fmt::Debug for DeploymentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentRecord")
            .field("chart_name", &self.tool.chart_name)
            .field("catalogue_version", &self.tool.version)
            .field("deployed_chart_version", &self.deployed_chart_version)
            .field("user", &self.user.slug)
            .finish()
    }
}
