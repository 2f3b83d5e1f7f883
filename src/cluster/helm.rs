use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::config::AuthInfo;
use kube::Client;
use serde_json::{json, Value};
use std::process::Output;
use tokio::sync::OnceCell;

use crate::cluster::process::ChildProcess;
use crate::cluster::traits::{BackgroundProcess, ClusterGateway};
use crate::config::AppConfig;
use crate::error::{DeploymentError, Result};
use crate::model::{Credential, DeploymentHealth, LiveDeployment, ToolDefinition, ToolStatus, User};

const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

#[derive(Debug, Clone)]
pub struct HelmGatewayConfig {
    pub helm_binary: String,
    /// Chart repository alias, charts are installed as `<repository>/<chart>`.
    pub repository: String,
    pub namespace_prefix: String,
    /// Kube API server URL. The in-cluster or kubeconfig settings are inferred when unset.
    pub api_server: Option<String>,
    pub tools_domain: String,
}

impl From<&AppConfig> for HelmGatewayConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            helm_binary: config.helm.binary.clone(),
            repository: config.helm.repository.clone(),
            namespace_prefix: config.cluster.namespace_prefix.clone(),
            api_server: config.cluster.api_server.clone(),
            tools_domain: config.tools.domain.clone(),
        }
    }
}

/// Cluster gateway reading deployments through the kube API and
/// installing releases with the `helm` command line tool.
#[derive(Debug)]
pub struct HelmGateway {
    config: HelmGatewayConfig,
    kube_config: OnceCell<kube::Config>,
}

impl HelmGateway {
    pub fn new(config: HelmGatewayConfig) -> Self {
        Self {
            config,
            kube_config: OnceCell::new(),
        }
    }

    fn namespace(&self, user: &User) -> String {
        user.namespace(&self.config.namespace_prefix)
    }

    async fn base_kube_config(&self) -> Result<&kube::Config> {
        self.kube_config
            .get_or_try_init(|| load_kube_config(self.config.api_server.as_deref()))
            .await
    }

    /// Client acting as the user: their token replaces any ambient auth.
    async fn client(&self, credential: &Credential) -> Result<Client> {
        let mut config = self.base_kube_config().await?.clone();
        config.auth_info = AuthInfo {
            token: Some(credential.token.clone().into()),
            ..AuthInfo::default()
        };
        Client::try_from(config).map_err(kube_failure)
    }

    async fn deployments(&self, user: &User, credential: &Credential) -> Result<Api<Deployment>> {
        let client = self.client(credential).await?;
        Ok(Api::namespaced(client, &self.namespace(user)))
    }

    /// Deployments belonging to one tool's release in the user's namespace.
    async fn chart_deployments(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: &Credential,
    ) -> Result<(Api<Deployment>, Vec<Deployment>)> {
        let api = self.deployments(user, credential).await?;
        let params = ListParams::default().labels(&format!("app={}", tool.chart_name));
        let list = api.list(&params).await.map_err(kube_failure)?;
        Ok((api, list.items))
    }

    fn helm_args(&self, user: &User, credential: Option<&Credential>) -> Vec<String> {
        let mut args = vec!["--namespace".to_string(), self.namespace(user)];
        if let Some(credential) = credential {
            args.push("--kube-token".to_string());
            args.push(credential.token.clone());
        }
        if let Some(server) = &self.config.api_server {
            args.push("--kube-apiserver".to_string());
            args.push(server.clone());
        }
        args
    }

    async fn exec(&self, program: &str, args: &[String]) -> Result<Output> {
        log::debug!("Running {} {}", program, args.first().map(String::as_str).unwrap_or(""));
        tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeploymentError::ClusterUnavailable(format!("failed to run {}: {}", program, e)))
    }

    fn install_command(&self, user: &User, tool: &ToolDefinition) -> std::process::Command {
        let mut command = std::process::Command::new(&self.config.helm_binary);
        command.args([
            "upgrade".to_string(),
            "--install".to_string(),
            user.release_name(&tool.chart_name),
            format!("{}/{}", self.config.repository, tool.chart_name),
            "--version".to_string(),
            tool.version.clone(),
        ]);
        command.args(self.helm_args(user, None));
        command.args([
            "--set-string".to_string(),
            format!("username={}", user.slug),
            "--set-string".to_string(),
            format!("toolsDomain={}", self.config.tools_domain),
        ]);
        match &tool.values {
            Value::Object(values) => {
                for (key, value) in values {
                    command.args(["--set-json".to_string(), format!("{}={}", key, value)]);
                }
            }
            Value::Null => {}
            other => log::warn!(
                "Ignoring non-object default values for {}: {}",
                tool.chart_name,
                other
            ),
        }
        command
    }
}

#[async_trait::async_trait]
impl ClusterGateway for HelmGateway {
    async fn list_deployments(
        &self,
        user: &User,
        credential: &Credential,
    ) -> Result<Vec<LiveDeployment>> {
        let api = self.deployments(user, credential).await?;
        let list = api.list(&ListParams::default()).await.map_err(kube_failure)?;
        Ok(live_deployments(&list.items))
    }

    async fn install(
        &self,
        user: &User,
        tool: &ToolDefinition,
    ) -> Result<Box<dyn BackgroundProcess>> {
        let process = ChildProcess::spawn(self.install_command(user, tool)).map_err(|e| {
            DeploymentError::ClusterUnavailable(format!(
                "failed to launch {}: {}",
                self.config.helm_binary, e
            ))
        })?;
        log::info!(
            "Installing {} {} for {} (pid {})",
            tool.chart_name,
            tool.version,
            user,
            process.id()
        );
        Ok(Box::new(process))
    }

    async fn uninstall(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: &Credential,
    ) -> Result<()> {
        let mut args = vec!["uninstall".to_string(), user.release_name(&tool.chart_name)];
        args.extend(self.helm_args(user, Some(credential)));
        let output = self.exec(&self.config.helm_binary, &args).await?;
        if output.status.success() {
            log::info!("Uninstalled {} for {}", tool.chart_name, user);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") {
            log::debug!("Release {} already absent", user.release_name(&tool.chart_name));
            return Ok(());
        }
        Err(classify_failure(&stderr))
    }

    async fn restart(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: &Credential,
    ) -> Result<()> {
        let (api, items) = self.chart_deployments(user, tool, credential).await?;
        if items.is_empty() {
            return Err(DeploymentError::NotDeployed {
                user: user.slug.clone(),
                chart_name: tool.chart_name.clone(),
            });
        }

        let patch = restart_patch(&chrono::Utc::now().to_rfc3339());
        for name in items.iter().filter_map(|d| d.metadata.name.as_deref()) {
            api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(kube_failure)?;
        }
        log::info!("Restarted {} for {}", tool.chart_name, user);
        Ok(())
    }

    async fn status(
        &self,
        user: &User,
        tool: &ToolDefinition,
        credential: &Credential,
    ) -> Result<ToolStatus> {
        let (_, items) = self.chart_deployments(user, tool, credential).await?;
        Ok(status_of(&items))
    }
}

async fn load_kube_config(api_server: Option<&str>) -> Result<kube::Config> {
    match api_server {
        Some(server) => {
            let url = server.parse::<http::Uri>().map_err(|e| {
                DeploymentError::ClusterUnavailable(format!("invalid api server {}: {}", server, e))
            })?;
            Ok(kube::Config::new(url))
        }
        None => kube::Config::infer().await.map_err(|e| {
            DeploymentError::ClusterUnavailable(format!("unable to load cluster config: {}", e))
        }),
    }
}

fn kube_failure(error: kube::Error) -> DeploymentError {
    match &error {
        kube::Error::Api(response) => api_failure(response.code, &response.message),
        _ => DeploymentError::ClusterUnavailable(error.to_string()),
    }
}

fn api_failure(code: u16, message: &str) -> DeploymentError {
    if code == 401 {
        DeploymentError::Authentication(message.to_string())
    } else {
        DeploymentError::ClusterUnavailable(format!("{} ({})", message, code))
    }
}

fn classify_failure(stderr: &str) -> DeploymentError {
    let stderr = stderr.trim();
    if stderr.contains("Unauthorized") || stderr.contains("must be logged in") {
        DeploymentError::Authentication(stderr.to_string())
    } else {
        DeploymentError::ClusterUnavailable(stderr.to_string())
    }
}

/// Same pod template annotation `kubectl rollout restart` sets.
fn restart_patch(restarted_at: &str) -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": { RESTARTED_AT_ANNOTATION: restarted_at }
                }
            }
        }
    })
}

/// Deployments without a `chart` label are not tool releases and are skipped.
pub fn live_deployments(items: &[Deployment]) -> Vec<LiveDeployment> {
    items
        .iter()
        .filter_map(|deployment| {
            let label = deployment.metadata.labels.as_ref()?.get("chart")?;
            Some(LiveDeployment::new(label, health_of(deployment)))
        })
        .collect()
}

fn desired_replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1)
}

fn deadline_exceeded(status: &DeploymentStatus) -> bool {
    status.conditions.iter().flatten().any(|condition| {
        condition.type_ == "Progressing"
            && condition.reason.as_deref() == Some("ProgressDeadlineExceeded")
    })
}

pub fn health_of(deployment: &Deployment) -> DeploymentHealth {
    let Some(status) = &deployment.status else {
        return DeploymentHealth::Unknown;
    };
    if deadline_exceeded(status) {
        return DeploymentHealth::Failed;
    }
    let desired = desired_replicas(deployment);
    let available = status.available_replicas.unwrap_or(0);
    if desired > 0 && available >= desired {
        DeploymentHealth::Running
    } else {
        DeploymentHealth::Pending
    }
}

/// Combined status of the deployments that make up one tool release.
pub fn status_of(items: &[Deployment]) -> ToolStatus {
    if items.is_empty() {
        return ToolStatus::NotDeployed;
    }
    if items.iter().all(|item| desired_replicas(item) == 0) {
        return ToolStatus::Idle;
    }
    let health: Vec<DeploymentHealth> = items
        .iter()
        .filter(|item| desired_replicas(item) > 0)
        .map(health_of)
        .collect();
    if health.contains(&DeploymentHealth::Failed) {
        ToolStatus::Failed
    } else if health.iter().all(|h| *h == DeploymentHealth::Running) {
        ToolStatus::Running
    } else {
        ToolStatus::Deploying
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn deployment(chart: &str, replicas: i32, available: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(chart.to_string()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), chart.to_string()),
                    ("chart".to_string(), format!("{}-1.0.0", chart)),
                ])),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: Some(available),
                ..DeploymentStatus::default()
            }),
        }
    }

    fn gateway(helm: &str, api_server: Option<&str>) -> HelmGateway {
        HelmGateway::new(HelmGatewayConfig {
            helm_binary: helm.to_string(),
            repository: "mojanalytics".to_string(),
            namespace_prefix: "user-".to_string(),
            api_server: api_server.map(str::to_string),
            tools_domain: "tools.example.net".to_string(),
        })
    }

    #[test]
    fn test_live_deployments_read_chart_labels() {
        let sidecar = Deployment {
            metadata: ObjectMeta {
                name: Some("sidecar".to_string()),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        };
        let items = vec![deployment("rstudio", 1, 1), sidecar, deployment("jupyter-lab", 1, 0)];

        assert_eq!(
            live_deployments(&items),
            vec![
                LiveDeployment::new("rstudio-1.0.0", DeploymentHealth::Running),
                LiveDeployment::new("jupyter-lab-1.0.0", DeploymentHealth::Pending),
            ]
        );
    }

    #[test]
    fn test_health_detects_deadline_exceeded() {
        let mut stuck = deployment("rstudio", 1, 0);
        if let Some(status) = stuck.status.as_mut() {
            status.conditions = Some(vec![DeploymentCondition {
                type_: "Progressing".to_string(),
                status: "False".to_string(),
                reason: Some("ProgressDeadlineExceeded".to_string()),
                ..DeploymentCondition::default()
            }]);
        }
        assert_eq!(health_of(&stuck), DeploymentHealth::Failed);

        let unobserved = Deployment {
            status: None,
            ..deployment("rstudio", 1, 0)
        };
        assert_eq!(health_of(&unobserved), DeploymentHealth::Unknown);
    }

    #[test]
    fn test_status_of_release() {
        assert_eq!(status_of(&[]), ToolStatus::NotDeployed);
        assert_eq!(status_of(&[deployment("rstudio", 0, 0)]), ToolStatus::Idle);
        assert_eq!(status_of(&[deployment("rstudio", 1, 1)]), ToolStatus::Running);
        assert_eq!(
            status_of(&[deployment("rstudio", 1, 1), deployment("auth-proxy", 1, 0)]),
            ToolStatus::Deploying
        );
    }

    #[test]
    fn test_restart_patch_sets_template_annotation() {
        let patch = restart_patch("2026-10-14T09:00:00+00:00");
        assert_eq!(
            patch["spec"]["template"]["metadata"]["annotations"][RESTARTED_AT_ANNOTATION],
            "2026-10-14T09:00:00+00:00"
        );
    }

    #[test]
    fn test_api_failures() {
        assert!(matches!(api_failure(401, "Unauthorized"), DeploymentError::Authentication(_)));
        assert!(matches!(
            api_failure(403, "deployments is forbidden"),
            DeploymentError::ClusterUnavailable(_)
        ));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("Error: Kubernetes cluster unreachable: Unauthorized"),
            DeploymentError::Authentication(_)
        ));
        assert!(matches!(
            classify_failure("Error: uninstall: dial tcp: i/o timeout"),
            DeploymentError::ClusterUnavailable(_)
        ));
    }

    #[test]
    fn test_install_command_passes_values() {
        let tool = ToolDefinition::new("rstudio", "RStudio", "2.2.5")
            .with_values(json!({"rstudio": {"image": {"tag": "4.0"}}}));
        let command = gateway("helm", None).install_command(&User::new("alice"), &tool);
        let args: Vec<String> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..4], ["upgrade", "--install", "rstudio-alice", "mojanalytics/rstudio"]);
        assert!(args.contains(&"user-alice".to_string()));
        assert!(args.contains(&"username=alice".to_string()));
        assert!(args.contains(&r#"rstudio={"image":{"tag":"4.0"}}"#.to_string()));
    }

    #[tokio::test]
    async fn test_install_returns_before_completion() {
        let tool = ToolDefinition::new("rstudio", "RStudio", "2.2.5");
        let mut process = gateway("false", None)
            .install(&User::new("alice"), &tool)
            .await
            .unwrap();

        let exit = loop {
            if let Some(exit) = process.try_wait().unwrap() {
                break exit;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        };
        assert!(!exit.success);
    }

    #[tokio::test]
    async fn test_missing_binary_is_cluster_unavailable() {
        let tool = ToolDefinition::new("rstudio", "RStudio", "2.2.5");
        let result = gateway("/nonexistent/helm", None)
            .install(&User::new("alice"), &tool)
            .await;
        assert!(matches!(result, Err(DeploymentError::ClusterUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_api_server_is_cluster_unavailable() {
        let gateway = gateway("helm", Some("http://127.0.0.1:9"));
        let result = gateway
            .list_deployments(&User::new("alice"), &Credential::new("id-token"))
            .await;
        assert!(matches!(result, Err(DeploymentError::ClusterUnavailable(_))));
    }
}
