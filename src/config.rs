use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub helm: HelmConfig,
    pub cluster: ClusterConfig,
    pub catalogue: CatalogueConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Domain user tools are served under, `https://<slug>-<chart>.<domain>/`
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmConfig {
    pub binary: String,
    pub repository: String,
    /// Chart repository index, an `http(s)://` URL or a local path
    pub index_url: String,
    pub index_refresh_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub namespace_prefix: String,
    /// Kube API server URL; inferred from the environment when unset
    pub api_server: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogueConfig {
    /// JSON file of tool definitions; the seed catalogue is used when unset
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub failed_handle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            domain: "tools.localhost".to_string(),
        }
    }
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: "helm".to_string(),
            repository: "mojanalytics".to_string(),
            index_url: "http://moj-analytics-helm-repo.s3-website-eu-west-1.amazonaws.com/index.yaml"
                .to_string(),
            index_refresh_secs: 300,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: "user-".to_string(),
            api_server: None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            failed_handle_ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Environment variables like CONTROLPANEL_HELM__INDEX_URL
        config = config.add_source(
            config::Environment::with_prefix("CONTROLPANEL")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn index_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.helm.index_refresh_secs)
    }

    pub fn failed_handle_ttl(&self) -> Duration {
        Duration::from_secs(self.registry.failed_handle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registry.sweep_interval_secs.max(1))
    }
}
