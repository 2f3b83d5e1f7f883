use serde::{Deserialize, Serialize};

use crate::model::User;

/// Health of a release as last observed in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentHealth {
    Pending,
    Running,
    Failed,
    Unknown,
}

/// A release found in a user's namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDeployment {
    /// Raw `chart` label of the release, e.g. `rstudio-2.2.5`.
    pub chart_label: String,
    pub health: DeploymentHealth,
}

impl LiveDeployment {
    pub fn new(chart_label: &str, health: DeploymentHealth) -> Self {
        Self {
            chart_label: chart_label.to_string(),
            health,
        }
    }

    pub fn chart(&self) -> Option<ChartLabel> {
        ChartLabel::parse(&self.chart_label)
    }
}

/// Chart identity embedded in a release label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartLabel {
    pub chart_name: String,
    pub chart_version: String,
}

impl ChartLabel {
    /// Parses `<chart>:<version>` or `<chart>-<version>`.
    ///
    /// The split is on the last separator so hyphenated chart names survive:
    /// `my-chart-name-1.0.0` is chart `my-chart-name`, version `1.0.0`.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        let (chart_name, chart_version) = match label.rsplit_once(':') {
            Some(parts) => parts,
            None => label.rsplit_once('-')?,
        };
        if chart_name.is_empty() || chart_version.is_empty() {
            return None;
        }
        Some(Self {
            chart_name: chart_name.to_string(),
            chart_version: chart_version.to_string(),
        })
    }
}

/// Registry key: one in-flight install per user and chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentKey {
    pub user_slug: String,
    pub chart_name: String,
}

impl DeploymentKey {
    pub fn new(user: &User, chart_name: &str) -> Self {
        Self {
            user_slug: user.slug.clone(),
            chart_name: chart_name.to_string(),
        }
    }
}

impl std::fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_slug, self.chart_name)
    }
}
