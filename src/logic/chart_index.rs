use anyhow::{anyhow, Context};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{DeploymentError, Result};

/// Resolves the application version packaged in a chart release.
#[async_trait::async_trait]
pub trait AppVersionResolver: Send + Sync {
    /// `Ok(None)` when the index has no `appVersion` for that exact chart version.
    async fn resolve_app_version(
        &self,
        chart_name: &str,
        chart_version: &str,
    ) -> Result<Option<String>>;
}

/// One chart release as listed in a repository index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartInfo {
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
    /// Only present for charts released after Helm introduced the field.
    #[serde(rename = "appVersion", default, deserialize_with = "scalar_string")]
    pub app_version: Option<String>,
}

// Unquoted YAML versions such as `appVersion: 0.35` arrive as numbers.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(
        match Option::<serde_yaml::Value>::deserialize(deserializer)? {
            Some(serde_yaml::Value::String(s)) => Some(s),
            Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
            Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        },
    )
}

/// Per-chart release lists, in either the Helm repository layout or keyed by version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChartVersions {
    Listed(Vec<ChartInfo>),
    Keyed(HashMap<String, ChartInfo>),
}

/// chart name -> chart version -> release info
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartIndex {
    charts: HashMap<String, HashMap<String, ChartInfo>>,
}

impl ChartIndex {
    /// Parse an `index.yaml` document (JSON is accepted as a YAML subset).
    pub fn parse(raw: &[u8]) -> anyhow::Result<Self> {
        let document: serde_yaml::Value =
            serde_yaml::from_slice(raw).context("Failed to parse chart index")?;
        let entries = match document.get("entries") {
            Some(entries) => entries.clone(),
            None => document,
        };
        if entries.is_null() {
            return Ok(Self::default());
        }
        let entries: HashMap<String, ChartVersions> =
            serde_yaml::from_value(entries).context("Unexpected chart index layout")?;

        let charts = entries
            .into_iter()
            .map(|(chart_name, versions)| {
                let versions = match versions {
                    ChartVersions::Listed(infos) => infos
                        .into_iter()
                        .filter_map(|info| Some((info.version.clone()?, info)))
                        .collect(),
                    ChartVersions::Keyed(infos) => infos,
                };
                (chart_name, versions)
            })
            .collect();
        Ok(Self { charts })
    }

    pub fn chart_info(&self, chart_name: &str) -> Option<&HashMap<String, ChartInfo>> {
        self.charts.get(chart_name)
    }

    pub fn app_version(&self, chart_name: &str, chart_version: &str) -> Option<String> {
        self.charts
            .get(chart_name)?
            .get(chart_version)?
            .app_version
            .clone()
    }
}

/// Where the raw index document comes from.
#[async_trait::async_trait]
pub trait IndexSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Vec<u8>>;
}

pub struct HttpIndexSource {
    client: reqwest::Client,
    url: String,
}

impl HttpIndexSource {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl IndexSource for HttpIndexSource {
    async fn fetch(&self) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", self.url))?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

pub struct FileIndexSource {
    path: PathBuf,
}

impl FileIndexSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl IndexSource for FileIndexSource {
    async fn fetch(&self) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| anyhow!("Failed to read {}: {}", self.path.display(), e))
    }
}

/// Pick a source for a configured index location.
pub fn index_source_for(location: &str) -> Arc<dyn IndexSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Arc::new(HttpIndexSource::new(location))
    } else {
        Arc::new(FileIndexSource::new(
            location.strip_prefix("file://").unwrap_or(location),
        ))
    }
}

struct CachedIndex {
    index: Arc<ChartIndex>,
    /// `None` once invalidated, forcing a refetch on next access.
    fetched_at: Option<Instant>,
}

/// Read-through cache over a chart repository index.
///
/// A refresh that fails while a copy is cached keeps serving the stale copy;
/// only a failure with nothing cached surfaces `IndexUnavailable`.
pub struct HelmRepository {
    source: Arc<dyn IndexSource>,
    refresh_interval: Duration,
    cache: RwLock<Option<CachedIndex>>,
    /// Held while fetching so concurrent lookups share one refresh
    refresh: tokio::sync::Mutex<()>,
}

impl HelmRepository {
    pub fn new(source: Arc<dyn IndexSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            cache: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn invalidate(&self) {
        if let Some(cached) = self.cache.write().as_mut() {
            cached.fetched_at = None;
        }
    }

    fn fresh(&self) -> Option<Arc<ChartIndex>> {
        let cache = self.cache.read();
        let cached = cache.as_ref()?;
        match cached.fetched_at {
            Some(at) if at.elapsed() < self.refresh_interval => Some(Arc::clone(&cached.index)),
            _ => None,
        }
    }

    pub async fn index(&self) -> Result<Arc<ChartIndex>> {
        if let Some(index) = self.fresh() {
            return Ok(index);
        }
        let _refresh = self.refresh.lock().await;
        if let Some(index) = self.fresh() {
            return Ok(index);
        }

        let fetched = self
            .source
            .fetch()
            .await
            .and_then(|raw| ChartIndex::parse(&raw));

        let mut cache = self.cache.write();
        match fetched {
            Ok(index) => {
                let index = Arc::new(index);
                *cache = Some(CachedIndex {
                    index: Arc::clone(&index),
                    fetched_at: Some(Instant::now()),
                });
                Ok(index)
            }
            Err(e) => match cache.as_mut() {
                Some(cached) => {
                    log::warn!("Chart index refresh failed, serving cached copy: {:#}", e);
                    // Retry after another interval rather than on every lookup.
                    cached.fetched_at = Some(Instant::now());
                    Ok(Arc::clone(&cached.index))
                }
                None => Err(DeploymentError::IndexUnavailable(format!("{:#}", e))),
            },
        }
    }

    pub async fn chart_info(&self, chart_name: &str) -> Result<HashMap<String, ChartInfo>> {
        Ok(self
            .index()
            .await?
            .chart_info(chart_name)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl AppVersionResolver for HelmRepository {
    async fn resolve_app_version(
        &self,
        chart_name: &str,
        chart_version: &str,
    ) -> Result<Option<String>> {
        Ok(self.index().await?.app_version(chart_name, chart_version))
    }
}
