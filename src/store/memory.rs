use anyhow::{Context, Result};
use itertools::Itertools;
use std::path::Path;

use crate::model::ToolDefinition;
use crate::store::traits::CatalogueStore;

/// Catalogue held in memory, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogue {
    tools: Vec<ToolDefinition>,
}

impl InMemoryCatalogue {
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        let tools = tools
            .into_iter()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect();
        Self { tools }
    }

    /// Load a JSON array of tool definitions
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalogue file {}", path.display()))?;
        let tools: Vec<ToolDefinition> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse catalogue file {}", path.display()))?;
        log::info!("Loaded {} tool definitions from {}", tools.len(), path.display());
        Ok(Self::new(tools))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait::async_trait]
impl CatalogueStore for InMemoryCatalogue {
    async fn list_tool_definitions(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self.tools.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tools_are_ordered_by_name() {
        let catalogue = InMemoryCatalogue::new(vec![
            ToolDefinition::new("rstudio", "RStudio", "2.2.5"),
            ToolDefinition::new("airflow-sqlite", "Airflow", "5.0.1"),
            ToolDefinition::new("jupyter-lab", "JupyterLab", "0.4.2"),
        ]);

        let names: Vec<String> = catalogue
            .list_tool_definitions()
            .await
            .unwrap()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, vec!["Airflow", "JupyterLab", "RStudio"]);
    }

    #[tokio::test]
    async fn test_get_tool_definition_by_chart() {
        let catalogue = InMemoryCatalogue::new(vec![ToolDefinition::new(
            "rstudio", "RStudio", "2.2.5",
        )]);
        assert!(catalogue.get_tool_definition("rstudio").await.unwrap().is_some());
        assert!(catalogue.get_tool_definition("superset").await.unwrap().is_none());
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let path = std::env::temp_dir().join(format!("missing-{}.json", uuid::Uuid::new_v4()));
        assert!(InMemoryCatalogue::from_file(&path).is_err());
    }

    #[test]
    fn test_from_file_loads_definitions() {
        let path = std::env::temp_dir().join(format!("catalogue-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"[{"chart_name": "rstudio", "name": "RStudio", "version": "2.2.5",
                 "values": {"resources": {"memory": "12Gi"}}}]"#,
        )
        .unwrap();

        let catalogue = InMemoryCatalogue::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(catalogue.len(), 1);
    }
}
