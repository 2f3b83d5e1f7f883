use crate::model::ToolDefinition;
use anyhow::Result;

/// Read-only view of the software catalogue.
#[async_trait::async_trait]
pub trait CatalogueStore: Send + Sync {
    /// All tool definitions, ordered by display name.
    async fn list_tool_definitions(&self) -> Result<Vec<ToolDefinition>>;

    async fn get_tool_definition(&self, chart_name: &str) -> Result<Option<ToolDefinition>> {
        Ok(self
            .list_tool_definitions()
            .await?
            .into_iter()
            .find(|tool| tool.chart_name == chart_name))
    }
}
