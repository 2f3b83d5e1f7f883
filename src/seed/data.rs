use crate::model::ToolDefinition;
use crate::store::InMemoryCatalogue;
use serde_json::json;

/// Helper function to create a ToolDefinition with a description and default values
fn catalogue_tool(
    chart_name: &str,
    name: &str,
    version: &str,
    description: &str,
    values: serde_json::Value,
) -> ToolDefinition {
    ToolDefinition::new(chart_name, name, version)
        .with_description(description)
        .with_values(values)
}

/// Tools offered when no catalogue file is configured
pub fn default_tools() -> Vec<ToolDefinition> {
    vec![
        catalogue_tool(
            "rstudio",
            "RStudio",
            "2.2.5",
            "RStudio IDE with R and Python",
            json!({
                "rstudio": {"resources": {"limits": {"memory": "12Gi"}}},
            }),
        ),
        catalogue_tool(
            "jupyter-lab",
            "JupyterLab",
            "0.4.2",
            "JupyterLab notebooks with the data science stack",
            json!({
                "jupyter": {"resources": {"limits": {"memory": "12Gi"}}},
            }),
        ),
        catalogue_tool(
            "airflow-sqlite",
            "Airflow",
            "5.0.1",
            "Airflow with a local SQLite metadata database",
            json!({}),
        ),
    ]
}

pub fn load_seed_catalogue() -> InMemoryCatalogue {
    let tools = default_tools();
    log::info!("Using seed catalogue with {} tools", tools.len());
    InMemoryCatalogue::new(tools)
}
