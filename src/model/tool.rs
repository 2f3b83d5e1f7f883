use serde::{Deserialize, Serialize};

use crate::model::User;

/// An entry in the software catalogue. Not a user's deployed instance of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub chart_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Chart version the catalogue offers.
    pub version: String,
    /// Default chart values passed on install.
    #[serde(default = "empty_values")]
    pub values: serde_json::Value,
}

fn empty_values() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolDefinition {
    pub fn new(chart_name: &str, name: &str, version: &str) -> Self {
        Self {
            chart_name: chart_name.to_string(),
            name: name.to_string(),
            description: String::new(),
            version: version.to_string(),
            values: empty_values(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_values(mut self, values: serde_json::Value) -> Self {
        self.values = values;
        self
    }

    pub fn host(&self, user: &User, tools_domain: &str) -> String {
        format!("{}-{}.{}", user.slug, self.chart_name, tools_domain)
    }

    pub fn url(&self, user: &User, tools_domain: &str) -> String {
        format!("https://{}/", self.host(user, tools_domain))
    }
}
