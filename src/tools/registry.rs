use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::schema::{ParamSpec, input_schema};
use super::Tool;
use crate::error::FlexAgentsError;

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid tool name pattern"));

/// Metadata for a registered tool plus the handler that implements it
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
    pub returns: Option<String>,
    pub examples: Vec<Value>,
    pub timeout: Option<Duration>,
    handler: Arc<dyn Tool>,
}

impl ToolDescriptor {
    /// Snapshot a tool's metadata into a descriptor
    pub fn from_tool(tool: impl Tool + 'static) -> Self {
        Self::from_arc(Arc::new(tool))
    }

    pub fn from_arc(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
            returns: tool.returns().map(str::to_string),
            examples: tool.examples(),
            timeout: tool.timeout(),
            handler: tool,
        }
    }

    pub fn handler(&self) -> Arc<dyn Tool> {
        Arc::clone(&self.handler)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn manifest_entry(&self) -> ManifestEntry {
        ManifestEntry {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            returns: self.returns.clone(),
            examples: self.examples.clone(),
            input_schema: input_schema(&self.parameters),
        }
    }

    fn validate(&self) -> Result<(), FlexAgentsError> {
        let invalid = |message: String| FlexAgentsError::InvalidDescriptor {
            tool_name: self.name.clone(),
            message,
        };

        if self.name.is_empty() {
            return Err(invalid("tool name must not be empty".into()));
        }
        if !TOOL_NAME.is_match(&self.name) {
            return Err(invalid(
                "tool name may only contain letters, digits, '_', '-' and '.'".into(),
            ));
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if param.name.is_empty() {
                return Err(invalid("parameter name must not be empty".into()));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(invalid(format!("parameter '{}' declared twice", param.name)));
            }
            if let Some(default) = &param.default {
                param.check(default).map_err(|e| invalid(format!("bad default: {}", e)))?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// One tool as advertised in the discovery manifest
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Registry of tools, keyed by name and kept in registration order
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), FlexAgentsError> {
        self.register_descriptor(ToolDescriptor::from_tool(tool))
    }

    /// Register a prepared descriptor.
    ///
    /// Fails with [`FlexAgentsError::DuplicateTool`] if the name is taken; the
    /// existing registration is left untouched.
    pub fn register_descriptor(&mut self, descriptor: ToolDescriptor) -> Result<(), FlexAgentsError> {
        descriptor.validate()?;

        if self.index.contains_key(&descriptor.name) {
            return Err(FlexAgentsError::DuplicateTool(descriptor.name));
        }

        debug!(tool = %descriptor.name, params = descriptor.parameters.len(), "registered tool");
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    /// Get a tool by exact name
    pub fn get(&self, name: &str) -> Result<&ToolDescriptor, FlexAgentsError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| FlexAgentsError::ToolNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterate over all tools in registration order.
    ///
    /// The iterator is `Clone`, so a consumer can restart it.
    pub fn list_all(&self) -> std::slice::Iter<'_, ToolDescriptor> {
        self.tools.iter()
    }

    /// Get tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Discovery manifest for every registered tool
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.tools.iter().map(ToolDescriptor::manifest_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub(crate) fn log_summary(&self) {
        info!(count = self.len(), tools = ?self.names(), "tool registry ready");
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ParamType};
    use serde_json::json;

    fn named(name: &str, description: &str) -> FnTool {
        FnTool::builder(name)
            .description(description)
            .handler(|_args| async { Ok(json!(null)) })
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut registry = ToolRegistry::new();
        registry
            .register(named("M365_User_Create", "from m365 provider"))
            .unwrap();

        let err = registry
            .register(named("M365_User_Create", "from specialized provider"))
            .unwrap_err();

        assert!(matches!(err, FlexAgentsError::DuplicateTool(ref n) if n == "M365_User_Create"));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("M365_User_Create").unwrap().description,
            "from m365 provider"
        );
    }

    #[test]
    fn get_is_exact_match() {
        let mut registry = ToolRegistry::new();
        registry.register(named("echo", "echo")).unwrap();

        assert!(registry.get("echo").is_ok());
        assert!(matches!(registry.get("Echo"), Err(FlexAgentsError::ToolNotFound(_))));
        assert!(matches!(registry.get("ech"), Err(FlexAgentsError::ToolNotFound(_))));
    }

    #[test]
    fn list_all_preserves_registration_order_and_restarts() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "m365_group_management", "beta"] {
            registry.register(named(name, name)).unwrap();
        }

        let iter = registry.list_all();
        let first: Vec<&str> = iter.clone().map(|d| d.name.as_str()).collect();
        let second: Vec<&str> = iter.map(|d| d.name.as_str()).collect();

        assert_eq!(first, vec!["zeta", "alpha", "m365_group_management", "beta"]);
        assert_eq!(first, second);
        assert_eq!(registry.names(), first);
    }

    #[test]
    fn rejects_empty_and_malformed_names() {
        let mut registry = ToolRegistry::new();

        let err = registry.register(named("", "nameless")).unwrap_err();
        assert!(matches!(err, FlexAgentsError::InvalidDescriptor { .. }));

        let err = registry.register(named("user create", "spaced")).unwrap_err();
        assert!(matches!(err, FlexAgentsError::InvalidDescriptor { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_repeated_parameter_names() {
        let tool = FnTool::builder("sharepoint_management")
            .param(ParamSpec::required("siteUrl", ParamType::String))
            .param(ParamSpec::optional("siteUrl", ParamType::String))
            .handler(|_args| async { Ok(json!(null)) });

        let err = ToolRegistry::new().register(tool).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn rejects_default_of_wrong_type() {
        let tool = FnTool::builder("azure_vm_management")
            .param(ParamSpec::optional("count", ParamType::Integer).with_default(json!("two")))
            .handler(|_args| async { Ok(json!(null)) });

        let err = ToolRegistry::new().register(tool).unwrap_err();
        assert!(err.to_string().contains("bad default"));
    }

    #[test]
    fn manifest_serializes_descriptor_metadata() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                FnTool::builder("m365_license_management")
                    .description("Assign or remove licenses")
                    .param(ParamSpec::required("action", ParamType::String))
                    .returns("License operation result")
                    .example(json!({"action": "assign"}))
                    .handler(|_args| async { Ok(json!(null)) }),
            )
            .unwrap();

        let manifest = serde_json::to_value(registry.manifest()).unwrap();
        let entry = &manifest[0];
        assert_eq!(entry["name"], "m365_license_management");
        assert_eq!(entry["returns"], "License operation result");
        assert_eq!(entry["parameters"][0]["name"], "action");
        assert_eq!(entry["inputSchema"]["required"], json!(["action"]));
        assert_eq!(entry["examples"][0]["action"], "assign");
    }
}
