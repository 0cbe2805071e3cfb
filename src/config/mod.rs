mod server;
mod services;

pub use server::{ServerConfig, UnknownArgumentPolicy};
pub use services::{AnthropicConfig, AzureConfig, M365Config};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::FlexAgentsError;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "flex-agents.toml";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub m365: M365Config,
    pub anthropic: AnthropicConfig,
    pub azure: AzureConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file yields defaults; a malformed file is an error, and so
    /// is a zero timeout, which would fail every invocation.
    pub fn load(path: &Path) -> Result<Self, FlexAgentsError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`AppConfig::load`] with an arbitrary variable lookup
    pub fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, FlexAgentsError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = Self::from_toml(&content)?;
            info!(path = %path.display(), "loaded configuration");
            config
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_overrides(lookup);
        if config.server.timeout_seconds == 0 {
            return Err(FlexAgentsError::Config(
                "server.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, FlexAgentsError> {
        toml::from_str(content).map_err(|e| FlexAgentsError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, FlexAgentsError> {
        toml::to_string_pretty(self).map_err(|e| FlexAgentsError::Config(e.to_string()))
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(debug) = var("MCP_DEBUG") {
            self.server.debug = debug.eq_ignore_ascii_case("true");
        }
        if let Some(level) = var("MCP_LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(timeout) = var("MCP_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(secs) => self.server.timeout_seconds = secs,
                Err(_) => debug!(value = %timeout, "ignoring non-numeric MCP_TIMEOUT_SECONDS"),
            }
        }

        let overrides: [(&str, &mut Option<String>); 7] = [
            ("AZURE_TENANT_ID", &mut self.m365.tenant_id),
            ("AZURE_CLIENT_ID", &mut self.m365.client_id),
            ("AZURE_CLIENT_SECRET", &mut self.m365.client_secret),
            ("ANTHROPIC_API_KEY", &mut self.anthropic.api_key),
            ("AZURE_SUBSCRIPTION_ID", &mut self.azure.subscription_id),
            ("AZURE_RESOURCE_GROUP", &mut self.azure.resource_group),
            ("AZURE_AUTHORITY", &mut self.m365.authority),
        ];
        for (key, slot) in overrides {
            if let Some(value) = var(key) {
                *slot = Some(value);
            }
        }

        if let Some(model) = var("ANTHROPIC_MODEL") {
            self.anthropic.model = model;
        }
    }

    /// Report missing required settings, grouped by section.
    ///
    /// Sections without problems are omitted; an empty map means valid.
    /// Azure settings are optional and never reported.
    pub fn validate(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut issues: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();

        let missing = |value: &Option<String>| !services::is_set(value);

        let mut m365 = Vec::new();
        if missing(&self.m365.tenant_id) {
            m365.push("missing tenant_id".to_string());
        }
        if missing(&self.m365.client_id) {
            m365.push("missing client_id".to_string());
        }
        if missing(&self.m365.client_secret) {
            m365.push("missing client_secret".to_string());
        }
        if !m365.is_empty() {
            issues.insert("m365", m365);
        }

        if missing(&self.anthropic.api_key) {
            issues.insert("anthropic", vec!["missing api_key".to_string()]);
        }

        let mut server = Vec::new();
        if self.server.timeout_seconds == 0 {
            server.push("timeout_seconds must be greater than zero".to_string());
        }
        if self.server.max_execution_history == 0 {
            server.push("max_execution_history must be greater than zero".to_string());
        }
        if !server.is_empty() {
            issues.insert("server", server);
        }

        issues
    }

    /// Credential status of each upstream service, keyed by section name
    pub fn services(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("anthropic", self.anthropic.is_configured()),
            ("azure", self.azure.is_configured()),
            ("m365", self.m365.is_configured()),
        ])
    }

    /// Sample configuration with placeholder credentials
    pub fn sample() -> Self {
        let mut config = Self::default();
        config.m365.tenant_id = Some("your-tenant-id".to_string());
        config.m365.client_id = Some("your-client-id".to_string());
        config.m365.client_secret = Some("your-client-secret".to_string());
        config.m365.authority =
            Some("https://login.microsoftonline.com/your-tenant-id".to_string());
        config.anthropic.api_key = Some("your-anthropic-api-key".to_string());
        config.azure.subscription_id = Some("your-azure-subscription-id".to_string());
        config.azure.resource_group = Some("your-resource-group".to_string());
        config
    }
}
