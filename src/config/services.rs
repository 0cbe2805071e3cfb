use std::fmt;

use serde::{Deserialize, Serialize};

const REDACTED: &str = "<redacted>";

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| REDACTED)
}

pub(crate) fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Microsoft 365 / Graph credentials
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct M365Config {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority: Option<String>,
    pub scopes: Vec<String>,
}

impl Default for M365Config {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            authority: None,
            scopes: vec!["https://graph.microsoft.com/.default".to_string()],
        }
    }
}

impl M365Config {
    /// Whether client-credential auth against Graph can be attempted
    pub fn is_configured(&self) -> bool {
        is_set(&self.tenant_id) && is_set(&self.client_id) && is_set(&self.client_secret)
    }

    /// Authority URL, derived from the tenant when not set explicitly
    pub fn authority_url(&self) -> Option<String> {
        self.authority.clone().or_else(|| {
            self.tenant_id
                .as_ref()
                .map(|tenant| format!("https://login.microsoftonline.com/{}", tenant))
        })
    }
}

impl fmt::Debug for M365Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("M365Config")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("authority", &self.authority)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

impl AnthropicConfig {
    pub fn is_configured(&self) -> bool {
        is_set(&self.api_key)
    }
}

impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Azure Resource Manager target. Optional: reported as unconfigured without a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub location: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            resource_group: None,
            location: "eastus".to_string(),
        }
    }
}

impl AzureConfig {
    pub fn is_configured(&self) -> bool {
        is_set(&self.subscription_id)
    }
}
