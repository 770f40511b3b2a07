use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::UsageError;

/// Version reported when a product is registered without one.
pub const EMPTY_VERSION: &str = "0.0.0.RELEASE";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RegistrarConfig {
    pub worker_count: usize,
    /// Minimum time before a structurally identical attempt is reported again.
    pub cooldown_ms: u64,
    /// Delay between `start()` and the first transmission request.
    pub transmission_delay_ms: u64,
    pub empty_version: String,
    pub log_level: LogLevel,
    pub host: HostConfig,
    pub products: Vec<ProductExtension>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// The implicit descriptor for the hosting platform itself.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HostConfig {
    pub product_name: String,
    pub root_plugin: String,
    /// Only identifiers with this prefix are reported against the host product.
    pub plugin_prefix: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            product_name: "Eclipse".to_string(),
            root_plugin: "org.eclipse.core.runtime".to_string(),
            plugin_prefix: "org.eclipse".to_string(),
        }
    }
}

/// A product contributed through extension configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProductExtension {
    pub id: Option<String>,
    #[serde(default)]
    pub source_control_identifier: Option<String>,
    /// Identifier of the contributing plugin; doubles as the root plugin.
    pub namespace: String,
    #[serde(default)]
    pub root_plugin: Option<String>,
    #[serde(default)]
    pub features: Vec<FeatureExtension>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FeatureExtension {
    pub id: Option<String>,
    #[serde(default)]
    pub plugins: Vec<PluginExtension>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PluginExtension {
    pub id: Option<String>,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        RegistrarConfig {
            worker_count: 5,
            cooldown_ms: 12 * 60 * 60 * 1000,
            transmission_delay_ms: 2 * 60 * 1000,
            empty_version: EMPTY_VERSION.to_string(),
            log_level: LogLevel::Info,
            host: HostConfig::default(),
            products: Vec::new(),
        }
    }
}

impl RegistrarConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn transmission_delay(&self) -> Duration {
        Duration::from_millis(self.transmission_delay_ms)
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = millis(cooldown);
        self
    }

    pub fn with_transmission_delay(mut self, delay: Duration) -> Self {
        self.transmission_delay_ms = millis(delay);
        self
    }

    pub fn with_product(mut self, product: ProductExtension) -> Self {
        self.products.push(product);
        self
    }

    pub fn load(path: &Path) -> Result<Self, UsageError> {
        if !path.exists() {
            return Ok(RegistrarConfig::default());
        }

        let content = fs::read_to_string(path)?;
        let config: RegistrarConfig = serde_json::from_str(&content)
            .map_err(|e| UsageError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), UsageError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| UsageError::InvalidConfiguration(e.to_string()))?;

        fs::write(path, content).map_err(UsageError::Io)
    }

    pub fn validate(&self) -> Result<(), UsageError> {
        if self.worker_count == 0 {
            return Err(UsageError::InvalidConfiguration(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.host.plugin_prefix.is_empty() {
            return Err(UsageError::InvalidConfiguration(
                "host.plugin_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl ProductExtension {
    pub fn new(id: &str, namespace: &str) -> Self {
        ProductExtension {
            id: Some(id.to_string()),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    pub fn with_feature(mut self, feature_id: &str, plugins: &[&str]) -> Self {
        self.features.push(FeatureExtension {
            id: Some(feature_id.to_string()),
            plugins: plugins
                .iter()
                .map(|p| PluginExtension {
                    id: Some(p.to_string()),
                })
                .collect(),
        });
        self
    }

    /// The bundle whose version identifies the product.
    pub fn root_plugin(&self) -> &str {
        self.root_plugin.as_deref().unwrap_or(&self.namespace)
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
