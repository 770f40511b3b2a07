//! The hosting platform as seen by the catalog: installed bundles, the
//! features (bundle groups) that ship them, and runtime properties.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const BUNDLE_VERSION_HEADER: &str = "Bundle-Version";
pub const SOURCE_CONTROL_HEADER: &str = "Source-Control-Identifier";
pub const GIT_COMMIT_HEADER: &str = "Git-Commit-Hash";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub symbolic_name: String,
    pub version: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl BundleInfo {
    pub fn new(symbolic_name: &str, version: &str) -> Self {
        BundleInfo {
            symbolic_name: symbolic_name.to_string(),
            version: version.to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Header value, treating empty strings as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Source-control id from the manifest; a commit hash wins over the
    /// generic identifier.
    pub fn source_control_identifier(&self) -> Option<String> {
        self.header(GIT_COMMIT_HEADER)
            .or_else(|| self.header(SOURCE_CONTROL_HEADER))
            .map(str::to_string)
    }
}

/// An installed feature and the bundles it contributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleGroup {
    pub identifier: String,
    #[serde(default)]
    pub bundles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEnvironment {
    pub os: String,
    pub ws: String,
    pub arch: String,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub application: Option<String>,
}

impl PlatformEnvironment {
    /// Platform metadata sent along with the first host product registration.
    pub fn product_data(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut data = serde_json::Map::new();
        data.insert(
            "platform".to_string(),
            format!("{}.{}.{}", self.os, self.ws, self.arch).into(),
        );
        if let Some(build_id) = &self.build_id {
            data.insert("buildId".to_string(), build_id.clone().into());
        }
        if let Some(product) = &self.product {
            data.insert("product".to_string(), product.clone().into());
        }
        if let Some(application) = &self.application {
            data.insert("application".to_string(), application.clone().into());
        }
        data
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Platform: Send + Sync {
    fn bundle(&self, symbolic_name: &str) -> Option<BundleInfo>;

    fn bundle_groups(&self) -> Vec<BundleGroup>;

    fn environment(&self) -> PlatformEnvironment;
}

/// Id of the host feature shipping `plugin`, if any. Only groups whose id
/// starts with `host_prefix` are considered.
pub fn owning_feature(platform: &dyn Platform, plugin: &str, host_prefix: &str) -> Option<String> {
    platform
        .bundle_groups()
        .into_iter()
        .filter(|group| group.identifier.starts_with(host_prefix))
        .find(|group| group.bundles.iter().any(|b| b == plugin))
        .map(|group| group.identifier)
}

/// In-memory platform description, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstalledPlatform {
    #[serde(default)]
    pub bundles: HashMap<String, BundleInfo>,
    #[serde(default)]
    pub groups: Vec<BundleGroup>,
    #[serde(default)]
    pub environment: PlatformEnvironment,
}

impl InstalledPlatform {
    pub fn new(environment: PlatformEnvironment) -> Self {
        InstalledPlatform {
            environment,
            ..Default::default()
        }
    }

    pub fn with_bundle(mut self, bundle: BundleInfo) -> Self {
        self.bundles.insert(bundle.symbolic_name.clone(), bundle);
        self
    }

    pub fn with_group(mut self, identifier: &str, bundles: &[&str]) -> Self {
        self.groups.push(BundleGroup {
            identifier: identifier.to_string(),
            bundles: bundles.iter().map(|b| b.to_string()).collect(),
        });
        self
    }
}

impl Platform for InstalledPlatform {
    fn bundle(&self, symbolic_name: &str) -> Option<BundleInfo> {
        self.bundles.get(symbolic_name).cloned()
    }

    fn bundle_groups(&self) -> Vec<BundleGroup> {
        self.groups.clone()
    }

    fn environment(&self) -> PlatformEnvironment {
        self.environment.clone()
    }
}
