use std::collections::HashMap;

use super::platform::{owning_feature, Platform, BUNDLE_VERSION_HEADER};
use crate::config::{HostConfig, ProductExtension};
use crate::error::UsageError;
use crate::metadata::{merge_feature_data, FeatureData};
use crate::product::{resolve_product, HeuristicVersionParser, Product};
use crate::sink::{FeatureUse, ReportingSink};

/// Collaborators a descriptor reports through.
pub struct DispatchContext<'a> {
    pub sink: &'a dyn ReportingSink,
    pub platform: &'a dyn Platform,
}

/// The platform itself, claiming every host-owned plugin.
#[derive(Debug, Clone)]
pub struct HostDescriptor {
    config: HostConfig,
    product: Option<Product>,
    registered: bool,
}

/// A product contributed through configuration, claiming exactly the
/// plugins it lists.
#[derive(Debug, Clone)]
pub struct ExtensionDescriptor {
    product_id: String,
    source_control_identifier: Option<String>,
    root_plugin: String,
    /// plugin id -> feature id
    plugins: HashMap<String, String>,
    product: Option<Product>,
    registered: bool,
}

#[derive(Debug, Clone)]
pub enum ProductDescriptor {
    Host(HostDescriptor),
    Extension(ExtensionDescriptor),
}

/// What a descriptor claims about a plugin identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch<'a> {
    pub product_id: &'a str,
    pub feature: Option<&'a str>,
}

/// Whether `descriptor` claims `plugin_id`, and for which product.
pub fn match_descriptor<'a>(descriptor: &'a ProductDescriptor, plugin_id: &str) -> Option<DescriptorMatch<'a>> {
    match descriptor {
        ProductDescriptor::Host(host) => plugin_id
            .starts_with(&host.config.plugin_prefix)
            .then_some(DescriptorMatch {
                product_id: &host.config.product_name,
                feature: None,
            }),
        ProductDescriptor::Extension(ext) => ext.plugins.get(plugin_id).map(|feature| DescriptorMatch {
            product_id: &ext.product_id,
            feature: Some(feature.as_str()),
        }),
    }
}

fn build_product(
    platform: &dyn Platform,
    root_plugin: &str,
    name: &str,
    source_control_identifier: Option<&str>,
) -> Option<Product> {
    let bundle = platform.bundle(root_plugin)?;
    let configured = source_control_identifier
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let product = resolve_product(name, &bundle.version, &HeuristicVersionParser)
        .with_source_control_identifier(configured.or_else(|| bundle.source_control_identifier()));
    Some(product)
}

impl HostDescriptor {
    pub fn new(config: HostConfig, platform: &dyn Platform) -> Self {
        let product = build_product(platform, &config.root_plugin, &config.product_name, None);
        HostDescriptor {
            config,
            product,
            registered: false,
        }
    }
}

impl ExtensionDescriptor {
    pub fn from_config(
        extension: &ProductExtension,
        platform: &dyn Platform,
        host_prefix: &str,
    ) -> Result<Self, UsageError> {
        let product_id = extension
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                UsageError::InvalidConfiguration(format!(
                    "product contributed by '{}' has no id",
                    extension.namespace
                ))
            })?;

        let mut plugins = HashMap::new();
        for feature in &extension.features {
            let Some(feature_id) = feature.id.as_deref() else {
                continue;
            };
            for plugin in &feature.plugins {
                let Some(plugin_id) = plugin.id.as_deref() else {
                    continue;
                };
                // A plugin patched into another host feature belongs to that feature.
                match owning_feature(platform, plugin_id, host_prefix) {
                    Some(owner) if owner != feature_id => {
                        tracing::debug!(
                            "{} is owned by {}, not attaching it to {}",
                            plugin_id,
                            owner,
                            feature_id
                        );
                    }
                    _ => {
                        plugins.insert(plugin_id.to_string(), feature_id.to_string());
                    }
                }
            }
        }

        let root_plugin = extension.root_plugin().to_string();
        let source_control_identifier = extension.source_control_identifier.clone();
        let product = build_product(
            platform,
            &root_plugin,
            &product_id,
            source_control_identifier.as_deref(),
        );

        Ok(ExtensionDescriptor {
            product_id,
            source_control_identifier,
            root_plugin,
            plugins,
            product,
            registered: false,
        })
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }
}

impl ProductDescriptor {
    pub fn host(config: HostConfig, platform: &dyn Platform) -> Self {
        ProductDescriptor::Host(HostDescriptor::new(config, platform))
    }

    pub fn product_id(&self) -> &str {
        match self {
            ProductDescriptor::Host(host) => &host.config.product_name,
            ProductDescriptor::Extension(ext) => &ext.product_id,
        }
    }

    pub fn is_registered(&self) -> bool {
        match self {
            ProductDescriptor::Host(host) => host.registered,
            ProductDescriptor::Extension(ext) => ext.registered,
        }
    }

    pub fn product(&self) -> Option<&Product> {
        match self {
            ProductDescriptor::Host(host) => host.product.as_ref(),
            ProductDescriptor::Extension(ext) => ext.product.as_ref(),
        }
    }

    pub fn claims(&self, plugin_id: &str) -> bool {
        match_descriptor(self, plugin_id).is_some()
    }

    /// Records a feature use if this descriptor claims `plugin_id`.
    pub fn register_feature_use_if_match(
        &mut self,
        ctx: &DispatchContext<'_>,
        plugin_id: &str,
        feature_data: Option<&FeatureData>,
    ) -> Result<bool, UsageError> {
        if !self.claims(plugin_id) {
            return Ok(false);
        }
        let product = self.register_product_if_required(ctx, None)?;
        register_feature(ctx, &product, plugin_id, feature_data)?;
        Ok(true)
    }

    /// Records that `project` uses the product owning `plugin_id`.
    pub fn register_project_usage(
        &mut self,
        ctx: &DispatchContext<'_>,
        plugin_id: &str,
        project: &str,
        feature_data: Option<&FeatureData>,
    ) -> Result<bool, UsageError> {
        if !self.claims(plugin_id) {
            return Ok(false);
        }
        let product = self.register_product_if_required(ctx, Some(project))?;
        register_feature(ctx, &product, plugin_id, feature_data)?;
        ctx.sink.register_product_usage(&product, None, Some(project))?;
        Ok(true)
    }

    /// Makes sure the product is known, registering it with the sink the
    /// first time, and returns it.
    fn register_product_if_required(
        &mut self,
        ctx: &DispatchContext<'_>,
        project: Option<&str>,
    ) -> Result<Product, UsageError> {
        match self {
            ProductDescriptor::Host(host) => {
                if host.product.is_none() {
                    host.product = build_product(
                        ctx.platform,
                        &host.config.root_plugin,
                        &host.config.product_name,
                        None,
                    );
                }
                let product = host
                    .product
                    .clone()
                    .ok_or_else(|| UsageError::ProductUnavailable(host.config.product_name.clone()))?;
                if !host.registered {
                    let data = serde_json::to_vec(&ctx.platform.environment().product_data())?;
                    ctx.sink.register_product_usage(&product, Some(&data), project)?;
                    host.registered = true;
                    tracing::debug!("registered host product {}", product.name);
                }
                Ok(product)
            }
            ProductDescriptor::Extension(ext) => {
                // The root bundle may have been installed after startup.
                if ext.product.is_none() {
                    ext.product = build_product(
                        ctx.platform,
                        &ext.root_plugin,
                        &ext.product_id,
                        ext.source_control_identifier.as_deref(),
                    );
                }
                let product = ext
                    .product
                    .clone()
                    .ok_or_else(|| UsageError::ProductUnavailable(ext.product_id.clone()))?;
                if !ext.registered {
                    ctx.sink.register_product_usage(&product, None, project)?;
                    ext.registered = true;
                    tracing::debug!("registered product {}", product.name);
                }
                Ok(product)
            }
        }
    }
}

fn register_feature(
    ctx: &DispatchContext<'_>,
    product: &Product,
    plugin_id: &str,
    feature_data: Option<&FeatureData>,
) -> Result<(), UsageError> {
    let merged = match feature_data {
        Some(data) if !data.is_empty() => {
            let payload = ctx.sink.payload()?;
            merge_feature_data(payload.registered_feature_data(&product.name, plugin_id), Some(data))
        }
        _ => merge_feature_data(None, None),
    };

    let version = ctx
        .platform
        .bundle(plugin_id)
        .and_then(|bundle| bundle.header(BUNDLE_VERSION_HEADER).map(str::to_string));
    let feature = FeatureUse::new(plugin_id, version);

    if merged.is_empty() {
        ctx.sink.register_feature_usage(product, &feature, None)
    } else {
        let bytes = merged.to_json_bytes()?;
        ctx.sink.register_feature_usage(product, &feature, Some(&bytes))
    }
}
