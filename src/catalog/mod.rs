//! Maps plugin identifiers to the products they belong to.
//!
//! Descriptors are consulted in a fixed order: configured extension products
//! first, in configuration order, then the host platform. The first
//! descriptor claiming an identifier wins.

mod descriptor;
pub mod platform;

pub use descriptor::{
    match_descriptor, DescriptorMatch, DispatchContext, ExtensionDescriptor, HostDescriptor,
    ProductDescriptor,
};
pub use platform::{BundleGroup, BundleInfo, InstalledPlatform, Platform, PlatformEnvironment};

use anyhow::Context;

use crate::config::RegistrarConfig;
use crate::error::UsageError;
use crate::metadata::FeatureData;

#[derive(Debug, Default)]
pub struct ProductCatalog {
    descriptors: Vec<ProductDescriptor>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the catalog from configuration. Malformed extension entries are
    /// logged and skipped; the host descriptor is always appended last.
    pub fn load(config: &RegistrarConfig, platform: &dyn Platform) -> Self {
        let mut catalog = ProductCatalog::new();
        for (index, extension) in config.products.iter().enumerate() {
            let built = ExtensionDescriptor::from_config(extension, platform, &config.host.plugin_prefix)
                .with_context(|| format!("product extension #{} from '{}'", index, extension.namespace));
            match built {
                Ok(descriptor) => {
                    tracing::debug!(
                        "loaded product {} claiming {} plugins",
                        extension.id.as_deref().unwrap_or_default(),
                        descriptor.plugin_count()
                    );
                    catalog.push(ProductDescriptor::Extension(descriptor));
                }
                Err(err) => tracing::warn!("skipping {:#}", err),
            }
        }
        catalog.push(ProductDescriptor::host(config.host.clone(), platform));
        catalog
    }

    pub fn push(&mut self, descriptor: ProductDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[ProductDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// First descriptor claiming `plugin_id`.
    pub fn find(&self, plugin_id: &str) -> Option<DescriptorMatch<'_>> {
        self.descriptors
            .iter()
            .find_map(|descriptor| match_descriptor(descriptor, plugin_id))
    }

    /// Reports a feature use through the first matching descriptor. Returns
    /// `false` when no descriptor claims the plugin.
    pub fn register_feature_use(
        &mut self,
        ctx: &DispatchContext<'_>,
        plugin_id: &str,
        feature_data: Option<&FeatureData>,
    ) -> Result<bool, UsageError> {
        for descriptor in &mut self.descriptors {
            if descriptor.register_feature_use_if_match(ctx, plugin_id, feature_data)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn register_project_usage(
        &mut self,
        ctx: &DispatchContext<'_>,
        plugin_id: &str,
        project: &str,
        feature_data: Option<&FeatureData>,
    ) -> Result<bool, UsageError> {
        for descriptor in &mut self.descriptors {
            if descriptor.register_project_usage(ctx, plugin_id, project, feature_data)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProductExtension;
    use crate::sink::{MemorySink, PrivacyLevel, ReportingSink};

    fn platform() -> InstalledPlatform {
        InstalledPlatform::default()
            .with_bundle(BundleInfo::new("org.eclipse.core.runtime", "3.8.0"))
            .with_bundle(BundleInfo::new("org.springframework.ide.eclipse", "3.0.0.RELEASE"))
            .with_bundle(BundleInfo::new("org.codehaus.groovy.eclipse", "2.7.0"))
    }

    fn config() -> RegistrarConfig {
        RegistrarConfig::default()
            .with_product(
                ProductExtension::new("spring-tools", "org.springframework.ide.eclipse")
                    .with_feature("spring.feature", &["org.eclipse.contribution.shared"]),
            )
            .with_product(
                ProductExtension::new("groovy-tools", "org.codehaus.groovy.eclipse")
                    .with_feature("groovy.feature", &["org.eclipse.contribution.shared"]),
            )
    }

    #[test]
    fn host_descriptor_comes_last() {
        let catalog = ProductCatalog::load(&config(), &platform());
        let ids: Vec<_> = catalog.descriptors().iter().map(|d| d.product_id()).collect();
        assert_eq!(ids, vec!["spring-tools", "groovy-tools", "Eclipse"]);
    }

    #[test]
    fn first_registered_descriptor_wins() {
        let mut catalog = ProductCatalog::load(&config(), &platform());
        assert_eq!(
            catalog.find("org.eclipse.contribution.shared").map(|m| m.product_id),
            Some("spring-tools")
        );
        assert_eq!(catalog.find("org.eclipse.ui").map(|m| m.product_id), Some("Eclipse"));
        assert_eq!(catalog.find("com.example"), None);

        let sink = MemorySink::new(PrivacyLevel::EnableUaa);
        let platform = platform();
        let ctx = DispatchContext {
            sink: &sink,
            platform: &platform,
        };
        assert!(catalog
            .register_feature_use(&ctx, "org.eclipse.contribution.shared", None)
            .unwrap());

        assert!(catalog.descriptors()[0].is_registered());
        assert!(!catalog.descriptors()[1].is_registered());
        assert!(!catalog.descriptors()[2].is_registered());
        let payload = sink.payload().unwrap();
        assert_eq!(payload.products.len(), 1);
        assert_eq!(payload.products[0].product.name, "spring-tools");
    }

    #[test]
    fn malformed_extension_is_skipped() {
        let mut config = config();
        config.products.insert(0, ProductExtension::default());
        let catalog = ProductCatalog::load(&config, &platform());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn unmatched_plugin_is_not_an_error() {
        let mut catalog = ProductCatalog::load(&config(), &platform());
        let sink = MemorySink::new(PrivacyLevel::EnableUaa);
        let platform = platform();
        let ctx = DispatchContext {
            sink: &sink,
            platform: &platform,
        };
        assert!(!catalog.register_feature_use(&ctx, "com.example", None).unwrap());
        assert!(!catalog
            .register_project_usage(&ctx, "com.example", "petclinic", None)
            .unwrap());
        assert!(sink.payload().unwrap().is_empty());
    }
}
