use serde::{Deserialize, Serialize};

use crate::error::UsageError;
use crate::product::Product;

/// A used feature of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureUse {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// UTF-8 JSON object; empty when no metadata was reported.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature_data: String,
    #[serde(default)]
    pub use_count: u32,
}

impl FeatureUse {
    pub fn new(name: &str, version: Option<String>) -> Self {
        FeatureUse {
            name: name.to_string(),
            version,
            feature_data: String::new(),
            use_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUse {
    pub product: Product,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product_data: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureUse>,
    #[serde(default)]
    pub use_count: u32,
}

impl ProductUse {
    pub fn new(product: Product) -> Self {
        ProductUse {
            product,
            projects: Vec::new(),
            product_data: String::new(),
            features: Vec::new(),
            use_count: 0,
        }
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureUse> {
        self.features.iter().find(|f| f.name == name)
    }
}

/// Everything recorded so far, grouped by product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePayload {
    #[serde(default)]
    pub products: Vec<ProductUse>,
}

impl UsagePayload {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// First non-empty feature data recorded for `feature` under any version
    /// of the product named `product_name`.
    pub fn registered_feature_data(&self, product_name: &str, feature: &str) -> Option<&str> {
        self.products
            .iter()
            .filter(|p| p.product.name == product_name)
            .flat_map(|p| p.features.iter())
            .find(|f| f.name == feature && !f.feature_data.is_empty())
            .map(|f| f.feature_data.as_str())
    }

    pub fn product_use_mut(&mut self, product: &Product) -> &mut ProductUse {
        let index = match self.products.iter().position(|p| &p.product == product) {
            Some(index) => index,
            None => {
                self.products.push(ProductUse::new(product.clone()));
                self.products.len() - 1
            }
        };
        &mut self.products[index]
    }

    /// Indented JSON with metadata strings expanded into objects.
    pub fn to_readable(&self) -> Result<String, UsageError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(products) = value.get_mut("products").and_then(|p| p.as_array_mut()) {
            for product in products {
                expand_json_field(product, "product_data");
                if let Some(features) = product.get_mut("features").and_then(|f| f.as_array_mut()) {
                    for feature in features {
                        expand_json_field(feature, "feature_data");
                    }
                }
            }
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

fn expand_json_field(node: &mut serde_json::Value, field: &str) {
    let Some(slot) = node.get_mut(field) else {
        return;
    };
    let parsed = slot
        .as_str()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok());
    if let Some(parsed) = parsed {
        *slot = parsed;
    }
}
