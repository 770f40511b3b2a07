//! Records which products, features and projects of an IDE installation are
//! used, and forwards that usage to a reporting sink.

pub mod attempt;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod product;
pub mod proxy;
pub mod registrar;
pub mod sink;
pub mod worker;

#[cfg(test)]
mod tests;

pub use catalog::{InstalledPlatform, Platform, ProductCatalog};
pub use config::{LogLevel, RegistrarConfig};
pub use error::{Result, UsageError};
pub use metadata::FeatureData;
pub use product::{Product, ProductVersion};
pub use proxy::{ProxyData, ProxyResolver, ProxyService};
pub use registrar::{UsageRegistrar, UsageReporter};
pub use sink::{HttpTransmitter, MemorySink, PrivacyLevel, ReportingSink};
