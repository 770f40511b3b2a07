
use std::sync::Arc;
use std::time::Duration;
use test_context::AsyncTestContext;
use tokio::runtime::Handle;

use crate::catalog::platform::BUNDLE_VERSION_HEADER;
use crate::catalog::{BundleInfo, InstalledPlatform, PlatformEnvironment};
use crate::config::{ProductExtension, RegistrarConfig};
use crate::error::UsageError;
use crate::logging;
use crate::registrar::UsageRegistrar;
use crate::sink::{MemorySink, PrivacyLevel, ReportingSink, Transmitter};

// Common test utilities and helpers
pub(crate) mod test_utils {
    use super::*;
    use crate::metadata::FeatureData;

    pub const COOLDOWN: Duration = Duration::from_millis(200);

    pub fn config() -> RegistrarConfig {
        RegistrarConfig::default()
            .with_cooldown(COOLDOWN)
            .with_transmission_delay(Duration::from_secs(3600))
            .with_product(
                ProductExtension::new("spring-tools", "org.springframework.ide.eclipse").with_feature(
                    "org.springframework.ide.eclipse.feature",
                    &[
                        "org.springframework.ide.eclipse.core",
                        "org.springframework.ide.eclipse.beans.core",
                    ],
                ),
            )
    }

    pub fn platform() -> InstalledPlatform {
        InstalledPlatform::new(PlatformEnvironment {
            os: "linux".into(),
            ws: "gtk".into(),
            arch: "x86_64".into(),
            build_id: Some("M20120914-1800".into()),
            ..Default::default()
        })
        .with_bundle(BundleInfo::new("org.eclipse.core.runtime", "3.8.0.v20120521"))
        .with_bundle(
            BundleInfo::new("org.eclipse.jdt.core", "3.8.2.v20120814")
                .with_header(BUNDLE_VERSION_HEADER, "3.8.2.v20120814"),
        )
        .with_bundle(BundleInfo::new("org.springframework.ide.eclipse", "3.0.0.201208091000-RELEASE"))
        .with_group("org.eclipse.jdt", &["org.eclipse.jdt.core"])
    }

    pub fn registrar(config: RegistrarConfig, sink: Arc<dyn ReportingSink>) -> UsageRegistrar {
        UsageRegistrar::new(config, sink, Arc::new(platform()), Handle::current()).unwrap()
    }

    pub fn data(pairs: &[(&str, &str)]) -> Option<FeatureData> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[derive(Default)]
pub struct RecordingTransmitter {
    pub bodies: parking_lot::Mutex<Vec<Vec<u8>>>,
}

impl Transmitter for RecordingTransmitter {
    fn transmit(&self, body: &[u8]) -> Result<(), UsageError> {
        self.bodies.lock().push(body.to_vec());
        Ok(())
    }
}

/// A started registrar over an in-memory sink that allows transmission.
pub struct RegistrarTestContext {
    pub registrar: UsageRegistrar,
    pub sink: Arc<MemorySink>,
    pub transmitter: Arc<RecordingTransmitter>,
}

#[async_trait::async_trait]
impl AsyncTestContext for RegistrarTestContext {
    async fn setup() -> Self {
        logging::init_test();
        let transmitter = Arc::new(RecordingTransmitter::default());
        let sink = Arc::new(MemorySink::new(PrivacyLevel::EnableUaa).with_transmitter(transmitter.clone()));
        let registrar = test_utils::registrar(test_utils::config(), sink.clone());
        registrar.start();

        RegistrarTestContext {
            registrar,
            sink,
            transmitter,
        }
    }

    async fn teardown(self) {
        self.registrar.shutdown().await;
    }
}
