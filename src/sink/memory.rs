use parking_lot::RwLock;
use std::sync::Arc;

use super::payload::{FeatureUse, UsagePayload};
use super::{PrivacyLevel, ReportingSink};
use crate::error::UsageError;
use crate::product::Product;

/// Sends a serialized payload somewhere. Called with the sink's state lock
/// held, so implementations should hand the body off rather than block.
pub trait Transmitter: Send + Sync {
    fn transmit(&self, body: &[u8]) -> Result<(), UsageError>;
}

#[derive(Debug, Default)]
struct SinkState {
    payload: UsagePayload,
    privacy_level: PrivacyLevel,
    /// Set whenever the payload changes, cleared after a successful send.
    dirty: bool,
    transmissions: u32,
}

/// In-process sink that keeps the payload in memory and transmits it
/// through an optional [`Transmitter`].
pub struct MemorySink {
    state: RwLock<SinkState>,
    transmitter: Option<Arc<dyn Transmitter>>,
}

impl MemorySink {
    pub fn new(privacy_level: PrivacyLevel) -> Self {
        MemorySink {
            state: RwLock::new(SinkState {
                privacy_level,
                ..Default::default()
            }),
            transmitter: None,
        }
    }

    pub fn with_transmitter(mut self, transmitter: Arc<dyn Transmitter>) -> Self {
        self.transmitter = Some(transmitter);
        self
    }

    /// Number of payloads handed to the transmitter so far.
    pub fn transmissions(&self) -> u32 {
        self.state.read().transmissions
    }

    fn send_if_allowed(&self, reason: &str) -> Result<(), UsageError> {
        let mut state = self.state.write();
        if !state.privacy_level.allows_transmission() {
            tracing::debug!("skipping {}: privacy level {}", reason, state.privacy_level);
            return Ok(());
        }
        if !state.dirty || state.payload.is_empty() {
            return Ok(());
        }
        let Some(transmitter) = &self.transmitter else {
            tracing::debug!("skipping {}: no transmitter configured", reason);
            return Ok(());
        };

        let body = serde_json::to_vec(&state.payload)?;
        transmitter.transmit(&body)?;
        state.dirty = false;
        state.transmissions += 1;
        tracing::info!("usage payload transmitted ({} bytes, {})", body.len(), reason);
        Ok(())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(PrivacyLevel::default())
    }
}

impl ReportingSink for MemorySink {
    fn register_product_usage<'a>(
        &self,
        product: &Product,
        product_data: Option<&'a [u8]>,
        project_id: Option<&'a str>,
    ) -> Result<(), UsageError> {
        let mut state = self.state.write();
        let level = state.privacy_level;
        if !level.allows_recording() {
            return Ok(());
        }

        let product_use = state.payload.product_use_mut(product);
        product_use.use_count += 1;
        if level.allows_metadata() {
            if let Some(data) = product_data {
                product_use.product_data = String::from_utf8_lossy(data).into_owned();
            }
            if let Some(project) = project_id {
                if !product_use.projects.iter().any(|p| p == project) {
                    product_use.projects.push(project.to_string());
                }
            }
        }
        state.dirty = true;
        Ok(())
    }

    fn register_feature_usage<'a>(
        &self,
        product: &Product,
        feature: &FeatureUse,
        feature_data: Option<&'a [u8]>,
    ) -> Result<(), UsageError> {
        let mut state = self.state.write();
        let level = state.privacy_level;
        if !level.allows_recording() {
            return Ok(());
        }

        let product_use = state.payload.product_use_mut(product);
        let index = match product_use
            .features
            .iter()
            .position(|f| f.name == feature.name)
        {
            Some(index) => index,
            None => {
                product_use.features.push(FeatureUse::new(&feature.name, None));
                product_use.features.len() - 1
            }
        };
        let recorded = &mut product_use.features[index];
        recorded.use_count += 1;
        if feature.version.is_some() {
            recorded.version = feature.version.clone();
        }
        if let (true, Some(data)) = (level.allows_metadata(), feature_data) {
            recorded.feature_data = String::from_utf8_lossy(data).into_owned();
        }
        state.dirty = true;
        Ok(())
    }

    fn payload(&self) -> Result<UsagePayload, UsageError> {
        Ok(self.state.read().payload.clone())
    }

    fn privacy_level(&self) -> Result<PrivacyLevel, UsageError> {
        Ok(self.state.read().privacy_level)
    }

    fn set_privacy_level(&self, level: PrivacyLevel) -> Result<(), UsageError> {
        let mut state = self.state.write();
        state.privacy_level = level;
        if !level.allows_recording() {
            state.payload = UsagePayload::default();
            state.dirty = false;
        }
        Ok(())
    }

    fn request_transmission(&self) -> Result<(), UsageError> {
        self.send_if_allowed("transmission request")
    }

    fn flush_if_possible(&self) -> Result<(), UsageError> {
        self.send_if_allowed("flush")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductVersion;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CapturingTransmitter {
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl Transmitter for CapturingTransmitter {
        fn transmit(&self, body: &[u8]) -> Result<(), UsageError> {
            self.bodies.lock().push(body.to_vec());
            Ok(())
        }
    }

    fn eclipse() -> Product {
        Product::new("Eclipse", &ProductVersion::new(3, 8, 0, "v20120521"))
    }

    #[test]
    fn records_features_under_their_product() {
        let sink = MemorySink::new(PrivacyLevel::EnableUaa);
        let feature = FeatureUse::new("org.eclipse.jdt.core", Some("3.8.1".into()));

        sink.register_product_usage(&eclipse(), Some(br#"{"platform":"linux.gtk.x86_64"}"#), None)
            .unwrap();
        sink.register_feature_usage(&eclipse(), &feature, Some(br#"{"x":"1"}"#)).unwrap();
        sink.register_feature_usage(&eclipse(), &feature, None).unwrap();

        let payload = sink.payload().unwrap();
        assert_eq!(payload.products.len(), 1);
        let product_use = &payload.products[0];
        assert_eq!(product_use.use_count, 1);
        assert_eq!(product_use.product_data, r#"{"platform":"linux.gtk.x86_64"}"#);

        let recorded = product_use.feature("org.eclipse.jdt.core").unwrap();
        assert_eq!(recorded.use_count, 2);
        assert_eq!(recorded.version.as_deref(), Some("3.8.1"));
        assert_eq!(recorded.feature_data, r#"{"x":"1"}"#);
    }

    #[test]
    fn projects_are_recorded_once() {
        let sink = MemorySink::new(PrivacyLevel::EnableUaa);
        sink.register_product_usage(&eclipse(), None, Some("petclinic")).unwrap();
        sink.register_product_usage(&eclipse(), None, Some("petclinic")).unwrap();
        sink.register_product_usage(&eclipse(), None, Some("roo-shell")).unwrap();

        let payload = sink.payload().unwrap();
        assert_eq!(payload.products[0].projects, vec!["petclinic", "roo-shell"]);
        assert_eq!(payload.products[0].use_count, 3);
    }

    #[test]
    fn declined_terms_record_nothing_and_clear_payload() {
        let sink = MemorySink::new(PrivacyLevel::EnableUaa);
        sink.register_product_usage(&eclipse(), None, None).unwrap();
        sink.set_privacy_level(PrivacyLevel::DeclineTou).unwrap();
        assert!(sink.payload().unwrap().is_empty());

        sink.register_product_usage(&eclipse(), None, None).unwrap();
        assert!(sink.payload().unwrap().is_empty());
    }

    #[test]
    fn limited_data_drops_metadata() {
        let sink = MemorySink::new(PrivacyLevel::LimitedData);
        let feature = FeatureUse::new("org.eclipse.jdt.core", None);
        sink.register_product_usage(&eclipse(), Some(b"{}"), Some("petclinic")).unwrap();
        sink.register_feature_usage(&eclipse(), &feature, Some(br#"{"x":"1"}"#)).unwrap();

        let payload = sink.payload().unwrap();
        assert!(payload.products[0].projects.is_empty());
        assert!(payload.products[0].product_data.is_empty());
        assert!(payload.products[0].features[0].feature_data.is_empty());
    }

    #[test]
    fn transmits_only_when_allowed_and_changed() {
        let transmitter = Arc::new(CapturingTransmitter::default());
        let sink = MemorySink::new(PrivacyLevel::UndecidedTou).with_transmitter(transmitter.clone());

        sink.register_product_usage(&eclipse(), None, None).unwrap();
        sink.request_transmission().unwrap();
        assert_eq!(sink.transmissions(), 0);

        sink.set_privacy_level(PrivacyLevel::EnableUaa).unwrap();
        sink.request_transmission().unwrap();
        sink.flush_if_possible().unwrap();
        assert_eq!(sink.transmissions(), 1);

        sink.register_product_usage(&eclipse(), None, None).unwrap();
        sink.flush_if_possible().unwrap();
        assert_eq!(sink.transmissions(), 2);

        let bodies = transmitter.bodies.lock();
        let sent: UsagePayload = serde_json::from_slice(&bodies[1]).unwrap();
        assert_eq!(sent.products[0].use_count, 2);
    }

    #[test]
    fn empty_payload_is_never_sent() {
        let transmitter = Arc::new(CapturingTransmitter::default());
        let sink = MemorySink::new(PrivacyLevel::EnableUaa).with_transmitter(transmitter.clone());
        sink.flush_if_possible().unwrap();
        assert!(transmitter.bodies.lock().is_empty());
    }
}
