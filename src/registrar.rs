//! The usage registrar: accepts usage events, suppresses repeats inside the
//! cooldown window and forwards the rest to the reporting sink.
//!
//! All `register_*` calls return immediately. The work runs on a pool of
//! worker tasks, and each job runs its dedup check, catalog dispatch and
//! ledger append under one write guard. Failures inside a job are logged
//! and swallowed, so callers never see them.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::attempt::{AttemptKind, Ledger, RegistrationAttempt};
use crate::catalog::{DispatchContext, Platform, ProductCatalog};
use crate::config::RegistrarConfig;
use crate::error::UsageError;
use crate::metadata::FeatureData;
use crate::product::{resolve_product, HeuristicVersionParser, VersionHeuristic};
use crate::sink::{PrivacyLevel, ReportingSink};
use crate::worker::{RegistrarStats, StatsSnapshot, WorkerPool};

/// What host integration code needs from a usage registrar.
pub trait UsageReporter: Send + Sync {
    fn register_feature_use(&self, plugin_id: &str, feature_data: Option<FeatureData>);

    fn register_product_use(&self, product_id: &str, version: Option<&str>, project_id: Option<&str>);

    fn register_project_usage_for_product(
        &self,
        feature: &str,
        project_id: &str,
        feature_data: Option<FeatureData>,
    );

    fn privacy_level(&self) -> Result<PrivacyLevel, UsageError>;

    fn set_privacy_level(&self, level: PrivacyLevel) -> Result<(), UsageError>;

    fn readable_payload(&self) -> Result<String, UsageError>;
}

#[derive(Debug, Default)]
struct RegistrarState {
    catalog: ProductCatalog,
    ledger: Ledger,
    started: bool,
}

struct Shared {
    config: RegistrarConfig,
    sink: Arc<dyn ReportingSink>,
    platform: Arc<dyn Platform>,
    heuristic: Arc<dyn VersionHeuristic>,
    state: RwLock<RegistrarState>,
    stats: RegistrarStats,
}

impl Shared {
    fn process(&self, attempt: RegistrationAttempt) {
        let mut state = self.state.write();
        if state.ledger.should_skip(&attempt, self.config.cooldown()) {
            tracing::debug!("dropping repeated {:?}", attempt.kind());
            self.stats.record_deduplicated();
            return;
        }

        match self.dispatch(&mut state.catalog, &attempt) {
            Ok(true) => {
                state.ledger.append(attempt);
                self.stats.record_dispatched();
            }
            Ok(false) => {
                tracing::debug!("no product claims {:?}", attempt.kind());
                self.stats.record_unmatched();
            }
            Err(err) => {
                tracing::warn!("failed to register {:?}: {}", attempt.kind(), err);
                self.stats.record_failed();
            }
        }
    }

    fn dispatch(&self, catalog: &mut ProductCatalog, attempt: &RegistrationAttempt) -> Result<bool, UsageError> {
        let ctx = DispatchContext {
            sink: self.sink.as_ref(),
            platform: self.platform.as_ref(),
        };
        match attempt.kind() {
            AttemptKind::Feature {
                plugin_id,
                feature_data,
            } => catalog.register_feature_use(&ctx, plugin_id, feature_data.as_ref()),
            AttemptKind::ProjectUsage {
                feature,
                project_id,
                feature_data,
            } => catalog.register_project_usage(&ctx, feature, project_id, feature_data.as_ref()),
            AttemptKind::Product {
                product_id,
                version,
                project_id,
            } => {
                let product = resolve_product(product_id, version, self.heuristic.as_ref());
                self.sink
                    .register_product_usage(&product, None, project_id.as_deref())?;
                Ok(true)
            }
        }
    }

    fn request_transmission(&self) {
        if let Err(err) = self.sink.request_transmission() {
            tracing::warn!("usage transmission failed: {}", err);
        }
    }
}

pub struct UsageRegistrar {
    shared: Arc<Shared>,
    pool: WorkerPool<RegistrationAttempt>,
    handle: Handle,
    transmission: Mutex<Option<JoinHandle<()>>>,
}

impl UsageRegistrar {
    pub fn new(
        config: RegistrarConfig,
        sink: Arc<dyn ReportingSink>,
        platform: Arc<dyn Platform>,
        handle: Handle,
    ) -> Result<Self, UsageError> {
        Self::with_heuristic(config, sink, platform, Arc::new(HeuristicVersionParser), handle)
    }

    /// Like [`UsageRegistrar::new`] with a custom fallback for versions that
    /// are not in `major.minor.micro.qualifier` form.
    pub fn with_heuristic(
        config: RegistrarConfig,
        sink: Arc<dyn ReportingSink>,
        platform: Arc<dyn Platform>,
        heuristic: Arc<dyn VersionHeuristic>,
        handle: Handle,
    ) -> Result<Self, UsageError> {
        config.validate()?;
        let worker_count = config.worker_count;
        let shared = Arc::new(Shared {
            config,
            sink,
            platform,
            heuristic,
            state: RwLock::new(RegistrarState::default()),
            stats: RegistrarStats::new(),
        });

        let worker_shared = shared.clone();
        let pool = WorkerPool::new(worker_count, &handle, move |attempt: RegistrationAttempt| {
            worker_shared.process(attempt)
        });

        Ok(UsageRegistrar {
            shared,
            pool,
            handle,
            transmission: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.shared.config
    }

    /// Loads the product catalog and schedules the first transmission
    /// request. Later calls do nothing.
    pub fn start(&self) {
        let mut state = self.shared.state.write();
        if state.started {
            return;
        }
        state.catalog = ProductCatalog::load(&self.shared.config, self.shared.platform.as_ref());
        state.started = true;
        let products = state.catalog.len();
        drop(state);

        let shared = self.shared.clone();
        let delay = self.shared.config.transmission_delay();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.request_transmission();
        });
        *self.transmission.lock() = Some(task);
        tracing::info!("usage registrar started with {} products, first transmission in {:?}", products, delay);
    }

    /// Cancels a transmission that has not fired yet and flushes the sink.
    /// Jobs still queued are not waited for, so their usage misses this
    /// flush. Use [`UsageRegistrar::shutdown`] to drain the queue first.
    pub fn stop(&self) {
        let _state = self.shared.state.write();
        if let Some(task) = self.transmission.lock().take() {
            task.abort();
        }
        if let Err(err) = self.shared.sink.flush_if_possible() {
            tracing::warn!("flushing usage data failed: {}", err);
        }
        tracing::info!("usage registrar stopped");
    }

    /// Waits for every queued job, then stops.
    pub async fn shutdown(&self) {
        self.settle().await;
        self.stop();
    }

    pub fn is_started(&self) -> bool {
        self.shared.state.read().started
    }

    pub fn register_feature_use(&self, plugin_id: &str, feature_data: Option<FeatureData>) {
        if plugin_id.is_empty() {
            return;
        }
        self.submit(RegistrationAttempt::feature(plugin_id, feature_data));
    }

    /// A missing version is reported as [`crate::config::EMPTY_VERSION`].
    /// An empty project id counts as no project.
    pub fn register_product_use(&self, product_id: &str, version: Option<&str>, project_id: Option<&str>) {
        if product_id.is_empty() {
            return;
        }
        let version = version.unwrap_or(self.shared.config.empty_version.as_str());
        let project_id = project_id.filter(|p| !p.is_empty());
        self.submit(RegistrationAttempt::product(product_id, version, project_id));
    }

    pub fn register_project_usage_for_product(
        &self,
        feature: &str,
        project_id: &str,
        feature_data: Option<FeatureData>,
    ) {
        if feature.is_empty() || project_id.is_empty() {
            return;
        }
        self.submit(RegistrationAttempt::project_usage(feature, project_id, feature_data));
    }

    pub fn privacy_level(&self) -> Result<PrivacyLevel, UsageError> {
        let _state = self.shared.state.read();
        self.shared.sink.privacy_level()
    }

    pub fn set_privacy_level(&self, level: PrivacyLevel) -> Result<(), UsageError> {
        let _state = self.shared.state.write();
        self.shared.sink.set_privacy_level(level)?;
        tracing::info!("privacy level set to {}", level);
        Ok(())
    }

    pub fn set_privacy_level_code(&self, code: i32) -> Result<(), UsageError> {
        self.set_privacy_level(PrivacyLevel::try_from(code)?)
    }

    /// The sink's current payload as indented JSON.
    pub fn readable_payload(&self) -> Result<String, UsageError> {
        let _state = self.shared.state.read();
        self.shared.sink.payload()?.to_readable()
    }

    /// Waits until every job queued so far has run.
    pub async fn settle(&self) {
        self.pool.settle().await;
    }

    pub fn pending_jobs(&self) -> usize {
        self.pool.pending()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn ledger_len(&self) -> usize {
        self.shared.state.read().ledger.len()
    }

    fn submit(&self, attempt: RegistrationAttempt) {
        self.shared.stats.record_submitted();
        if !self.pool.submit(attempt) {
            tracing::warn!("usage registrar workers are gone, dropping registration");
        }
    }
}

impl Drop for UsageRegistrar {
    fn drop(&mut self) {
        if let Some(task) = self.transmission.get_mut().take() {
            task.abort();
        }
    }
}

impl UsageReporter for UsageRegistrar {
    fn register_feature_use(&self, plugin_id: &str, feature_data: Option<FeatureData>) {
        UsageRegistrar::register_feature_use(self, plugin_id, feature_data)
    }

    fn register_product_use(&self, product_id: &str, version: Option<&str>, project_id: Option<&str>) {
        UsageRegistrar::register_product_use(self, product_id, version, project_id)
    }

    fn register_project_usage_for_product(
        &self,
        feature: &str,
        project_id: &str,
        feature_data: Option<FeatureData>,
    ) {
        UsageRegistrar::register_project_usage_for_product(self, feature, project_id, feature_data)
    }

    fn privacy_level(&self) -> Result<PrivacyLevel, UsageError> {
        UsageRegistrar::privacy_level(self)
    }

    fn set_privacy_level(&self, level: PrivacyLevel) -> Result<(), UsageError> {
        UsageRegistrar::set_privacy_level(self, level)
    }

    fn readable_payload(&self) -> Result<String, UsageError> {
        UsageRegistrar::readable_payload(self)
    }
}
