use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use crate::metadata::FeatureData;

/// What a registration attempt reports. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    Feature {
        plugin_id: String,
        feature_data: Option<FeatureData>,
    },
    Product {
        product_id: String,
        version: String,
        project_id: Option<String>,
    },
    ProjectUsage {
        feature: String,
        project_id: String,
        feature_data: Option<FeatureData>,
    },
}

/// A single request to report one unit of usage.
#[derive(Debug, Clone)]
pub struct RegistrationAttempt {
    kind: AttemptKind,
    created_at: Instant,
}

impl RegistrationAttempt {
    pub fn new(kind: AttemptKind) -> Self {
        Self {
            kind,
            created_at: Instant::now(),
        }
    }

    pub fn feature(plugin_id: &str, feature_data: Option<FeatureData>) -> Self {
        Self::new(AttemptKind::Feature {
            plugin_id: plugin_id.to_string(),
            feature_data,
        })
    }

    pub fn product(product_id: &str, version: &str, project_id: Option<&str>) -> Self {
        Self::new(AttemptKind::Product {
            product_id: product_id.to_string(),
            version: version.to_string(),
            project_id: project_id.map(str::to_string),
        })
    }

    pub fn project_usage(feature: &str, project_id: &str, feature_data: Option<FeatureData>) -> Self {
        Self::new(AttemptKind::ProjectUsage {
            feature: feature.to_string(),
            project_id: project_id.to_string(),
            feature_data,
        })
    }

    pub fn kind(&self) -> &AttemptKind {
        &self.kind
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// True once more than `cooldown` has passed since this attempt was made.
    pub fn cooldown_elapsed(&self, cooldown: Duration) -> bool {
        self.created_at.elapsed() > cooldown
    }
}

impl PartialEq for RegistrationAttempt {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for RegistrationAttempt {}

impl Hash for RegistrationAttempt {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

/// Append-only record of dispatched attempts.
///
/// Only mutated while the registrar's write guard is held, which is what
/// makes the check-then-append in [`Ledger::should_skip`] race free.
#[derive(Debug, Default)]
pub struct Ledger {
    attempts: Vec<RegistrationAttempt>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent entry structurally equal to `attempt`.
    pub fn latest(&self, attempt: &RegistrationAttempt) -> Option<&RegistrationAttempt> {
        self.attempts.iter().rev().find(|a| *a == attempt)
    }

    pub fn should_skip(&self, attempt: &RegistrationAttempt, cooldown: Duration) -> bool {
        self.latest(attempt)
            .is_some_and(|previous| !previous.cooldown_elapsed(cooldown))
    }

    pub fn append(&mut self, attempt: RegistrationAttempt) {
        self.attempts.push(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistrationAttempt> {
        self.attempts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn data(pairs: &[(&str, &str)]) -> Option<FeatureData> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn equality_ignores_timestamp() {
        let first = RegistrationAttempt::feature("org.eclipse.jdt.core", data(&[("x", "1")]));
        thread::sleep(Duration::from_millis(2));
        let second = RegistrationAttempt::feature("org.eclipse.jdt.core", data(&[("x", "1")]));

        assert_ne!(first.created_at(), second.created_at());
        assert_eq!(first, second);
    }

    #[test]
    fn differing_feature_data_is_distinct() {
        let a = RegistrationAttempt::feature("org.eclipse.jdt.core", data(&[("x", "1")]));
        let b = RegistrationAttempt::feature("org.eclipse.jdt.core", data(&[("x", "2")]));
        let c = RegistrationAttempt::feature("org.eclipse.jdt.core", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn map_order_does_not_matter() {
        let a = RegistrationAttempt::feature("p", data(&[("a", "1"), ("b", "2")]));
        let b = RegistrationAttempt::feature("p", data(&[("b", "2"), ("a", "1")]));
        assert_eq!(a, b);
    }

    #[test]
    fn variants_never_compare_equal() {
        let product = RegistrationAttempt::product("p", "1.0.0", Some("proj"));
        let usage = RegistrationAttempt::project_usage("p", "proj", None);
        assert_ne!(product, usage);
    }

    #[test]
    fn product_version_is_part_of_identity() {
        let a = RegistrationAttempt::product("spring-tools", "3.9.0.RELEASE", None);
        let b = RegistrationAttempt::product("spring-tools", "3.9.1.RELEASE", None);
        assert_ne!(a, b);
    }

    #[test]
    fn ledger_skips_within_cooldown() {
        let mut ledger = Ledger::new();
        let attempt = RegistrationAttempt::feature("p", None);
        assert!(!ledger.should_skip(&attempt, Duration::from_secs(60)));

        ledger.append(attempt.clone());
        assert!(ledger.should_skip(&RegistrationAttempt::feature("p", None), Duration::from_secs(60)));
        assert!(!ledger.should_skip(&RegistrationAttempt::feature("q", None), Duration::from_secs(60)));
    }

    #[test]
    fn ledger_allows_after_cooldown() {
        let mut ledger = Ledger::new();
        ledger.append(RegistrationAttempt::feature("p", None));
        thread::sleep(Duration::from_millis(20));

        assert!(!ledger.should_skip(&RegistrationAttempt::feature("p", None), Duration::from_millis(5)));
    }

    #[test]
    fn latest_entry_governs_the_window() {
        let mut ledger = Ledger::new();
        ledger.append(RegistrationAttempt::feature("p", None));
        thread::sleep(Duration::from_millis(30));
        ledger.append(RegistrationAttempt::feature("p", None));

        let probe = RegistrationAttempt::feature("p", None);
        assert!(ledger.should_skip(&probe, Duration::from_millis(20)));
        assert_eq!(ledger.len(), 2);
    }
}
