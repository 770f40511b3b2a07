mod http;
mod memory;
mod payload;

pub use http::HttpTransmitter;
pub use memory::{MemorySink, Transmitter};
pub use payload::{FeatureUse, ProductUse, UsagePayload};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::UsageError;
use crate::product::Product;

/// How much usage data the user has agreed to share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrivacyLevel {
    #[default]
    UndecidedTou,
    DeclineTou,
    EnableUaa,
    DisableUaa,
    LimitedData,
}

impl PrivacyLevel {
    pub const ALL: [PrivacyLevel; 5] = [
        PrivacyLevel::UndecidedTou,
        PrivacyLevel::DeclineTou,
        PrivacyLevel::EnableUaa,
        PrivacyLevel::DisableUaa,
        PrivacyLevel::LimitedData,
    ];

    pub fn code(self) -> i32 {
        match self {
            PrivacyLevel::UndecidedTou => 0,
            PrivacyLevel::DeclineTou => 1,
            PrivacyLevel::EnableUaa => 2,
            PrivacyLevel::DisableUaa => 3,
            PrivacyLevel::LimitedData => 4,
        }
    }

    /// Whether usage may be stored locally at this level.
    pub fn allows_recording(self) -> bool {
        !matches!(self, PrivacyLevel::DeclineTou | PrivacyLevel::DisableUaa)
    }

    /// Whether stored usage may leave the machine at this level.
    pub fn allows_transmission(self) -> bool {
        matches!(self, PrivacyLevel::EnableUaa | PrivacyLevel::LimitedData)
    }

    /// Whether feature/product metadata and project ids may be kept.
    pub fn allows_metadata(self) -> bool {
        !matches!(self, PrivacyLevel::LimitedData)
    }
}

impl TryFrom<i32> for PrivacyLevel {
    type Error = UsageError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        PrivacyLevel::ALL
            .into_iter()
            .find(|level| level.code() == code)
            .ok_or(UsageError::InvalidPrivacyLevel(code))
    }
}

impl From<PrivacyLevel> for i32 {
    fn from(level: PrivacyLevel) -> Self {
        level.code()
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrivacyLevel::UndecidedTou => "UNDECIDED_TOU",
            PrivacyLevel::DeclineTou => "DECLINE_TOU",
            PrivacyLevel::EnableUaa => "ENABLE_UAA",
            PrivacyLevel::DisableUaa => "DISABLE_UAA",
            PrivacyLevel::LimitedData => "LIMITED_DATA",
        };
        f.write_str(name)
    }
}

/// Persists usage records and transmits them.
///
/// The registrar only calls these methods while holding its own lock, so
/// implementations see calls one at a time for mutations.
#[cfg_attr(test, mockall::automock)]
pub trait ReportingSink: Send + Sync {
    fn register_product_usage<'a>(
        &self,
        product: &Product,
        product_data: Option<&'a [u8]>,
        project_id: Option<&'a str>,
    ) -> Result<(), UsageError>;

    fn register_feature_usage<'a>(
        &self,
        product: &Product,
        feature: &FeatureUse,
        feature_data: Option<&'a [u8]>,
    ) -> Result<(), UsageError>;

    fn payload(&self) -> Result<UsagePayload, UsageError>;

    fn privacy_level(&self) -> Result<PrivacyLevel, UsageError>;

    fn set_privacy_level(&self, level: PrivacyLevel) -> Result<(), UsageError>;

    fn request_transmission(&self) -> Result<(), UsageError>;

    fn flush_if_possible(&self) -> Result<(), UsageError>;
}
