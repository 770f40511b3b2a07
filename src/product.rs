use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::UsageError;

/// Identity of a product as reported to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub release_qualifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_control_identifier: Option<String>,
}

impl Product {
    pub fn new(name: &str, version: &ProductVersion) -> Self {
        Product {
            name: name.to_string(),
            major_version: version.major,
            minor_version: version.minor,
            patch_version: version.micro,
            release_qualifier: version.qualifier.clone(),
            source_control_identifier: None,
        }
    }

    pub fn with_source_control_identifier(mut self, id: Option<String>) -> Self {
        self.source_control_identifier = id.filter(|id| !id.is_empty());
        self
    }

    pub fn version(&self) -> ProductVersion {
        ProductVersion {
            major: self.major_version,
            minor: self.minor_version,
            micro: self.patch_version,
            qualifier: self.release_qualifier.clone(),
        }
    }
}

/// A `major.minor.micro.qualifier` version triple plus qualifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl ProductVersion {
    pub fn new(major: u32, minor: u32, micro: u32, qualifier: &str) -> Self {
        ProductVersion {
            major,
            minor,
            micro,
            qualifier: qualifier.to_string(),
        }
    }

    /// Strict parse. Missing trailing components default to zero; an empty
    /// string is `0.0.0`.
    pub fn parse(raw: &str) -> Result<Self, UsageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(ProductVersion::default());
        }

        let invalid = |reason: &str| UsageError::VersionParse {
            version: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = trimmed.splitn(4, '.');
        let mut numeric = [0u32; 3];
        for (index, slot) in numeric.iter_mut().enumerate() {
            match parts.next() {
                Some(part) => {
                    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(invalid(&format!("component {} is not a number", index + 1)));
                    }
                    *slot = part
                        .parse()
                        .map_err(|_| invalid(&format!("component {} is out of range", index + 1)))?;
                }
                None if index == 0 => return Err(invalid("missing major component")),
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default();
        if trimmed.ends_with('.') && qualifier.is_empty() {
            return Err(invalid("trailing separator"));
        }
        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid("qualifier contains invalid characters"));
        }

        Ok(ProductVersion {
            major: numeric[0],
            minor: numeric[1],
            micro: numeric[2],
            qualifier: qualifier.to_string(),
        })
    }
}

impl FromStr for ProductVersion {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductVersion::parse(s)
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

/// Best-effort product identity for version strings the strict parser rejects.
pub trait VersionHeuristic: Send + Sync {
    fn resolve(&self, name: &str, version: &str) -> Product;
}

/// Pulls leading numbers, an optional qualifier and an optional trailing
/// `[rev <id>]` marker out of free-form version strings such as
/// `3.9.0-SNAPSHOT` or `1.0.0.RELEASE [rev 4ae21f]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicVersionParser;

fn heuristic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:[.\-_ ]+([^\[\s]+))?\s*(?:\[(?:rev\s+)?([^\]]+)\])?\s*$",
        )
        .expect("heuristic version pattern is valid")
    })
}

impl VersionHeuristic for HeuristicVersionParser {
    fn resolve(&self, name: &str, version: &str) -> Product {
        let number = |m: Option<regex::Match<'_>>| {
            m.and_then(|m| m.as_str().parse::<u32>().ok()).unwrap_or(0)
        };

        match heuristic_pattern().captures(version) {
            Some(caps) => {
                let parsed = ProductVersion {
                    major: number(caps.get(1)),
                    minor: number(caps.get(2)),
                    micro: number(caps.get(3)),
                    qualifier: caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default(),
                };
                Product::new(name, &parsed)
                    .with_source_control_identifier(caps.get(5).map(|m| m.as_str().trim().to_string()))
            }
            None => Product::new(name, &ProductVersion::new(0, 0, 0, version.trim())),
        }
    }
}

/// Strict parse first, falling back to `heuristic` when that fails.
pub fn resolve_product(name: &str, version: &str, heuristic: &dyn VersionHeuristic) -> Product {
    match ProductVersion::parse(version) {
        Ok(parsed) => Product::new(name, &parsed),
        Err(err) => {
            tracing::debug!("{}; using heuristic version for {}", err, name);
            heuristic.resolve(name, version)
        }
    }
}
