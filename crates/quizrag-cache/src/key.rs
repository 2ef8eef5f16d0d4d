//! Cache key derivation

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Identifiers longer than this are replaced by their md5 digest.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Artifact classes, each with an independent default TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheClass {
    Chunk,
    Quiz,
    Objectives,
    SearchResults,
}

impl CacheClass {
    pub const ALL: [CacheClass; 4] = [
        CacheClass::Chunk,
        CacheClass::Quiz,
        CacheClass::Objectives,
        CacheClass::SearchResults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheClass::Chunk => "chunk",
            CacheClass::Quiz => "quiz",
            CacheClass::Objectives => "objectives",
            CacheClass::SearchResults => "search_results",
        }
    }
}

impl fmt::Display for CacheClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheClass {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "chunk" => Ok(CacheClass::Chunk),
            "quiz" => Ok(CacheClass::Quiz),
            "objectives" => Ok(CacheClass::Objectives),
            "search_results" | "search" => Ok(CacheClass::SearchResults),
            other => Err(CacheError::InvalidPattern {
                pattern: other.to_string(),
            }),
        }
    }
}

/// Builds `<namespace>:<class>:<identifier>` keys.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    namespace: String,
}

impl KeyDeriver {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn derive(&self, class: CacheClass, identifier: &str) -> String {
        format!(
            "{}:{}:{}",
            self.namespace,
            class.as_str(),
            Self::bounded_identifier(identifier)
        )
    }

    /// Glob matching every key in the namespace, or only those under `pattern`.
    ///
    /// `pattern` is usually a class name (`"quiz"`), but any glob fragment is
    /// accepted and matched against the part after the namespace.
    pub fn pattern(&self, pattern: Option<&str>) -> String {
        match pattern {
            Some(fragment) => format!("{}:{}:*", self.namespace, fragment),
            None => format!("{}:*", self.namespace),
        }
    }

    /// Reserved key used by functional health diagnostics.
    pub fn health_key(&self) -> String {
        format!("{}:health_check", self.namespace)
    }

    fn bounded_identifier(identifier: &str) -> String {
        if identifier.chars().count() > MAX_IDENTIFIER_LEN {
            format!("{:x}", md5::compute(identifier.as_bytes()))
        } else {
            identifier.to_string()
        }
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new("quiz_gen")
    }
}
