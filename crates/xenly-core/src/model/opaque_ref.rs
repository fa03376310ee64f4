// ── Object references ──
//
// XAPI identifies every object by an opaque reference string that stays
// stable for the object's lifetime. References held in fields are
// non-owning: the target may have been deleted or never delivered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque reference to a remote object (`OpaqueRef:…`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueRef(String);

impl OpaqueRef {
    /// The reference XAPI uses for "no object".
    pub const NULL: &'static str = "OpaqueRef:NULL";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn null() -> Self {
        Self(Self::NULL.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for the null reference and for the empty string some
    /// older hosts send instead.
    pub fn is_null(&self) -> bool {
        self.0.is_empty() || self.0 == Self::NULL
    }
}

impl fmt::Display for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OpaqueRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<String> for OpaqueRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OpaqueRef {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for OpaqueRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
