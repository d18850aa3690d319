//! Packed protocol version encoding.
//!
//! The wire carries a version as a single `u32`:
//!
//! ```text
//! [major (upper 16 bits)] [minor (8 bits)] [patch (8 bits)]
//! ```
//!
//! Encoding is lossy and never fails. `minor` and `patch` are masked to one byte,
//! so out-of-range values are truncated rather than rejected. `major` is shifted
//! without masking; bits that do not fit are dropped.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A (major, minor, patch) protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Pack into the wire representation. See [`encode`].
    #[inline]
    pub fn to_wire(self) -> u32 {
        encode(self)
    }

    /// Unpack from the wire representation. See [`decode`].
    #[inline]
    pub fn from_wire(wire: u32) -> Self {
        decode(wire)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl From<(u32, u32, u32)> for SemanticVersion {
    fn from((major, minor, patch): (u32, u32, u32)) -> Self {
        Self::new(major, minor, patch)
    }
}

/// Pack a version into its `u32` wire form.
///
/// `minor` and `patch` are truncated to their low byte.
#[inline]
pub fn encode(version: SemanticVersion) -> u32 {
    (version.major << 16) | ((version.minor & 0xFF) << 8) | (version.patch & 0xFF)
}

/// Unpack a `u32` wire version. Never fails.
#[inline]
pub fn decode(wire: u32) -> SemanticVersion {
    SemanticVersion {
        major: wire >> 16,
        minor: (wire >> 8) & 0xFF,
        patch: wire & 0xFF,
    }
}
