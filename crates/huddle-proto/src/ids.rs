//! Identifier and color newtypes shared by client and server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one live connection.
///
/// Assigned by the transport at connect time and unique among live
/// connections. Serialized as a plain JSON string (`userId` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Render a random 64-bit value as a 16 digit lowercase hex identifier.
    pub fn from_u64(value: u64) -> Self {
        Self(format!("{value:016x}"))
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Display color assigned to a room membership, e.g. `#1a2b3c`.
///
/// Purely visual. Two members may share a color.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Build a color from the low 24 bits of `rgb`.
    ///
    /// Always renders six lowercase hex digits with a `#` prefix.
    pub fn from_rgb(rgb: u32) -> Self {
        Self(format!("#{:06x}", rgb & 0x00ff_ffff))
    }

    /// Color as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the color has the `#rrggbb` shape.
    ///
    /// Colors received from the wire are not validated on decode, so this is
    /// used by invariant checks rather than by the codec.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 7
            && self.0.starts_with('#')
            && self.0[1..].bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
