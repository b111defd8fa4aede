//! Device identity

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug)]
struct Identity {
    /// Address as given, minus surrounding whitespace
    address: Box<str>,
    /// Lowercased address used for equality, ordering and hashing
    key: Box<str>,
}

/// Opaque, stable identifier of a peripheral (typically its hardware address).
///
/// Cheap to clone; immutable for the life of a supervisor. The address is kept
/// exactly as given (minus surrounding whitespace) and is what transports
/// receive, so case-sensitive platform identifiers survive. Comparison ignores
/// ASCII case: `B0:B1:13:2D:B4:01` and `b0:b1:13:2d:b4:01` name the same device.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DeviceId(Arc<Identity>);

impl DeviceId {
    /// Create a device identity from an address string.
    pub fn new(address: impl AsRef<str>) -> Self {
        let address = address.as_ref().trim();
        Self(Arc::new(Identity {
            address: address.into(),
            key: address.to_ascii_lowercase().into_boxed_str(),
        }))
    }

    /// The address as given.
    pub fn as_str(&self) -> &str {
        &self.0.address
    }

    /// Lowercased form used for comparison.
    pub fn normalized(&self) -> &str {
        &self.0.key
    }
}

impl PartialEq for DeviceId {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for DeviceId {}

impl Hash for DeviceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl PartialOrd for DeviceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeviceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.key.cmp(&other.0.key)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceId").field(&self.0.address).finish()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.address)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(value: DeviceId) -> Self {
        value.0.address.to_string()
    }
}
