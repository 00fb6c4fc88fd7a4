//! Resources and the identifiers of the parties that handle them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw numeric id.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw numeric id.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Monotonic resource identifier, assigned when a producer mints a resource.
    ResourceId
);

numeric_id!(
    /// Producer slot identifier (`0..producer_count`).
    ProducerId
);

numeric_id!(
    /// Identifier of a live consumer connection.
    ConsumerId
);

numeric_id!(
    /// Identifier of a live monitor connection.
    MonitorId
);

/// A discrete unit produced into the buffer and handed to one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Unique, monotonically increasing id
    pub id: ResourceId,

    /// Producer that minted this resource
    pub produced_by: ProducerId,
}

impl Resource {
    /// Creates a resource record.
    pub const fn new(id: ResourceId, produced_by: ProducerId) -> Self {
        Self { id, produced_by }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{} (producer {})", self.id, self.produced_by)
    }
}
