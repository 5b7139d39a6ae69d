use crate::error::FramingError;
use std::fmt;

/// Identifier of a logical flow within one session.
///
/// Flow IDs are assigned by the application. On the wire they are encoded as a
/// QUIC variable-length integer, so the largest usable value is `2^62 - 1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowId(u64);

impl FlowId {
    /// The largest flow ID that fits the wire encoding.
    pub const MAX: FlowId = FlowId((1 << 62) - 1);

    /// Wraps a value already known to be in range, such as a decoded varint.
    /// Application IDs go through `TryFrom<u64>`.
    pub(crate) fn new(id: u64) -> Self {
        debug_assert!(id <= Self::MAX.0, "flow ID {} out of range", id);
        FlowId(id)
    }
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for FlowId {
    type Error = FramingError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > Self::MAX.0 {
            return Err(FramingError::FlowIdOutOfRange(value));
        }
        Ok(FlowId(value))
    }
}

impl From<u32> for FlowId {
    fn from(value: u32) -> Self {
        FlowId(value as u64)
    }
}

impl From<FlowId> for u64 {
    fn from(value: FlowId) -> Self {
        value.0
    }
}

impl nohash_hasher::IsEnabled for FlowId {}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
