//! Stable ID newtypes for instrumented program locations.
//!
//! A [`LocationId`] is the "iid" an analysis sees for every event. It is a
//! newtype over `u32` so it cannot be confused with operand indices or
//! counters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of one instrumented program point.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LocationId(pub u32);

impl LocationId {
    /// Returns the id as a slot index for host-side tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for LocationId {
    fn from(idx: usize) -> Self {
        LocationId(idx as u32)
    }
}
