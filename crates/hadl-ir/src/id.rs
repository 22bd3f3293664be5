//! Stable ID newtypes for graph entities.
//!
//! `NodeId` is a distinct newtype wrapper over `u32` indexing a slot in a
//! graph's node arena. Slots are push-only and ids are never reused, so a
//! `NodeId` stays meaningful (active or deleted) for the life of its graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier within a single [`crate::graph::Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena slot index for this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
    }

    #[test]
    fn node_id_index() {
        assert_eq!(NodeId(42).index(), 42);
    }

    #[test]
    fn serde_roundtrip() {
        let id = NodeId(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
