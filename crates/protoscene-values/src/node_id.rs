// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Generational node handles.
use std::fmt;

/// Handle to a node slot in an arena.
///
/// A handle pairs a slot index with the generation the slot had when the node
/// was inserted. Freeing a slot bumps its generation, so stale handles stop
/// resolving instead of aliasing whatever node reuses the slot. Index 0 is the
/// nil sentinel and never names a live node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// The nil handle.
    pub const NIL: Self = Self {
        index: 0,
        generation: 0,
    };

    /// Builds a handle from its raw parts.
    #[must_use]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at insertion time.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns `true` for the nil sentinel.
    #[must_use]
    pub const fn is_nil(self) -> bool {
        self.index == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}
