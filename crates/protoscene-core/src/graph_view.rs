// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Read-only view over a node graph.
use protoscene_values::{FieldValue, NodeId};

use crate::interface::InterfaceSet;

/// What path computation needs to know about a graph.
///
/// Implemented by template bodies and by the live world, so a path computed
/// on one can be replayed on the other.
pub trait NodeGraph {
    /// Interfaces of a live node.
    fn interfaces(&self, node: NodeId) -> Option<&InterfaceSet>;

    /// Current value of a field or exposedField.
    fn field_value(&self, node: NodeId, name: &str) -> Option<FieldValue>;
}
