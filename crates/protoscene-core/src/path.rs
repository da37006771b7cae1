// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structural node addresses.
//!
//! A [`NodePath`] names a node by how to reach it from a root list: which
//! root, then which node-valued field, then which element of that field, and
//! so on. Because clones have the same structure as their template body, a
//! path computed on the body finds the corresponding node in any clone.
use protoscene_values::{NodeId, ValueKind};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::graph_view::NodeGraph;

/// Node-valued field to descend through.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathStep {
    /// `SFNode` or `MFNode`.
    pub kind: ValueKind,
    /// Field name.
    pub field: String,
}

/// One hop: the position in the current list, then where to go next.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathElement {
    /// Index into the current node list (roots first, then field contents).
    pub index: usize,
    /// Field to descend through; `None` on the final element.
    pub step: Option<PathStep>,
}

/// Ordered hops from a root list to one node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodePath(pub Vec<PathElement>);

impl NodePath {
    /// Hops in order.
    pub fn elements(&self) -> &[PathElement] {
        &self.0
    }
}

struct Search<'g, G: ?Sized> {
    graph: &'g G,
    target: NodeId,
    visited: FxHashSet<NodeId>,
    path: Vec<PathElement>,
}

impl<G: NodeGraph + ?Sized> Search<'_, G> {
    fn in_list(&mut self, list: &[NodeId]) -> bool {
        for (index, &node) in list.iter().enumerate() {
            self.path.push(PathElement { index, step: None });
            if node == self.target || self.in_children(node) {
                return true;
            }
            self.path.pop();
        }
        false
    }

    fn in_children(&mut self, node: NodeId) -> bool {
        if !self.visited.insert(node) {
            return false;
        }
        let graph = self.graph;
        let Some(interfaces) = graph.interfaces(node) else {
            return false;
        };
        for interface in interfaces
            .iter()
            .filter(|i| i.access.is_field() && i.kind.is_node())
        {
            let Some(value) = graph.field_value(node, &interface.name) else {
                continue;
            };
            if let Some(last) = self.path.last_mut() {
                last.step = Some(PathStep {
                    kind: interface.kind,
                    field: interface.name.clone(),
                });
            }
            if self.in_list(value.node_refs()) {
                return true;
            }
        }
        if let Some(last) = self.path.last_mut() {
            last.step = None;
        }
        false
    }
}

/// Depth-first search for `target` below `roots`.
///
/// Roots are visited in order and node-valued fields in interface order; the
/// first occurrence wins. Nodes already searched are not searched again, so
/// shared sub-graphs and reference cycles terminate. Returns `None` when
/// `target` is unreachable.
pub fn compute_path<G: NodeGraph + ?Sized>(
    graph: &G,
    roots: &[NodeId],
    target: NodeId,
) -> Option<NodePath> {
    let mut search = Search {
        graph,
        target,
        visited: FxHashSet::default(),
        path: Vec::new(),
    };
    search.in_list(roots).then_some(NodePath(search.path))
}

/// Replays `path` against `roots` in `graph`.
///
/// Returns `None` when the graph does not have the structure the path was
/// computed on (an index out of range, a missing field). That happens when
/// an IS-mapped node field was given a caller value whose shape differs
/// from the template default.
pub fn resolve_path<G: NodeGraph + ?Sized>(
    graph: &G,
    path: &NodePath,
    roots: &[NodeId],
) -> Option<NodeId> {
    let mut list = roots.to_vec();
    let mut current = None;
    for element in &path.0 {
        let Some(&node) = list.get(element.index) else {
            debug!(index = element.index, len = list.len(), "node path index out of range");
            return None;
        };
        current = Some(node);
        if let Some(step) = &element.step {
            let Some(value) = graph.field_value(node, &step.field) else {
                debug!(%node, field = %step.field, "node path field missing");
                return None;
            };
            list = value.node_refs().to_vec();
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use protoscene_values::{FieldValue, MfNode, SfNode};

    use super::*;
    use crate::interface::{Access, InterfaceSet, NodeInterface};

    #[derive(Default)]
    struct Toy {
        interfaces: InterfaceSet,
        fields: BTreeMap<(NodeId, String), FieldValue>,
    }

    impl NodeGraph for Toy {
        fn interfaces(&self, _node: NodeId) -> Option<&InterfaceSet> {
            Some(&self.interfaces)
        }

        fn field_value(&self, node: NodeId, name: &str) -> Option<FieldValue> {
            if let Some(value) = self.fields.get(&(node, name.to_owned())) {
                return Some(value.clone());
            }
            self.interfaces
                .get(name)
                .map(|i| FieldValue::default_for(i.kind))
        }
    }

    fn id(index: u32) -> NodeId {
        NodeId::from_parts(index, 0)
    }

    fn toy() -> Toy {
        let interfaces = [
            NodeInterface::new(Access::ExposedField, ValueKind::MfNode, "children"),
            NodeInterface::new(Access::Field, ValueKind::SfNode, "proxy"),
        ]
        .into_iter()
        .collect();
        let mut fields = BTreeMap::new();
        fields.insert((id(1), "children".into()), MfNode(vec![id(2), id(3)]).into());
        fields.insert((id(3), "proxy".into()), SfNode(Some(id(4))).into());
        fields.insert((id(4), "proxy".into()), SfNode(Some(id(4))).into());
        Toy { interfaces, fields }
    }

    #[test]
    fn finds_nested_node_and_replays() {
        let graph = toy();
        let path = compute_path(&graph, &[id(9), id(1)], id(4));
        let expected = NodePath(vec![
            PathElement {
                index: 1,
                step: Some(PathStep {
                    kind: ValueKind::MfNode,
                    field: "children".into(),
                }),
            },
            PathElement {
                index: 1,
                step: Some(PathStep {
                    kind: ValueKind::SfNode,
                    field: "proxy".into(),
                }),
            },
            PathElement {
                index: 0,
                step: None,
            },
        ]);
        assert_eq!(path.as_ref(), Some(&expected));
        assert_eq!(resolve_path(&graph, &expected, &[id(9), id(1)]), Some(id(4)));
    }

    #[test]
    fn unreachable_and_self_loops_terminate() {
        let graph = toy();
        assert_eq!(compute_path(&graph, &[id(1)], id(77)), None);
        assert_eq!(compute_path(&graph, &[], id(1)), None);
    }

    #[test]
    fn mismatched_structure_resolves_to_none() {
        let graph = toy();
        let path = NodePath(vec![PathElement {
            index: 5,
            step: None,
        }]);
        assert_eq!(resolve_path(&graph, &path, &[id(1)]), None);
    }
}
