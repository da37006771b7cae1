// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node interface descriptors and the errors raised when using them.
use std::collections::BTreeMap;
use std::fmt;

use protoscene_values::{KindMismatch, NodeId, ValueKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How an interface may be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    /// Initialized at creation, readable afterwards; not an event endpoint.
    Field,
    /// Receives events.
    EventIn,
    /// Emits events.
    EventOut,
    /// Field plus implicit `set_<name>` eventIn and `<name>_changed` eventOut.
    ExposedField,
}

impl Access {
    /// Can be read as a field (field, exposedField).
    #[must_use]
    pub const fn is_field(self) -> bool {
        matches!(self, Access::Field | Access::ExposedField)
    }

    /// Can receive events (eventIn, exposedField).
    #[must_use]
    pub const fn receives(self) -> bool {
        matches!(self, Access::EventIn | Access::ExposedField)
    }

    /// Can emit events (eventOut, exposedField).
    #[must_use]
    pub const fn emits(self) -> bool {
        matches!(self, Access::EventOut | Access::ExposedField)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Field => "field",
            Access::EventIn => "eventIn",
            Access::EventOut => "eventOut",
            Access::ExposedField => "exposedField",
        })
    }
}

/// One declared interface: access, kind and name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeInterface {
    /// Access type.
    pub access: Access,
    /// Value kind carried by the interface.
    pub kind: ValueKind,
    /// Interface name, unique within its set.
    pub name: String,
}

impl NodeInterface {
    /// Convenience constructor.
    pub fn new(access: Access, kind: ValueKind, name: impl Into<String>) -> Self {
        Self {
            access,
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for NodeInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.access, self.kind, self.name)
    }
}

/// Errors from reading, writing or connecting a single interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceError {
    /// The node type has no interface of that name usable this way.
    #[error("{node_type} has no {access} named `{name}`")]
    UnsupportedInterface {
        /// Node type id.
        node_type: String,
        /// How the caller tried to use the interface.
        access: Access,
        /// Requested name.
        name: String,
    },
    /// A value of the wrong kind was supplied.
    #[error("`{name}`: {source}")]
    TypeMismatch {
        /// Interface name.
        name: String,
        /// Kinds involved.
        #[source]
        source: KindMismatch,
    },
    /// The node handle no longer names a live node.
    #[error("node {0} is not live")]
    DeadNode(NodeId),
    /// The class handle does not belong to this world.
    #[error("unknown node class `{0}`")]
    UnknownClass(String),
}

impl InterfaceError {
    pub(crate) fn unsupported(node_type: &str, access: Access, name: &str) -> Self {
        Self::UnsupportedInterface {
            node_type: node_type.to_owned(),
            access,
            name: name.to_owned(),
        }
    }

    pub(crate) fn mismatch(name: &str, expected: ValueKind, found: ValueKind) -> Self {
        Self::TypeMismatch {
            name: name.to_owned(),
            source: KindMismatch { expected, found },
        }
    }
}

/// A second interface with an existing name was declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("interface `{0}` declared twice")]
pub struct DuplicateInterface(pub String);

/// Name-keyed set of interfaces.
///
/// Iteration is in name order, which is what makes node paths reproducible
/// between a template body and its clones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSet {
    by_name: BTreeMap<String, NodeInterface>,
}

impl InterfaceSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interface; names must be unique.
    pub fn insert(&mut self, interface: NodeInterface) -> Result<(), DuplicateInterface> {
        if self.by_name.contains_key(&interface.name) {
            return Err(DuplicateInterface(interface.name));
        }
        self.by_name.insert(interface.name.clone(), interface);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, interface: NodeInterface) -> Result<Self, DuplicateInterface> {
        self.insert(interface)?;
        Ok(self)
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&NodeInterface> {
        self.by_name.get(name)
    }

    /// `true` when an identical descriptor is present.
    pub fn contains(&self, interface: &NodeInterface) -> bool {
        self.by_name.get(&interface.name) == Some(interface)
    }

    /// Field or exposedField named `name`.
    pub fn find_field(&self, name: &str) -> Option<&NodeInterface> {
        self.get(name).filter(|i| i.access.is_field())
    }

    /// Interface that receives events sent to `name`.
    ///
    /// Matches an eventIn or exposedField named exactly `name`, then an
    /// exposedField `x` when `name` is `set_x`.
    pub fn find_event_in(&self, name: &str) -> Option<&NodeInterface> {
        self.get(name)
            .filter(|i| i.access.receives())
            .or_else(|| {
                let bare = name.strip_prefix("set_")?;
                self.get(bare).filter(|i| i.access == Access::ExposedField)
            })
    }

    /// Interface that emits events under `name`.
    ///
    /// Matches an eventOut or exposedField named exactly `name`, then an
    /// exposedField `x` when `name` is `x_changed`.
    pub fn find_event_out(&self, name: &str) -> Option<&NodeInterface> {
        self.get(name)
            .filter(|i| i.access.emits())
            .or_else(|| {
                let bare = name.strip_suffix("_changed")?;
                self.get(bare).filter(|i| i.access == Access::ExposedField)
            })
    }

    /// All interfaces in name order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeInterface> {
        self.by_name.values()
    }

    /// Number of interfaces.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl FromIterator<NodeInterface> for InterfaceSet {
    /// Collects interfaces; a later duplicate name replaces the earlier one.
    fn from_iter<I: IntoIterator<Item = NodeInterface>>(iter: I) -> Self {
        Self {
            by_name: iter.into_iter().map(|i| (i.name.clone(), i)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InterfaceSet {
        [
            NodeInterface::new(Access::ExposedField, ValueKind::SfFloat, "speed"),
            NodeInterface::new(Access::EventIn, ValueKind::SfTime, "set_start"),
            NodeInterface::new(Access::EventOut, ValueKind::SfBool, "isActive"),
            NodeInterface::new(Access::Field, ValueKind::SfInt32, "count"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn exposed_field_aliases_resolve() {
        let set = sample();
        assert_eq!(set.find_event_in("speed").map(|i| i.name.as_str()), Some("speed"));
        assert_eq!(set.find_event_in("set_speed").map(|i| i.name.as_str()), Some("speed"));
        assert_eq!(set.find_event_out("speed_changed").map(|i| i.name.as_str()), Some("speed"));
        assert!(set.find_event_out("count_changed").is_none());
        assert!(set.find_event_in("set_count").is_none());
    }

    #[test]
    fn exact_event_names_win_over_aliases() {
        let set = sample();
        assert_eq!(set.find_event_in("set_start").map(|i| i.access), Some(Access::EventIn));
        assert!(set.find_event_out("set_start").is_none());
        assert!(set.find_field("isActive").is_none());
        assert_eq!(set.find_field("count").map(|i| i.kind), Some(ValueKind::SfInt32));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut set = sample();
        assert_eq!(
            set.insert(NodeInterface::new(Access::Field, ValueKind::SfBool, "speed")),
            Err(DuplicateInterface("speed".into()))
        );
        assert_eq!(set.len(), 4);
    }
}
