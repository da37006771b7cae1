// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Event endpoints and the typed adapters behind instance interfaces.
//!
//! A PROTO instance has no behaviour of its own: its public eventIns fan out
//! to the internal nodes they are IS-bound to, and internal eventOuts are
//! relayed out through the instance. The adapters doing this are generic over
//! the field type and built per interface kind with
//! [`dispatch`](protoscene_values::dispatch).
use std::collections::BTreeMap;
use std::fmt;

use protoscene_values::{
    dispatch, FieldType, FieldValue, KindMismatch, KindVisitor, NodeId, ValueKind,
};

use crate::interface::{Access, InterfaceSet};

/// Where a delivered event goes next.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {
    /// Deliver to a receiving interface of `node`.
    EventIn {
        /// Receiving node.
        node: NodeId,
        /// Canonical interface name (`x` for exposedField `x`).
        interface: String,
    },
    /// Re-emit from an emitting interface of `node` (IS-bound eventOut).
    Relay {
        /// Emitting node.
        node: NodeId,
        /// Canonical interface name.
        interface: String,
    },
}

impl Destination {
    /// Node the destination lives on.
    pub fn node(&self) -> NodeId {
        match self {
            Destination::EventIn { node, .. } | Destination::Relay { node, .. } => *node,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::EventIn { node, interface } => write!(f, "{node}.{interface} (in)"),
            Destination::Relay { node, interface } => write!(f, "{node}.{interface} (relay)"),
        }
    }
}

/// An event waiting in the world queue.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PendingEvent {
    pub(crate) destination: Destination,
    pub(crate) value: FieldValue,
    pub(crate) timestamp: f64,
}

/// Handle for sending events into one node interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventListener {
    pub(crate) node: NodeId,
    pub(crate) interface: String,
    pub(crate) kind: ValueKind,
}

impl EventListener {
    /// Target node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Canonical interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Kind the listener accepts.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

/// Handle for observing one emitting node interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventEmitter {
    pub(crate) node: NodeId,
    pub(crate) interface: String,
    pub(crate) kind: ValueKind,
}

impl EventEmitter {
    /// Source node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Canonical interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Kind the emitter produces.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

/// Common part of every adapter.
pub trait Adapter: fmt::Debug + Send {
    /// Kind of values the adapter carries.
    fn kind(&self) -> ValueKind;
}

/// Public eventIn of an instance: records the event and names the internal
/// destinations it fans out to.
pub trait EventInAdapter: Adapter {
    /// Adds a fan-out destination. Returns `false` if already present.
    fn add_delegate(&mut self, destination: Destination) -> bool;
    /// Fan-out destinations in insertion order.
    fn delegates(&self) -> &[Destination];
    /// Accepts an event.
    fn receive(&mut self, value: &FieldValue, timestamp: f64) -> Result<(), KindMismatch>;
    /// Last event accepted, if any.
    fn last_received(&self) -> Option<(FieldValue, f64)>;
}

/// Public eventOut of an instance: holds the value last relayed out.
pub trait EventOutAdapter: Adapter {
    /// Last relayed value (the kind default before any event).
    fn value(&self) -> FieldValue;
    /// Records a value the internal node emitted.
    fn relay(&mut self, value: &FieldValue) -> Result<(), KindMismatch>;
}

/// Public exposedField of an instance: a stored value that is also both an
/// eventIn and an eventOut.
pub trait ExposedFieldAdapter: EventInAdapter + EventOutAdapter {
    /// Overwrites the stored value without generating an event.
    fn set(&mut self, value: &FieldValue) -> Result<(), KindMismatch>;
}

/// Typed public eventIn.
#[derive(Debug)]
pub struct ProtoEventIn<V: FieldType> {
    delegates: Vec<Destination>,
    last: Option<(V, f64)>,
}

impl<V: FieldType> Default for ProtoEventIn<V> {
    fn default() -> Self {
        Self {
            delegates: Vec::new(),
            last: None,
        }
    }
}

impl<V: FieldType> Adapter for ProtoEventIn<V> {
    fn kind(&self) -> ValueKind {
        V::KIND
    }
}

impl<V: FieldType> EventInAdapter for ProtoEventIn<V> {
    fn add_delegate(&mut self, destination: Destination) -> bool {
        if self.delegates.contains(&destination) {
            return false;
        }
        self.delegates.push(destination);
        true
    }

    fn delegates(&self) -> &[Destination] {
        &self.delegates
    }

    fn receive(&mut self, value: &FieldValue, timestamp: f64) -> Result<(), KindMismatch> {
        self.last = Some((V::try_from_value(value)?, timestamp));
        Ok(())
    }

    fn last_received(&self) -> Option<(FieldValue, f64)> {
        self.last
            .as_ref()
            .map(|(value, ts)| (value.clone().into_value(), *ts))
    }
}

/// Typed public eventOut.
#[derive(Debug, Default)]
pub struct ProtoEventOut<V: FieldType> {
    value: V,
}

impl<V: FieldType> Adapter for ProtoEventOut<V> {
    fn kind(&self) -> ValueKind {
        V::KIND
    }
}

impl<V: FieldType> EventOutAdapter for ProtoEventOut<V> {
    fn value(&self) -> FieldValue {
        self.value.clone().into_value()
    }

    fn relay(&mut self, value: &FieldValue) -> Result<(), KindMismatch> {
        self.value = V::try_from_value(value)?;
        Ok(())
    }
}

/// Typed public exposedField.
#[derive(Debug)]
pub struct ProtoExposedField<V: FieldType> {
    delegates: Vec<Destination>,
    value: V,
    last_time: Option<f64>,
}

impl<V: FieldType> ProtoExposedField<V> {
    /// Starts holding `value`.
    pub fn new(value: V) -> Self {
        Self {
            delegates: Vec::new(),
            value,
            last_time: None,
        }
    }
}

impl<V: FieldType> Adapter for ProtoExposedField<V> {
    fn kind(&self) -> ValueKind {
        V::KIND
    }
}

impl<V: FieldType> EventInAdapter for ProtoExposedField<V> {
    fn add_delegate(&mut self, destination: Destination) -> bool {
        if self.delegates.contains(&destination) {
            return false;
        }
        self.delegates.push(destination);
        true
    }

    fn delegates(&self) -> &[Destination] {
        &self.delegates
    }

    fn receive(&mut self, value: &FieldValue, timestamp: f64) -> Result<(), KindMismatch> {
        self.value = V::try_from_value(value)?;
        self.last_time = Some(timestamp);
        Ok(())
    }

    fn last_received(&self) -> Option<(FieldValue, f64)> {
        self.last_time
            .map(|ts| (self.value.clone().into_value(), ts))
    }
}

impl<V: FieldType> EventOutAdapter for ProtoExposedField<V> {
    fn value(&self) -> FieldValue {
        self.value.clone().into_value()
    }

    fn relay(&mut self, value: &FieldValue) -> Result<(), KindMismatch> {
        self.value = V::try_from_value(value)?;
        Ok(())
    }
}

impl<V: FieldType> ExposedFieldAdapter for ProtoExposedField<V> {
    fn set(&mut self, value: &FieldValue) -> Result<(), KindMismatch> {
        self.value = V::try_from_value(value)?;
        Ok(())
    }
}

struct NewEventIn;

impl KindVisitor for NewEventIn {
    type Output = Box<dyn EventInAdapter>;

    fn visit<V: FieldType>(self) -> Self::Output {
        Box::new(ProtoEventIn::<V>::default())
    }
}

struct NewEventOut;

impl KindVisitor for NewEventOut {
    type Output = Box<dyn EventOutAdapter>;

    fn visit<V: FieldType>(self) -> Self::Output {
        Box::new(ProtoEventOut::<V>::default())
    }
}

struct NewExposedField<'a>(&'a FieldValue);

impl KindVisitor for NewExposedField<'_> {
    type Output = Box<dyn ExposedFieldAdapter>;

    fn visit<V: FieldType>(self) -> Self::Output {
        // The visited kind is the value's own kind, so the typed view exists.
        let initial = V::from_value(self.0).cloned().unwrap_or_default();
        Box::new(ProtoExposedField::new(initial))
    }
}

/// A typed eventIn adapter for `kind`.
pub fn event_in_adapter(kind: ValueKind) -> Box<dyn EventInAdapter> {
    dispatch(kind, NewEventIn)
}

/// A typed eventOut adapter for `kind`.
pub fn event_out_adapter(kind: ValueKind) -> Box<dyn EventOutAdapter> {
    dispatch(kind, NewEventOut)
}

/// A typed exposedField adapter holding `initial`.
pub fn exposed_field_adapter(initial: &FieldValue) -> Box<dyn ExposedFieldAdapter> {
    dispatch(initial.kind(), NewExposedField(initial))
}

/// Effect of delivering one event to an [`AdapterSet`].
#[derive(Debug, Default)]
pub(crate) struct Received {
    pub(crate) delegates: Vec<Destination>,
    pub(crate) exposed: bool,
}

/// Adapters for every event-capable public interface of one node.
#[derive(Debug, Default)]
pub(crate) struct AdapterSet {
    event_ins: BTreeMap<String, Box<dyn EventInAdapter>>,
    event_outs: BTreeMap<String, Box<dyn EventOutAdapter>>,
    exposed: BTreeMap<String, Box<dyn ExposedFieldAdapter>>,
}

impl AdapterSet {
    /// One adapter per eventIn, eventOut and exposedField in `interfaces`.
    /// `initial` supplies exposedField starting values.
    pub(crate) fn for_interfaces(
        interfaces: &InterfaceSet,
        mut initial: impl FnMut(&str, ValueKind) -> FieldValue,
    ) -> Self {
        let mut set = Self::default();
        for interface in interfaces.iter() {
            let name = interface.name.clone();
            match interface.access {
                Access::Field => {}
                Access::EventIn => {
                    set.event_ins.insert(name, event_in_adapter(interface.kind));
                }
                Access::EventOut => {
                    set.event_outs
                        .insert(name, event_out_adapter(interface.kind));
                }
                Access::ExposedField => {
                    let value = initial(&interface.name, interface.kind);
                    set.exposed.insert(name, exposed_field_adapter(&value));
                }
            }
        }
        set
    }

    /// Adds a fan-out destination to a receiving interface.
    pub(crate) fn add_delegate(&mut self, interface: &str, destination: Destination) -> bool {
        if let Some(adapter) = self.exposed.get_mut(interface) {
            return adapter.add_delegate(destination);
        }
        self.event_ins
            .get_mut(interface)
            .is_some_and(|adapter| adapter.add_delegate(destination))
    }

    /// Delivers an event. `None` when no receiving adapter has that name.
    pub(crate) fn receive(
        &mut self,
        interface: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> Option<Result<Received, KindMismatch>> {
        if let Some(adapter) = self.exposed.get_mut(interface) {
            return Some(adapter.receive(value, timestamp).map(|()| Received {
                delegates: adapter.delegates().to_vec(),
                exposed: true,
            }));
        }
        let adapter = self.event_ins.get_mut(interface)?;
        Some(adapter.receive(value, timestamp).map(|()| Received {
            delegates: adapter.delegates().to_vec(),
            exposed: false,
        }))
    }

    /// Records a relayed value. `None` when no emitting adapter has that name.
    pub(crate) fn relay(
        &mut self,
        interface: &str,
        value: &FieldValue,
    ) -> Option<Result<(), KindMismatch>> {
        if let Some(adapter) = self.exposed.get_mut(interface) {
            return Some(adapter.relay(value));
        }
        self.event_outs
            .get_mut(interface)
            .map(|adapter| adapter.relay(value))
    }

    /// Overwrites an exposedField value without an event.
    pub(crate) fn set_exposed(
        &mut self,
        interface: &str,
        value: &FieldValue,
    ) -> Option<Result<(), KindMismatch>> {
        self.exposed
            .get_mut(interface)
            .map(|adapter| adapter.set(value))
    }

    /// Current value of an exposedField or eventOut.
    pub(crate) fn value(&self, interface: &str) -> Option<FieldValue> {
        self.exposed
            .get(interface)
            .map(|adapter| adapter.value())
            .or_else(|| self.event_outs.get(interface).map(|adapter| adapter.value()))
    }

    /// Last event received on an eventIn or exposedField.
    pub(crate) fn last_received(&self, interface: &str) -> Option<(FieldValue, f64)> {
        self.exposed
            .get(interface)
            .and_then(|adapter| adapter.last_received())
            .or_else(|| {
                self.event_ins
                    .get(interface)
                    .and_then(|adapter| adapter.last_received())
            })
    }
}

#[cfg(test)]
mod tests {
    use protoscene_values::{SfFloat, SfInt32, SfString};

    use super::*;
    use crate::interface::NodeInterface;

    #[test]
    fn adapters_follow_their_kind() {
        for &kind in ValueKind::ALL {
            assert_eq!(event_in_adapter(kind).kind(), kind);
            assert_eq!(event_out_adapter(kind).kind(), kind);
            assert_eq!(exposed_field_adapter(&FieldValue::default_for(kind)).kind(), kind);
        }
    }

    #[test]
    fn event_in_rejects_wrong_kind_and_dedupes_delegates() {
        let mut adapter = event_in_adapter(ValueKind::SfFloat);
        let target = Destination::EventIn {
            node: NodeId::from_parts(3, 0),
            interface: "set_speed".into(),
        };
        assert!(adapter.add_delegate(target.clone()));
        assert!(!adapter.add_delegate(target));
        assert_eq!(adapter.delegates().len(), 1);

        assert!(adapter.receive(&SfInt32(1).into(), 0.0).is_err());
        assert_eq!(adapter.last_received(), None);
        assert!(adapter.receive(&SfFloat(2.0).into(), 1.5).is_ok());
        assert_eq!(adapter.last_received(), Some((SfFloat(2.0).into(), 1.5)));
    }

    #[test]
    fn adapter_set_routes_by_access() {
        let interfaces: InterfaceSet = [
            NodeInterface::new(Access::ExposedField, ValueKind::SfString, "label"),
            NodeInterface::new(Access::EventOut, ValueKind::SfFloat, "done"),
            NodeInterface::new(Access::Field, ValueKind::SfFloat, "plain"),
        ]
        .into_iter()
        .collect();
        let mut set = AdapterSet::for_interfaces(&interfaces, |_, _| SfString("hi".into()).into());

        assert_eq!(set.value("label"), Some(SfString("hi".into()).into()));
        assert_eq!(set.value("done"), Some(SfFloat(0.0).into()));
        assert!(set.receive("plain", &SfFloat(1.0).into(), 0.0).is_none());

        let received = set.receive("label", &SfString("yo".into()).into(), 2.0);
        assert!(matches!(received, Some(Ok(Received { exposed: true, .. }))));
        assert_eq!(set.value("label"), Some(SfString("yo".into()).into()));
        assert!(matches!(set.relay("done", &SfFloat(4.0).into()), Some(Ok(()))));
        assert_eq!(set.value("done"), Some(SfFloat(4.0).into()));
    }
}
