// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node classes and node types.
//!
//! A *class* is what a node implementation is (a builtin class, a PROTO
//! template, an EXTERNPROTO reference). A *type* is a class seen through an
//! interface set: for PROTO types the set may be any subset of the
//! template's public interface.
use std::collections::BTreeMap;
use std::sync::Arc;

use protoscene_values::{FieldValue, ValueKind};

use crate::externproto::{ExternClassId, ExternTypeId};
use crate::interface::{Access, InterfaceError, InterfaceSet, NodeInterface};
use crate::template::{DefinitionError, TemplateModel};

/// An ordinary node class: a field container with exposedField semantics.
///
/// Builtin nodes store their field values, apply exposedField events and
/// re-emit them as `<name>_changed`. A *pass-through* pair copies every event
/// received on an eventIn to an eventOut of the same kind, which is enough to
/// stand in for sensors and interpolators when exercising routes.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinClass {
    id: String,
    interfaces: InterfaceSet,
    defaults: BTreeMap<String, FieldValue>,
    passthrough: BTreeMap<String, String>,
}

impl BuiltinClass {
    /// Starts describing a class named `id`.
    pub fn builder(id: impl Into<String>) -> BuiltinClassBuilder {
        BuiltinClassBuilder {
            class: Self {
                id: id.into(),
                interfaces: InterfaceSet::new(),
                defaults: BTreeMap::new(),
                passthrough: BTreeMap::new(),
            },
            error: None,
        }
    }

    /// Class id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declared interfaces.
    pub fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    /// Default value of a field or exposedField.
    pub fn default_value(&self, name: &str) -> Option<&FieldValue> {
        self.defaults.get(name)
    }

    /// eventOut fed by the given eventIn, if any.
    pub fn passthrough_target(&self, event_in: &str) -> Option<&str> {
        self.passthrough.get(event_in).map(String::as_str)
    }
}

/// Chained description of a [`BuiltinClass`]; the first error wins.
#[derive(Debug)]
pub struct BuiltinClassBuilder {
    class: BuiltinClass,
    error: Option<DefinitionError>,
}

impl BuiltinClassBuilder {
    fn declare(mut self, access: Access, kind: ValueKind, name: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self
                .class
                .interfaces
                .insert(NodeInterface::new(access, kind, name))
            {
                self.error = Some(e.into());
            }
        }
        self
    }

    /// Declares a field initialized to `default`.
    pub fn field(mut self, name: &str, default: FieldValue) -> Self {
        self = self.declare(Access::Field, default.kind(), name);
        self.class.defaults.insert(name.to_owned(), default);
        self
    }

    /// Declares an exposedField initialized to `default`.
    pub fn exposed_field(mut self, name: &str, default: FieldValue) -> Self {
        self = self.declare(Access::ExposedField, default.kind(), name);
        self.class.defaults.insert(name.to_owned(), default);
        self
    }

    /// Declares an eventIn.
    pub fn event_in(self, name: &str, kind: ValueKind) -> Self {
        self.declare(Access::EventIn, kind, name)
    }

    /// Declares an eventOut.
    pub fn event_out(self, name: &str, kind: ValueKind) -> Self {
        self.declare(Access::EventOut, kind, name)
    }

    /// Forwards events received on `event_in` to `event_out`.
    pub fn passthrough(mut self, event_in: &str, event_out: &str) -> Self {
        self.class
            .passthrough
            .insert(event_in.to_owned(), event_out.to_owned());
        self
    }

    /// Validates pass-through pairs and finishes the class.
    pub fn build(self) -> Result<Arc<BuiltinClass>, DefinitionError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut class = self.class;
        let mut canonical = BTreeMap::new();
        for (event_in, event_out) in &class.passthrough {
            let input = class
                .interfaces
                .find_event_in(event_in)
                .ok_or_else(|| DefinitionError::UnknownInterface(event_in.clone()))?;
            let output = class
                .interfaces
                .find_event_out(event_out)
                .ok_or_else(|| DefinitionError::UnknownInterface(event_out.clone()))?;
            if input.kind != output.kind {
                return Err(DefinitionError::PassthroughMismatch {
                    event_in: event_in.clone(),
                    event_out: event_out.clone(),
                });
            }
            canonical.insert(input.name.clone(), output.name.clone());
        }
        class.passthrough = canonical;
        Ok(Arc::new(class))
    }
}

/// What a node type instantiates.
#[derive(Debug, Clone)]
pub enum NodeClass {
    /// Ordinary node class.
    Builtin(Arc<BuiltinClass>),
    /// PROTO template.
    Proto(Arc<TemplateModel>),
    /// EXTERNPROTO reference owned by a world.
    Extern(ExternClassId),
}

/// A class viewed through an interface set; the factory for nodes.
#[derive(Debug, Clone)]
pub struct NodeType {
    id: String,
    class: NodeClass,
    interfaces: InterfaceSet,
    placeholder: Option<ExternTypeId>,
}

impl NodeType {
    /// The full type of a builtin class.
    pub fn builtin(class: &Arc<BuiltinClass>) -> Arc<Self> {
        Arc::new(Self {
            id: class.id.clone(),
            class: NodeClass::Builtin(Arc::clone(class)),
            interfaces: class.interfaces.clone(),
            placeholder: None,
        })
    }

    /// A type of `model` named `id` exposing `interfaces`.
    ///
    /// Every requested interface must exist in the template with the same
    /// access and kind.
    pub fn proto(
        model: &Arc<TemplateModel>,
        id: impl Into<String>,
        interfaces: &InterfaceSet,
    ) -> Result<Arc<Self>, InterfaceError> {
        let id = id.into();
        for interface in interfaces.iter() {
            if !model.interfaces().contains(interface) {
                return Err(InterfaceError::unsupported(
                    model.id(),
                    interface.access,
                    &interface.name,
                ));
            }
        }
        Ok(Arc::new(Self {
            id,
            class: NodeClass::Proto(Arc::clone(model)),
            interfaces: interfaces.clone(),
            placeholder: None,
        }))
    }

    /// The type exposing a template's whole public interface.
    pub fn proto_full(model: &Arc<TemplateModel>) -> Arc<Self> {
        Arc::new(Self {
            id: model.id().to_owned(),
            class: NodeClass::Proto(Arc::clone(model)),
            interfaces: model.interfaces().clone(),
            placeholder: None,
        })
    }

    pub(crate) fn restricted(id: &str, class: NodeClass, interfaces: InterfaceSet) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            class,
            interfaces,
            placeholder: None,
        })
    }

    pub(crate) fn placeholder(
        class: ExternClassId,
        slot: ExternTypeId,
        id: String,
        interfaces: InterfaceSet,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            class: NodeClass::Extern(class),
            interfaces,
            placeholder: Some(slot),
        })
    }

    /// Type id (the name nodes of this type are declared with).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Class this type instantiates.
    pub fn class(&self) -> &NodeClass {
        &self.class
    }

    /// Interfaces visible through this type.
    pub fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    /// Placeholder slot for EXTERNPROTO types.
    pub fn placeholder_slot(&self) -> Option<ExternTypeId> {
        self.placeholder
    }

    /// Declared default for a field or exposedField, when the class has one
    /// that is meaningful outside its own graph.
    pub(crate) fn class_default(&self, name: &str) -> Option<FieldValue> {
        match &self.class {
            NodeClass::Builtin(class) => class.default_value(name).cloned(),
            NodeClass::Proto(_) | NodeClass::Extern(_) => None,
        }
    }
}
