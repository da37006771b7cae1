// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Builtin node classes used by fixtures and tests.

use std::sync::Arc;

use protoscene_core::{BuiltinClass, DefinitionError, NodeType, World};
use protoscene_values::{
    Color, MfNode, Rotation, SfBool, SfColor, SfFloat, SfNode, SfRotation, SfString, SfVec3f,
    ValueKind, Vec3f,
};

/// A small set of builtin classes.
///
/// - `Group`: `children` plus `addChildren` / `removeChildren` eventIns.
/// - `Transform`: `children`, `translation`, `rotation`, `scale`.
/// - `Material`: `diffuseColor`, `transparency`.
/// - `Shape`: `appearance`, `geometry`.
/// - `Relay`: copies `set_value` to `value_changed` (SFFloat).
/// - `Holder`: node-valued and float fields for exercising IS bindings.
/// - `Clock`: an `enabled` flag and eventOuts driven by `emit_event`.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// `Group`.
    pub group: Arc<BuiltinClass>,
    /// `Transform`.
    pub transform: Arc<BuiltinClass>,
    /// `Material`.
    pub material: Arc<BuiltinClass>,
    /// `Shape`.
    pub shape: Arc<BuiltinClass>,
    /// `Relay`.
    pub relay: Arc<BuiltinClass>,
    /// `Holder`.
    pub holder: Arc<BuiltinClass>,
    /// `Clock`.
    pub clock: Arc<BuiltinClass>,
}

impl Catalog {
    /// Builds every class.
    pub fn new() -> Result<Self, DefinitionError> {
        let children = || MfNode(Vec::new()).into();
        Ok(Self {
            group: BuiltinClass::builder("Group")
                .exposed_field("children", children())
                .event_in("addChildren", ValueKind::MfNode)
                .event_in("removeChildren", ValueKind::MfNode)
                .build()?,
            transform: BuiltinClass::builder("Transform")
                .exposed_field("children", children())
                .exposed_field("translation", SfVec3f(Vec3f([0.0; 3])).into())
                .exposed_field("rotation", SfRotation(Rotation::default()).into())
                .exposed_field("scale", SfVec3f(Vec3f([1.0; 3])).into())
                .build()?,
            material: BuiltinClass::builder("Material")
                .exposed_field(
                    "diffuseColor",
                    SfColor(Color {
                        r: 0.8,
                        g: 0.8,
                        b: 0.8,
                    })
                    .into(),
                )
                .exposed_field("transparency", SfFloat(0.0).into())
                .build()?,
            shape: BuiltinClass::builder("Shape")
                .exposed_field("appearance", SfNode(None).into())
                .exposed_field("geometry", SfNode(None).into())
                .build()?,
            relay: BuiltinClass::builder("Relay")
                .event_in("set_value", ValueKind::SfFloat)
                .event_out("value_changed", ValueKind::SfFloat)
                .passthrough("set_value", "value_changed")
                .build()?,
            holder: BuiltinClass::builder("Holder")
                .field("node", SfNode(None).into())
                .exposed_field("nodes", children())
                .exposed_field("value", SfFloat(0.0).into())
                .field("weight", SfFloat(1.0).into())
                .field("label", SfString(String::new()).into())
                .build()?,
            clock: BuiltinClass::builder("Clock")
                .exposed_field("enabled", SfBool(true).into())
                .event_out("fraction_changed", ValueKind::SfFloat)
                .event_out("isActive", ValueKind::SfBool)
                .build()?,
        })
    }

    /// Every class, in a stable order.
    pub fn all(&self) -> [&Arc<BuiltinClass>; 7] {
        [
            &self.group,
            &self.transform,
            &self.material,
            &self.shape,
            &self.relay,
            &self.holder,
            &self.clock,
        ]
    }

    /// Class with the given id.
    pub fn find(&self, id: &str) -> Option<&Arc<BuiltinClass>> {
        self.all().into_iter().find(|class| class.id() == id)
    }

    /// Full node type of the class `id`.
    pub fn node_type(&self, id: &str) -> Option<Arc<NodeType>> {
        self.find(id).map(NodeType::builtin)
    }

    /// Registers every class with `world`.
    pub fn install(&self, world: &mut World) {
        for class in self.all() {
            world.register_builtin(Arc::clone(class));
        }
    }
}
