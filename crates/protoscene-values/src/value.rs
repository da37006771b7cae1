// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The kind table: `ValueKind`, one newtype per kind, `FieldValue`, and
//! the total per-kind dispatch, all expanded from a single macro invocation.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::geom::{Color, ColorRgba, Image, Rotation, Vec2d, Vec2f, Vec3d, Vec3f};
use crate::node_id::NodeId;

/// A concrete Rust type standing for one [`ValueKind`].
///
/// Implemented only by the per-kind newtypes generated in this module, so the
/// mapping between kinds and types is a bijection.
pub trait FieldType: Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static {
    /// The kind this type carries.
    const KIND: ValueKind;

    /// Borrows the typed payload when `value` has this kind.
    fn from_value(value: &FieldValue) -> Option<&Self>;

    /// Wraps the typed payload back into a [`FieldValue`].
    fn into_value(self) -> FieldValue;

    /// Clones the typed payload out of `value`, or reports both kinds.
    fn try_from_value(value: &FieldValue) -> Result<Self, KindMismatch> {
        Self::from_value(value).cloned().ok_or(KindMismatch {
            expected: Self::KIND,
            found: value.kind(),
        })
    }
}

/// Callback run by [`dispatch`] with the concrete type for a kind.
pub trait KindVisitor {
    /// What the visit produces.
    type Output;

    /// Called exactly once, with `V::KIND` equal to the dispatched kind.
    fn visit<V: FieldType>(self) -> Self::Output;
}

/// A value did not have the kind its destination requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected a {expected} value, found {found}")]
pub struct KindMismatch {
    /// Kind the destination declares.
    pub expected: ValueKind,
    /// Kind actually supplied.
    pub found: ValueKind,
}

/// A kind name did not match any of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field kind `{0}`")]
pub struct UnknownKind(pub String);

macro_rules! field_kinds {
    ($( $(#[$doc:meta])* $variant:ident($inner:ty) => $label:literal, )*) => {
        /// Closed enumeration of field kinds.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum ValueKind {
            $( $(#[$doc])* $variant, )*
        }

        impl ValueKind {
            /// Every kind in declaration order.
            pub const ALL: &'static [ValueKind] = &[$(ValueKind::$variant,)*];

            /// Scene-language spelling of the kind (`"SFFloat"`, `"MFNode"`, ...).
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(ValueKind::$variant => $label,)*
                }
            }

            /// Parses a scene-language kind name.
            pub fn from_name(name: &str) -> Result<Self, UnknownKind> {
                match name {
                    $($label => Ok(ValueKind::$variant),)*
                    other => Err(UnknownKind(other.to_owned())),
                }
            }
        }

        $(
            $(#[$doc])*
            #[derive(Clone, Debug, Default, PartialEq)]
            #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
            pub struct $variant(pub $inner);

            impl FieldType for $variant {
                const KIND: ValueKind = ValueKind::$variant;

                fn from_value(value: &FieldValue) -> Option<&Self> {
                    match value {
                        FieldValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_value(self) -> FieldValue {
                    FieldValue::$variant(self)
                }
            }

            impl From<$variant> for FieldValue {
                fn from(value: $variant) -> Self {
                    FieldValue::$variant(value)
                }
            }
        )*

        /// A value of any kind.
        #[derive(Clone, Debug, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum FieldValue {
            $( $(#[$doc])* $variant($variant), )*
        }

        impl FieldValue {
            /// Kind of this value.
            #[must_use]
            pub const fn kind(&self) -> ValueKind {
                match self {
                    $(FieldValue::$variant(_) => ValueKind::$variant,)*
                }
            }
        }

        /// Runs `visitor` with the concrete [`FieldType`] for `kind`.
        ///
        /// The match is total; a new kind added to the table is dispatched
        /// without touching any caller.
        pub fn dispatch<V: KindVisitor>(kind: ValueKind, visitor: V) -> V::Output {
            match kind {
                $(ValueKind::$variant => visitor.visit::<$variant>(),)*
            }
        }
    };
}

field_kinds! {
    /// Single boolean.
    SfBool(bool) => "SFBool",
    /// Single RGB color.
    SfColor(Color) => "SFColor",
    /// Single RGBA color.
    SfColorRgba(ColorRgba) => "SFColorRGBA",
    /// Single double.
    SfDouble(f64) => "SFDouble",
    /// Single float.
    SfFloat(f32) => "SFFloat",
    /// Single image.
    SfImage(Image) => "SFImage",
    /// Single 32-bit integer.
    SfInt32(i32) => "SFInt32",
    /// Single node reference, possibly null.
    SfNode(Option<NodeId>) => "SFNode",
    /// Single rotation.
    SfRotation(Rotation) => "SFRotation",
    /// Single string.
    SfString(String) => "SFString",
    /// Single time stamp in seconds.
    SfTime(f64) => "SFTime",
    /// Single double-precision 2D vector.
    SfVec2d(Vec2d) => "SFVec2d",
    /// Single 2D vector.
    SfVec2f(Vec2f) => "SFVec2f",
    /// Single double-precision 3D vector.
    SfVec3d(Vec3d) => "SFVec3d",
    /// Single 3D vector.
    SfVec3f(Vec3f) => "SFVec3f",
    /// Boolean list.
    MfBool(Vec<bool>) => "MFBool",
    /// RGB color list.
    MfColor(Vec<Color>) => "MFColor",
    /// RGBA color list.
    MfColorRgba(Vec<ColorRgba>) => "MFColorRGBA",
    /// Double list.
    MfDouble(Vec<f64>) => "MFDouble",
    /// Float list.
    MfFloat(Vec<f32>) => "MFFloat",
    /// Image list.
    MfImage(Vec<Image>) => "MFImage",
    /// 32-bit integer list.
    MfInt32(Vec<i32>) => "MFInt32",
    /// Node reference list.
    MfNode(Vec<NodeId>) => "MFNode",
    /// Rotation list.
    MfRotation(Vec<Rotation>) => "MFRotation",
    /// String list.
    MfString(Vec<String>) => "MFString",
    /// Time stamp list.
    MfTime(Vec<f64>) => "MFTime",
    /// Double-precision 2D vector list.
    MfVec2d(Vec<Vec2d>) => "MFVec2d",
    /// 2D vector list.
    MfVec2f(Vec<Vec2f>) => "MFVec2f",
    /// Double-precision 3D vector list.
    MfVec3d(Vec<Vec3d>) => "MFVec3d",
    /// 3D vector list.
    MfVec3f(Vec<Vec3f>) => "MFVec3f",
}

impl ValueKind {
    /// `true` for `SFNode` and `MFNode`.
    #[must_use]
    pub const fn is_node(self) -> bool {
        matches!(self, ValueKind::SfNode | ValueKind::MfNode)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

struct DefaultValue;

impl KindVisitor for DefaultValue {
    type Output = FieldValue;

    fn visit<V: FieldType>(self) -> FieldValue {
        V::default().into_value()
    }
}

impl FieldValue {
    /// The language default for `kind` (zero, empty, null, identity rotation).
    #[must_use]
    pub fn default_for(kind: ValueKind) -> Self {
        dispatch(kind, DefaultValue)
    }

    /// Node references held by this value, in order. Empty for non-node kinds.
    #[must_use]
    pub fn node_refs(&self) -> &[NodeId] {
        match self {
            FieldValue::SfNode(SfNode(node)) => node.as_slice(),
            FieldValue::MfNode(MfNode(nodes)) => nodes,
            _ => &[],
        }
    }

    /// Rebuilds the value with every node reference passed through `f`.
    ///
    /// Non-node values are cloned unchanged; `f` is never called for them.
    pub fn try_map_nodes<E>(
        &self,
        mut f: impl FnMut(NodeId) -> Result<NodeId, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            FieldValue::SfNode(SfNode(node)) => {
                FieldValue::SfNode(SfNode(node.map(&mut f).transpose()?))
            }
            FieldValue::MfNode(MfNode(nodes)) => FieldValue::MfNode(MfNode(
                nodes.iter().map(|n| f(*n)).collect::<Result<_, _>>()?,
            )),
            other => other.clone(),
        })
    }

    /// Fails with [`KindMismatch`] unless this value has `kind`.
    pub fn expect_kind(&self, kind: ValueKind) -> Result<(), KindMismatch> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(KindMismatch {
                expected: kind,
                found: self.kind(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KindOf;

    impl KindVisitor for KindOf {
        type Output = ValueKind;

        fn visit<V: FieldType>(self) -> ValueKind {
            V::KIND
        }
    }

    #[test]
    fn dispatch_is_total_and_faithful() {
        assert_eq!(ValueKind::ALL.len(), 30);
        for &kind in ValueKind::ALL {
            assert_eq!(dispatch(kind, KindOf), kind);
            assert_eq!(FieldValue::default_for(kind).kind(), kind);
        }
    }

    #[test]
    fn names_parse_back() {
        for &kind in ValueKind::ALL {
            assert_eq!(kind.name().parse::<ValueKind>(), Ok(kind));
        }
        assert_eq!(
            ValueKind::from_name("SFWidget"),
            Err(UnknownKind("SFWidget".into()))
        );
    }

    #[test]
    fn rotation_default_is_identity_about_z() {
        assert_eq!(
            FieldValue::default_for(ValueKind::SfRotation),
            FieldValue::SfRotation(SfRotation(Rotation {
                x: 0.0,
                y: 0.0,
                z: 1.0,
                angle: 0.0
            }))
        );
    }

    #[test]
    fn typed_access_reports_mismatch() {
        let value = FieldValue::from(SfFloat(2.5));
        assert_eq!(SfFloat::try_from_value(&value), Ok(SfFloat(2.5)));
        assert_eq!(
            SfInt32::try_from_value(&value),
            Err(KindMismatch {
                expected: ValueKind::SfInt32,
                found: ValueKind::SfFloat
            })
        );
    }

    #[test]
    fn node_refs_are_remapped_in_order() {
        let a = NodeId::from_parts(1, 0);
        let b = NodeId::from_parts(2, 0);
        let value = FieldValue::from(MfNode(vec![a, b, a]));
        assert_eq!(value.node_refs(), &[a, b, a]);

        let mapped = value
            .try_map_nodes(|n| Ok::<_, ()>(NodeId::from_parts(n.index() + 10, 3)))
            .unwrap_or_else(|()| FieldValue::default_for(ValueKind::MfNode));
        assert_eq!(
            mapped,
            FieldValue::from(MfNode(vec![
                NodeId::from_parts(11, 3),
                NodeId::from_parts(12, 3),
                NodeId::from_parts(11, 3)
            ]))
        );
        assert!(FieldValue::from(SfString("x".into())).node_refs().is_empty());
        assert!(FieldValue::from(SfNode(None)).node_refs().is_empty());
    }
}
