// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field kinds and typed field values for protoscene.
//!
//! Every interface of a scene node (field, eventIn, eventOut, exposedField)
//! carries exactly one [`ValueKind`], fixed when the interface is declared.
//! Values travel as [`FieldValue`]; code that needs the concrete Rust type for a
//! kind goes through [`dispatch`], a total match generated from the same table
//! as the enum so that no kind can be forgotten.
//!
//! Node references ([`NodeId`]) are generational arena handles. They carry no
//! owner: a value's node references are interpreted against whichever graph
//! holds the value (a template body or a live world).
#![forbid(unsafe_code)]

mod geom;
mod node_id;
mod value;

pub use geom::{Color, ColorRgba, Image, Rotation, Vec2d, Vec2f, Vec3d, Vec3f};
pub use node_id::NodeId;
pub use value::{
    dispatch, FieldType, FieldValue, KindMismatch, KindVisitor, MfBool, MfColor, MfColorRgba,
    MfDouble, MfFloat, MfImage, MfInt32, MfNode, MfRotation, MfString, MfTime, MfVec2d, MfVec2f,
    MfVec3d, MfVec3f, SfBool, SfColor, SfColorRgba, SfDouble, SfFloat, SfImage, SfInt32, SfNode,
    SfRotation, SfString, SfTime, SfVec2d, SfVec2f, SfVec3d, SfVec3f, UnknownKind, ValueKind,
};
