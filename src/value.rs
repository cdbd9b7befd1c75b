//! Tagged value codec for member payloads
//!
//! Every member value travels as a discriminated union keyed on `$type`.
//! The union is exhaustive: an unrecognized tag is a protocol error, never
//! silently ignored. Encoding and decoding are structural inverses, and
//! round-trip fidelity is a correctness requirement for every tag.

use crate::error::{ClientError, Result};
use crate::scene::{ElementId, EntityId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive scalar payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Scalar {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// UTF-8 string value.
    String(String),
}

/// Fixed-arity vector and color payloads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Vector {
    /// Two-component float vector.
    Float2 {
        /// X component.
        x: f64,
        /// Y component.
        y: f64,
    },
    /// Three-component float vector.
    Float3 {
        /// X component.
        x: f64,
        /// Y component.
        y: f64,
        /// Z component.
        z: f64,
    },
    /// RGBA color.
    Color {
        /// Red channel.
        r: f64,
        /// Green channel.
        g: f64,
        /// Blue channel.
        b: f64,
        /// Alpha channel.
        a: f64,
    },
}

/// One element of an ordered list of references.
///
/// Supplying `id` on write updates that element in place; omitting it asks
/// the server to create a new element. Re-sending a full list without the
/// prior elements' own ids therefore duplicates them — preserving those ids
/// is what [`crate::upsert`] exists for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListElement {
    /// Server-assigned identity of the element itself, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
    /// Entity the element points at.
    pub target_id: EntityId,
}

impl ListElement {
    /// Element pointing at `target`, with no own-id yet.
    pub fn new(target: EntityId) -> Self {
        Self {
            id: None,
            target_id: target,
        }
    }
}

/// Discriminated union of every member payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type", rename_all = "lowercase")]
pub enum MemberValue {
    /// Primitive scalar.
    Scalar(Scalar),
    /// Vector or color.
    Vector(Vector),
    /// Enumeration value, carried as strings for an opaque enum type.
    Enum {
        /// Name of the remote enumeration type.
        #[serde(rename = "enumType")]
        enum_type: String,
        /// Selected enumeration member.
        value: String,
    },
    /// Reference to another addressable entity. When the member being set is
    /// itself a sub-field with its own identity, `id` names the field slot
    /// being written — distinct from the value assigned to it.
    Reference {
        /// Identity of the field slot, when the slot itself is addressable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<ElementId>,
        /// Entity being pointed at.
        #[serde(rename = "targetId")]
        target_id: EntityId,
    },
    /// Ordered list of references.
    List {
        /// Elements in server order.
        elements: Vec<ListElement>,
    },
}

impl MemberValue {
    /// Encode into the wire representation.
    pub fn to_wire(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|err| ClientError::Protocol(format!("value encoding failed: {err}")))
    }

    /// Decode from the wire representation.
    ///
    /// Rejects payloads with a missing or unrecognized `$type` tag.
    pub fn from_wire(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| ClientError::Protocol(format!("malformed member value: {err}")))
    }

    /// Convenience constructor for a boolean scalar.
    pub fn bool(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }

    /// Convenience constructor for an integer scalar.
    pub fn int(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }

    /// Convenience constructor for a float scalar.
    pub fn float(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }

    /// Convenience constructor for a string scalar.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    /// Convenience constructor for a bare reference with no slot id.
    pub fn reference(target: EntityId) -> Self {
        Self::Reference {
            id: None,
            target_id: target,
        }
    }
}
