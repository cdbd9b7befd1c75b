//! Data model for the remote scene graph
//!
//! Everything here is a snapshot: the server owns the authoritative state and
//! the client only ever holds what the last query returned. Identifiers are
//! plain strings assigned by the remote side; the newtypes exist so the
//! different address spaces (nodes, objects, members, list elements) cannot
//! be mixed up at compile time.

use crate::value::MemberValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a node in the scene hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a server-assigned node identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// View this node as a generic reference target.
    pub fn as_entity(&self) -> EntityId {
        EntityId(self.0.clone())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a typed sub-object attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap a server-assigned object identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// View this object as a generic reference target.
    pub fn as_entity(&self) -> EntityId {
        EntityId(self.0.clone())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a named member on a typed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    /// Wrap a server-assigned member identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single element inside a list member, or of the slot a
/// sub-field reference occupies. Assigned by the server at creation time;
/// the client can never invent one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(String);

impl ElementId {
    /// Wrap a server-assigned element identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generic address of any entity a reference may point at.
///
/// References do not distinguish between node and object targets on the
/// wire, so this is the union of both address spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a raw entity identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<NodeId> for EntityId {
    fn from(id: NodeId) -> Self {
        Self(id.0)
    }
}

impl From<ObjectId> for EntityId {
    fn from(id: ObjectId) -> Self {
        Self(id.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Three-component vector used for positions and scales.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Construct from components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The all-ones vector, the default scale.
    pub fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
    /// W component.
    pub w: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Local transform of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position relative to the parent node.
    pub position: Vec3,
    /// Rotation relative to the parent node.
    pub rotation: Quat,
    /// Scale relative to the parent node.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::default(),
            rotation: Quat::default(),
            scale: Vec3::one(),
        }
    }
}

/// Snapshot of one node in the hierarchy.
///
/// `parent_id` is a lookup key, not an owning pointer; children and objects
/// are owned server-side in the sense that destroying the node destroys them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Server-assigned identifier.
    pub id: NodeId,
    /// Display name; not necessarily unique.
    pub name: String,
    /// Parent node, absent for roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// Whether the node participates in the scene.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Local transform.
    #[serde(default)]
    pub transform: Transform,
    /// Child nodes, populated to the depth the query asked for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    /// Typed sub-objects, populated when the query asked for them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<TypedObject>,
}

fn default_active() -> bool {
    true
}

impl Node {
    /// Find a directly attached object by its opaque type tag.
    pub fn object_of_type(&self, type_tag: &str) -> Option<&TypedObject> {
        self.objects.iter().find(|o| o.type_tag == type_tag)
    }
}

/// Snapshot of a typed sub-object and its named members.
///
/// The type tag is an opaque string the client passes through verbatim; the
/// remote application's component catalog is not interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedObject {
    /// Server-assigned identifier.
    pub id: ObjectId,
    /// Opaque type tag.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Members keyed by name.
    #[serde(default)]
    pub members: BTreeMap<String, Member>,
}

/// A named, independently addressable field on a typed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Server-assigned identifier of the member itself.
    pub id: MemberId,
    /// Current payload in tagged form.
    pub value: MemberValue,
}
