//! Scenewire – an asynchronous client for a remotely hosted hierarchical scene graph
//!
//! The remote application exposes a tree of nodes, each hosting typed
//! sub-objects with individually addressable members, behind a single
//! persistent message-oriented connection. This crate implements the client
//! side of that protocol:
//! - Correlation of many concurrent outstanding requests against
//!   out-of-order replies
//! - A self-describing tagged value codec covering scalars, vectors,
//!   enumerations, cross-references, and ordered lists of references
//! - The two-round-trip upsert needed to mutate reference lists without
//!   duplicating or losing elements
//! - Bounded-backoff reconciliation of eventual consistency between create
//!   acknowledgments and query visibility
//!
//! This is a library; it has no command-line surface. The remote component
//! catalog (type tags) is opaque to it, and rendering or presentation
//! concerns are entirely out of scope.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod connection;
pub mod error;
pub mod scene;
pub mod settle;
pub mod transport;
pub mod upsert;
pub mod value;

mod correlator;

pub use connection::{Connection, ConnectionConfig, CreateNode, UpdateNode};
pub use error::{ClientError, Result};
pub use scene::{
    ElementId, EntityId, Member, MemberId, Node, NodeId, ObjectId, Quat, Transform, TypedObject,
    Vec3,
};
pub use settle::{SettleConfig, await_visible};
pub use upsert::ListWrite;
pub use value::{ListElement, MemberValue, Scalar, Vector};

/// Current version of the scenewire crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version spoken on the wire
pub const PROTOCOL_VERSION: &str = "1.0.0";
