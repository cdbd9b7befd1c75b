//! Connection lifecycle and the public query/command surface
//!
//! A [`Connection`] owns one transport, one request-id counter, and one
//! pending-request table. It is an explicit value, never a process-wide
//! singleton: any number of independent connections may coexist, and any
//! number of calls may be issued concurrently against one of them. No
//! ordering is imposed across independent calls — the only guarantee is
//! that each caller gets its own matched reply.
//!
//! Command operations return acknowledgment only. The remote side assigns
//! entity identifiers, so a caller that needs the id of something it just
//! created must follow up with a query, usually via [`crate::settle`].

use crate::correlator::Correlator;
use crate::error::{ClientError, Result};
use crate::scene::{Node, NodeId, ObjectId, Transform, TypedObject};
use crate::transport::{self, IoTasks};
use crate::value::MemberValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound frames buffered between callers and the writer task.
const OUTBOUND_BUFFER: usize = 64;

/// Tunables for a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Per-call budget for a matched reply to arrive.
    pub call_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Parameters for [`Connection::create_node`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNode {
    /// Parent under which to create the node; absent creates a root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// Display name for the new node.
    pub name: String,
    /// Initial transform; the server default is identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// Initial active flag; the server default is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl CreateNode {
    /// Request for a named node with all other fields at server defaults.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Place the node under the given parent.
    pub fn under(mut self, parent: NodeId) -> Self {
        self.parent_id = Some(parent);
        self
    }
}

/// Parameters for [`Connection::update_node`]. Absent fields are untouched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNode {
    /// Node being updated.
    pub node_id: NodeId,
    /// New transform, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// New active flag, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// One client connection to the remote scene graph.
pub struct Connection {
    correlator: Arc<Correlator>,
    tasks: IoTasks,
    config: ConnectionConfig,
    id: Uuid,
}

impl Connection {
    /// Connect over TCP.
    pub async fn connect(addr: impl ToSocketAddrs, config: ConnectionConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        Ok(Self::from_stream(stream, config))
    }

    /// Build a connection over an arbitrary duplex stream.
    ///
    /// This is the seam tests use with an in-memory pipe; production code
    /// normally goes through [`Connection::connect`].
    pub fn from_stream<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let correlator = Arc::new(Correlator::new(outbound_tx));
        let tasks = transport::spawn(stream, Arc::clone(&correlator), outbound_rx);
        let id = Uuid::new_v4();
        tracing::debug!(connection = %id, "connection established");
        Self {
            correlator,
            tasks,
            config,
            id,
        }
    }

    /// Tear the connection down, failing every outstanding call.
    pub fn close(&self) {
        tracing::debug!(connection = %self.id, "closing connection");
        self.correlator.shut_down();
        self.tasks.reader.abort();
        self.tasks.writer.abort();
    }

    /// Issue a raw operation against the remote side.
    ///
    /// The typed surface below is built on this; it is public as an escape
    /// hatch for operations the client does not model.
    pub async fn call(&self, operation: &str, params: Value) -> Result<Value> {
        self.correlator
            .call(operation, params, self.config.call_timeout)
            .await
    }

    // --- Query surface -----------------------------------------------------

    /// Fetch a node and its descendants.
    ///
    /// `depth` bounds the traversal: 0 returns the node alone, `k` returns
    /// descendants up to `k` levels. `include_objects` controls whether
    /// typed sub-objects are populated on each returned node.
    pub async fn fetch_subtree(
        &self,
        node: &NodeId,
        depth: u32,
        include_objects: bool,
    ) -> Result<Node> {
        let data = self
            .call(
                "fetch_subtree",
                json!({
                    "nodeId": node,
                    "depth": depth,
                    "includeObjects": include_objects,
                }),
            )
            .await?;
        decode(data)
    }

    /// Fetch one typed object with all of its members.
    pub async fn fetch_object(&self, object: &ObjectId) -> Result<TypedObject> {
        let data = self
            .call("fetch_object", json!({ "objectId": object }))
            .await?;
        decode(data)
    }

    /// Find a node by name under `parent` (or among the roots), searching
    /// `depth` levels down. Fails with [`ClientError::NotFound`] when
    /// nothing matches.
    pub async fn find_by_name(
        &self,
        name: &str,
        parent: Option<&NodeId>,
        depth: u32,
    ) -> Result<Node> {
        let mut params = serde_json::Map::new();
        params.insert("name".to_string(), Value::String(name.to_string()));
        if let Some(parent) = parent {
            params.insert(
                "parentId".to_string(),
                Value::String(parent.as_str().to_string()),
            );
        }
        params.insert("depth".to_string(), Value::Number(depth.into()));

        let data = self.call("find_by_name", Value::Object(params)).await?;
        if data.is_null() {
            return Err(ClientError::NotFound(format!("no node named {name:?}")));
        }
        decode(data)
    }

    // --- Command surface ---------------------------------------------------

    /// Create a node. Acknowledgment only; the new node's id must be
    /// discovered with a follow-up query.
    pub async fn create_node(&self, request: CreateNode) -> Result<()> {
        let params = to_params(&request)?;
        self.call("create_node", params).await.map(drop)
    }

    /// Attach a typed object to a node. The type tag is passed through
    /// verbatim; acknowledgment only.
    pub async fn create_object(&self, node: &NodeId, type_tag: &str) -> Result<()> {
        self.call(
            "create_object",
            json!({ "nodeId": node, "type": type_tag }),
        )
        .await
        .map(drop)
    }

    /// Update named members of a typed object.
    pub async fn update_object(
        &self,
        object: &ObjectId,
        members: BTreeMap<String, MemberValue>,
    ) -> Result<()> {
        let mut encoded = serde_json::Map::new();
        for (name, value) in &members {
            encoded.insert(name.clone(), value.to_wire()?);
        }
        self.call(
            "update_object",
            json!({ "objectId": object, "members": encoded }),
        )
        .await
        .map(drop)
    }

    /// Update a node's transform and/or active flag.
    pub async fn update_node(&self, request: UpdateNode) -> Result<()> {
        let params = to_params(&request)?;
        self.call("update_node", params).await.map(drop)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.correlator.shut_down();
        self.tasks.reader.abort();
        self.tasks.writer.abort();
    }
}

fn to_params<T: Serialize>(request: &T) -> Result<Value> {
    serde_json::to_value(request)
        .map_err(|err| ClientError::Protocol(format!("parameter encoding failed: {err}")))
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|err| ClientError::Protocol(format!("malformed reply payload: {err}")))
}
