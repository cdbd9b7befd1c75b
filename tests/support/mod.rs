//! In-memory fake server speaking the scenewire wire protocol.
//!
//! Tests drive a real [`Connection`] over an in-memory duplex pipe against
//! this server. It implements the server-side invariants the client is
//! written against: server-assigned identifiers, element upsert semantics,
//! depth-bounded traversal, and configurable visibility delay, plus the
//! fault knobs (reply reordering, dropped replies, early close) the
//! correlation tests need.
#![allow(dead_code)]

use scenewire::transport::{CommandFrame, ReplyError, ReplyFrame};
use scenewire::{
    Connection, ConnectionConfig, CreateNode, Node, NodeId, SettleConfig, TypedObject,
    await_visible,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};
use tokio::task::JoinHandle;

/// Behavior knobs for one server instance.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Created entities stay invisible to queries for this long.
    pub visibility_delay: Duration,
    /// Created entities never become visible at all.
    pub never_visible: bool,
    /// Buffer this many requests, then reply to them in reverse order.
    pub reorder_window: usize,
    /// Swallow every reply, leaving all requests pending.
    pub drop_replies: bool,
    /// Close the connection after receiving this many requests, without
    /// replying to the last one.
    pub close_after_requests: Option<usize>,
    /// Number of root nodes (named `seed-0`, `seed-1`, ...) present and
    /// visible before the first request.
    pub preseed_roots: usize,
}

pub fn start(options: ServerOptions) -> (Connection, JoinHandle<()>) {
    start_with(options, ConnectionConfig::default())
}

pub fn start_with(
    options: ServerOptions,
    config: ConnectionConfig,
) -> (Connection, JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let connection = Connection::from_stream(client_io, config);
    let handle = tokio::spawn(run(server_io, options));
    (connection, handle)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Create a root node and wait until a name lookup observes it.
pub async fn create_root_settled(conn: &Connection, name: &str) -> anyhow::Result<Node> {
    conn.create_node(CreateNode::named(name)).await?;
    let node = conn
        .find_by_name_settled(name, None, 1, &SettleConfig::default())
        .await?;
    Ok(node)
}

/// Create a child node under `parent` and wait until it is observable.
pub async fn create_child_settled(
    conn: &Connection,
    parent: &NodeId,
    name: &str,
) -> anyhow::Result<Node> {
    conn.create_node(CreateNode::named(name).under(parent.clone()))
        .await?;
    let node = conn
        .find_by_name_settled(name, Some(parent), 1, &SettleConfig::default())
        .await?;
    Ok(node)
}

/// Attach a typed object to `node` and wait until a subtree fetch reports it.
pub async fn attach_object_settled(
    conn: &Connection,
    node: &NodeId,
    type_tag: &str,
) -> anyhow::Result<TypedObject> {
    conn.create_object(node, type_tag).await?;
    let snapshot = await_visible(
        || conn.fetch_subtree(node, 0, true),
        |n: &Node| n.object_of_type(type_tag).is_some(),
        &SettleConfig::default(),
    )
    .await?;
    let object = snapshot
        .object_of_type(type_tag)
        .cloned()
        .expect("predicate guarantees the object is present");
    Ok(object)
}

async fn run(io: DuplexStream, options: ServerOptions) {
    let (read_half, mut write_half) = tokio::io::split(io);
    let mut lines = BufReader::new(read_half).lines();
    let mut scene = Scene::new(&options);
    let mut window: Vec<ReplyFrame> = Vec::new();
    let mut received = 0usize;

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let frame: CommandFrame =
            serde_json::from_str(&line).expect("client sent a well-formed command frame");
        received += 1;
        let reply = scene.dispatch(frame);

        if let Some(limit) = options.close_after_requests {
            if received >= limit {
                // Dropping the stream gives the client an EOF with the last
                // request still pending.
                return;
            }
        }
        if options.drop_replies {
            continue;
        }
        if options.reorder_window > 1 {
            window.push(reply);
            if window.len() >= options.reorder_window {
                while let Some(buffered) = window.pop() {
                    write_reply(&mut write_half, &buffered).await;
                }
            }
        } else {
            write_reply(&mut write_half, &reply).await;
        }
    }
}

async fn write_reply(writer: &mut WriteHalf<DuplexStream>, reply: &ReplyFrame) {
    let mut line = serde_json::to_vec(reply).expect("encode reply");
    line.push(b'\n');
    writer.write_all(&line).await.expect("write reply");
    writer.flush().await.expect("flush reply");
}

struct Scene {
    visibility_delay: Duration,
    never_visible: bool,
    nodes: BTreeMap<String, NodeRec>,
    objects: BTreeMap<String, ObjectRec>,
    roots: Vec<String>,
    next_id: u64,
}

struct NodeRec {
    name: String,
    parent: Option<String>,
    active: bool,
    transform: Option<Value>,
    children: Vec<String>,
    objects: Vec<String>,
    visible_at: Instant,
}

struct ObjectRec {
    type_tag: String,
    members: BTreeMap<String, MemberRec>,
    visible_at: Instant,
}

struct MemberRec {
    id: String,
    value: StoredValue,
}

enum StoredValue {
    /// Scalar, vector, or enum payload stored verbatim.
    Plain(Value),
    /// Reference member with its own slot identity.
    Reference { slot: String, target: String },
    /// Ordered list of (element id, target id) pairs.
    List(Vec<(String, String)>),
}

impl Scene {
    fn new(options: &ServerOptions) -> Self {
        let mut scene = Self {
            visibility_delay: options.visibility_delay,
            never_visible: options.never_visible,
            nodes: BTreeMap::new(),
            objects: BTreeMap::new(),
            roots: Vec::new(),
            next_id: 0,
        };
        for i in 0..options.preseed_roots {
            let id = scene.fresh_id("node");
            scene.nodes.insert(
                id.clone(),
                NodeRec {
                    name: format!("seed-{i}"),
                    parent: None,
                    active: true,
                    transform: None,
                    children: Vec::new(),
                    objects: Vec::new(),
                    visible_at: Instant::now(),
                },
            );
            scene.roots.push(id);
        }
        scene
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn creation_visible_at(&self) -> Instant {
        if self.never_visible {
            Instant::now() + Duration::from_secs(3600)
        } else {
            Instant::now() + self.visibility_delay
        }
    }

    fn entity_exists(&self, id: &str) -> bool {
        self.nodes.contains_key(id) || self.objects.contains_key(id)
    }

    fn dispatch(&mut self, frame: CommandFrame) -> ReplyFrame {
        let result = match frame.operation.as_str() {
            "create_node" => self.create_node(&frame.params),
            "update_node" => self.update_node(&frame.params),
            "create_object" => self.create_object(&frame.params),
            "update_object" => self.update_object(&frame.params),
            "fetch_subtree" => self.fetch_subtree(&frame.params),
            "fetch_object" => self.fetch_object(&frame.params),
            "find_by_name" => self.find_by_name(&frame.params),
            other => Err(format!("unknown operation: {other}")),
        };
        match result {
            Ok(data) => ReplyFrame {
                request_id: frame.request_id,
                success: true,
                data,
                error: None,
            },
            Err(message) => ReplyFrame {
                request_id: frame.request_id,
                success: false,
                data: Value::Null,
                error: Some(ReplyError { message }),
            },
        }
    }

    fn create_node(&mut self, params: &Value) -> Result<Value, String> {
        let name = str_param(params, "name")?.to_string();
        let parent = params
            .get("parentId")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(parent_id) = &parent {
            if !self.nodes.contains_key(parent_id) {
                return Err(format!("no such node: {parent_id}"));
            }
        }
        let transform = params.get("transform").filter(|t| !t.is_null()).cloned();
        let active = params.get("active").and_then(Value::as_bool).unwrap_or(true);

        let id = self.fresh_id("node");
        let record = NodeRec {
            name,
            parent: parent.clone(),
            active,
            transform,
            children: Vec::new(),
            objects: Vec::new(),
            visible_at: self.creation_visible_at(),
        };
        self.nodes.insert(id.clone(), record);
        match parent {
            Some(parent_id) => self
                .nodes
                .get_mut(&parent_id)
                .expect("parent checked above")
                .children
                .push(id),
            None => self.roots.push(id),
        }
        Ok(Value::Null)
    }

    fn update_node(&mut self, params: &Value) -> Result<Value, String> {
        let id = str_param(params, "nodeId")?.to_string();
        let transform = params.get("transform").filter(|t| !t.is_null()).cloned();
        let active = params.get("active").and_then(Value::as_bool);
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| format!("no such node: {id}"))?;
        if transform.is_some() {
            node.transform = transform;
        }
        if let Some(active) = active {
            node.active = active;
        }
        Ok(Value::Null)
    }

    fn create_object(&mut self, params: &Value) -> Result<Value, String> {
        let node_id = str_param(params, "nodeId")?.to_string();
        let type_tag = str_param(params, "type")?.to_string();
        if !self.nodes.contains_key(&node_id) {
            return Err(format!("no such node: {node_id}"));
        }
        let id = self.fresh_id("object");
        let record = ObjectRec {
            type_tag,
            members: BTreeMap::new(),
            visible_at: self.creation_visible_at(),
        };
        self.objects.insert(id.clone(), record);
        self.nodes
            .get_mut(&node_id)
            .expect("node checked above")
            .objects
            .push(id);
        Ok(Value::Null)
    }

    fn update_object(&mut self, params: &Value) -> Result<Value, String> {
        let id = str_param(params, "objectId")?.to_string();
        if !self.objects.contains_key(&id) {
            return Err(format!("no such object: {id}"));
        }
        let members = params
            .get("members")
            .and_then(Value::as_object)
            .ok_or_else(|| "missing parameter: members".to_string())?
            .clone();

        for (name, payload) in members {
            self.write_member(&id, &name, &payload)?;
        }
        Ok(Value::Null)
    }

    fn write_member(&mut self, object_id: &str, name: &str, payload: &Value) -> Result<(), String> {
        let tag = payload
            .get("$type")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("member {name} missing $type"))?
            .to_string();

        let stored = match tag.as_str() {
            "scalar" | "vector" | "enum" => StoredValue::Plain(payload.clone()),
            "reference" => {
                let target = payload
                    .get("targetId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("member {name} missing targetId"))?
                    .to_string();
                if !self.entity_exists(&target) {
                    return Err(format!("no such entity: {target}"));
                }
                let given_slot = payload.get("id").and_then(Value::as_str);
                let existing_slot = self
                    .objects
                    .get(object_id)
                    .and_then(|o| o.members.get(name))
                    .and_then(|m| match &m.value {
                        StoredValue::Reference { slot, .. } => Some(slot.clone()),
                        _ => None,
                    });
                let slot = match (given_slot, existing_slot) {
                    (Some(given), Some(existing)) if given == existing => existing,
                    (Some(given), _) => return Err(format!("no such field slot: {given}")),
                    (None, Some(existing)) => existing,
                    (None, None) => self.fresh_id("field"),
                };
                StoredValue::Reference { slot, target }
            }
            "list" => {
                let elements = payload
                    .get("elements")
                    .and_then(Value::as_array)
                    .ok_or_else(|| format!("member {name} missing elements"))?
                    .clone();
                let mut store = self
                    .objects
                    .get(object_id)
                    .and_then(|o| o.members.get(name))
                    .and_then(|m| match &m.value {
                        StoredValue::List(els) => Some(els.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();

                for element in &elements {
                    let target = element
                        .get("targetId")
                        .and_then(Value::as_str)
                        .ok_or_else(|| format!("member {name} element missing targetId"))?
                        .to_string();
                    if !self.entity_exists(&target) {
                        return Err(format!("no such entity: {target}"));
                    }
                    match element.get("id").and_then(Value::as_str) {
                        Some(element_id) => {
                            let slot = store
                                .iter_mut()
                                .find(|(id, _)| id == element_id)
                                .ok_or_else(|| format!("no such element: {element_id}"))?;
                            slot.1 = target;
                        }
                        None => {
                            let element_id = self.fresh_id("element");
                            store.push((element_id, target));
                        }
                    }
                }
                StoredValue::List(store)
            }
            other => return Err(format!("unknown value tag: {other}")),
        };

        let member_id = self
            .objects
            .get(object_id)
            .and_then(|o| o.members.get(name))
            .map(|m| m.id.clone())
            .unwrap_or_else(|| self.fresh_id("member"));
        self.objects
            .get_mut(object_id)
            .expect("object checked by caller")
            .members
            .insert(
                name.to_string(),
                MemberRec {
                    id: member_id,
                    value: stored,
                },
            );
        Ok(())
    }

    fn fetch_object(&mut self, params: &Value) -> Result<Value, String> {
        let id = str_param(params, "objectId")?;
        let object = self
            .objects
            .get(id)
            .filter(|o| is_visible(o.visible_at))
            .ok_or_else(|| format!("no such object: {id}"))?;
        Ok(object_json(id, object))
    }

    fn fetch_subtree(&mut self, params: &Value) -> Result<Value, String> {
        let id = str_param(params, "nodeId")?;
        let depth = params.get("depth").and_then(Value::as_u64).unwrap_or(0);
        let include_objects = params
            .get("includeObjects")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !self
            .nodes
            .get(id)
            .is_some_and(|n| is_visible(n.visible_at))
        {
            return Err(format!("no such node: {id}"));
        }
        Ok(self.node_json(id, depth, include_objects))
    }

    fn find_by_name(&mut self, params: &Value) -> Result<Value, String> {
        let name = str_param(params, "name")?;
        let depth = params.get("depth").and_then(Value::as_u64).unwrap_or(1);
        let mut frontier: Vec<String> = match params.get("parentId").and_then(Value::as_str) {
            Some(parent) => {
                let node = self
                    .nodes
                    .get(parent)
                    .ok_or_else(|| format!("no such node: {parent}"))?;
                node.children.clone()
            }
            None => self.roots.clone(),
        };

        let mut level = 1;
        while level <= depth && !frontier.is_empty() {
            for id in &frontier {
                let node = &self.nodes[id];
                if is_visible(node.visible_at) && node.name == name {
                    return Ok(self.node_json(id, 0, false));
                }
            }
            frontier = frontier
                .iter()
                .flat_map(|id| self.nodes[id].children.clone())
                .collect();
            level += 1;
        }
        Ok(Value::Null)
    }

    fn node_json(&self, id: &str, depth: u64, include_objects: bool) -> Value {
        let node = &self.nodes[id];
        let mut out = Map::new();
        out.insert("id".to_string(), json!(id));
        out.insert("name".to_string(), json!(node.name));
        if let Some(parent) = &node.parent {
            out.insert("parentId".to_string(), json!(parent));
        }
        out.insert("active".to_string(), json!(node.active));
        if let Some(transform) = &node.transform {
            out.insert("transform".to_string(), transform.clone());
        }
        if depth > 0 {
            let children: Vec<Value> = node
                .children
                .iter()
                .filter(|c| is_visible(self.nodes[c.as_str()].visible_at))
                .map(|c| self.node_json(c, depth - 1, include_objects))
                .collect();
            if !children.is_empty() {
                out.insert("children".to_string(), Value::Array(children));
            }
        }
        if include_objects {
            let objects: Vec<Value> = node
                .objects
                .iter()
                .filter_map(|oid| {
                    self.objects
                        .get(oid)
                        .filter(|o| is_visible(o.visible_at))
                        .map(|o| object_json(oid, o))
                })
                .collect();
            if !objects.is_empty() {
                out.insert("objects".to_string(), Value::Array(objects));
            }
        }
        Value::Object(out)
    }
}

fn object_json(id: &str, object: &ObjectRec) -> Value {
    let mut members = Map::new();
    for (name, record) in &object.members {
        members.insert(
            name.clone(),
            json!({ "id": record.id, "value": member_value_json(&record.value) }),
        );
    }
    json!({ "id": id, "type": object.type_tag, "members": members })
}

fn member_value_json(value: &StoredValue) -> Value {
    match value {
        StoredValue::Plain(v) => v.clone(),
        StoredValue::Reference { slot, target } => {
            json!({ "$type": "reference", "id": slot, "targetId": target })
        }
        StoredValue::List(elements) => {
            let elements: Vec<Value> = elements
                .iter()
                .map(|(id, target)| json!({ "id": id, "targetId": target }))
                .collect();
            json!({ "$type": "list", "elements": elements })
        }
    }
}

fn is_visible(visible_at: Instant) -> bool {
    Instant::now() >= visible_at
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing parameter: {key}"))
}
