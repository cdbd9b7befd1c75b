//! List upsert and sub-field binding
//!
//! The server assigns a list element's own-id at creation time and the
//! client cannot invent one, yet writing a list without the existing
//! elements' ids duplicates them. Both helpers here formalize the same
//! discover-then-bind sequence the calling scripts used to spell out by
//! hand: write, read the assigned ids back, write again fully identified.
//!
//! Neither sequence is atomic. A second writer mutating the same member
//! between the round trips produces an unspecified outcome, so callers must
//! keep a single logical writer per list.

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::scene::{ElementId, EntityId, ObjectId, TypedObject};
use crate::value::{ListElement, MemberValue};
use std::collections::{BTreeMap, HashSet};

/// Caller intent for one list slot: a target, plus the element's own-id
/// when it is already known from an earlier read or upsert.
#[derive(Debug, Clone)]
pub struct ListWrite {
    /// Own-id of the element being updated in place, if known.
    pub id: Option<ElementId>,
    /// Entity the element should point at.
    pub target: EntityId,
}

impl ListWrite {
    /// A new element; the server will assign its identity.
    pub fn new(target: EntityId) -> Self {
        Self { id: None, target }
    }

    /// An existing element, updated in place.
    pub fn existing(id: ElementId, target: EntityId) -> Self {
        Self {
            id: Some(id),
            target,
        }
    }
}

impl Connection {
    /// Set a list member without duplicating or losing elements.
    ///
    /// Three steps: write the desired list (ids only where known), read the
    /// member back to learn the server-assigned ids of the new elements,
    /// then write once more with every element fully identified. Re-running
    /// the sequence with the returned elements converges to the same
    /// identities instead of growing the list.
    ///
    /// Callers replacing an existing list (rather than appending) must have
    /// read the current own-ids and included them in `desired`.
    pub async fn upsert_list_elements(
        &self,
        object: &ObjectId,
        member: &str,
        desired: Vec<ListWrite>,
    ) -> Result<Vec<ListElement>> {
        let first: Vec<ListElement> = desired
            .iter()
            .map(|write| ListElement {
                id: write.id.clone(),
                target_id: write.target.clone(),
            })
            .collect();
        self.write_list(object, member, first).await?;

        let snapshot = self.fetch_object(object).await?;
        let observed = list_member(&snapshot, member)?;

        let known: HashSet<&ElementId> = desired.iter().filter_map(|w| w.id.as_ref()).collect();
        let mut fresh = observed
            .iter()
            .filter(|el| el.id.as_ref().is_some_and(|id| !known.contains(id)));

        let mut resolved = Vec::with_capacity(desired.len());
        for write in &desired {
            match &write.id {
                Some(id) => resolved.push(ListElement {
                    id: Some(id.clone()),
                    target_id: write.target.clone(),
                }),
                None => {
                    let element = fresh.find(|el| el.target_id == write.target).ok_or_else(|| {
                        ClientError::Protocol(format!(
                            "list member {member:?} reported no id for target {}",
                            write.target
                        ))
                    })?;
                    resolved.push(ListElement {
                        id: element.id.clone(),
                        target_id: write.target.clone(),
                    });
                }
            }
        }

        self.write_list(object, member, resolved.clone()).await?;
        Ok(resolved)
    }

    /// Point a reference member at `target`, preserving the identity of the
    /// field slot it occupies.
    ///
    /// Reads the object to discover the member's own reference-slot id, then
    /// writes `{id, targetId}` so the server updates that slot in place.
    pub async fn bind_sub_field(
        &self,
        object: &ObjectId,
        member: &str,
        target: &EntityId,
    ) -> Result<()> {
        let snapshot = self.fetch_object(object).await?;
        let found = snapshot.members.get(member).ok_or_else(|| {
            ClientError::Protocol(format!("object {} has no member {member:?}", snapshot.id))
        })?;
        let slot = match &found.value {
            MemberValue::Reference { id, .. } => id.clone(),
            _ => {
                return Err(ClientError::Protocol(format!(
                    "member {member:?} is not a reference"
                )));
            }
        };

        let mut members = BTreeMap::new();
        members.insert(
            member.to_string(),
            MemberValue::Reference {
                id: slot,
                target_id: target.clone(),
            },
        );
        self.update_object(object, members).await
    }

    async fn write_list(
        &self,
        object: &ObjectId,
        member: &str,
        elements: Vec<ListElement>,
    ) -> Result<()> {
        let mut members = BTreeMap::new();
        members.insert(member.to_string(), MemberValue::List { elements });
        self.update_object(object, members).await
    }
}

fn list_member<'a>(object: &'a TypedObject, member: &str) -> Result<&'a [ListElement]> {
    let found = object.members.get(member).ok_or_else(|| {
        ClientError::Protocol(format!("object {} has no member {member:?}", object.id))
    })?;
    match &found.value {
        MemberValue::List { elements } => Ok(elements),
        _ => Err(ClientError::Protocol(format!(
            "member {member:?} is not a list"
        ))),
    }
}
