use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worldgrid_common::{GroupId, ObjectId, UserId};

use crate::SceneError;

/// A live object group as seen by region-level bookkeeping.
///
/// Only the facts accounting needs are modelled: ownership, position of the
/// root part, the number of parts, and the two flags that exclude an object
/// from parcel counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub owner_id: UserId,
    pub group_id: GroupId,
    /// Region-local position of the root part.
    pub position: Vec3,
    pub part_count: usize,
    pub is_attachment: bool,
    pub temporary_on_rez: bool,
}

impl SceneObject {
    /// A single-part, rezzed, non-temporary object.
    pub fn new(owner_id: UserId, position: Vec3) -> Self {
        Self {
            id: ObjectId::new(),
            owner_id,
            group_id: GroupId::NIL,
            position,
            part_count: 1,
            is_attachment: false,
            temporary_on_rez: false,
        }
    }

    /// Whether this object counts against any parcel.
    pub fn is_countable(&self) -> bool {
        !self.is_attachment && !self.temporary_on_rez
    }
}

/// An event record produced by every mutation to the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SceneEvent {
    /// Object group entered the scene (rezzed, loaded, or crossed in).
    ObjectAdded(SceneObject),
    /// Object group is leaving the scene. Carries its last state.
    ObjectRemoved(SceneObject),
    /// Object group moved; parcel membership may have changed.
    ObjectMoved { id: ObjectId, old: Vec3, new: Vec3 },
}

/// The live objects of one region.
///
/// Uses BTreeMap so a full enumeration always visits objects in the same order.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: BTreeMap<ObjectId, SceneObject>,
    event_log: Vec<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    /// Add an object group, replacing any previous group with the same id.
    pub fn add(&mut self, object: SceneObject) -> SceneEvent {
        self.objects.insert(object.id, object.clone());
        let event = SceneEvent::ObjectAdded(object);
        self.event_log.push(event.clone());
        event
    }

    /// Remove an object group. Returns its removal event.
    pub fn remove(&mut self, id: ObjectId) -> Result<SceneEvent, SceneError> {
        let object = self.objects.remove(&id).ok_or(SceneError::ObjectNotFound(id))?;
        let event = SceneEvent::ObjectRemoved(object);
        self.event_log.push(event.clone());
        Ok(event)
    }

    /// Move an object group's root part.
    pub fn move_to(&mut self, id: ObjectId, new: Vec3) -> Result<SceneEvent, SceneError> {
        let object = self.objects.get_mut(&id).ok_or(SceneError::ObjectNotFound(id))?;
        let old = object.position;
        object.position = new;
        let event = SceneEvent::ObjectMoved { id, old, new };
        self.event_log.push(event.clone());
        Ok(event)
    }

    /// Visit every object group in id order.
    pub fn for_each_object(&self, f: &mut dyn FnMut(&SceneObject)) {
        for object in self.objects.values() {
            f(object);
        }
    }
}
