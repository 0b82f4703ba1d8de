use std::collections::HashMap;

use tracing::warn;

use super::objects::{GameObject, ObjectId, ObjectKind};

/// Where an object lives: `layers[layer]` is an object layer and `index` its
/// position in that layer's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub layer: usize,
    pub index: usize,
}

/// Level-wide lookup of objects by id, name and kind.
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    by_id: HashMap<ObjectId, ObjectHandle>,
    by_name: HashMap<String, Vec<ObjectHandle>>,
    by_kind: HashMap<ObjectKind, Vec<ObjectHandle>>,
    order: Vec<ObjectHandle>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, object: &GameObject, handle: ObjectHandle) {
        if let Some(previous) = self.by_id.insert(object.id, handle) {
            warn!(
                id = object.id,
                name = %object.name,
                previous_layer = previous.layer,
                previous_index = previous.index,
                "object_id_duplicate"
            );
        }
        if !object.name.is_empty() {
            self.by_name
                .entry(object.name.clone())
                .or_default()
                .push(handle);
        }
        self.by_kind.entry(object.kind).or_default().push(handle);
        self.order.push(handle);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every handle in construction order.
    pub fn handles(&self) -> &[ObjectHandle] {
        &self.order
    }

    pub fn by_id(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.by_id.get(&id).copied()
    }

    /// First object registered under `name`.
    pub fn by_name(&self, name: &str) -> Option<ObjectHandle> {
        self.by_name
            .get(name)
            .and_then(|handles| handles.first())
            .copied()
    }

    pub fn all_by_name(&self, name: &str) -> &[ObjectHandle] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_kind(&self, kind: ObjectKind) -> &[ObjectHandle] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}
