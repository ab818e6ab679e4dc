//! Native execution models.
//!
//! Each backend device owns the native handles registered for abstract
//! objects and implements [`crate::executor::Backend`] over an entry-point
//! trait for its API. The crate never links a driver; hosts implement the
//! entry-point traits over their bindings.

pub mod d3d12;
pub mod gl;
pub mod vulkan;

use hashbrown::HashMap;

use crate::error::ObjectError;
use crate::objects::ObjectId;

/// Native handles registered for abstract object ids.
#[derive(Debug)]
pub(crate) struct Registry<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: ObjectId, V> Registry<K, V> {
    pub fn insert(&mut self, id: K, value: V) -> Option<V> {
        self.entries.insert(id, value)
    }

    pub fn get(&self, id: K) -> Result<&V, ObjectError> {
        self.entries.get(&id).ok_or_else(|| id.unregistered())
    }

    pub fn get_mut(&mut self, id: K) -> Result<&mut V, ObjectError> {
        self.entries.get_mut(&id).ok_or_else(|| id.unregistered())
    }

    pub fn remove(&mut self, id: K) -> Result<V, ObjectError> {
        self.entries.remove(&id).ok_or_else(|| id.unregistered())
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries.drain()
    }
}
