//! Process-wide identity table for formula values.
//!
//! The four singletons own the identifiers 0..=3. Every other value takes the next unused
//! identifier from an atomic counter and claims it with compare-and-insert, so identifiers are
//! never shared and never reused. The table only holds weak references; a value leaves the
//! table when its last reference is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::object::{ObjectCell, ScriptObject, Value};

pub type ObjectId = u64;

pub const NULL_ID: ObjectId = 0;
pub const ALL_OBJECTS_ID: ObjectId = 1;
pub const TRUE_ID: ObjectId = 2;
pub const FALSE_ID: ObjectId = 3;
pub const FIRST_DYNAMIC_ID: ObjectId = 4;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

pub fn global() -> &'static Registry {
    &GLOBAL
}

pub struct Registry {
    singletons: [ScriptObject; 4],
    objects: DashMap<ObjectId, Weak<ObjectCell>>,
    next_id: AtomicU64,
}

impl Registry {
    fn new() -> Registry {
        let singletons = [
            ScriptObject::with_id(NULL_ID, Value::Null),
            ScriptObject::with_id(ALL_OBJECTS_ID, Value::ViewForAllObjects),
            ScriptObject::with_id(TRUE_ID, Value::Boolean(true)),
            ScriptObject::with_id(FALSE_ID, Value::Boolean(false)),
        ];
        let objects = DashMap::new();
        for object in &singletons {
            objects.insert(object.id(), object.downgrade());
        }
        Registry {
            singletons,
            objects,
            next_id: AtomicU64::new(FIRST_DYNAMIC_ID),
        }
    }

    pub(super) fn singleton(&self, id: ObjectId) -> ScriptObject {
        self.singletons[id as usize].clone()
    }

    /// Wraps `value` in a new object and makes it reachable by identifier before anyone else
    /// can see it.
    pub(super) fn publish(&self, value: Value) -> ScriptObject {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            match self.objects.entry(id) {
                // Somebody claimed this slot first; draw again.
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let object = ScriptObject::with_id(id, value);
                    slot.insert(object.downgrade());
                    return object;
                }
            }
        }
    }

    pub(super) fn forget(&self, id: ObjectId) {
        self.objects
            .remove_if(&id, |_, weak| weak.strong_count() == 0);
    }

    pub fn lookup(&self, id: ObjectId) -> Option<ScriptObject> {
        let cell = self.objects.get(&id).and_then(|weak| weak.upgrade())?;
        Some(ScriptObject::from_cell(cell))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn concurrent_allocation_hands_out_distinct_ids() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    (0..500)
                        .map(|i| ScriptObject::integer(i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        // Keep every object alive so no identifier can be a recycled slot.
        let objects: Vec<ScriptObject> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        let ids: HashSet<ObjectId> = objects.iter().map(ScriptObject::id).collect();

        assert_eq!(ids.len(), objects.len());
        assert!(ids.iter().all(|id| *id >= FIRST_DYNAMIC_ID));
    }

    #[test]
    fn dropped_objects_leave_the_table() {
        let object = ScriptObject::new_object();
        let id = object.id();
        assert!(global().lookup(id).is_some());

        drop(object);
        assert!(global().lookup(id).is_none());
    }

    #[test]
    fn identifiers_are_not_reused() {
        let first = ScriptObject::new_object().id();
        let second = ScriptObject::new_object().id();
        assert!(second > first);
    }

    #[test]
    fn singletons_are_always_reachable() {
        for id in [NULL_ID, ALL_OBJECTS_ID, TRUE_ID, FALSE_ID] {
            assert_eq!(global().lookup(id).map(|object| object.id()), Some(id));
        }
        assert!(global().len() >= 4);
        assert!(!global().is_empty());
    }
}
