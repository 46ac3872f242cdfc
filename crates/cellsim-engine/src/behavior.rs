//! Per-cell behaviors: logic that runs on the graph's tick.
//!
//! A behavior is created with its cell, subscribes to the pool of the graph
//! the cell joins, and is destroyed when the cell is removed. Subscribers
//! are registered through a tracked collection owned by the cell, so every
//! subscription is removed on teardown without the behavior keeping ids.
//!
//! Behaviors live inside their cell. Subscriber callbacks reach them again
//! through [`TickContext::with_cell`](crate::TickContext::with_cell) and
//! [`CellBehaviorContainer::get_mut`].

use crate::cell::CellInfo;
use crate::error::CellError;
use crate::subscriber::SubscriberCollection;
use cellsim_core::CellId;
use indexmap::IndexMap;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt;

/// Logic attached to a cell.
pub trait CellBehavior: Any + Send {
    /// Called once the behavior has been added to its cell.
    fn on_added(&mut self, _cell: &CellInfo) {}

    /// Register subscribers for `cell` with the graph's pool.
    fn subscribe(&mut self, _cell: CellId, _subscribers: &mut dyn SubscriberCollection) {}

    /// Called on teardown, after the behavior's subscriptions are removed.
    fn destroy(&mut self) {}

    /// Persistent state, or `None` for stateless behaviors.
    fn save(&self) -> Option<Value> {
        None
    }

    /// Restore persistent state.
    fn load(&mut self, _state: Value) -> Result<(), serde_json::Error> {
        Ok(())
    }

    /// Stable name used as the persistence key.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// The behaviors of one cell, at most one per concrete type.
#[derive(Default)]
pub struct CellBehaviorContainer {
    behaviors: IndexMap<TypeId, Box<dyn CellBehavior>>,
}

impl CellBehaviorContainer {
    /// An empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a behavior.
    pub fn add<T: CellBehavior>(&mut self, behavior: T) -> Result<(), CellError> {
        self.add_boxed(Box::new(behavior))
    }

    /// Add a boxed behavior.
    pub fn add_boxed(&mut self, behavior: Box<dyn CellBehavior>) -> Result<(), CellError> {
        let any: &dyn Any = &*behavior;
        let key = any.type_id();
        if self.behaviors.contains_key(&key) {
            return Err(CellError::DuplicateBehavior(behavior.type_name()));
        }
        self.behaviors.insert(key, behavior);
        Ok(())
    }

    /// The behavior of type `T`.
    pub fn get<T: CellBehavior>(&self) -> Option<&T> {
        let behavior: &dyn Any = &**self.behaviors.get(&TypeId::of::<T>())?;
        behavior.downcast_ref::<T>()
    }

    /// The behavior of type `T`, mutably.
    pub fn get_mut<T: CellBehavior>(&mut self) -> Option<&mut T> {
        let behavior: &mut dyn Any = &mut **self.behaviors.get_mut(&TypeId::of::<T>())?;
        behavior.downcast_mut::<T>()
    }

    /// Whether a `T` is present.
    pub fn contains<T: CellBehavior>(&self) -> bool {
        self.behaviors.contains_key(&TypeId::of::<T>())
    }

    /// Number of behaviors.
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Whether the container is empty.
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Notify every behavior that it was added to `cell`.
    pub(crate) fn on_added(&mut self, cell: &CellInfo) {
        for behavior in self.behaviors.values_mut() {
            behavior.on_added(cell);
        }
    }

    /// Subscribe every behavior, in registration order.
    pub(crate) fn subscribe_all(&mut self, cell: CellId, subscribers: &mut dyn SubscriberCollection) {
        for behavior in self.behaviors.values_mut() {
            behavior.subscribe(cell, subscribers);
        }
    }

    /// Destroy every behavior.
    pub(crate) fn destroy_all(&mut self) {
        for behavior in self.behaviors.values_mut() {
            behavior.destroy();
        }
    }

    /// Drop every behavior after destroying it.
    pub(crate) fn drain_destroy(&mut self) {
        self.destroy_all();
        self.behaviors.clear();
    }

    /// `(name, state)` of every behavior with persistent state.
    pub fn save(&self) -> Vec<(String, Value)> {
        self.behaviors
            .values()
            .filter_map(|b| Some((b.type_name().to_owned(), b.save()?)))
            .collect()
    }

    /// Restore the behavior named `name`. Returns `false` when no such
    /// behavior exists.
    pub fn load(&mut self, name: &str, state: Value) -> Result<bool, serde_json::Error> {
        match self.behaviors.values_mut().find(|b| b.type_name() == name) {
            Some(behavior) => {
                behavior.load(state)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl fmt::Debug for CellBehaviorContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.behaviors.values().map(|b| b.type_name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{SubscriberCollectionExt, SubscriberPool};
    use crate::TickContext;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        count: u32,
        destroyed: bool,
    }

    impl CellBehavior for Counter {
        fn subscribe(&mut self, _cell: CellId, subscribers: &mut dyn SubscriberCollection) {
            subscribers.add_pre(|_, _, _: &mut TickContext<'_>| {});
        }

        fn destroy(&mut self) {
            self.destroyed = true;
        }

        fn save(&self) -> Option<Value> {
            Some(json!(self.count))
        }

        fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
            self.count = serde_json::from_value(state)?;
            Ok(())
        }

        fn type_name(&self) -> &'static str {
            "counter"
        }
    }

    struct Silent;

    impl CellBehavior for Silent {}

    #[test]
    fn duplicate_type_is_reported() {
        let mut container = CellBehaviorContainer::new();
        container.add(Counter::default()).unwrap();
        container.add(Silent).unwrap();
        let err = container.add(Counter::default()).unwrap_err();
        assert_eq!(err, CellError::DuplicateBehavior("counter"));
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn typed_lookup() {
        let mut container = CellBehaviorContainer::new();
        container.add(Counter::default()).unwrap();
        container.get_mut::<Counter>().unwrap().count = 3;
        assert_eq!(container.get::<Counter>().unwrap().count, 3);
        assert!(container.get::<Silent>().is_none());
    }

    #[test]
    fn subscribe_and_destroy() {
        let mut container = CellBehaviorContainer::new();
        container.add(Counter::default()).unwrap();
        container.add(Silent).unwrap();
        let mut pool = SubscriberPool::new();
        container.subscribe_all(CellId::next(), &mut pool);
        assert_eq!(pool.subscriber_count(), 1);
        container.destroy_all();
        assert!(container.get::<Counter>().unwrap().destroyed);
    }

    #[test]
    fn save_skips_stateless_behaviors() {
        let mut container = CellBehaviorContainer::new();
        container.add(Counter { count: 9, destroyed: false }).unwrap();
        container.add(Silent).unwrap();
        let saved = container.save();
        assert_eq!(saved, vec![("counter".to_owned(), json!(9))]);

        let mut restored = CellBehaviorContainer::new();
        restored.add(Counter::default()).unwrap();
        assert!(restored.load("counter", json!(9)).unwrap());
        assert!(!restored.load("missing", json!(1)).unwrap());
        assert_eq!(restored.get::<Counter>().unwrap().count, 9);
    }
}
