//! Per-tick callback scheduling.
//!
//! Subscribers register with an (interval, phase) policy. Identical
//! policies share a bucket with its own countdown: the countdown starts at
//! `interval`, is decremented on every dispatch of the bucket's phase, and
//! fires every member when it reaches zero, passing
//! `dt = tick_dt × max(interval, 1)`. Interval 0 fires every tick.
//!
//! While a phase is dispatching the pool is exclusively borrowed, so
//! callbacks add and remove subscribers through the [`TickContext`]; those
//! changes are queued and applied once the phase has finished.

use crate::context::TickContext;
use cellsim_core::SubscriberId;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

// ── Policy ─────────────────────────────────────────────────────────

/// Which half of the tick a subscriber runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriberPhase {
    /// Before the solvers are stepped.
    Pre,
    /// After the solvers are stepped.
    Post,
}

/// Execution policy of a subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberOptions {
    /// Ticks between invocations; 0 and 1 both mean every tick.
    pub interval: u32,
    /// Phase of the tick to run in.
    pub phase: SubscriberPhase,
}

impl SubscriberOptions {
    /// Run in the Pre phase every `interval` ticks.
    pub const fn pre(interval: u32) -> Self {
        Self {
            interval,
            phase: SubscriberPhase::Pre,
        }
    }

    /// Run in the Post phase every `interval` ticks.
    pub const fn post(interval: u32) -> Self {
        Self {
            interval,
            phase: SubscriberPhase::Post,
        }
    }
}

// ── Subscriber ─────────────────────────────────────────────────────

/// A per-tick callback.
pub trait Subscriber: Send {
    /// Called when the subscriber's bucket fires. `dt` is the simulated
    /// time since the previous invocation.
    fn update(&mut self, dt: f64, phase: SubscriberPhase, ctx: &mut TickContext<'_>);
}

impl<F> Subscriber for F
where
    F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send,
{
    fn update(&mut self, dt: f64, phase: SubscriberPhase, ctx: &mut TickContext<'_>) {
        self(dt, phase, ctx)
    }
}

/// Anything subscribers can be registered with.
pub trait SubscriberCollection {
    /// Register a subscriber and return its handle.
    fn add_subscriber(
        &mut self,
        options: SubscriberOptions,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriberId;

    /// Unregister a subscriber.
    fn remove_subscriber(&mut self, id: SubscriberId);
}

/// Closure-taking shorthands for any [`SubscriberCollection`].
pub trait SubscriberCollectionExt: SubscriberCollection {
    /// Register a closure with explicit options.
    fn add_with<F>(&mut self, options: SubscriberOptions, f: F) -> SubscriberId
    where
        F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send + 'static,
    {
        self.add_subscriber(options, Box::new(f))
    }

    /// Every tick, before the solvers.
    fn add_pre<F>(&mut self, f: F) -> SubscriberId
    where
        F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send + 'static,
    {
        self.add_with(SubscriberOptions::pre(1), f)
    }

    /// Every tick, after the solvers.
    fn add_post<F>(&mut self, f: F) -> SubscriberId
    where
        F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send + 'static,
    {
        self.add_with(SubscriberOptions::post(1), f)
    }

    /// Every 10 ticks, before the solvers.
    fn add_pre10<F>(&mut self, f: F) -> SubscriberId
    where
        F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send + 'static,
    {
        self.add_with(SubscriberOptions::pre(10), f)
    }

    /// Every 10 ticks, after the solvers.
    fn add_post10<F>(&mut self, f: F) -> SubscriberId
    where
        F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send + 'static,
    {
        self.add_with(SubscriberOptions::post(10), f)
    }

    /// Every 100 ticks, before the solvers.
    fn add_pre100<F>(&mut self, f: F) -> SubscriberId
    where
        F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send + 'static,
    {
        self.add_with(SubscriberOptions::pre(100), f)
    }

    /// Every 100 ticks, after the solvers.
    fn add_post100<F>(&mut self, f: F) -> SubscriberId
    where
        F: FnMut(f64, SubscriberPhase, &mut TickContext<'_>) + Send + 'static,
    {
        self.add_with(SubscriberOptions::post(100), f)
    }
}

impl<T: SubscriberCollection + ?Sized> SubscriberCollectionExt for T {}

// ── SubscriberPool ─────────────────────────────────────────────────

struct Bucket {
    countdown: i64,
    members: IndexMap<SubscriberId, Box<dyn Subscriber>>,
}

/// Change requested by a callback while its phase was dispatching.
pub(crate) enum PendingChange {
    Add(SubscriberId, SubscriberOptions, Box<dyn Subscriber>),
    Remove(SubscriberId),
}

/// Bucketed subscriber registry of one graph.
#[derive(Default)]
pub struct SubscriberPool {
    buckets: IndexMap<SubscriberOptions, Bucket>,
    index: IndexMap<SubscriberId, SubscriberOptions>,
}

impl SubscriberPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.index.len()
    }

    /// Whether a bucket with these options exists.
    pub fn has_bucket(&self, options: SubscriberOptions) -> bool {
        self.buckets.contains_key(&options)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.index.contains_key(&id)
    }

    /// Insert under a pre-allocated id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered.
    pub(crate) fn insert(
        &mut self,
        id: SubscriberId,
        options: SubscriberOptions,
        subscriber: Box<dyn Subscriber>,
    ) {
        if self.index.insert(id, options).is_some() {
            panic!("subscriber {id} registered twice");
        }
        self.buckets
            .entry(options)
            .or_insert_with(|| Bucket {
                countdown: i64::from(options.interval),
                members: IndexMap::new(),
            })
            .members
            .insert(id, subscriber);
    }

    /// Dispatch every bucket of `phase`, then apply the changes the
    /// callbacks queued on `ctx`.
    pub fn update(&mut self, phase: SubscriberPhase, ctx: &mut TickContext<'_>) {
        let tick_dt = ctx.tick_dt();
        for (options, bucket) in self.buckets.iter_mut() {
            if options.phase != phase {
                continue;
            }
            bucket.countdown -= 1;
            if bucket.countdown > 0 {
                continue;
            }
            bucket.countdown = i64::from(options.interval);
            let dt = tick_dt * f64::from(options.interval.max(1));
            for (id, subscriber) in bucket.members.iter_mut() {
                ctx.set_current(Some(*id));
                subscriber.update(dt, phase, ctx);
            }
        }
        ctx.set_current(None);
        let pending = ctx.take_pending();
        self.validate(&pending);
        for change in pending {
            match change {
                PendingChange::Add(id, options, subscriber) => self.insert(id, options, subscriber),
                PendingChange::Remove(id) => self.remove_subscriber(id),
            }
        }
    }
}

impl SubscriberPool {
    /// Check a batch of queued changes before any of it is applied.
    ///
    /// # Panics
    ///
    /// Panics if a removal names an id that is neither registered nor
    /// added earlier in the batch, or names the same id twice.
    fn validate(&self, pending: &[PendingChange]) {
        let mut added = HashSet::new();
        let mut removed = HashSet::new();
        for change in pending {
            match change {
                PendingChange::Add(id, ..) => {
                    added.insert(*id);
                }
                PendingChange::Remove(id) => {
                    let known = self.index.contains_key(id) || added.contains(id);
                    if !known || !removed.insert(*id) {
                        panic!("subscriber {id} is not registered");
                    }
                }
            }
        }
    }
}

impl SubscriberCollection for SubscriberPool {
    fn add_subscriber(
        &mut self,
        options: SubscriberOptions,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriberId {
        let id = SubscriberId::next();
        self.insert(id, options, subscriber);
        id
    }

    /// # Panics
    ///
    /// Panics if `id` is not registered.
    fn remove_subscriber(&mut self, id: SubscriberId) {
        let Some(options) = self.index.swap_remove(&id) else {
            panic!("subscriber {id} is not registered");
        };
        let emptied = match self.buckets.get_mut(&options) {
            Some(bucket) => {
                bucket.members.shift_remove(&id);
                bucket.members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.buckets.shift_remove(&options);
        }
    }
}

impl fmt::Debug for SubscriberPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberPool")
            .field("buckets", &self.buckets.len())
            .field("subscribers", &self.index.len())
            .finish()
    }
}

// ── Tracked subscriptions ──────────────────────────────────────────

/// Remembers the subscribers registered through it, so that they can all
/// be removed again with [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct TrackedSubscribers {
    ids: Vec<SubscriberId>,
}

impl TrackedSubscribers {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection that registers with `pool` and records the ids here.
    pub fn track<'a>(&'a mut self, pool: &'a mut SubscriberPool) -> TrackedCollection<'a> {
        TrackedCollection { pool, ids: self }
    }

    /// Remove every recorded subscriber from `pool`. Ids the pool no
    /// longer holds, such as subscribers that removed themselves during a
    /// tick, are skipped.
    pub fn clear(&mut self, pool: &mut SubscriberPool) {
        for id in self.ids.drain(..) {
            if pool.contains(id) {
                pool.remove_subscriber(id);
            }
        }
    }

    /// Number of recorded subscribers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// [`SubscriberCollection`] view produced by [`TrackedSubscribers::track`].
pub struct TrackedCollection<'a> {
    pool: &'a mut SubscriberPool,
    ids: &'a mut TrackedSubscribers,
}

impl SubscriberCollection for TrackedCollection<'_> {
    fn add_subscriber(
        &mut self,
        options: SubscriberOptions,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriberId {
        let id = self.pool.add_subscriber(options, subscriber);
        self.ids.ids.push(id);
        id
    }

    /// # Panics
    ///
    /// Panics if `id` was not registered through this collection.
    fn remove_subscriber(&mut self, id: SubscriberId) {
        let Some(pos) = self.ids.ids.iter().position(|x| *x == id) else {
            panic!("subscriber {id} was not registered through this collection");
        };
        self.ids.ids.swap_remove(pos);
        self.pool.remove_subscriber(id);
    }
}
