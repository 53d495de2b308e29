//! Event pool and reference-counted lifecycle.
//!
//! Events are stored in an arena of slots addressed by [`EventHandle`]s. A
//! handle pairs the slot index with the slot's generation; the generation is
//! bumped whenever the slot's event goes back to the pool, so a handle kept
//! past its last release is detected as stale instead of silently aliasing
//! the next event that reuses the slot.
//!
//! ## Lifecycle
//!
//! ```text
//! acquire ──► ref_count = 1 ──► retain/release ... ──► ref_count = 0
//!                                                         │
//!                    reset fields, generation += 1  ◄─────┘
//!                    slot joins its kind's free list
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use ember_config::PoolConfig;

use crate::error::{PoolError, PoolResult};
use crate::event::{Event, EventKind, EventTypeId};

/// Generation-checked reference to a pooled [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    index: u32,
    generation: u32,
}

impl EventHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Events with a non-zero reference count.
    pub live: usize,
    /// Released events waiting for reuse.
    pub free: usize,
    /// Slots whose event was dropped.
    pub vacant: usize,
}

struct Slot {
    generation: u32,
    ref_count: u32,
    event: Option<Rc<Event>>,
}

#[derive(Default)]
struct PoolInner {
    slots: Vec<Slot>,
    free: HashMap<EventTypeId, Vec<u32>>,
    vacant: Vec<u32>,
}

impl PoolInner {
    fn live_slot(&mut self, handle: EventHandle) -> PoolResult<&mut Slot> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(PoolError::InvalidHandle(handle))?;
        if slot.generation != handle.generation || slot.ref_count == 0 {
            return Err(PoolError::StaleHandle(handle));
        }
        Ok(slot)
    }
}

/// Arena of reusable events, with one free list per event kind.
pub struct EventPool {
    inner: RefCell<PoolInner>,
    next_event_id: Cell<u64>,
    max_free_per_kind: usize,
}

impl EventPool {
    /// Pool with the default retention limit.
    pub fn new() -> Self {
        Self::with_config(&PoolConfig::default())
    }

    /// Pool keeping at most `config.max_free_per_kind` released events per kind.
    pub fn with_config(config: &PoolConfig) -> Self {
        Self {
            inner: RefCell::new(PoolInner::default()),
            next_event_id: Cell::new(1),
            max_free_per_kind: config.max_free_per_kind,
        }
    }

    /// Take an event of kind `T` with a reference count of one.
    ///
    /// A previously released `T` is reused when one is available.
    pub fn acquire<T: EventKind>(&self) -> EventHandle {
        self.acquire_event::<T>().0
    }

    /// Take an event of kind `T` wrapped in a guard that releases on drop.
    pub fn get_pooled<T: EventKind>(self: &Rc<Self>) -> PooledEvent {
        let (handle, event) = self.acquire_event::<T>();
        PooledEvent {
            pool: Rc::clone(self),
            handle,
            event,
        }
    }

    /// Wrap a live raw handle in a guard, taking a new reference for it.
    pub fn try_pooled(self: &Rc<Self>, handle: EventHandle) -> PoolResult<PooledEvent> {
        self.try_retain(handle)?;
        match self.get(handle) {
            Some(event) => Ok(PooledEvent {
                pool: Rc::clone(self),
                handle,
                event,
            }),
            None => {
                self.try_release(handle)?;
                Err(PoolError::InvalidHandle(handle))
            }
        }
    }

    fn acquire_event<T: EventKind>(&self) -> (EventHandle, Rc<Event>) {
        let kind = T::event_type();
        let mut inner = self.inner.borrow_mut();

        let reused = inner.free.get_mut(&kind).and_then(Vec::pop);
        let index = match reused.or_else(|| inner.vacant.pop()) {
            Some(index) => index,
            None => {
                inner.slots.push(Slot {
                    generation: 0,
                    ref_count: 0,
                    event: None,
                });
                (inner.slots.len() - 1) as u32
            }
        };

        let slot = &mut inner.slots[index as usize];
        let handle = EventHandle::new(index, slot.generation);
        slot.ref_count = 1;
        let event = match &slot.event {
            Some(event) => Rc::clone(event),
            None => {
                let event = Rc::new(Event::new::<T>(handle));
                slot.event = Some(Rc::clone(&event));
                event
            }
        };
        drop(inner);

        let id = self.next_event_id.get();
        self.next_event_id.set(id + 1);
        event.activate(handle, id);
        tracing::trace!(event = id, %handle, reused = reused.is_some(), "acquired event");
        (handle, event)
    }

    /// Add a reference, returning the new count.
    pub fn try_retain(&self, handle: EventHandle) -> PoolResult<u32> {
        let mut inner = self.inner.borrow_mut();
        let slot = inner.live_slot(handle)?;
        slot.ref_count += 1;
        Ok(slot.ref_count)
    }

    /// Drop a reference, returning the remaining count.
    ///
    /// At zero the event is reset and goes back to its kind's free list.
    pub fn try_release(&self, handle: EventHandle) -> PoolResult<u32> {
        let event = {
            let mut inner = self.inner.borrow_mut();
            let slot = inner.live_slot(handle)?;
            slot.ref_count -= 1;
            if slot.ref_count > 0 {
                return Ok(slot.ref_count);
            }
            slot.generation = slot.generation.wrapping_add(1);
            slot.event.clone()
        };

        // Resetting drops the old payload, which may run arbitrary code, so
        // the pool must not be borrowed here.
        let Some(event) = event else {
            return Ok(0);
        };
        event.reset();

        let kind = event.event_type();
        let mut inner = self.inner.borrow_mut();
        let free = inner.free.entry(kind).or_default();
        if free.len() < self.max_free_per_kind {
            free.push(handle.index);
        } else {
            inner.slots[handle.index as usize].event = None;
            inner.vacant.push(handle.index);
        }
        Ok(0)
    }

    /// Add a reference.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the handle is stale or invalid.
    pub fn retain(&self, handle: EventHandle) {
        if let Err(err) = self.try_retain(handle) {
            contract_violation("retain", err);
        }
    }

    /// Drop a reference.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the handle is stale or invalid.
    pub fn release(&self, handle: EventHandle) {
        if let Err(err) = self.try_release(handle) {
            contract_violation("release", err);
        }
    }

    /// The live event behind `handle`.
    ///
    /// The returned `Rc` does not hold a reference on the slot, so it must not
    /// outlive the caller's own reference. Use [`try_pooled`](Self::try_pooled)
    /// outside the crate.
    pub(crate) fn get(&self, handle: EventHandle) -> Option<Rc<Event>> {
        self.inner
            .borrow_mut()
            .live_slot(handle)
            .ok()
            .and_then(|slot| slot.event.clone())
    }

    /// Current reference count, or `None` for a stale handle.
    pub fn ref_count(&self, handle: EventHandle) -> Option<u32> {
        self.inner
            .borrow_mut()
            .live_slot(handle)
            .ok()
            .map(|slot| slot.ref_count)
    }

    /// Snapshot of live, free and vacant slot counts.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.borrow();
        PoolStats {
            live: inner.slots.iter().filter(|s| s.ref_count > 0).count(),
            free: inner.free.values().map(Vec::len).sum(),
            vacant: inner.vacant.len(),
        }
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPool")
            .field("stats", &self.stats())
            .field("max_free_per_kind", &self.max_free_per_kind)
            .finish()
    }
}

fn contract_violation(op: &str, err: PoolError) {
    if cfg!(debug_assertions) {
        panic!("EventPool::{op} on a pooled event: {err}");
    }
    tracing::error!("EventPool::{} on a pooled event: {}", op, err);
}

/// Shared ownership of one pooled event.
///
/// Cloning retains, dropping releases. Derefs to the [`Event`].
pub struct PooledEvent {
    pool: Rc<EventPool>,
    handle: EventHandle,
    event: Rc<Event>,
}

impl PooledEvent {
    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    pub fn pool(&self) -> &Rc<EventPool> {
        &self.pool
    }

    /// Current reference count of the underlying event.
    pub fn ref_count(&self) -> u32 {
        self.pool.ref_count(self.handle).unwrap_or(0)
    }
}

impl Deref for PooledEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl Clone for PooledEvent {
    fn clone(&self) -> Self {
        self.pool.retain(self.handle);
        Self {
            pool: Rc::clone(&self.pool),
            handle: self.handle,
            event: Rc::clone(&self.event),
        }
    }
}

impl Drop for PooledEvent {
    fn drop(&mut self) {
        if let Err(err) = self.pool.try_release(self.handle) {
            tracing::error!("PooledEvent dropped with invalid handle: {}", err);
        }
    }
}

impl fmt::Debug for PooledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledEvent").field(&*self.event).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventFlags, PropagationPhase};

    #[derive(Default, Debug, PartialEq)]
    struct Tick {
        frame: u64,
    }

    impl EventKind for Tick {}

    #[derive(Default)]
    struct Resize;

    impl EventKind for Resize {}

    #[test]
    fn test_acquire_starts_with_one_reference() {
        let pool = EventPool::new();
        let handle = pool.acquire::<Tick>();

        assert_eq!(pool.ref_count(handle), Some(1));
        let event = pool.get(handle).unwrap();
        assert_eq!(event.event_type(), Tick::event_type());
        assert_eq!(event.handle(), handle);
        assert_eq!(pool.stats().live, 1);
    }

    #[test]
    fn test_retain_release_counts() {
        let pool = EventPool::new();
        let handle = pool.acquire::<Tick>();

        assert_eq!(pool.try_retain(handle), Ok(2));
        assert_eq!(pool.try_retain(handle), Ok(3));
        assert_eq!(pool.try_release(handle), Ok(2));
        assert_eq!(pool.try_release(handle), Ok(1));
        assert_eq!(pool.try_release(handle), Ok(0));

        assert_eq!(pool.ref_count(handle), None);
        assert!(pool.get(handle).is_none());
        assert_eq!(pool.stats(), PoolStats { live: 0, free: 1, vacant: 0 });
    }

    #[test]
    fn test_release_resets_and_recycles_same_kind() {
        let pool = EventPool::new();
        let first = pool.acquire::<Tick>();
        {
            let event = pool.get(first).unwrap();
            event.payload_mut::<Tick>().unwrap().frame = 42;
            event.stop_propagation();
            event.set_phase(PropagationPhase::AtTarget);
        }
        pool.release(first);

        let second = pool.acquire::<Tick>();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);

        let event = pool.get(second).unwrap();
        assert_eq!(event.flags(), EventFlags::empty());
        assert_eq!(event.phase(), PropagationPhase::None);
        assert_eq!(event.payload::<Tick>().unwrap().frame, 0);
    }

    #[test]
    fn test_other_kind_does_not_reuse_slot() {
        let pool = EventPool::new();
        let tick = pool.acquire::<Tick>();
        pool.release(tick);

        let resize = pool.acquire::<Resize>();
        assert_ne!(resize.index(), tick.index());
        assert!(pool.get(resize).unwrap().is::<Resize>());
    }

    #[test]
    fn test_stale_handle_detected() {
        let pool = EventPool::new();
        let handle = pool.acquire::<Tick>();
        pool.release(handle);
        let _reused = pool.acquire::<Tick>();

        assert_eq!(pool.try_retain(handle), Err(PoolError::StaleHandle(handle)));
        assert_eq!(pool.try_release(handle), Err(PoolError::StaleHandle(handle)));
    }

    #[test]
    fn test_invalid_handle_detected() {
        let pool = EventPool::new();
        let bogus = EventHandle::new(99, 0);
        assert_eq!(pool.try_retain(bogus), Err(PoolError::InvalidHandle(bogus)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "EventPool::release")]
    fn test_double_release_panics_in_debug() {
        let pool = EventPool::new();
        let handle = pool.acquire::<Tick>();
        pool.release(handle);
        pool.release(handle);
    }

    #[test]
    fn test_retention_limit_drops_extra_events() {
        let pool = EventPool::with_config(&PoolConfig {
            max_free_per_kind: 1,
        });
        let a = pool.acquire::<Tick>();
        let b = pool.acquire::<Tick>();
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.stats(), PoolStats { live: 0, free: 1, vacant: 1 });

        // The vacant slot is reused by any kind
        let resize = pool.acquire::<Resize>();
        assert_eq!(resize.index(), b.index());
        assert!(pool.get(resize).unwrap().is::<Resize>());
    }

    #[test]
    fn test_event_ids_increase() {
        let pool = EventPool::new();
        let a = pool.acquire::<Tick>();
        let b = pool.acquire::<Tick>();
        assert!(pool.get(b).unwrap().id() > pool.get(a).unwrap().id());
    }

    #[test]
    fn test_pooled_event_guard() {
        let pool = Rc::new(EventPool::new());
        let event = pool.get_pooled::<Tick>();
        let handle = event.handle();
        assert_eq!(event.ref_count(), 1);

        let shared = event.clone();
        assert_eq!(shared.ref_count(), 2);

        drop(event);
        assert_eq!(pool.ref_count(handle), Some(1));
        assert!(shared.is::<Tick>());

        drop(shared);
        assert_eq!(pool.ref_count(handle), None);
        assert_eq!(pool.stats().free, 1);
    }

    #[test]
    fn test_try_pooled_takes_its_own_reference() {
        let pool = Rc::new(EventPool::new());
        let handle = pool.acquire::<Tick>();

        let guard = pool.try_pooled(handle).unwrap();
        assert_eq!(guard.ref_count(), 2);
        drop(guard);

        pool.release(handle);
        assert_eq!(
            pool.try_pooled(handle).unwrap_err(),
            PoolError::StaleHandle(handle)
        );
    }

    #[test]
    fn test_guard_keeps_released_handle_from_aliasing() {
        let pool = Rc::new(EventPool::new());
        let first = pool.acquire::<Tick>();
        let guard = pool.try_pooled(first).unwrap();
        pool.release(first);

        // The guard's reference keeps the slot out of the free list
        let second = pool.acquire::<Tick>();
        pool.try_pooled(second).unwrap().payload_mut::<Tick>().unwrap().frame = 99;
        assert_ne!(second.index(), first.index());
        assert_eq!(guard.handle(), first);
        assert_eq!(guard.payload::<Tick>().unwrap().frame, 0);

        drop(guard);
        let third = pool.acquire::<Tick>();
        assert_eq!(third.index(), first.index());
        assert_ne!(third.generation(), first.generation());
        assert_eq!(
            pool.try_pooled(first).unwrap_err(),
            PoolError::StaleHandle(first)
        );
        assert_eq!(pool.ref_count(third), Some(1));
    }
}
