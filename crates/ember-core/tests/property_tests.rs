//! Property tests for pool recycling, drain ordering and gate nesting.

use std::cell::RefCell;
use std::rc::Rc;

use ember_core::{
    Callback, CallbackRegistry, EventDispatcher, EventFlags, EventHandler, EventKind, EventPool,
    PropagationPhase, SendEvent,
};
use proptest::prelude::*;

// ============================================================================
// HELPERS
// ============================================================================

#[derive(Default, Debug, PartialEq)]
struct Numbered {
    value: u32,
    spawn: bool,
}

impl EventKind for Numbered {}

struct Collector {
    callbacks: CallbackRegistry,
    dispatcher: Rc<EventDispatcher>,
}

impl EventHandler for Collector {
    fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    fn dispatcher(&self) -> Option<Rc<EventDispatcher>> {
        Some(Rc::clone(&self.dispatcher))
    }
}

const CHILD_OFFSET: u32 = 1000;

/// A collector whose callback records every value and re-sends
/// `value + CHILD_OFFSET` for events flagged to spawn.
fn collector(dispatcher: &Rc<EventDispatcher>) -> (Rc<Collector>, Rc<RefCell<Vec<u32>>>) {
    let collector = Rc::new(Collector {
        callbacks: CallbackRegistry::new(),
        dispatcher: Rc::clone(dispatcher),
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    let target = Rc::downgrade(&collector);
    let log = Rc::clone(&seen);
    let dispatcher = Rc::clone(dispatcher);
    collector.register_callback(&Callback::new(move |_, event: &Numbered| {
        log.borrow_mut().push(event.value);
        if !event.spawn {
            return;
        }
        if let Some(target) = target.upgrade() {
            let child = dispatcher.get_pooled::<Numbered>();
            child.payload_mut::<Numbered>().unwrap().value = event.value + CHILD_OFFSET;
            target.send_event(&child);
        }
    }));

    (collector, seen)
}

fn send(collector: &Rc<Collector>, value: u32, spawn: bool) {
    let event = collector.dispatcher.get_pooled::<Numbered>();
    *event.payload_mut::<Numbered>().unwrap() = Numbered { value, spawn };
    collector.send_event(&event);
}

// ============================================================================
// POOL ROUND TRIP
// ============================================================================

proptest! {
    /// Releasing the last reference resets the event and makes its slot the
    /// next one handed out for the same kind.
    #[test]
    fn prop_released_events_are_reset_and_reused(
        extra_refs in 0u32..8,
        value in any::<u32>(),
        stop in any::<bool>(),
        prevent in any::<bool>(),
    ) {
        let pool = Rc::new(EventPool::new());
        let handle = pool.acquire::<Numbered>();
        {
            let event = pool.try_pooled(handle).unwrap();
            event.payload_mut::<Numbered>().unwrap().value = value;
            if stop {
                event.stop_propagation();
            }
            if prevent {
                event.prevent_default();
            }
        }

        for _ in 0..extra_refs {
            pool.retain(handle);
        }
        for remaining in (0..=extra_refs).rev() {
            prop_assert_eq!(pool.try_release(handle), Ok(remaining));
        }
        prop_assert!(pool.ref_count(handle).is_none());
        prop_assert!(pool.try_pooled(handle).is_err());

        let next = pool.acquire::<Numbered>();
        prop_assert_eq!(next.index(), handle.index());
        prop_assert_ne!(next.generation(), handle.generation());

        let event = pool.try_pooled(next).unwrap();
        pool.release(next);
        prop_assert_eq!(event.ref_count(), 1);
        prop_assert_eq!(event.flags(), EventFlags::empty());
        prop_assert_eq!(event.phase(), PropagationPhase::None);
        prop_assert!(event.target().is_none());
        prop_assert_eq!(&*event.payload::<Numbered>().unwrap(), &Numbered::default());
    }
}

// ============================================================================
// DRAIN ORDER
// ============================================================================

proptest! {
    /// Everything queued before a drain runs first, in order; events raised
    /// while handling run afterwards, in the order they were raised.
    #[test]
    fn prop_drain_is_fifo_and_breadth_first(spawns in prop::collection::vec(any::<bool>(), 0..24)) {
        let dispatcher = EventDispatcher::new();
        let (collector, seen) = collector(&dispatcher);

        dispatcher.close_gate();
        for (value, spawn) in spawns.iter().enumerate() {
            send(&collector, value as u32, *spawn);
        }
        prop_assert_eq!(dispatcher.queue_len(), spawns.len());
        dispatcher.open_gate();

        let mut expected: Vec<u32> = (0..spawns.len() as u32).collect();
        expected.extend(
            spawns
                .iter()
                .enumerate()
                .filter(|(_, spawn)| **spawn)
                .map(|(value, _)| value as u32 + CHILD_OFFSET),
        );
        prop_assert_eq!(&*seen.borrow(), &expected);
        prop_assert_eq!(dispatcher.queue_len(), 0);
        prop_assert_eq!(dispatcher.pool().stats().live, 0);
    }
}

// ============================================================================
// GATE NESTING
// ============================================================================

proptest! {
    /// Nothing drains until the outermost gate opens.
    #[test]
    fn prop_only_outermost_open_drains(depth in 1u32..10, events in 1usize..6) {
        let dispatcher = EventDispatcher::new();
        let (collector, seen) = collector(&dispatcher);

        for _ in 0..depth {
            dispatcher.close_gate();
        }
        for value in 0..events {
            send(&collector, value as u32, false);
        }

        for open in 1..depth {
            dispatcher.open_gate();
            prop_assert_eq!(dispatcher.gate_count(), depth - open);
            prop_assert_eq!(dispatcher.queue_len(), events);
            prop_assert!(seen.borrow().is_empty());
        }

        dispatcher.open_gate();
        prop_assert_eq!(dispatcher.gate_count(), 0);
        prop_assert_eq!(dispatcher.queue_len(), 0);
        prop_assert_eq!(seen.borrow().len(), events);
    }
}
