//! Dispatching strategies.
//!
//! A dispatcher hands every event to its strategies in order. A strategy only
//! sees events it accepts through [`DispatchingStrategy::can_dispatch`], and
//! the chain ends early once an event has its dispatch or its propagation
//! stopped.

use std::rc::Rc;

use crate::event::Event;
use crate::handler::{handle_event_at_target_and_default_phase, EventHandler};

/// One link of a dispatcher's strategy chain.
pub trait DispatchingStrategy {
    /// Whether this strategy wants `event`.
    fn can_dispatch(&self, event: &Event) -> bool;

    /// Deliver `event` to `target`.
    fn dispatch(&self, event: &Event, target: &Rc<dyn EventHandler>);
}

/// Runs every phase at the target, then ends the chain.
///
/// # Panics
///
/// Panics if the event is already being dispatched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDispatchingStrategy;

struct DispatchingGuard<'a>(&'a Event);

impl Drop for DispatchingGuard<'_> {
    fn drop(&mut self) {
        self.0.set_dispatching(false);
    }
}

impl DispatchingStrategy for DefaultDispatchingStrategy {
    fn can_dispatch(&self, _event: &Event) -> bool {
        true
    }

    fn dispatch(&self, event: &Event, target: &Rc<dyn EventHandler>) {
        assert!(
            !event.is_dispatching(),
            "Event is being dispatched recursively"
        );
        event.set_dispatching(true);
        let _guard = DispatchingGuard(event);

        handle_event_at_target_and_default_phase(event, &**target);

        event.stop_dispatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{Callback, CallbackRegistry};
    use crate::event::EventKind;
    use crate::pool::EventPool;
    use std::cell::Cell;

    #[derive(Default)]
    struct Ping;

    impl EventKind for Ping {}

    #[derive(Default)]
    struct Counter {
        callbacks: CallbackRegistry,
        defaults: Cell<u32>,
    }

    impl EventHandler for Counter {
        fn callbacks(&self) -> &CallbackRegistry {
            &self.callbacks
        }

        fn execute_default_action(&self, _event: &Event) {
            self.defaults.set(self.defaults.get() + 1);
        }
    }

    #[test]
    fn test_default_strategy_runs_phases_and_stops_dispatch() {
        let pool = Rc::new(EventPool::new());
        let counter = Rc::new(Counter::default());
        let target: Rc<dyn EventHandler> = counter.clone();
        let event = pool.get_pooled::<Ping>();

        let strategy = DefaultDispatchingStrategy;
        assert!(strategy.can_dispatch(&event));
        strategy.dispatch(&event, &target);

        assert_eq!(counter.defaults.get(), 1);
        assert!(event.is_dispatch_stopped());
        assert!(!event.is_dispatching());
    }

    #[test]
    fn test_dispatching_flag_set_during_callbacks() {
        let pool = Rc::new(EventPool::new());
        let counter = Rc::new(Counter::default());
        let seen = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen);
        counter.register_callback(&Callback::new(move |event, _: &Ping| {
            flag.set(event.is_dispatching())
        }));
        let target: Rc<dyn EventHandler> = counter;
        let event = pool.get_pooled::<Ping>();

        DefaultDispatchingStrategy.dispatch(&event, &target);

        assert!(seen.get());
        assert!(!event.is_dispatching());
    }

    #[test]
    #[should_panic(expected = "Event is being dispatched recursively")]
    fn test_recursive_dispatch_panics() {
        let pool = Rc::new(EventPool::new());
        let counter = Rc::new(Counter::default());
        counter.register_callback(&Callback::new(|event, _: &Ping| {
            let target = event.target().expect("target is alive");
            DefaultDispatchingStrategy.dispatch(event, &target);
        }));
        let target: Rc<dyn EventHandler> = counter;
        let event = pool.get_pooled::<Ping>();
        event.set_target(&target);

        DefaultDispatchingStrategy.dispatch(&event, &target);
    }
}
