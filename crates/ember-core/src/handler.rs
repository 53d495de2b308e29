//! The handler capability and the per-target phase state machine.
//!
//! Anything that owns a [`CallbackRegistry`] can receive events by
//! implementing [`EventHandler`]. When an event reaches its target it walks
//! the phases in order:
//!
//! 1. [`AtTarget`](PropagationPhase::AtTarget): registered callbacks run,
//!    unless propagation was already stopped.
//! 2. [`DefaultActionAtTarget`](PropagationPhase::DefaultActionAtTarget): the
//!    handler's at-target hook runs, unless the default was prevented.
//! 3. [`DefaultAction`](PropagationPhase::DefaultAction): the final hook, same
//!    condition. Only the target-and-default entry point runs this step.
//!
//! Inactive handlers receiving an event that skips disabled targets run the
//! `*_disabled*` hooks in steps 2 and 3 instead.

use std::rc::Rc;

use crate::callbacks::{Callback, CallbackKey, CallbackRegistry, InvokePolicy, UserDataCallback};
use crate::dispatcher::{DispatchMode, EventDispatcher};
use crate::event::{Event, EventKind, PropagationPhase};
use crate::pool::PooledEvent;

/// A target that events can be dispatched to.
///
/// Only [`callbacks`](Self::callbacks) is required:
///
/// ```
/// use ember_core::{CallbackRegistry, EventHandler};
///
/// #[derive(Default)]
/// struct Button {
///     callbacks: CallbackRegistry,
/// }
///
/// impl EventHandler for Button {
///     fn callbacks(&self) -> &CallbackRegistry {
///         &self.callbacks
///     }
/// }
/// ```
pub trait EventHandler: 'static {
    /// Registry holding this handler's callbacks.
    fn callbacks(&self) -> &CallbackRegistry;

    /// Whether the handler is currently enabled.
    fn is_active(&self) -> bool {
        true
    }

    /// Dispatcher used by [`SendEvent`].
    fn dispatcher(&self) -> Option<Rc<EventDispatcher>> {
        None
    }

    fn execute_default_action_at_target(&self, _event: &Event) {}

    fn execute_default_action(&self, _event: &Event) {}

    /// Runs instead of [`execute_default_action_at_target`](Self::execute_default_action_at_target)
    /// when the handler is inactive and the event skips disabled targets.
    fn execute_default_action_disabled_at_target(&self, _event: &Event) {}

    /// Runs instead of [`execute_default_action`](Self::execute_default_action)
    /// when the handler is inactive and the event skips disabled targets.
    fn execute_default_action_disabled(&self, _event: &Event) {}

    fn register_callback<T: EventKind>(&self, callback: &Callback<T>)
    where
        Self: Sized,
    {
        self.callbacks().register(callback, InvokePolicy::Default);
    }

    fn register_callback_with_policy<T: EventKind>(
        &self,
        callback: &Callback<T>,
        policy: InvokePolicy,
    ) where
        Self: Sized,
    {
        self.callbacks().register(callback, policy);
    }

    fn register_callback_with_user_data<T: EventKind, U: 'static>(
        &self,
        callback: &UserDataCallback<T, U>,
        user_data: U,
    ) where
        Self: Sized,
    {
        self.callbacks()
            .register_with_user_data(callback, user_data, InvokePolicy::Default);
    }

    /// Remove the first registration of `callback`; `false` if there was none.
    fn unregister_callback(&self, callback: &impl CallbackKey) -> bool
    where
        Self: Sized,
    {
        self.callbacks().unregister(callback)
    }

    fn try_get_user_data<T: EventKind, U: Clone + 'static>(
        &self,
        callback: &UserDataCallback<T, U>,
    ) -> Option<U>
    where
        Self: Sized,
    {
        self.callbacks().try_get_user_data(callback)
    }
}

/// Sending events to a handler through its own dispatcher.
pub trait SendEvent {
    /// Dispatch `event` to this handler in [`DispatchMode::Queued`] mode.
    fn send_event(&self, event: &PooledEvent) {
        self.send_event_with_mode(event, DispatchMode::Queued);
    }

    /// Dispatch `event` to this handler.
    ///
    /// Does nothing if the handler has no dispatcher.
    fn send_event_with_mode(&self, event: &PooledEvent, mode: DispatchMode);
}

impl<H: EventHandler> SendEvent for Rc<H> {
    fn send_event_with_mode(&self, event: &PooledEvent, mode: DispatchMode) {
        let target: Rc<dyn EventHandler> = self.clone();
        send(&target, event, mode);
    }
}

impl SendEvent for Rc<dyn EventHandler> {
    fn send_event_with_mode(&self, event: &PooledEvent, mode: DispatchMode) {
        send(self, event, mode);
    }
}

fn send(target: &Rc<dyn EventHandler>, event: &PooledEvent, mode: DispatchMode) {
    let Some(dispatcher) = target.dispatcher() else {
        tracing::debug!(
            "Dropping event {} ({}): target has no dispatcher",
            event.id(),
            event.event_type()
        );
        return;
    };
    dispatcher.dispatch(event, target, mode);
}

/// Run the callback phase and the at-target default action.
pub fn handle_event_at_target_phase(event: &Event, target: &dyn EventHandler) {
    run_phase(event, target, PropagationPhase::AtTarget);
    run_phase(event, target, PropagationPhase::DefaultActionAtTarget);
    event.set_phase(PropagationPhase::None);
}

/// Run all three phases; this is what the default strategy uses.
pub fn handle_event_at_target_and_default_phase(event: &Event, target: &dyn EventHandler) {
    run_phase(event, target, PropagationPhase::AtTarget);
    run_phase(event, target, PropagationPhase::DefaultActionAtTarget);
    run_phase(event, target, PropagationPhase::DefaultAction);
    event.set_phase(PropagationPhase::None);
}

fn run_phase(event: &Event, target: &dyn EventHandler, phase: PropagationPhase) {
    event.set_phase(phase);
    match phase {
        PropagationPhase::None => {}
        PropagationPhase::AtTarget => {
            if !event.is_propagation_stopped() {
                target.callbacks().invoke(event, phase, target.is_active());
            }
        }
        PropagationPhase::DefaultActionAtTarget | PropagationPhase::DefaultAction => {
            if event.is_default_prevented() {
                return;
            }
            let disabled = event.skip_disabled_targets() && !target.is_active();
            match (phase, disabled) {
                (PropagationPhase::DefaultActionAtTarget, false) => {
                    target.execute_default_action_at_target(event)
                }
                (PropagationPhase::DefaultActionAtTarget, true) => {
                    target.execute_default_action_disabled_at_target(event)
                }
                (_, false) => target.execute_default_action(event),
                (_, true) => target.execute_default_action_disabled(event),
            }
        }
    }
}
