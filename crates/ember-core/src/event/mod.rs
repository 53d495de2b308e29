//! Pooled event objects.
//!
//! An [`Event`] carries a typed payload plus the dispatch state the core
//! needs: its target, the phase it is currently in and a small set of control
//! flags. Events live inside an [`EventPool`](crate::EventPool) and are
//! recycled rather than freed.
//!
//! All mutable state sits behind `Cell`/`RefCell` so callbacks receive a
//! shared `&Event` and can still stop propagation, prevent the default action
//! or dispatch other events re-entrantly on the same thread.

mod kind;

pub use kind::{EventKind, EventTypeId};

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::handler::EventHandler;
use crate::pool::EventHandle;

/// Phase an event is in while being handled at its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropagationPhase {
    /// Not being handled.
    #[default]
    None,
    /// Registered callbacks run.
    AtTarget,
    /// The target's own at-target default action runs.
    DefaultActionAtTarget,
    /// The target's final default action runs.
    DefaultAction,
}

bitflags! {
    /// Control and bookkeeping flags of an [`Event`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u8 {
        /// Remaining callbacks are skipped.
        const PROPAGATION_STOPPED = 1;
        /// Default-action hooks are skipped.
        const DEFAULT_PREVENTED = 1 << 1;
        /// A strategy is currently running this event.
        const DISPATCHING = 1 << 2;
        /// Inactive targets run their disabled hooks instead.
        const SKIP_DISABLED_TARGETS = 1 << 3;
        /// Later strategies in the chain are skipped.
        const STOP_DISPATCH = 1 << 4;
        /// The event has been handed to a dispatcher at least once.
        const RECEIVED_BY_DISPATCHER = 1 << 5;
    }
}

/// One occurrence, owned by an [`EventPool`](crate::EventPool).
pub struct Event {
    id: Cell<u64>,
    event_type: EventTypeId,
    handle: Cell<EventHandle>,
    target: RefCell<Option<Weak<dyn EventHandler>>>,
    phase: Cell<PropagationPhase>,
    flags: Cell<EventFlags>,
    payload: RefCell<Box<dyn Any>>,
    reset_payload: fn(&mut dyn Any),
}

fn reset_payload<T: EventKind>(payload: &mut dyn Any) {
    if let Some(payload) = payload.downcast_mut::<T>() {
        payload.reset();
    }
}

impl Event {
    pub(crate) fn new<T: EventKind>(handle: EventHandle) -> Self {
        Self {
            id: Cell::new(0),
            event_type: T::event_type(),
            handle: Cell::new(handle),
            target: RefCell::new(None),
            phase: Cell::new(PropagationPhase::None),
            flags: Cell::new(EventFlags::empty()),
            payload: RefCell::new(Box::new(T::default())),
            reset_payload: reset_payload::<T>,
        }
    }

    /// Process-unique id stamped at acquisition.
    pub fn id(&self) -> u64 {
        self.id.get()
    }

    /// Kind of this event.
    pub fn event_type(&self) -> EventTypeId {
        self.event_type
    }

    /// Pool handle of this event.
    pub fn handle(&self) -> EventHandle {
        self.handle.get()
    }

    /// The handler this event is addressed to, if it is still alive.
    pub fn target(&self) -> Option<Rc<dyn EventHandler>> {
        self.target.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Current phase.
    pub fn phase(&self) -> PropagationPhase {
        self.phase.get()
    }

    /// Snapshot of all flags.
    pub fn flags(&self) -> EventFlags {
        self.flags.get()
    }

    /// Skip every callback registered after the current one.
    pub fn stop_propagation(&self) {
        self.set_flag(EventFlags::PROPAGATION_STOPPED, true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.flags.get().contains(EventFlags::PROPAGATION_STOPPED)
    }

    /// Suppress the target's default-action hooks.
    pub fn prevent_default(&self) {
        self.set_flag(EventFlags::DEFAULT_PREVENTED, true);
    }

    pub fn is_default_prevented(&self) -> bool {
        self.flags.get().contains(EventFlags::DEFAULT_PREVENTED)
    }

    /// True while a strategy is running this event.
    pub fn is_dispatching(&self) -> bool {
        self.flags.get().contains(EventFlags::DISPATCHING)
    }

    pub fn skip_disabled_targets(&self) -> bool {
        self.flags.get().contains(EventFlags::SKIP_DISABLED_TARGETS)
    }

    /// Route inactive targets to their disabled hooks and skip their
    /// [`InvokePolicy::Default`](crate::InvokePolicy::Default) callbacks.
    pub fn set_skip_disabled_targets(&self, skip: bool) {
        self.set_flag(EventFlags::SKIP_DISABLED_TARGETS, skip);
    }

    /// Skip the remaining strategies of the current dispatch.
    pub fn stop_dispatch(&self) {
        self.set_flag(EventFlags::STOP_DISPATCH, true);
    }

    pub fn is_dispatch_stopped(&self) -> bool {
        self.flags.get().contains(EventFlags::STOP_DISPATCH)
    }

    pub fn was_received_by_dispatcher(&self) -> bool {
        self.flags
            .get()
            .contains(EventFlags::RECEIVED_BY_DISPATCHER)
    }

    /// True if the payload is a `T`.
    pub fn is<T: EventKind>(&self) -> bool {
        self.event_type == T::event_type()
    }

    /// Borrow the payload as `T`.
    ///
    /// Returns `None` if this event is of another kind.
    pub fn payload<T: EventKind>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.payload.borrow(), |payload| (**payload).downcast_ref::<T>()).ok()
    }

    /// Mutably borrow the payload as `T`.
    ///
    /// # Panics
    ///
    /// Panics if the payload is already borrowed, which is the case while
    /// callbacks for this event are running.
    pub fn payload_mut<T: EventKind>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.payload.borrow_mut(), |payload| {
            (**payload).downcast_mut::<T>()
        })
        .ok()
    }

    pub(crate) fn activate(&self, handle: EventHandle, id: u64) {
        self.handle.set(handle);
        self.id.set(id);
    }

    pub(crate) fn set_target(&self, target: &Rc<dyn EventHandler>) {
        *self.target.borrow_mut() = Some(Rc::downgrade(target));
    }

    pub(crate) fn set_phase(&self, phase: PropagationPhase) {
        self.phase.set(phase);
    }

    pub(crate) fn set_dispatching(&self, dispatching: bool) {
        self.set_flag(EventFlags::DISPATCHING, dispatching);
    }

    pub(crate) fn clear_stop_dispatch(&self) {
        self.set_flag(EventFlags::STOP_DISPATCH, false);
    }

    /// Bookkeeping hook run once per `dispatch` call.
    pub(crate) fn mark_received_by_dispatcher(&self) {
        if self.was_received_by_dispatcher() {
            tracing::trace!(event = self.id(), "event re-dispatched");
        }
        self.set_flag(EventFlags::RECEIVED_BY_DISPATCHER, true);
    }

    /// Back to the acquired-fresh state. Called when the last reference goes.
    pub(crate) fn reset(&self) {
        self.phase.set(PropagationPhase::None);
        self.flags.set(EventFlags::empty());
        self.target.borrow_mut().take();
        let mut payload = self.payload.borrow_mut();
        (self.reset_payload)(&mut **payload);
    }

    fn set_flag(&self, flag: EventFlags, on: bool) {
        let mut flags = self.flags.get();
        flags.set(flag, on);
        self.flags.set(flags);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id())
            .field("event_type", &self.event_type)
            .field("handle", &self.handle())
            .field("phase", &self.phase())
            .field("flags", &self.flags())
            .finish()
    }
}
