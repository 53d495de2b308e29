//! Callback registry.
//!
//! Each handler owns one [`CallbackRegistry`]: a single insertion-ordered list
//! of entries for all event kinds. Invocation walks the list in order and lets
//! each entry's own event type decide whether it applies, so callbacks for
//! different kinds keep their relative registration order.
//!
//! Callbacks are identified by the shared closure inside a [`Callback`] (or
//! [`UserDataCallback`]), not by the closure's value. Keep the `Callback`
//! around to unregister it later:
//!
//! ```
//! use ember_core::{Callback, CallbackRegistry, EventKind, InvokePolicy};
//!
//! #[derive(Default)]
//! struct Ping;
//! impl EventKind for Ping {}
//!
//! let registry = CallbackRegistry::new();
//! let on_ping = Callback::new(|_event, _ping: &Ping| println!("ping"));
//!
//! registry.register(&on_ping, InvokePolicy::Default);
//! assert!(registry.unregister(&on_ping));
//! assert!(!registry.unregister(&on_ping));
//! ```
//!
//! The list is copy-on-write: a running invocation iterates a snapshot, so
//! callbacks may register or unregister freely. Changes apply to the next
//! invocation.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::event::{Event, EventKind, EventTypeId, PropagationPhase};

/// Which call sites may trigger a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InvokePolicy {
    /// Skipped for inactive targets when the event skips disabled targets.
    #[default]
    Default,
    /// Always invoked, even on inactive targets.
    IncludeDisabled,
}

/// Identity of a registered callback.
pub trait CallbackKey {
    /// Kind the callback listens to.
    fn event_type(&self) -> EventTypeId;

    /// Address of the shared closure; equal for all clones.
    fn identity(&self) -> usize;
}

/// Callback for events of kind `T`.
///
/// Cloning shares identity: a clone unregisters the original.
pub struct Callback<T> {
    func: Rc<dyn Fn(&Event, &T)>,
}

impl<T: EventKind> Callback<T> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Event, &T) + 'static,
    {
        Self {
            func: Rc::new(func),
        }
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<T: EventKind> CallbackKey for Callback<T> {
    fn event_type(&self) -> EventTypeId {
        T::event_type()
    }

    fn identity(&self) -> usize {
        Rc::as_ptr(&self.func) as *const () as usize
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("identity", &(Rc::as_ptr(&self.func) as *const ()))
            .finish()
    }
}

/// Callback for events of kind `T` that also receives a context value `U`.
pub struct UserDataCallback<T, U> {
    func: Rc<dyn Fn(&Event, &T, &U)>,
}

impl<T: EventKind, U: 'static> UserDataCallback<T, U> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Event, &T, &U) + 'static,
    {
        Self {
            func: Rc::new(func),
        }
    }
}

impl<T, U> Clone for UserDataCallback<T, U> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<T: EventKind, U: 'static> CallbackKey for UserDataCallback<T, U> {
    fn event_type(&self) -> EventTypeId {
        T::event_type()
    }

    fn identity(&self) -> usize {
        Rc::as_ptr(&self.func) as *const () as usize
    }
}

impl<T, U> fmt::Debug for UserDataCallback<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDataCallback")
            .field("identity", &(Rc::as_ptr(&self.func) as *const ()))
            .finish()
    }
}

type InvokeFn = dyn Fn(&Event, Option<&dyn Any>);

fn erase<F>(func: F) -> Rc<InvokeFn>
where
    F: Fn(&Event, Option<&dyn Any>) + 'static,
{
    Rc::new(func)
}

#[derive(Clone)]
struct Functor {
    event_type: EventTypeId,
    identity: usize,
    policy: InvokePolicy,
    invoke: Rc<InvokeFn>,
    user_data: Option<Rc<dyn Any>>,
}

impl Functor {
    fn matches(&self, key: &impl CallbackKey) -> bool {
        self.event_type == key.event_type() && self.identity == key.identity()
    }
}

/// Ordered callbacks of one handler.
///
/// The backing list is only allocated on first registration.
#[derive(Default)]
pub struct CallbackRegistry {
    functors: RefCell<Option<Rc<Vec<Functor>>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback`.
    ///
    /// Registering the same callback twice adds a second entry; both fire.
    pub fn register<T: EventKind>(&self, callback: &Callback<T>, policy: InvokePolicy) {
        let func = Rc::clone(&callback.func);
        self.push(Functor {
            event_type: T::event_type(),
            identity: callback.identity(),
            policy,
            invoke: erase(move |event, _| {
                if let Some(payload) = event.payload::<T>() {
                    func(event, &*payload);
                }
            }),
            user_data: None,
        });
    }

    /// Append `callback` together with `user_data`, which is passed to every
    /// invocation and can be read back with [`try_get_user_data`](Self::try_get_user_data).
    pub fn register_with_user_data<T: EventKind, U: 'static>(
        &self,
        callback: &UserDataCallback<T, U>,
        user_data: U,
        policy: InvokePolicy,
    ) {
        let func = Rc::clone(&callback.func);
        let user_data: Rc<dyn Any> = Rc::new(user_data);
        self.push(Functor {
            event_type: T::event_type(),
            identity: callback.identity(),
            policy,
            invoke: erase(move |event, user_data| {
                let Some(user_data) = user_data.and_then(|data| data.downcast_ref::<U>()) else {
                    return;
                };
                if let Some(payload) = event.payload::<T>() {
                    func(event, &*payload, user_data);
                }
            }),
            user_data: Some(user_data),
        });
    }

    /// User data stored with the first registration of `callback`.
    pub fn try_get_user_data<T: EventKind, U: Clone + 'static>(
        &self,
        callback: &UserDataCallback<T, U>,
    ) -> Option<U> {
        let functors = self.functors.borrow();
        let functor = functors.as_ref()?.iter().find(|f| f.matches(callback))?;
        functor.user_data.as_deref()?.downcast_ref::<U>().cloned()
    }

    /// Remove the first entry registered for `callback`.
    ///
    /// Returns `false`, and changes nothing, if it was never registered.
    pub fn unregister(&self, callback: &impl CallbackKey) -> bool {
        let mut functors = self.functors.borrow_mut();
        let Some(list) = functors.as_mut() else {
            return false;
        };
        let Some(position) = list.iter().position(|f| f.matches(callback)) else {
            return false;
        };
        Rc::make_mut(list).remove(position);
        true
    }

    pub fn is_registered(&self, callback: &impl CallbackKey) -> bool {
        self.functors
            .borrow()
            .as_ref()
            .is_some_and(|list| list.iter().any(|f| f.matches(callback)))
    }

    /// Number of entries across all kinds.
    pub fn len(&self) -> usize {
        self.functors.borrow().as_ref().map_or(0, |list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries listening to `event_type`.
    pub fn count_for(&self, event_type: EventTypeId) -> usize {
        self.functors.borrow().as_ref().map_or(0, |list| {
            list.iter().filter(|f| f.event_type == event_type).count()
        })
    }

    /// Run the callbacks that apply to `event`.
    ///
    /// Only the [`AtTarget`](PropagationPhase::AtTarget) phase runs callbacks;
    /// the default-action phases belong to the handler's own hooks. Stops as
    /// soon as a callback stops propagation.
    pub fn invoke(&self, event: &Event, phase: PropagationPhase, target_active: bool) {
        if phase != PropagationPhase::AtTarget {
            return;
        }
        let Some(functors) = self.functors.borrow().clone() else {
            return;
        };
        let skip_default_policy = event.skip_disabled_targets() && !target_active;

        for functor in functors.iter() {
            if functor.event_type != event.event_type() {
                continue;
            }
            if skip_default_policy && functor.policy == InvokePolicy::Default {
                continue;
            }

            (functor.invoke)(event, functor.user_data.as_deref());

            if event.is_propagation_stopped() {
                break;
            }
        }
    }

    fn push(&self, functor: Functor) {
        let mut functors = self.functors.borrow_mut();
        Rc::make_mut(functors.get_or_insert_with(Default::default)).push(functor);
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.len())
            .finish()
    }
}
