//! Single-threaded event dispatch with pooled events.
//!
//! Events are typed payloads ([`EventKind`]) carried by reference-counted,
//! recycled [`Event`] objects from an [`EventPool`]. An [`EventDispatcher`]
//! delivers them to an [`EventHandler`], either right away or, while the
//! dispatcher is gated, in FIFO order once the last gate opens. At the target
//! each event runs through the callback phase and the handler's default-action
//! hooks.
//!
//! ## Usage
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use ember_core::{
//!     Callback, CallbackRegistry, EventDispatcher, EventHandler, EventKind, SendEvent,
//! };
//!
//! #[derive(Default)]
//! struct Clicked {
//!     x: i32,
//! }
//! impl EventKind for Clicked {}
//!
//! struct Button {
//!     callbacks: CallbackRegistry,
//!     dispatcher: Rc<EventDispatcher>,
//! }
//!
//! impl EventHandler for Button {
//!     fn callbacks(&self) -> &CallbackRegistry {
//!         &self.callbacks
//!     }
//!
//!     fn dispatcher(&self) -> Option<Rc<EventDispatcher>> {
//!         Some(Rc::clone(&self.dispatcher))
//!     }
//! }
//!
//! let dispatcher = EventDispatcher::new();
//! let button = Rc::new(Button {
//!     callbacks: CallbackRegistry::new(),
//!     dispatcher: Rc::clone(&dispatcher),
//! });
//!
//! let last_x = Rc::new(Cell::new(0));
//! let seen = Rc::clone(&last_x);
//! button.register_callback(&Callback::new(move |_event, click: &Clicked| seen.set(click.x)));
//!
//! let event = dispatcher.get_pooled::<Clicked>();
//! event.payload_mut::<Clicked>().unwrap().x = 12;
//!
//! dispatcher.close_gate();
//! button.send_event(&event);
//! assert_eq!(last_x.get(), 0);
//!
//! dispatcher.open_gate();
//! assert_eq!(last_x.get(), 12);
//! ```

#![warn(clippy::all)]

pub mod callbacks;
pub mod dispatcher;
mod error;
pub mod event;
pub mod global;
pub mod handler;
pub mod pool;
pub mod strategy;

pub use callbacks::{Callback, CallbackKey, CallbackRegistry, InvokePolicy, UserDataCallback};
pub use dispatcher::{DispatchMode, EventDispatcher, EventDispatcherBuilder, EventDispatcherGate};
pub use error::{InstallError, PoolError, PoolResult};
pub use event::{Event, EventFlags, EventKind, EventTypeId, PropagationPhase};
pub use handler::{
    handle_event_at_target_and_default_phase, handle_event_at_target_phase, EventHandler,
    SendEvent,
};
pub use pool::{EventHandle, EventPool, PoolStats, PooledEvent};
pub use strategy::{DefaultDispatchingStrategy, DispatchingStrategy};

pub use ember_config::EmberConfig;
