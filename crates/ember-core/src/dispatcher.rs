//! The event dispatcher.
//!
//! [`EventDispatcher`] decides *when* an event reaches its target. Events
//! dispatched while the dispatcher is gated are queued and run, in order, once
//! the last gate opens. Processing an event always closes a gate for its
//! duration, so events raised by callbacks are queued behind the current one
//! instead of interrupting it.
//!
//! ```
//! use std::rc::Rc;
//! use ember_core::{CallbackRegistry, DispatchMode, EventDispatcher, EventHandler, EventKind};
//!
//! #[derive(Default)]
//! struct Ping;
//! impl EventKind for Ping {}
//!
//! #[derive(Default)]
//! struct Target {
//!     callbacks: CallbackRegistry,
//! }
//!
//! impl EventHandler for Target {
//!     fn callbacks(&self) -> &CallbackRegistry {
//!         &self.callbacks
//!     }
//! }
//!
//! let dispatcher = EventDispatcher::new();
//! let target: Rc<dyn EventHandler> = Rc::new(Target::default());
//!
//! dispatcher.close_gate();
//! dispatcher.dispatch(&dispatcher.get_pooled::<Ping>(), &target, DispatchMode::Queued);
//! assert_eq!(dispatcher.queue_len(), 1);
//!
//! dispatcher.open_gate();
//! assert_eq!(dispatcher.queue_len(), 0);
//! ```
//!
//! ## Draining
//!
//! A drain runs in passes. Each pass takes the whole queue and processes it
//! FIFO; events queued meanwhile land in a fresh queue and run in the next
//! pass. A drain requested while another one is running is left to the
//! running one.
//!
//! ## Contexts
//!
//! [`push_context`](EventDispatcher::push_context) starts an isolated epoch
//! with no gates and an empty queue; [`pop_context`](EventDispatcher::pop_context)
//! restores the previous one. A host loop calling both once per tick gets a
//! full drain-and-reset cycle.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use ember_config::EmberConfig;

use crate::event::{Event, EventKind};
use crate::handler::EventHandler;
use crate::pool::{EventHandle, EventPool, PooledEvent};
use crate::strategy::{DefaultDispatchingStrategy, DispatchingStrategy};

/// When a dispatched event is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchMode {
    /// Queue while gated, otherwise process right away.
    #[default]
    Queued,
    /// Always process before `dispatch` returns.
    Immediate,
}

struct QueuedEvent {
    event: PooledEvent,
    target: Weak<dyn EventHandler>,
}

type EventQueue = VecDeque<QueuedEvent>;

struct DispatchContext {
    gate_count: u32,
    queue: EventQueue,
    processing: bool,
}

/// Queues, gates and delivers events to their targets.
pub struct EventDispatcher {
    pool: Rc<EventPool>,
    strategies: Vec<Box<dyn DispatchingStrategy>>,
    gate_count: Cell<u32>,
    queue: RefCell<EventQueue>,
    contexts: RefCell<Vec<DispatchContext>>,
    processing: Cell<bool>,
    queue_warn_threshold: usize,
    trace_dispatch: bool,
}

impl EventDispatcher {
    /// Dispatcher with default configuration and the default strategy.
    pub fn new() -> Rc<Self> {
        Self::builder().build()
    }

    /// Dispatcher with the default strategy, configured from `config`.
    pub fn from_config(config: &EmberConfig) -> Rc<Self> {
        Self::builder().config(config.clone()).build()
    }

    /// Start building a dispatcher with custom strategies or a shared pool.
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::default()
    }

    /// Pool this dispatcher's events come from.
    pub fn pool(&self) -> &Rc<EventPool> {
        &self.pool
    }

    /// Acquire a fresh event of kind `T` from this dispatcher's pool.
    pub fn get_pooled<T: EventKind>(&self) -> PooledEvent {
        self.pool.get_pooled::<T>()
    }

    /// Deliver `event` to `target`.
    ///
    /// The event is processed before this returns if `mode` is
    /// [`Immediate`](DispatchMode::Immediate) or no gate is closed. Otherwise
    /// it is queued, holding its own reference until processed.
    ///
    /// # Panics
    ///
    /// Panics if `event` is currently being dispatched.
    pub fn dispatch(&self, event: &PooledEvent, target: &Rc<dyn EventHandler>, mode: DispatchMode) {
        assert!(
            !event.is_dispatching(),
            "Event is being dispatched recursively"
        );
        event.mark_received_by_dispatcher();
        event.set_target(target);

        if mode == DispatchMode::Immediate || self.gate_count.get() == 0 {
            tracing::trace!(event = event.id(), ?mode, "processing event now");
            self.process_event(event, target);
            return;
        }

        let len = {
            let mut queue = self.queue.borrow_mut();
            queue.push_back(QueuedEvent {
                event: event.clone(),
                target: Rc::downgrade(target),
            });
            queue.len()
        };
        tracing::trace!(event = event.id(), queued = len, "event queued");
        if self.queue_warn_threshold.checked_add(1) == Some(len) {
            tracing::warn!(
                "Event queue holds {} events (threshold {}); is a gate left closed?",
                len,
                self.queue_warn_threshold
            );
        }
    }

    /// [`dispatch`](Self::dispatch) for a raw handle from this dispatcher's pool.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or does not belong to the pool.
    pub fn dispatch_handle(
        &self,
        handle: EventHandle,
        target: &Rc<dyn EventHandler>,
        mode: DispatchMode,
    ) {
        match self.pool.try_pooled(handle) {
            Ok(event) => self.dispatch(&event, target, mode),
            Err(err) => panic!("EventDispatcher::dispatch_handle: {err}"),
        }
    }

    /// Close one gate. Queued events wait until every gate is open again.
    pub fn close_gate(&self) {
        self.gate_count.set(self.gate_count.get() + 1);
    }

    /// Open one gate, draining the queue when the last one opens.
    ///
    /// # Panics
    ///
    /// Panics if no gate is closed.
    pub fn open_gate(&self) {
        let count = self.gate_count.get();
        assert!(count > 0, "EventDispatcher::open_gate called with no gate closed");
        self.gate_count.set(count - 1);
        if count == 1 {
            self.process_event_queue();
        }
    }

    /// Close a gate for the lifetime of the returned guard.
    pub fn gate(&self) -> EventDispatcherGate<'_> {
        self.close_gate();
        EventDispatcherGate { dispatcher: self }
    }

    /// Drain the queue, then start a fresh context with no gates and an empty
    /// queue.
    ///
    /// Called from inside a drain, the pending queue cannot be drained yet and
    /// is saved with the context instead.
    pub fn push_context(&self) {
        if !self.processing.get() {
            self.process_event_queue();
        }

        let saved = DispatchContext {
            gate_count: self.gate_count.replace(0),
            queue: mem::take(&mut *self.queue.borrow_mut()),
            processing: self.processing.replace(false),
        };
        let depth = {
            let mut contexts = self.contexts.borrow_mut();
            contexts.push(saved);
            contexts.len()
        };
        tracing::debug!("Pushed dispatch context, depth {}", depth);
    }

    /// Restore the context saved by the matching [`push_context`](Self::push_context).
    ///
    /// # Panics
    ///
    /// Panics if a gate is still closed, events are still queued, or there is
    /// no saved context.
    pub fn pop_context(&self) {
        assert_eq!(
            self.gate_count.get(),
            0,
            "EventDispatcher::pop_context called with gates still closed"
        );
        assert!(
            self.queue.borrow().is_empty(),
            "EventDispatcher::pop_context called with events still queued"
        );
        let saved = self.contexts.borrow_mut().pop();
        let Some(saved) = saved else {
            panic!("EventDispatcher::pop_context called without a matching push_context");
        };

        self.gate_count.set(saved.gate_count);
        *self.queue.borrow_mut() = saved.queue;
        self.processing.set(saved.processing);
        tracing::debug!("Popped dispatch context, depth {}", self.context_depth());
    }

    /// Process every queued event, including events queued while doing so.
    ///
    /// If a callback panics, the remaining events of the current pass are
    /// released and discarded.
    pub fn process_event_queue(&self) {
        if self.processing.get() {
            tracing::debug!("Drain requested during a drain; deferring to the running one");
            return;
        }
        if self.queue.borrow().is_empty() {
            return;
        }

        self.processing.set(true);
        let _processing = ProcessingGuard(self);

        loop {
            let pass = mem::take(&mut *self.queue.borrow_mut());
            if pass.is_empty() {
                break;
            }
            tracing::trace!(events = pass.len(), "draining event queue");

            let mut pass = Pass(pass);
            while let Some(entry) = pass.0.pop_front() {
                self.process_queued(entry);
            }
        }
    }

    /// Number of currently closed gates.
    pub fn gate_count(&self) -> u32 {
        self.gate_count.get()
    }

    /// Number of events waiting in the current context's queue.
    pub fn queue_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Number of saved contexts.
    pub fn context_depth(&self) -> usize {
        self.contexts.borrow().len()
    }

    /// True while a drain is running in the current context.
    pub fn is_processing(&self) -> bool {
        self.processing.get()
    }

    fn process_queued(&self, entry: QueuedEvent) {
        let QueuedEvent { event, target } = entry;
        match target.upgrade() {
            Some(target) => self.process_event(&event, &target),
            None => tracing::debug!(
                "Skipping queued event {} ({}): target was dropped",
                event.id(),
                event.event_type()
            ),
        }
    }

    fn process_event(&self, event: &Event, target: &Rc<dyn EventHandler>) {
        let _gate = self.gate();
        event.clear_stop_dispatch();

        for (index, strategy) in self.strategies.iter().enumerate() {
            if !strategy.can_dispatch(event) {
                if self.trace_dispatch {
                    tracing::trace!(event = event.id(), strategy = index, "strategy declined");
                }
                continue;
            }

            strategy.dispatch(event, target);
            if self.trace_dispatch {
                tracing::trace!(
                    event = event.id(),
                    strategy = index,
                    stopped = event.is_dispatch_stopped(),
                    "strategy dispatched"
                );
            }

            if event.is_dispatch_stopped() || event.is_propagation_stopped() {
                break;
            }
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        let pending = self.queue.get_mut().len()
            + self
                .contexts
                .get_mut()
                .iter()
                .map(|context| context.queue.len())
                .sum::<usize>();
        if pending > 0 {
            tracing::debug!("Dispatcher dropped with {} undelivered events", pending);
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("strategies", &self.strategies.len())
            .field("gate_count", &self.gate_count())
            .field("queue_len", &self.queue_len())
            .field("context_depth", &self.context_depth())
            .field("processing", &self.is_processing())
            .finish()
    }
}

/// Closed gate that opens again when dropped.
///
/// Dropping during a panic only opens the gate; the queue is left for the
/// next drain.
#[must_use = "the gate opens again as soon as the guard is dropped"]
pub struct EventDispatcherGate<'a> {
    dispatcher: &'a EventDispatcher,
}

impl Drop for EventDispatcherGate<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let count = self.dispatcher.gate_count.get();
            self.dispatcher.gate_count.set(count.saturating_sub(1));
        } else {
            self.dispatcher.open_gate();
        }
    }
}

struct ProcessingGuard<'a>(&'a EventDispatcher);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.processing.set(false);
    }
}

/// Events of one drain pass not yet processed.
struct Pass(EventQueue);

impl Drop for Pass {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            tracing::warn!(
                "Discarding {} queued events after a callback panicked",
                self.0.len()
            );
        }
    }
}

/// Builder for [`EventDispatcher`].
///
/// Adding any strategy replaces the default [`DefaultDispatchingStrategy`].
#[derive(Default)]
pub struct EventDispatcherBuilder {
    config: EmberConfig,
    pool: Option<Rc<EventPool>>,
    strategies: Option<Vec<Box<dyn DispatchingStrategy>>>,
}

impl EventDispatcherBuilder {
    /// Pool retention and queue diagnostics settings.
    pub fn config(mut self, config: EmberConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing pool instead of creating one from the config.
    pub fn pool(mut self, pool: Rc<EventPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Append a strategy to the chain.
    pub fn strategy(mut self, strategy: impl DispatchingStrategy + 'static) -> Self {
        self.strategies
            .get_or_insert_with(Vec::new)
            .push(Box::new(strategy));
        self
    }

    /// Build with an empty chain; dispatching becomes a no-op.
    pub fn without_strategies(mut self) -> Self {
        self.strategies = Some(Vec::new());
        self
    }

    /// Finish the dispatcher.
    pub fn build(self) -> Rc<EventDispatcher> {
        let pool = self
            .pool
            .unwrap_or_else(|| Rc::new(EventPool::with_config(&self.config.pool)));
        let strategies = self
            .strategies
            .unwrap_or_else(|| vec![Box::new(DefaultDispatchingStrategy)]);

        Rc::new(EventDispatcher {
            pool,
            strategies,
            gate_count: Cell::new(0),
            queue: RefCell::new(VecDeque::new()),
            contexts: RefCell::new(Vec::new()),
            processing: Cell::new(false),
            queue_warn_threshold: self.config.dispatcher.queue_warn_threshold,
            trace_dispatch: self.config.dispatcher.trace_dispatch,
        })
    }
}

impl fmt::Debug for EventDispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcherBuilder")
            .field("config", &self.config)
            .field("strategies", &self.strategies.as_ref().map(Vec::len))
            .finish()
    }
}
