//! Per-thread access to "the" dispatcher.
//!
//! Dispatchers are single-threaded, so the shared handle lives in a
//! thread-local rather than a process-wide static. Nothing is created
//! implicitly: install a dispatcher at startup and uninstall it at teardown.
//!
//! ```
//! use ember_core::{global, EventDispatcher};
//!
//! global::install(EventDispatcher::new()).unwrap();
//! assert!(global::current().is_some());
//!
//! let depth = global::with_current(|dispatcher| dispatcher.context_depth());
//! assert_eq!(depth, Some(0));
//!
//! global::uninstall();
//! assert!(global::current().is_none());
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::dispatcher::EventDispatcher;
use crate::error::InstallError;

thread_local! {
    static CURRENT: RefCell<Option<Rc<EventDispatcher>>> = const { RefCell::new(None) };
}

/// Make `dispatcher` this thread's current dispatcher.
///
/// Fails if one is already installed; uninstall it first to replace it.
pub fn install(dispatcher: Rc<EventDispatcher>) -> Result<(), InstallError> {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        if current.is_some() {
            return Err(InstallError::AlreadyInstalled);
        }
        *current = Some(dispatcher);
        tracing::debug!("Installed thread dispatcher");
        Ok(())
    })
}

/// This thread's dispatcher, if one is installed.
pub fn current() -> Option<Rc<EventDispatcher>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Run `f` with this thread's dispatcher.
///
/// The dispatcher is cloned out first, so `f` may install or uninstall.
pub fn with_current<R>(f: impl FnOnce(&Rc<EventDispatcher>) -> R) -> Option<R> {
    current().map(|dispatcher| f(&dispatcher))
}

/// Remove and return this thread's dispatcher.
pub fn uninstall() -> Option<Rc<EventDispatcher>> {
    let previous = CURRENT.with(|current| current.borrow_mut().take());
    if previous.is_some() {
        tracing::debug!("Uninstalled thread dispatcher");
    }
    previous
}
